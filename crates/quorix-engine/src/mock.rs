//! Deterministic scripted engine for tests.
//!
//! The mock reproduces the black-box engine's observable behavior — round
//! counts, message fan-out, keyshare and signature shapes — with payloads
//! derived from SHA-256 so that every party computes identical artifacts:
//!
//! - the aggregate public key is a function of `(group_id, n, t)` and is
//!   embedded verbatim in each party's round-4 broadcast, so cross-party
//!   equality is observable;
//! - rotation parses the prior share and carries its public key forward;
//! - `(r, s)` is a function of the message hash and the full multiset of
//!   partials, so every signer combines to the same signature.

use sha2::{Digest, Sha256};

use crate::{
    Engine, EngineError, EngineKeyshare, EngineMessage, KeygenParams, KeygenProtocol, Result,
    SignParams, SignProtocol, Signature,
};

use serde::{Deserialize, Serialize};

/// The deterministic test engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockEngine;

/// The mock's keyshare blob layout.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MockShare {
    /// Aggregate public key, hex.
    pub public_key: String,
    /// Owning party's member index.
    pub party_index: u8,
    /// Signing threshold.
    pub threshold: u16,
    /// Number of participants.
    pub participants: u16,
    /// Group id, hex.
    pub group_id: String,
}

impl MockShare {
    /// Decode a mock share blob.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| EngineError::Keyshare(e.to_string()))
    }
}

fn digest(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}

/// Compressed-point-shaped public key for a group: `0x02 ‖ SHA-256(...)`.
fn group_public_key(group_id: &[u8], n: u16, t: u16) -> Vec<u8> {
    let mut key = vec![0x02u8];
    key.extend(digest(&[
        b"mock-group-key",
        group_id,
        &n.to_be_bytes(),
        &t.to_be_bytes(),
    ]));
    key
}

struct MockKeygen {
    params: KeygenParams,
    public_key: Vec<u8>,
    // Next round whose inputs handle_messages expects; 0 until the first
    // message has been created.
    round: u8,
    share_ready: bool,
}

impl MockKeygen {
    fn new(params: KeygenParams) -> Result<Self> {
        if params.threshold < 2 || params.threshold > params.total_parties {
            return Err(EngineError::InvalidParameters(format!(
                "threshold {} out of range for {} parties",
                params.threshold, params.total_parties
            )));
        }
        if u16::from(params.party_index) >= params.total_parties {
            return Err(EngineError::InvalidParameters(format!(
                "party index {} out of range",
                params.party_index
            )));
        }
        if params.group_id.is_empty() {
            return Err(EngineError::InvalidParameters("empty group id".to_string()));
        }

        let public_key = match &params.prior_keyshare {
            // Rotation: the aggregate key is preserved from the prior share.
            Some(blob) => {
                let prior = MockShare::decode(blob)?;
                hex::decode(&prior.public_key)
                    .map_err(|e| EngineError::Keyshare(e.to_string()))?
            }
            None => group_public_key(&params.group_id, params.total_parties, params.threshold),
        };

        Ok(Self {
            params,
            public_key,
            round: 0,
            share_ready: false,
        })
    }

    fn peer_payload(&self, round: u8, to_index: u8) -> Vec<u8> {
        digest(&[
            b"mock-keygen",
            &self.params.group_id,
            &[round, self.params.party_index, to_index],
        ])
    }

    fn check_inputs(&self, messages: &[EngineMessage]) -> Result<()> {
        let expected = usize::from(self.params.total_parties) - 1;
        if messages.len() != expected {
            return Err(EngineError::Protocol(format!(
                "round {}: expected {expected} messages, got {}",
                self.round,
                messages.len()
            )));
        }
        for msg in messages {
            if msg.from_index == self.params.party_index
                || u16::from(msg.from_index) >= self.params.total_parties
            {
                return Err(EngineError::Protocol(format!(
                    "round {}: bad sender index {}",
                    self.round, msg.from_index
                )));
            }
        }
        Ok(())
    }
}

impl KeygenProtocol for MockKeygen {
    fn create_first_message(&mut self) -> Result<EngineMessage> {
        if self.round != 0 {
            return Err(EngineError::Protocol(
                "first message already created".to_string(),
            ));
        }
        self.round = 1;
        Ok(EngineMessage {
            payload: digest(&[
                b"mock-keygen",
                &self.params.group_id,
                &[1, self.params.party_index],
            ]),
            from_index: self.params.party_index,
            to_index: None,
        })
    }

    fn handle_messages(&mut self, messages: Vec<EngineMessage>) -> Result<Vec<EngineMessage>> {
        if !(1..=4).contains(&self.round) {
            return Err(EngineError::Protocol(format!(
                "unexpected round {}",
                self.round
            )));
        }
        self.check_inputs(&messages)?;

        let me = self.params.party_index;
        let outputs = match self.round {
            1 | 2 => {
                let next = self.round + 1;
                (0..self.params.total_parties)
                    .filter_map(|j| u8::try_from(j).ok())
                    .filter(|&j| j != me)
                    .map(|j| EngineMessage {
                        payload: self.peer_payload(next, j),
                        from_index: me,
                        to_index: Some(j),
                    })
                    .collect()
            }
            3 => vec![EngineMessage {
                payload: self.public_key.clone(),
                from_index: me,
                to_index: None,
            }],
            _ => {
                for msg in &messages {
                    if msg.payload != self.public_key {
                        return Err(EngineError::Protocol(format!(
                            "party {} disagrees on the public key",
                            msg.from_index
                        )));
                    }
                }
                self.share_ready = true;
                Vec::new()
            }
        };
        self.round += 1;
        Ok(outputs)
    }

    fn keyshare(&mut self) -> Result<EngineKeyshare> {
        if !self.share_ready {
            return Err(EngineError::Protocol(
                "keyshare requested before the final round".to_string(),
            ));
        }
        let share = MockShare {
            public_key: hex::encode(&self.public_key),
            party_index: self.params.party_index,
            threshold: self.params.threshold,
            participants: self.params.total_parties,
            group_id: hex::encode(&self.params.group_id),
        };
        let serialized =
            serde_json::to_vec(&share).map_err(|e| EngineError::Keyshare(e.to_string()))?;
        Ok(EngineKeyshare {
            serialized,
            public_key: self.public_key.clone(),
            participants: self.params.total_parties,
            threshold: self.params.threshold,
            party_index: self.params.party_index,
        })
    }
}

struct MockSign {
    share: MockShare,
    message_hash: Option<[u8; 32]>,
    round: u8,
    peers: Vec<u8>,
    partial_taken: bool,
}

impl MockSign {
    fn partial_for(&self, index: u8) -> Result<Vec<u8>> {
        let hash = self
            .message_hash
            .ok_or_else(|| EngineError::Protocol("no message hash bound".to_string()))?;
        Ok(digest(&[b"mock-partial", &hash, &[index]]))
    }

    fn peer_payload(&self, round: u8, to_index: u8) -> Vec<u8> {
        digest(&[b"mock-sign", &[round, self.share.party_index, to_index]])
    }
}

impl SignProtocol for MockSign {
    fn create_first_message(&mut self, message_hash: &[u8; 32]) -> Result<EngineMessage> {
        if self.round != 0 {
            return Err(EngineError::Protocol(
                "first message already created".to_string(),
            ));
        }
        self.message_hash = Some(*message_hash);
        self.round = 1;
        Ok(EngineMessage {
            payload: digest(&[b"mock-sign", message_hash, &[1, self.share.party_index]]),
            from_index: self.share.party_index,
            to_index: None,
        })
    }

    fn handle_messages(&mut self, messages: Vec<EngineMessage>) -> Result<Vec<EngineMessage>> {
        if !(1..=3).contains(&self.round) {
            return Err(EngineError::Protocol(format!(
                "unexpected round {}",
                self.round
            )));
        }
        if messages.is_empty() {
            return Err(EngineError::Protocol("empty round input".to_string()));
        }
        for msg in &messages {
            if msg.from_index == self.share.party_index {
                return Err(EngineError::Protocol("own message fed back".to_string()));
            }
        }

        if self.round == 1 {
            self.peers = messages.iter().map(|m| m.from_index).collect();
            self.peers.sort_unstable();
        }

        let outputs = if self.round < 3 {
            let next = self.round + 1;
            self.peers
                .clone()
                .into_iter()
                .map(|j| EngineMessage {
                    payload: self.peer_payload(next, j),
                    from_index: self.share.party_index,
                    to_index: Some(j),
                })
                .collect()
        } else {
            // The partial is produced on demand via last_message.
            Vec::new()
        };
        self.round += 1;
        Ok(outputs)
    }

    fn last_message(&mut self, message_hash: &[u8; 32]) -> Result<EngineMessage> {
        if self.round != 4 {
            return Err(EngineError::Protocol(
                "partial requested before round 3 completed".to_string(),
            ));
        }
        if self.message_hash != Some(*message_hash) {
            return Err(EngineError::Protocol("message hash mismatch".to_string()));
        }
        self.partial_taken = true;
        Ok(EngineMessage {
            payload: self.partial_for(self.share.party_index)?,
            from_index: self.share.party_index,
            to_index: None,
        })
    }

    fn combine(&mut self, partials: Vec<EngineMessage>) -> Result<Signature> {
        if !self.partial_taken {
            return Err(EngineError::Protocol(
                "partial signature not produced".to_string(),
            ));
        }
        let hash = self
            .message_hash
            .ok_or_else(|| EngineError::Protocol("no message hash bound".to_string()))?;

        let mut shares: Vec<Vec<u8>> = partials.into_iter().map(|m| m.payload).collect();
        shares.push(self.partial_for(self.share.party_index)?);
        shares.sort();

        let mut transcript = hash.to_vec();
        for share in &shares {
            transcript.extend_from_slice(share);
        }
        Ok(Signature {
            r: digest(&[b"mock-r", &transcript]),
            s: digest(&[b"mock-s", &transcript]),
        })
    }
}

impl Engine for MockEngine {
    fn keygen(&self, params: KeygenParams) -> Result<Box<dyn KeygenProtocol>> {
        Ok(Box::new(MockKeygen::new(params)?))
    }

    fn sign(&self, params: SignParams) -> Result<Box<dyn SignProtocol>> {
        let share = MockShare::decode(&params.keyshare)?;
        Ok(Box::new(MockSign {
            share,
            message_hash: None,
            round: 0,
            peers: Vec::new(),
            partial_taken: false,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(index: u8) -> KeygenParams {
        KeygenParams {
            total_parties: 3,
            threshold: 2,
            party_index: index,
            group_id: vec![0x11u8; 32],
            seed: None,
            distributed: true,
            prior_keyshare: None,
        }
    }

    /// Drive n mock keygen sessions to completion by routing messages
    /// between them directly.
    fn run_keygen(sessions: &mut [Box<dyn KeygenProtocol>]) -> Vec<EngineKeyshare> {
        let n = sessions.len();
        let mut inbox: Vec<Vec<EngineMessage>> = vec![Vec::new(); n];

        for (i, session) in sessions.iter_mut().enumerate() {
            let first = session.create_first_message().expect("first message");
            for (j, slot) in inbox.iter_mut().enumerate() {
                if j != i {
                    slot.push(first.clone());
                }
            }
        }

        for _round in 1..=4 {
            let mut next: Vec<Vec<EngineMessage>> = vec![Vec::new(); n];
            for (i, session) in sessions.iter_mut().enumerate() {
                let outputs = session
                    .handle_messages(std::mem::take(&mut inbox[i]))
                    .expect("handle round");
                for msg in outputs {
                    match msg.to_index {
                        Some(j) => next[usize::from(j)].push(msg),
                        None => {
                            for (j, slot) in next.iter_mut().enumerate() {
                                if j != i {
                                    slot.push(msg.clone());
                                }
                            }
                        }
                    }
                }
            }
            inbox = next;
        }

        sessions
            .iter_mut()
            .map(|s| s.keyshare().expect("keyshare"))
            .collect()
    }

    #[test]
    fn test_keygen_public_keys_agree() {
        let engine = MockEngine;
        let mut sessions: Vec<Box<dyn KeygenProtocol>> = (0..3u8)
            .map(|i| engine.keygen(params(i)).expect("session"))
            .collect();
        let shares = run_keygen(&mut sessions);
        assert_eq!(shares[0].public_key, shares[1].public_key);
        assert_eq!(shares[1].public_key, shares[2].public_key);
        assert_eq!(shares[0].public_key.len(), 33);
        assert_eq!(shares[0].public_key[0], 0x02);
    }

    #[test]
    fn test_rotation_preserves_public_key() {
        let engine = MockEngine;
        let mut sessions: Vec<Box<dyn KeygenProtocol>> = (0..3u8)
            .map(|i| engine.keygen(params(i)).expect("session"))
            .collect();
        let shares = run_keygen(&mut sessions);

        let mut rotated: Vec<Box<dyn KeygenProtocol>> = (0..3u8)
            .map(|i| {
                let mut p = params(i);
                p.prior_keyshare = Some(shares[usize::from(i)].serialized.clone());
                engine.keygen(p).expect("rotation session")
            })
            .collect();
        let new_shares = run_keygen(&mut rotated);
        assert_eq!(new_shares[0].public_key, shares[0].public_key);
    }

    #[test]
    fn test_keyshare_before_final_round_rejected() {
        let engine = MockEngine;
        let mut session = engine.keygen(params(0)).expect("session");
        assert!(session.keyshare().is_err());
    }

    #[test]
    fn test_wrong_message_count_rejected() {
        let engine = MockEngine;
        let mut session = engine.keygen(params(0)).expect("session");
        let _ = session.create_first_message().expect("first");
        assert!(session.handle_messages(Vec::new()).is_err());
    }

    #[test]
    fn test_bad_threshold_rejected() {
        let engine = MockEngine;
        let mut p = params(0);
        p.threshold = 1;
        assert!(engine.keygen(p).is_err());
        let mut p = params(0);
        p.threshold = 4;
        assert!(engine.keygen(p).is_err());
    }

    #[test]
    fn test_signing_parties_agree() {
        let engine = MockEngine;
        let mut sessions: Vec<Box<dyn KeygenProtocol>> = (0..3u8)
            .map(|i| engine.keygen(params(i)).expect("session"))
            .collect();
        let shares = run_keygen(&mut sessions);
        let hash: [u8; 32] = core::array::from_fn(|i| u8::try_from(i + 1).unwrap_or(0));

        // Parties 1 and 2 sign.
        let mut signers: Vec<Box<dyn SignProtocol>> = [1usize, 2]
            .iter()
            .map(|&i| {
                engine
                    .sign(SignParams::root(shares[i].serialized.clone()))
                    .expect("sign session")
            })
            .collect();

        let firsts: Vec<EngineMessage> = signers
            .iter_mut()
            .map(|s| s.create_first_message(&hash).expect("first"))
            .collect();

        // Round 1: each signer sees the other's broadcast.
        let mut outputs: Vec<Vec<EngineMessage>> = Vec::new();
        for (i, signer) in signers.iter_mut().enumerate() {
            let peer_msgs: Vec<EngineMessage> = firsts
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, m)| m.clone())
                .collect();
            outputs.push(signer.handle_messages(peer_msgs).expect("round 1"));
        }

        // Rounds 2 and 3: point-to-point between the two signers.
        for _round in 2..=3 {
            let mut next: Vec<Vec<EngineMessage>> = Vec::new();
            for (i, signer) in signers.iter_mut().enumerate() {
                let inbound = outputs[1 - i].clone();
                next.push(signer.handle_messages(inbound).expect("round"));
            }
            outputs = next;
        }

        let partials: Vec<EngineMessage> = signers
            .iter_mut()
            .map(|s| s.last_message(&hash).expect("partial"))
            .collect();

        let sig_a = signers[0]
            .combine(vec![partials[1].clone()])
            .expect("combine");
        let sig_b = signers[1]
            .combine(vec![partials[0].clone()])
            .expect("combine");

        assert_eq!(sig_a, sig_b);
        assert_eq!(sig_a.r.len(), 32);
        assert_eq!(sig_a.s.len(), 32);
    }

    #[test]
    fn test_combine_without_partial_rejected() {
        let engine = MockEngine;
        let share = MockShare {
            public_key: hex::encode(group_public_key(&[0x11u8; 32], 3, 2)),
            party_index: 0,
            threshold: 2,
            participants: 3,
            group_id: hex::encode([0x11u8; 32]),
        };
        let blob = serde_json::to_vec(&share).expect("encode");
        let mut signer = engine.sign(SignParams::root(blob)).expect("session");
        assert!(signer.combine(Vec::new()).is_err());
    }

    #[test]
    fn test_bad_keyshare_blob_rejected() {
        let engine = MockEngine;
        assert!(engine.sign(SignParams::root(b"not json".to_vec())).is_err());
    }
}
