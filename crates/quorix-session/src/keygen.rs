//! Keygen and rotation driver.
//!
//! Wraps an engine keygen session. Every round expects `n - 1` peer
//! frames; rounds 1 and 4 are broadcast, rounds 2 and 3 point-to-point.
//! After round 4 the engine yields the keyshare, the driver builds and
//! persists the [`KeyShare`] record (rotation goes through the
//! two-generation backup policy), and the session announces `DONE`. The
//! record is delivered once the relay confirms `END:SUCCESS`.

use quorix_crypto::encoding;
use quorix_engine::{Engine, EngineMessage, KeygenParams, KeygenProtocol};
use quorix_store::KeyShareStore;
use quorix_types::message::LAST_ROUND;
use quorix_types::{now_ms, GroupInfo, KeyShare, PartyId, SessionKind};

use crate::session::{DriverOutput, ProtocolDriver};
use crate::{Result, SessionError};

/// Options for starting a keygen or rotation session.
#[derive(Clone, Debug, Default)]
pub struct KeygenOptions {
    /// Distributed keygen (the only supported mode on the relay).
    pub distributed: bool,
    /// Optional caller-supplied entropy.
    pub seed: Option<[u8; 32]>,
    /// Prior keyshare; present for rotation.
    pub prior: Option<KeyShare>,
}

impl KeygenOptions {
    /// Plain distributed keygen.
    pub fn distributed() -> Self {
        Self {
            distributed: true,
            seed: None,
            prior: None,
        }
    }

    /// Rotation bound to a prior keyshare.
    pub fn rotation(prior: KeyShare) -> Self {
        Self {
            distributed: true,
            seed: None,
            prior: Some(prior),
        }
    }
}

/// Driver for DKG and key rotation.
pub struct KeygenDriver {
    engine: Box<dyn KeygenProtocol>,
    store: KeyShareStore,
    own_id: PartyId,
    group_info: GroupInfo,
    rotation: bool,
    record: Option<KeyShare>,
}

impl KeygenDriver {
    /// Open an engine session for the group and wrap it.
    pub fn new(
        engine: &dyn Engine,
        group: &GroupInfo,
        own_id: &PartyId,
        store: KeyShareStore,
        options: KeygenOptions,
    ) -> Result<Self> {
        let own_index = group
            .member_index(own_id)
            .ok_or_else(|| SessionError::BadPeer(own_id.to_string()))?;
        let rotation = options.prior.is_some();

        let params = KeygenParams {
            total_parties: group.n,
            threshold: group.t,
            party_index: own_index,
            group_id: group.group_id.to_bytes()?,
            seed: options.seed,
            distributed: options.distributed,
            prior_keyshare: options.prior.map(|p| p.serialized),
        };
        let session = engine.keygen(params)?;

        Ok(Self {
            engine: session,
            store,
            own_id: own_id.clone(),
            group_info: group.clone(),
            rotation,
            record: None,
        })
    }

    fn complete_round_four(&mut self, messages: Vec<EngineMessage>) -> Result<()> {
        let leftovers = self.engine.handle_messages(messages)?;
        if !leftovers.is_empty() {
            return Err(SessionError::Protocol(
                "engine emitted messages after the final round".to_string(),
            ));
        }

        let share = self.engine.keyshare()?;
        let record = KeyShare {
            serialized: share.serialized,
            public_key: encoding::hex_encode(&share.public_key),
            participants: share.participants,
            threshold: share.threshold,
            party_id: self.own_id.clone(),
            party_index: share.party_index,
            group_id: self.group_info.group_id.clone(),
            total_parties: self.group_info.n,
            timestamp: now_ms(),
            api_key: None,
        };
        record.validate()?;

        if self.rotation {
            self.store.save_rotated(&record)?;
        } else {
            self.store.save(&record)?;
        }
        self.record = Some(record);
        Ok(())
    }
}

impl ProtocolDriver for KeygenDriver {
    type Output = KeyShare;

    fn kind(&self) -> SessionKind {
        SessionKind::Keygen
    }

    fn start(&mut self) -> Result<Vec<EngineMessage>> {
        Ok(vec![self.engine.create_first_message()?])
    }

    fn expected_count(&self, _round: u8) -> usize {
        usize::from(self.group_info.n).saturating_sub(1)
    }

    fn process_round(&mut self, round: u8, messages: Vec<EngineMessage>) -> Result<DriverOutput> {
        if round == LAST_ROUND {
            self.complete_round_four(messages)?;
            return Ok(DriverOutput::Finished);
        }

        let outputs = self.engine.handle_messages(messages)?;
        Ok(DriverOutput::Messages {
            round: round + 1,
            messages: outputs,
        })
    }

    fn finish(&mut self) -> Result<KeyShare> {
        self.record
            .clone()
            .ok_or_else(|| SessionError::Protocol("keyshare not yet produced".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use quorix_engine::mock::MockEngine;
    use quorix_store::{BlobStore, MemoryStore};
    use quorix_types::{GroupId, GroupMember, ProtocolMessage};
    use std::sync::Arc;

    fn party(tag: u8) -> PartyId {
        PartyId::new(format!("02{}", format!("{tag:02x}").repeat(32)))
    }

    fn group() -> GroupInfo {
        GroupInfo {
            group_id: GroupId::new("11".repeat(32)),
            n: 3,
            t: 2,
            timeout: 60,
            created_at: 0,
            updated_at: 0,
            created_by: None,
            members: (0..3u8)
                .map(|i| GroupMember {
                    party_id: party(i + 1),
                    index: i,
                })
                .collect(),
            status: "active".to_string(),
        }
    }

    fn start_frame() -> ProtocolMessage {
        ProtocolMessage {
            group_id: group().group_id,
            from_id: PartyId::server(),
            to_id: PartyId::broadcast(),
            content: "start".to_string(),
            round: 0,
            timestamp: 0,
        }
    }

    fn end_frame(to: PartyId, status: &str) -> ProtocolMessage {
        ProtocolMessage {
            group_id: group().group_id,
            from_id: PartyId::server(),
            to_id: to,
            content: format!("END:{status}"),
            round: 5,
            timestamp: 0,
        }
    }

    /// Route frames between keygen sessions until every party has
    /// announced DONE, then deliver END:SUCCESS.
    pub(crate) fn run_to_completion(
        sessions: &mut [Session<KeygenDriver>],
    ) -> Vec<KeyShare> {
        let ids: Vec<PartyId> = sessions.iter().map(|s| {
            s.group().members[usize::from(s.own_index())].party_id.clone()
        }).collect();

        let mut wire: Vec<ProtocolMessage> = Vec::new();
        for session in sessions.iter_mut() {
            let progress = session.handle_message(start_frame()).expect("start");
            wire.extend(progress.outbound);
        }

        let mut done = 0usize;
        while let Some(frame) = wire.pop() {
            if frame.is_done() {
                done += 1;
                continue;
            }
            for (i, session) in sessions.iter_mut().enumerate() {
                let mine = frame.is_broadcast() || frame.to_id == ids[i];
                if !mine || frame.from_id == ids[i] {
                    continue;
                }
                let progress = session.handle_message(frame.clone()).expect("route");
                wire.extend(progress.outbound);
            }
        }
        assert_eq!(done, sessions.len());

        sessions
            .iter_mut()
            .enumerate()
            .map(|(i, session)| {
                let progress = session
                    .handle_message(end_frame(ids[i].clone(), "SUCCESS"))
                    .expect("end");
                progress.finished.expect("record")
            })
            .collect()
    }

    fn make_sessions(
        stores: &[KeyShareStore],
        options: impl Fn(usize) -> KeygenOptions,
    ) -> Vec<Session<KeygenDriver>> {
        let engine = MockEngine;
        (0..3usize)
            .map(|i| {
                let own = party(u8::try_from(i + 1).unwrap_or(1));
                let driver = KeygenDriver::new(
                    &engine,
                    &group(),
                    &own,
                    stores[i].clone(),
                    options(i),
                )
                .expect("driver");
                Session::new(group(), own, driver).expect("session")
            })
            .collect()
    }

    fn memory_stores() -> Vec<KeyShareStore> {
        (0..3)
            .map(|_| KeyShareStore::new(Arc::new(MemoryStore::new()) as Arc<dyn BlobStore>))
            .collect()
    }

    #[test]
    fn test_three_party_dkg_agrees_on_public_key() {
        let stores = memory_stores();
        let mut sessions = make_sessions(&stores, |_| KeygenOptions::distributed());
        let records = run_to_completion(&mut sessions);

        assert_eq!(records[0].public_key, records[1].public_key);
        assert_eq!(records[1].public_key, records[2].public_key);
        assert_eq!(records[0].threshold, 2);
        assert_eq!(records[0].total_parties, 3);

        // Each party persisted its own record.
        for (i, store) in stores.iter().enumerate() {
            let loaded = store
                .load(&records[i].group_id, records[i].party_index)
                .expect("load")
                .expect("present");
            assert_eq!(loaded, records[i]);
        }
    }

    #[test]
    fn test_rotation_preserves_public_key_and_keeps_backup() {
        let stores = memory_stores();
        let mut sessions = make_sessions(&stores, |_| KeygenOptions::distributed());
        let originals = run_to_completion(&mut sessions);

        let mut rotations = make_sessions(&stores, |i| {
            KeygenOptions::rotation(originals[i].clone())
        });
        let rotated = run_to_completion(&mut rotations);

        for i in 0..3 {
            assert_eq!(rotated[i].public_key, originals[i].public_key);
            let backup = stores[i]
                .load_backup(&originals[i].group_id, originals[i].party_index)
                .expect("load backup")
                .expect("present");
            assert_eq!(backup, originals[i]);
            let current = stores[i]
                .load(&originals[i].group_id, originals[i].party_index)
                .expect("load")
                .expect("present");
            assert_eq!(current, rotated[i]);
        }
    }

    #[test]
    fn test_finish_before_final_round_is_protocol_error() {
        let stores = memory_stores();
        let mut sessions = make_sessions(&stores, |_| KeygenOptions::distributed());
        let result = sessions[0].handle_message(start_frame()).expect("start");
        assert_eq!(result.outbound.len(), 1);

        // END:SUCCESS before the keyshare exists.
        let end = end_frame(party(1), "SUCCESS");
        assert!(sessions[0].handle_message(end).is_err());
    }
}
