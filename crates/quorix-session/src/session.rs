//! The shared round pipeline.
//!
//! One [`Session`] drives one protocol run from the server's `START`
//! sentinel to the terminal `END:<status>` frame. The pipeline, in order,
//! for every inbound frame:
//!
//! 1. completed session → drop
//! 2. `START` → driver start, emit the round-1 outputs
//! 3. `END:<status>` (session started) → complete; non-`SUCCESS` is an error
//! 4. self frame → drop
//! 5. not started → drop
//! 6. duplicate `(from, to, round, content)` → drop
//! 7. round filter (broadcast rounds accept peer broadcasts,
//!    point-to-point rounds accept frames addressed to us)
//! 8. buffer; once the round holds its expected count, process it
//!
//! `processed` guards a round against re-entry and is reverted when the
//! driver fails, so a later frame can retry; `emitted` guards a round's
//! outputs against double emission.

use std::collections::{HashMap, HashSet};

use sha2::{Digest, Sha256};

use quorix_engine::EngineMessage;
use quorix_types::message::{END_SUCCESS, FIRST_ROUND, LAST_ROUND};
use quorix_types::{GroupInfo, PartyId, ProtocolMessage, SessionKind};

use crate::{convert, Result, SessionError};

/// What a driver's round processing produced.
pub enum DriverOutput {
    /// Messages to emit for the given round.
    Messages {
        /// The round the messages belong to.
        round: u8,
        /// The messages, in emission order.
        messages: Vec<EngineMessage>,
    },
    /// The protocol's local work is done; the session announces `DONE`
    /// and waits for the relay's terminal frame.
    Finished,
}

/// Per-protocol behavior plugged into the shared pipeline.
pub trait ProtocolDriver {
    /// The artifact a completed session yields.
    type Output;

    /// The relay protocol tag this driver runs under.
    fn kind(&self) -> SessionKind;

    /// Produce the round-1 messages in response to `START`.
    fn start(&mut self) -> Result<Vec<EngineMessage>>;

    /// How many peer frames the given round needs before processing.
    fn expected_count(&self, round: u8) -> usize;

    /// Process one complete round of peer messages.
    fn process_round(&mut self, round: u8, messages: Vec<EngineMessage>) -> Result<DriverOutput>;

    /// The completion artifact; called once the relay confirms
    /// `END:SUCCESS`.
    fn finish(&mut self) -> Result<Self::Output>;
}

/// What handling one inbound frame produced.
#[derive(Debug)]
pub struct Progress<T> {
    /// Frames to forward to the relay, in order.
    pub outbound: Vec<ProtocolMessage>,
    /// The completion artifact, present exactly once per session.
    pub finished: Option<T>,
}

impl<T> Progress<T> {
    fn none() -> Self {
        Self {
            outbound: Vec::new(),
            finished: None,
        }
    }
}

#[derive(Default)]
struct RoundState {
    buffered: Vec<ProtocolMessage>,
    processed: bool,
    emitted: bool,
}

/// A protocol session bound to one group and one driver.
pub struct Session<D: ProtocolDriver> {
    group: GroupInfo,
    own_id: PartyId,
    own_index: u8,
    driver: D,
    // -1 until the server's START arrives.
    current_round: i32,
    complete: bool,
    artifact_ready: bool,
    seen: HashSet<[u8; 32]>,
    rounds: HashMap<u8, RoundState>,
}

impl<D: ProtocolDriver> Session<D> {
    /// Bind a driver to a validated group.
    pub fn new(group: GroupInfo, own_id: PartyId, driver: D) -> Result<Self> {
        group.validate()?;
        let own_index = group
            .member_index(&own_id)
            .ok_or_else(|| SessionError::BadPeer(own_id.to_string()))?;
        Ok(Self {
            group,
            own_id,
            own_index,
            driver,
            current_round: -1,
            complete: false,
            artifact_ready: false,
            seen: HashSet::new(),
            rounds: HashMap::new(),
        })
    }

    /// The relay protocol tag this session runs under.
    pub fn kind(&self) -> SessionKind {
        self.driver.kind()
    }

    /// The group this session runs in.
    pub fn group(&self) -> &GroupInfo {
        &self.group
    }

    /// This party's member index.
    pub fn own_index(&self) -> u8 {
        self.own_index
    }

    /// Whether the terminal frame has been received.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Whether the local artifact exists (i.e. `DONE` has been emitted).
    pub fn artifact_ready(&self) -> bool {
        self.artifact_ready
    }

    /// The current round, `-1` before `START`.
    pub fn current_round(&self) -> i32 {
        self.current_round
    }

    /// Run one inbound frame through the pipeline.
    pub fn handle_message(&mut self, frame: ProtocolMessage) -> Result<Progress<D::Output>> {
        if self.complete {
            tracing::debug!(round = frame.round, "session complete, dropping frame");
            return Ok(Progress::none());
        }

        if frame.is_start() {
            return self.handle_start();
        }

        if let Some(status) = frame.end_status() {
            let status = status.to_string();
            return self.handle_end(&status);
        }

        if frame.from_id == self.own_id {
            tracing::debug!(round = frame.round, "dropping self frame");
            return Ok(Progress::none());
        }

        if self.current_round < 0 {
            tracing::debug!(round = frame.round, "session not started, dropping frame");
            return Ok(Progress::none());
        }

        if !self.seen.insert(frame_digest(&frame)) {
            tracing::debug!(round = frame.round, from = %frame.from_id, "dropping duplicate frame");
            return Ok(Progress::none());
        }

        if !self.accepts(&frame) {
            return Ok(Progress::none());
        }

        let round = frame.round;
        let expected = self.driver.expected_count(round);
        let state = self.rounds.entry(round).or_default();
        state.buffered.push(frame);

        if state.processed || state.buffered.len() < expected {
            return Ok(Progress::none());
        }
        self.process_round(round, expected)
    }

    fn handle_start(&mut self) -> Result<Progress<D::Output>> {
        if self.current_round >= 0 {
            tracing::debug!("dropping repeated START");
            return Ok(Progress::none());
        }
        self.current_round = i32::from(FIRST_ROUND);
        let outputs = self.driver.start()?;
        tracing::info!(
            kind = %self.driver.kind(),
            group_id = %self.group.group_id,
            party_index = self.own_index,
            "session started"
        );
        Ok(Progress {
            outbound: self.emit(FIRST_ROUND, outputs)?,
            finished: None,
        })
    }

    fn handle_end(&mut self, status: &str) -> Result<Progress<D::Output>> {
        if self.current_round < 0 {
            tracing::debug!(status, "END before START, dropping frame");
            return Ok(Progress::none());
        }
        self.complete = true;

        if status == END_SUCCESS {
            let artifact = self.driver.finish()?;
            tracing::info!(
                kind = %self.driver.kind(),
                group_id = %self.group.group_id,
                "session completed"
            );
            return Ok(Progress {
                outbound: Vec::new(),
                finished: Some(artifact),
            });
        }

        tracing::warn!(status, "session terminated without success");
        Err(SessionError::EndedNonSuccess(status.to_string()))
    }

    /// Round-semantics filter: rounds 1 and 4 are broadcast, rounds 2
    /// and 3 are point-to-point (frames for us or for everyone).
    fn accepts(&self, frame: &ProtocolMessage) -> bool {
        if !(FIRST_ROUND..=LAST_ROUND).contains(&frame.round) {
            tracing::warn!(round = frame.round, from = %frame.from_id, "dropping out-of-range round");
            return false;
        }
        if frame.is_broadcast() || frame.to_id == self.own_id {
            return true;
        }
        tracing::debug!(round = frame.round, to = %frame.to_id, "dropping frame addressed elsewhere");
        false
    }

    fn process_round(&mut self, round: u8, expected: usize) -> Result<Progress<D::Output>> {
        let frames = {
            let Some(state) = self.rounds.get_mut(&round) else {
                return Ok(Progress::none());
            };
            state.processed = true;
            // Exactly the expected count reaches the driver, even if a
            // reverted round has accumulated extras since.
            state.buffered[..expected].to_vec()
        };

        tracing::debug!(round, frames = frames.len(), "processing round");
        let outcome = self.run_driver(round, &frames);

        let output = match outcome {
            Ok(output) => output,
            Err(e) => {
                if let Some(state) = self.rounds.get_mut(&round) {
                    state.processed = false;
                }
                return Err(e);
            }
        };

        let already_emitted = self
            .rounds
            .get(&round)
            .map(|s| s.emitted)
            .unwrap_or(false);
        if let Some(state) = self.rounds.get_mut(&round) {
            state.emitted = true;
        }

        match output {
            DriverOutput::Messages {
                round: next,
                messages,
            } => {
                self.current_round = i32::from(next);
                if already_emitted {
                    return Ok(Progress::none());
                }
                Ok(Progress {
                    outbound: self.emit(next, messages)?,
                    finished: None,
                })
            }
            DriverOutput::Finished => {
                self.artifact_ready = true;
                if already_emitted {
                    return Ok(Progress::none());
                }
                tracing::info!(
                    kind = %self.driver.kind(),
                    group_id = %self.group.group_id,
                    "local work complete, announcing DONE"
                );
                Ok(Progress {
                    outbound: vec![ProtocolMessage::done(
                        self.group.group_id.clone(),
                        self.own_id.clone(),
                    )],
                    finished: None,
                })
            }
        }
    }

    fn run_driver(&mut self, round: u8, frames: &[ProtocolMessage]) -> Result<DriverOutput> {
        let mut inputs = Vec::with_capacity(frames.len());
        for frame in frames {
            inputs.push(convert::to_engine(frame, &self.group)?);
        }
        self.driver.process_round(round, inputs)
    }

    fn emit(&self, round: u8, messages: Vec<EngineMessage>) -> Result<Vec<ProtocolMessage>> {
        messages
            .into_iter()
            .map(|m| convert::from_engine(m, &self.group, &self.own_id, round))
            .collect()
    }
}

/// Stable digest over `(from_id, to_id, round, content)` for replay and
/// duplicate suppression.
fn frame_digest(frame: &ProtocolMessage) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(frame.from_id.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(frame.to_id.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update([frame.round]);
    hasher.update(frame.content.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorix_crypto::encoding;
    use quorix_types::{GroupId, GroupMember};

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

    /// Scripted driver: two-peer rounds, finishes after round 2.
    struct TestDriver {
        rounds_seen: Vec<(u8, usize)>,
        fail_round: Option<u8>,
        finished: bool,
    }

    impl TestDriver {
        fn new() -> Self {
            Self {
                rounds_seen: Vec::new(),
                fail_round: None,
                finished: false,
            }
        }
    }

    impl ProtocolDriver for TestDriver {
        type Output = String;

        fn kind(&self) -> SessionKind {
            SessionKind::Keygen
        }

        fn start(&mut self) -> Result<Vec<EngineMessage>> {
            Ok(vec![EngineMessage {
                payload: b"first".to_vec(),
                from_index: 0,
                to_index: None,
            }])
        }

        fn expected_count(&self, _round: u8) -> usize {
            2
        }

        fn process_round(
            &mut self,
            round: u8,
            messages: Vec<EngineMessage>,
        ) -> Result<DriverOutput> {
            if self.fail_round.take() == Some(round) {
                return Err(SessionError::Protocol("scripted failure".to_string()));
            }
            self.rounds_seen.push((round, messages.len()));
            if round == 2 {
                self.finished = true;
                Ok(DriverOutput::Finished)
            } else {
                Ok(DriverOutput::Messages {
                    round: round + 1,
                    messages: vec![EngineMessage {
                        payload: vec![round + 1],
                        from_index: 0,
                        to_index: Some(1),
                    }],
                })
            }
        }

        fn finish(&mut self) -> Result<String> {
            if !self.finished {
                return Err(SessionError::Protocol("no artifact".to_string()));
            }
            Ok("artifact".to_string())
        }
    }

    fn session() -> Session<TestDriver> {
        Session::new(group(), party(1), TestDriver::new()).expect("session")
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

    fn end_frame(status: &str) -> ProtocolMessage {
        ProtocolMessage {
            group_id: group().group_id,
            from_id: PartyId::server(),
            to_id: party(1),
            content: format!("END:{status}"),
            round: 5,
            timestamp: 0,
        }
    }

    fn peer_frame(from_tag: u8, to: PartyId, round: u8, payload: &[u8]) -> ProtocolMessage {
        ProtocolMessage {
            group_id: group().group_id,
            from_id: party(from_tag),
            to_id: to,
            content: encoding::b64_encode(payload),
            round,
            timestamp: 0,
        }
    }

    #[test]
    fn test_frames_before_start_are_dropped() {
        let mut s = session();
        let progress = s
            .handle_message(peer_frame(2, PartyId::broadcast(), 1, b"early"))
            .expect("handle");
        assert!(progress.outbound.is_empty());
        assert_eq!(s.current_round(), -1);
    }

    #[test]
    fn test_start_emits_round_one() {
        let mut s = session();
        let progress = s.handle_message(start_frame()).expect("handle");
        assert_eq!(progress.outbound.len(), 1);
        assert_eq!(progress.outbound[0].round, 1);
        assert!(progress.outbound[0].is_broadcast());
        assert_eq!(s.current_round(), 1);
    }

    #[test]
    fn test_repeated_start_is_dropped() {
        let mut s = session();
        let _ = s.handle_message(start_frame()).expect("handle");
        let progress = s.handle_message(start_frame()).expect("handle");
        assert!(progress.outbound.is_empty());
    }

    #[test]
    fn test_round_processes_at_expected_count() {
        let mut s = session();
        let _ = s.handle_message(start_frame()).expect("start");

        let none = s
            .handle_message(peer_frame(2, PartyId::broadcast(), 1, b"a"))
            .expect("first peer");
        assert!(none.outbound.is_empty());

        let progress = s
            .handle_message(peer_frame(3, PartyId::broadcast(), 1, b"b"))
            .expect("second peer");
        assert_eq!(progress.outbound.len(), 1);
        assert_eq!(progress.outbound[0].round, 2);
        assert_eq!(s.driver.rounds_seen, vec![(1, 2)]);
    }

    #[test]
    fn test_duplicates_are_no_ops() {
        let mut s = session();
        let _ = s.handle_message(start_frame()).expect("start");

        for _ in 0..3 {
            let progress = s
                .handle_message(peer_frame(2, PartyId::broadcast(), 1, b"a"))
                .expect("duplicate");
            assert!(progress.outbound.is_empty());
        }
        // Still waiting for the second distinct frame.
        assert!(s.driver.rounds_seen.is_empty());

        let progress = s
            .handle_message(peer_frame(3, PartyId::broadcast(), 1, b"b"))
            .expect("second peer");
        assert!(!progress.outbound.is_empty());
        assert_eq!(s.driver.rounds_seen, vec![(1, 2)]);
    }

    #[test]
    fn test_self_frames_have_no_effect() {
        let mut s = session();
        let _ = s.handle_message(start_frame()).expect("start");
        let progress = s
            .handle_message(peer_frame(1, PartyId::broadcast(), 1, b"echo"))
            .expect("self frame");
        assert!(progress.outbound.is_empty());
        assert!(s.driver.rounds_seen.is_empty());
    }

    #[test]
    fn test_frames_addressed_elsewhere_are_dropped() {
        let mut s = session();
        let _ = s.handle_message(start_frame()).expect("start");
        let progress = s
            .handle_message(peer_frame(2, party(3), 2, b"not for us"))
            .expect("handle");
        assert!(progress.outbound.is_empty());
        assert!(s.driver.rounds_seen.is_empty());
    }

    #[test]
    fn test_out_of_range_round_dropped() {
        let mut s = session();
        let _ = s.handle_message(start_frame()).expect("start");
        let progress = s
            .handle_message(peer_frame(2, PartyId::broadcast(), 5, b"late"))
            .expect("handle");
        assert!(progress.outbound.is_empty());
    }

    #[test]
    fn test_completion_handshake() {
        let mut s = session();
        let _ = s.handle_message(start_frame()).expect("start");
        for round in 1..=2u8 {
            let _ = s
                .handle_message(peer_frame(2, PartyId::broadcast(), round, b"a"))
                .expect("peer");
            let progress = s
                .handle_message(peer_frame(3, PartyId::broadcast(), round, b"b"))
                .expect("peer");
            if round == 2 {
                // Local work done: the DONE frame goes to the relay.
                assert_eq!(progress.outbound.len(), 1);
                assert!(progress.outbound[0].is_done());
                assert!(s.artifact_ready());
            }
        }

        let progress = s.handle_message(end_frame("SUCCESS")).expect("end");
        assert_eq!(progress.finished.as_deref(), Some("artifact"));
        assert!(s.is_complete());

        // Everything after completion is dropped.
        let after = s
            .handle_message(peer_frame(2, PartyId::broadcast(), 1, b"zombie"))
            .expect("after end");
        assert!(after.outbound.is_empty());
    }

    #[test]
    fn test_end_without_success_is_an_error() {
        let mut s = session();
        let _ = s.handle_message(start_frame()).expect("start");
        let result = s.handle_message(end_frame("TIMEOUT"));
        assert!(matches!(
            result,
            Err(SessionError::EndedNonSuccess(status)) if status == "TIMEOUT"
        ));
        assert!(s.is_complete());
    }

    #[test]
    fn test_end_before_start_is_dropped() {
        let mut s = session();
        let progress = s.handle_message(end_frame("SUCCESS")).expect("handle");
        assert!(progress.finished.is_none());
        assert!(!s.is_complete());
    }

    #[test]
    fn test_driver_failure_reverts_processed_and_retries() {
        let mut s = session();
        s.driver.fail_round = Some(1);
        let _ = s.handle_message(start_frame()).expect("start");

        let _ = s
            .handle_message(peer_frame(2, PartyId::broadcast(), 1, b"a"))
            .expect("peer");
        let result = s.handle_message(peer_frame(3, PartyId::broadcast(), 1, b"b"));
        assert!(result.is_err());
        assert!(s.driver.rounds_seen.is_empty());

        // A further frame for the round retries with exactly the expected
        // count.
        let progress = s
            .handle_message(peer_frame(3, PartyId::broadcast(), 1, b"c"))
            .expect("retry");
        assert_eq!(progress.outbound.len(), 1);
        assert_eq!(s.driver.rounds_seen, vec![(1, 2)]);
    }

    #[test]
    fn test_unknown_own_party_rejected() {
        let result = Session::new(group(), party(9), TestDriver::new());
        assert!(matches!(result, Err(SessionError::BadPeer(_))));
    }
}
