//! Signing driver.
//!
//! Wraps an engine signing session bound to a keyshare and a 32-byte
//! message hash. Every round expects `t - 1` peer frames. After round 3
//! the engine's partial signature goes out as the round-4 broadcast; the
//! peers' partials then combine into the final `(r, s)`, the session
//! announces `DONE`, and the signature is delivered on `END:SUCCESS`.

use quorix_engine::{Engine, EngineMessage, SignParams, SignProtocol, Signature};
use quorix_types::message::LAST_ROUND;
use quorix_types::{KeyShare, SessionKind};

use crate::session::{DriverOutput, ProtocolDriver};
use crate::{Result, SessionError};

/// Round after which the partial signature is produced.
const PARTIAL_ROUND: u8 = 3;

/// Driver for distributed signing.
pub struct SignDriver {
    engine: Box<dyn SignProtocol>,
    threshold: u16,
    message_hash: [u8; 32],
    signature: Option<Signature>,
}

impl SignDriver {
    /// Open an engine signing session for the keyshare.
    ///
    /// `derivation_path` defaults to `"m"` (the root key).
    pub fn new(
        engine: &dyn Engine,
        keyshare: &KeyShare,
        message_hash: [u8; 32],
        derivation_path: Option<String>,
    ) -> Result<Self> {
        keyshare.validate()?;
        let params = SignParams {
            keyshare: keyshare.serialized.clone(),
            derivation_path: derivation_path.unwrap_or_else(|| "m".to_string()),
            extra: None,
        };
        let session = engine.sign(params)?;
        Ok(Self {
            engine: session,
            threshold: keyshare.threshold,
            message_hash,
            signature: None,
        })
    }
}

impl ProtocolDriver for SignDriver {
    type Output = Signature;

    fn kind(&self) -> SessionKind {
        SessionKind::Sign
    }

    fn start(&mut self) -> Result<Vec<EngineMessage>> {
        Ok(vec![self.engine.create_first_message(&self.message_hash)?])
    }

    fn expected_count(&self, _round: u8) -> usize {
        usize::from(self.threshold).saturating_sub(1)
    }

    fn process_round(&mut self, round: u8, messages: Vec<EngineMessage>) -> Result<DriverOutput> {
        match round {
            PARTIAL_ROUND => {
                let leftovers = self.engine.handle_messages(messages)?;
                if !leftovers.is_empty() {
                    return Err(SessionError::Protocol(
                        "engine emitted messages before the partial".to_string(),
                    ));
                }
                let partial = self.engine.last_message(&self.message_hash)?;
                Ok(DriverOutput::Messages {
                    round: LAST_ROUND,
                    messages: vec![partial],
                })
            }
            LAST_ROUND => {
                // The engine holds our own partial; inputs are the peers'.
                let signature = self.engine.combine(messages)?;
                self.signature = Some(signature);
                Ok(DriverOutput::Finished)
            }
            _ => {
                let outputs = self.engine.handle_messages(messages)?;
                Ok(DriverOutput::Messages {
                    round: round + 1,
                    messages: outputs,
                })
            }
        }
    }

    fn finish(&mut self) -> Result<Signature> {
        self.signature
            .clone()
            .ok_or_else(|| SessionError::Protocol("signature not yet combined".to_string()))
    }
}
