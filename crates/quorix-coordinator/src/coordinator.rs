//! The coordinator façade.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use quorix_engine::Engine;
use quorix_relay::RelayClient;
use quorix_session::{KeygenDriver, KeygenOptions, Session, SignDriver};
use quorix_store::KeyShareStore;
use quorix_token::{SessionToken, BOOTSTRAP_WINDOW_MS};
use quorix_transport::{Transport, TransportConfig};
use quorix_types::{now_ms, GroupId, GroupInfo, KeyShare, PartyId, ProtocolMessage, SessionKind};

use crate::config::{validate_parameters, CoordinatorConfig};
use crate::events::{CoordinatorEvent, EventBus};
use crate::{CoordinatorError, Result};

enum ActiveSession {
    Keygen {
        session: Session<KeygenDriver>,
        rotation: bool,
    },
    Sign(Session<SignDriver>),
}

impl ActiveSession {
    fn kind(&self) -> SessionKind {
        match self {
            ActiveSession::Keygen { session, .. } => session.kind(),
            ActiveSession::Sign(session) => session.kind(),
        }
    }

    fn group_id(&self) -> GroupId {
        match self {
            ActiveSession::Keygen { session, .. } => session.group().group_id.clone(),
            ActiveSession::Sign(session) => session.group().group_id.clone(),
        }
    }

    fn is_complete(&self) -> bool {
        match self {
            ActiveSession::Keygen { session, .. } => session.is_complete(),
            ActiveSession::Sign(session) => session.is_complete(),
        }
    }
}

/// The single entry point external callers drive.
pub struct Coordinator {
    relay: RelayClient,
    transport: Transport,
    store: KeyShareStore,
    engine: Arc<dyn Engine>,
    group: Option<GroupInfo>,
    active: Option<ActiveSession>,
    outgoing: VecDeque<ProtocolMessage>,
    queued: HashSet<[u8; 32]>,
    sent: HashSet<[u8; 32]>,
    events: EventBus,
}

impl Coordinator {
    /// Build a coordinator over a relay, an engine, and a keyshare store.
    pub fn new(config: CoordinatorConfig, engine: Arc<dyn Engine>, store: KeyShareStore) -> Self {
        Self {
            relay: RelayClient::new(config.relay_url.clone()),
            transport: Transport::new(TransportConfig::new(config.ws_url.clone())),
            store,
            engine,
            group: None,
            active: None,
            outgoing: VecDeque::new(),
            queued: HashSet::new(),
            sent: HashSet::new(),
            events: EventBus::default(),
        }
    }

    /// Load persisted state: the keyshares available for signing.
    ///
    /// There is no resumption of an in-flight session across restarts; a
    /// restart aborts it and the relay eventually times the group out.
    pub fn initialize(&self) -> Result<Vec<KeyShare>> {
        let records = self.store.list()?;
        tracing::debug!(keyshares = records.len(), "coordinator initialized");
        Ok(records)
    }

    /// Subscribe to completion and error events.
    pub fn events(&self) -> tokio::sync::broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    /// The active group record, when one has been created or joined.
    pub fn group(&self) -> Option<&GroupInfo> {
        self.group.as_ref()
    }

    /// This party's relay handle, once registered.
    pub fn party_id(&self) -> Option<&PartyId> {
        self.relay.party_id()
    }

    /// Register with the relay; stores the bearer token and arms loop
    /// suppression with the assigned party id.
    pub async fn register(&mut self) -> Result<PartyId> {
        let registered = self.relay.register().await?;
        self.transport.set_own_party_id(registered.party_id.clone());
        Ok(registered.party_id)
    }

    /// Restore previously persisted credentials instead of registering.
    pub fn set_credentials(&mut self, party_id: PartyId, token: String) {
        self.transport.set_own_party_id(party_id.clone());
        self.relay.set_credentials(party_id, token);
    }

    /// Restore a previously fetched group record (rehydration path).
    pub fn set_group(&mut self, group: GroupInfo) -> Result<()> {
        group
            .validate()
            .map_err(|e| CoordinatorError::Config(e.to_string()))?;
        self.group = Some(group);
        Ok(())
    }

    /// Create a group on the relay.
    pub async fn create_group(&mut self, t: u16, n: u16, timeout_minutes: u64) -> Result<GroupInfo> {
        validate_parameters(t, n)?;
        let group = self.relay.create_group(n, t, timeout_minutes).await?;
        group
            .validate()
            .map_err(|e| CoordinatorError::Config(e.to_string()))?;
        self.group = Some(group.clone());
        Ok(group)
    }

    /// Join a group and fetch its record.
    pub async fn join_group(&mut self, group_id: &GroupId) -> Result<GroupInfo> {
        self.relay.join_group(group_id).await?;
        let group = self.relay.group_info(group_id).await?;
        group
            .validate()
            .map_err(|e| CoordinatorError::Config(e.to_string()))?;
        self.group = Some(group.clone());
        Ok(group)
    }

    /// Initiator side of the out-of-band bootstrap: build a keygen token
    /// and install its key into the transport.
    pub fn create_keygen_token(&mut self) -> Result<String> {
        let group = self.require_group()?.clone();
        let (token, key) = SessionToken::keygen(&group, now_ms());
        self.transport.set_encryption_key(key);
        Ok(token.encode()?)
    }

    /// Build a rotation token.
    pub fn create_rotation_token(&mut self, rotation_type: &str) -> Result<String> {
        let group = self.require_group()?.clone();
        let (token, key) = SessionToken::rotation(&group, rotation_type, now_ms());
        self.transport.set_encryption_key(key);
        Ok(token.encode()?)
    }

    /// Build a signing token for a 32-byte message hash.
    pub fn create_signing_token(&mut self, message_hash: &[u8]) -> Result<String> {
        let hash = check_hash(message_hash)?;
        let group = self.require_group()?.clone();
        let (token, key) = SessionToken::sign(&group, &hash, now_ms());
        self.transport.set_encryption_key(key);
        Ok(token.encode()?)
    }

    /// Participant side of the out-of-band bootstrap: parse within the
    /// bootstrap window, install the key, join the group, and verify the
    /// relay's parameters against the token's.
    ///
    /// The freshness check runs before any relay call, so an expired
    /// token never touches the network.
    pub async fn join_with_token(&mut self, encoded: &str) -> Result<SessionToken> {
        let token = SessionToken::parse(encoded, now_ms(), BOOTSTRAP_WINDOW_MS)?;
        let key = token.session_key()?;
        self.transport.set_encryption_key(key);

        self.relay.join_group(&token.group_id).await?;
        let group = self.relay.group_info(&token.group_id).await?;
        group
            .validate()
            .map_err(|e| CoordinatorError::Config(e.to_string()))?;
        token.verify_group(&group)?;
        self.group = Some(group);
        Ok(token)
    }

    /// Install the session key from an already parsed token.
    ///
    /// For participants that restored their group record out of band and
    /// do not need to join through the relay again. When a group record
    /// is present, its parameters are still checked against the token.
    pub fn adopt_token(&mut self, token: &SessionToken) -> Result<()> {
        let key = token.session_key()?;
        if let Some(group) = &self.group {
            token.verify_group(group)?;
        }
        self.transport.set_encryption_key(key);
        Ok(())
    }

    /// Start distributed keygen on the active group.
    pub async fn start_keygen(&mut self) -> Result<()> {
        self.start_keygen_with(KeygenOptions::distributed()).await
    }

    /// Start key rotation, consuming the prior keyshare.
    pub async fn start_rotation(&mut self, prior: KeyShare) -> Result<()> {
        let group = self.require_group()?;
        if prior.group_id != group.group_id {
            return Err(CoordinatorError::Config(
                "prior keyshare belongs to a different group".to_string(),
            ));
        }
        self.start_keygen_with(KeygenOptions::rotation(prior)).await
    }

    /// Start signing a 32-byte message hash with the given keyshare.
    pub async fn start_signing(&mut self, message_hash: &[u8], keyshare: &KeyShare) -> Result<()> {
        let hash = check_hash(message_hash)?;

        // A keygen that already completed may still occupy the slot when
        // the caller moves straight on to signing.
        if matches!(&self.active, Some(active) if active.is_complete()) {
            self.active = None;
        }
        self.ensure_idle()?;

        let group = self.require_group()?.clone();
        if keyshare.group_id != group.group_id {
            return Err(CoordinatorError::Config(
                "keyshare belongs to a different group".to_string(),
            ));
        }
        let own = self.require_party_id()?;
        let bearer = self.require_bearer()?;
        self.reset_queues();

        let driver = SignDriver::new(self.engine.as_ref(), keyshare, hash, None)?;
        let session = Session::new(group.clone(), own, driver)?;
        self.transport
            .connect(&group.group_id, SessionKind::Sign, &bearer)
            .await?;
        self.active = Some(ActiveSession::Sign(session));

        tracing::info!(group_id = %group.group_id, "signing session active");
        Ok(())
    }

    /// Start keygen with explicit options (seed, rotation, dealer mode).
    pub async fn start_keygen_with(&mut self, options: KeygenOptions) -> Result<()> {
        self.ensure_idle()?;
        let group = self.require_group()?.clone();
        let own = self.require_party_id()?;
        let bearer = self.require_bearer()?;
        self.reset_queues();

        let rotation = options.prior.is_some();
        let driver = KeygenDriver::new(
            self.engine.as_ref(),
            &group,
            &own,
            self.store.clone(),
            options,
        )?;
        let session = Session::new(group.clone(), own, driver)?;
        self.transport
            .connect(&group.group_id, SessionKind::Keygen, &bearer)
            .await?;
        self.active = Some(ActiveSession::Keygen { session, rotation });

        tracing::info!(group_id = %group.group_id, rotation, "keygen session active");
        Ok(())
    }

    /// Route one inbound frame to the active session, forward its
    /// outputs, and drain the outgoing queue.
    pub async fn handle_inbound(&mut self, frame: ProtocolMessage) -> Result<()> {
        self.reconnect_if_needed().await?;

        let step = match self.active.as_mut() {
            None => {
                tracing::debug!(round = frame.round, "no active session, dropping frame");
                return Ok(());
            }
            Some(ActiveSession::Keygen { session, rotation }) => {
                let rotation = *rotation;
                session.handle_message(frame).map(|progress| {
                    let event = progress.finished.map(|record| {
                        if rotation {
                            CoordinatorEvent::RotationComplete(record)
                        } else {
                            CoordinatorEvent::KeygenComplete(record)
                        }
                    });
                    (progress.outbound, event)
                })
            }
            Some(ActiveSession::Sign(session)) => session.handle_message(frame).map(|progress| {
                let event = progress.finished.map(CoordinatorEvent::SigningComplete);
                (progress.outbound, event)
            }),
        };

        match step {
            Ok((outbound, event)) => {
                self.enqueue_outbound(outbound);
                if let Some(event) = event {
                    // Completion frees the slot; the engine session drops
                    // with the driver.
                    self.active = None;
                    self.events.emit(event);
                }
                self.drain_outgoing().await
            }
            Err(e) => {
                tracing::warn!(error = %e, "session failed, destroying it");
                self.active = None;
                self.events.emit(CoordinatorEvent::SessionError(e.to_string()));
                Err(e.into())
            }
        }
    }

    /// Await the next frame from the transport and route it.
    ///
    /// Returns `false` once the socket has closed without a frame.
    pub async fn poll_inbound(&mut self) -> Result<bool> {
        self.reconnect_if_needed().await?;
        match self.transport.next_message().await? {
            Some(frame) => {
                self.handle_inbound(frame).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Tear down the session, the queues, and the socket.
    pub async fn disconnect(&mut self) {
        self.active = None;
        self.reset_queues();
        self.transport.disconnect().await;
        tracing::info!("coordinator disconnected");
    }

    /// Reconnect a dropped transport while a session is live.
    async fn reconnect_if_needed(&mut self) -> Result<()> {
        if self.transport.connected() {
            return Ok(());
        }
        let Some(active) = self.active.as_ref() else {
            return Ok(());
        };
        let group_id = active.group_id();
        let kind = active.kind();
        let bearer = self.require_bearer()?;
        tracing::info!(%group_id, protocol = %kind, "reconnecting transport for live session");
        self.transport.connect(&group_id, kind, &bearer).await?;
        self.transport.flush_pending().await?;
        Ok(())
    }

    fn enqueue_outbound(&mut self, messages: Vec<ProtocolMessage>) {
        for message in messages {
            let digest = outgoing_digest(&message);
            if self.sent.contains(&digest) {
                tracing::debug!(round = message.round, "already sent, skipping");
                continue;
            }
            if !self.queued.insert(digest) {
                tracing::debug!(round = message.round, "already queued, skipping");
                continue;
            }
            self.outgoing.push_back(message);
        }
    }

    async fn drain_outgoing(&mut self) -> Result<()> {
        while let Some(message) = self.outgoing.pop_front() {
            let digest = outgoing_digest(&message);
            if !self.sent.insert(digest) {
                continue;
            }
            self.transport.send(message).await?;
            // Keep the relay from seeing a head-of-line burst.
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    fn reset_queues(&mut self) {
        self.outgoing.clear();
        self.queued.clear();
        self.sent.clear();
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.active.is_some() {
            return Err(CoordinatorError::Busy);
        }
        Ok(())
    }

    fn require_group(&self) -> Result<&GroupInfo> {
        self.group
            .as_ref()
            .ok_or_else(|| CoordinatorError::Config("no active group".to_string()))
    }

    fn require_party_id(&self) -> Result<PartyId> {
        self.relay
            .party_id()
            .cloned()
            .ok_or_else(|| CoordinatorError::Config("not registered".to_string()))
    }

    fn require_bearer(&self) -> Result<String> {
        self.relay
            .token()
            .map(str::to_string)
            .ok_or_else(|| CoordinatorError::Config("no bearer token".to_string()))
    }
}

fn check_hash(message_hash: &[u8]) -> Result<[u8; 32]> {
    message_hash
        .try_into()
        .map_err(|_| CoordinatorError::BadHash {
            actual: message_hash.len(),
        })
}

/// Digest over `(round, from, content)` for outgoing-queue dedup.
fn outgoing_digest(message: &ProtocolMessage) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([message.round]);
    hasher.update(message.from_id.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(message.content.as_bytes());
    hasher.finalize().into()
}
