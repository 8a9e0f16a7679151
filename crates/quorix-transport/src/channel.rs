//! Socket lifecycle and message pumping.
//!
//! ## Connection lifecycle
//!
//! 1. The coordinator connects with the session's group, protocol tag,
//!    and bearer token; the socket URL is
//!    `{base}/ws/{group_id}/{keygen|sign}?token={urlencoded}`.
//! 2. The session key and own party id are installed before any
//!    peer-to-peer traffic.
//! 3. Outbound frames sent while the socket is down land in a bounded
//!    ring and are flushed, oldest first, once the socket is back.
//! 4. `disconnect` closes with the normal close code (1000) and drops
//!    the ring.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use quorix_crypto::aead::SessionKey;
use quorix_types::{GroupId, PartyId, ProtocolMessage, SessionKind};

use crate::{frame, Result, TransportError};

/// Default socket-open timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the outgoing ring; the oldest frame is dropped on overflow.
pub const DEFAULT_PENDING_CAPACITY: usize = 100;

/// Delay between consecutive flushed frames.
pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_millis(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for a relay channel.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Socket base URL (e.g. `ws://relay.local:8000`).
    pub ws_base: Url,
    /// Socket-open timeout.
    pub connect_timeout: Duration,
    /// Outgoing ring capacity.
    pub pending_capacity: usize,
    /// Delay between flushed frames.
    pub flush_delay: Duration,
}

impl TransportConfig {
    /// Configuration with the production defaults.
    pub fn new(ws_base: Url) -> Self {
        Self {
            ws_base,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            pending_capacity: DEFAULT_PENDING_CAPACITY,
            flush_delay: DEFAULT_FLUSH_DELAY,
        }
    }
}

/// The relay message channel.
pub struct Transport {
    config: TransportConfig,
    socket: Option<WsStream>,
    own_party_id: Option<PartyId>,
    key: Option<SessionKey>,
    pending: VecDeque<ProtocolMessage>,
}

impl Transport {
    /// Create a disconnected channel.
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            socket: None,
            own_party_id: None,
            key: None,
            pending: VecDeque::new(),
        }
    }

    /// Whether the socket is currently open.
    pub fn connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Number of frames waiting in the outgoing ring.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Install the session content-encryption key.
    ///
    /// Must happen before any peer-to-peer frame is sent or received.
    pub fn set_encryption_key(&mut self, key: SessionKey) {
        self.key = Some(key);
    }

    /// Install this party's id for loop suppression.
    pub fn set_own_party_id(&mut self, party_id: PartyId) {
        self.own_party_id = Some(party_id);
    }

    /// Open the socket for a session.
    ///
    /// A second connect while already open is a no-op. Fails with
    /// [`TransportError::ConnectTimeout`] when the handshake does not
    /// complete within the configured timeout.
    pub async fn connect(
        &mut self,
        group_id: &GroupId,
        kind: SessionKind,
        bearer_token: &str,
    ) -> Result<()> {
        if self.socket.is_some() {
            tracing::debug!(%group_id, "connect ignored, socket already open");
            return Ok(());
        }

        let url = socket_url(&self.config.ws_base, group_id, kind, bearer_token)?;
        let (socket, _response) =
            tokio::time::timeout(self.config.connect_timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| TransportError::ConnectTimeout)?
                .map_err(|e| TransportError::Socket(e.to_string()))?;

        tracing::info!(%group_id, protocol = %kind, "relay socket connected");
        self.socket = Some(socket);
        Ok(())
    }

    /// Send one frame, or park it in the outgoing ring while disconnected.
    pub async fn send(&mut self, message: ProtocolMessage) -> Result<()> {
        if self.socket.is_none() {
            self.enqueue(message);
            return Ok(());
        }
        self.write_frame(message).await
    }

    /// Flush the outgoing ring in FIFO order.
    ///
    /// Frames are spaced by the configured flush delay to avoid
    /// head-of-line bursts at the relay.
    pub async fn flush_pending(&mut self) -> Result<()> {
        while self.socket.is_some() {
            let Some(message) = self.pending.pop_front() else {
                break;
            };
            self.write_frame(message).await?;
            tokio::time::sleep(self.config.flush_delay).await;
        }
        Ok(())
    }

    /// Receive the next valid frame.
    ///
    /// Malformed frames, self-frames, and frames that fail decryption are
    /// dropped (logged) and reading continues. Returns `None` once the
    /// socket has closed.
    pub async fn next_message(&mut self) -> Result<Option<ProtocolMessage>> {
        loop {
            let Some(socket) = self.socket.as_mut() else {
                return Ok(None);
            };
            match socket.next().await {
                None => {
                    self.socket = None;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    self.socket = None;
                    return Err(TransportError::Socket(e.to_string()));
                }
                Some(Ok(Message::Close(_))) => {
                    tracing::debug!("relay closed the socket");
                    self.socket = None;
                    return Ok(None);
                }
                Some(Ok(Message::Text(text))) => {
                    if let Some(message) = self.accept_frame(&text) {
                        return Ok(Some(message));
                    }
                }
                Some(Ok(_)) => {
                    // Ping/pong and binary frames carry no protocol content.
                }
            }
        }
    }

    /// Close with the normal close code and drop the outgoing ring.
    pub async fn disconnect(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let close = CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            };
            if let Err(e) = socket.close(Some(close)).await {
                tracing::debug!(error = %e, "socket close failed");
            }
        }
        self.pending.clear();
    }

    fn enqueue(&mut self, message: ProtocolMessage) {
        if self.pending.len() >= self.config.pending_capacity {
            if let Some(dropped) = self.pending.pop_front() {
                tracing::warn!(
                    capacity = self.config.pending_capacity,
                    round = dropped.round,
                    "outgoing ring full, dropping oldest frame"
                );
            }
        }
        self.pending.push_back(message);
    }

    async fn write_frame(&mut self, message: ProtocolMessage) -> Result<()> {
        let sealed = frame::seal(message, self.key.as_ref())?;
        let text =
            serde_json::to_string(&sealed).map_err(|e| TransportError::InvalidFrame(e.to_string()))?;

        let Some(socket) = self.socket.as_mut() else {
            self.enqueue(sealed);
            return Ok(());
        };
        if let Err(e) = socket.send(Message::Text(text)).await {
            self.socket = None;
            return Err(TransportError::Socket(e.to_string()));
        }
        Ok(())
    }

    fn accept_frame(&self, text: &str) -> Option<ProtocolMessage> {
        let message: ProtocolMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed frame");
                return None;
            }
        };
        if let Some(own) = &self.own_party_id {
            if &message.from_id == own {
                tracing::debug!(round = message.round, "dropping self frame");
                return None;
            }
        }
        match frame::open(message, self.key.as_ref()) {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecryptable frame");
                None
            }
        }
    }
}

/// Build the relay socket URL for a session.
pub fn socket_url(
    base: &Url,
    group_id: &GroupId,
    kind: SessionKind,
    bearer_token: &str,
) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| TransportError::Url("base cannot be a base URL".to_string()))?;
        segments.pop_if_empty();
        segments.push("ws");
        segments.push(group_id.as_str());
        segments.push(kind.as_str());
    }
    url.query_pairs_mut().append_pair("token", bearer_token);
    Ok(url)
}
