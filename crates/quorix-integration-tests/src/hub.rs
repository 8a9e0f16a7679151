//! A minimal in-process relay hub.
//!
//! Stands in for the relay's socket surface: accepts one WebSocket per
//! party, sends the `START` sentinel once everyone is connected, routes
//! frames (broadcast to all but the sender, point-to-point by learned
//! party id), counts `DONE` announcements, and terminates the session
//! with `END:<status>`. Frame content passes through untouched, exactly
//! like the untrusted relay: the hub never sees plaintext.
//!
//! Connections arriving after the session wave are accepted and parked,
//! so a client reconnecting after termination does not fail its
//! handshake.

use std::collections::HashMap;
use std::net::SocketAddr;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use quorix_types::{GroupId, PartyId, ProtocolMessage};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Hub behavior for one session.
#[derive(Clone, Debug)]
pub struct HubConfig {
    /// The group id stamped on server frames.
    pub group_id: GroupId,
    /// Number of parties in the session wave.
    pub parties: usize,
    /// Status sent once every party has announced `DONE`.
    pub end_status: String,
    /// When set to `(round, status)`, the hub terminates every party
    /// with `END:<status>` as soon as it sees a frame beyond `round`.
    pub fail: Option<(u8, String)>,
}

impl HubConfig {
    /// A hub that runs the session to a successful end.
    pub fn success(group_id: GroupId, parties: usize) -> Self {
        Self {
            group_id,
            parties,
            end_status: "SUCCESS".to_string(),
            fail: None,
        }
    }

    /// A hub that cuts the session off after the given round.
    pub fn failing_after(group_id: GroupId, parties: usize, round: u8, status: &str) -> Self {
        Self {
            group_id,
            parties,
            end_status: "SUCCESS".to_string(),
            fail: Some((round, status.to_string())),
        }
    }
}

/// Start a hub; returns the socket address clients connect to.
pub async fn start(config: HubConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind hub");
    let addr = listener.local_addr().expect("hub addr");
    tokio::spawn(run(listener, config));
    addr
}

async fn run(listener: TcpListener, config: HubConfig) {
    let (frame_tx, mut frames) = mpsc::unbounded_channel::<(usize, String)>();
    let mut sinks: Vec<WsSink> = Vec::new();

    for connection in 0..config.parties {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(ws) = accept_async(stream).await else {
            return;
        };
        let (sink, mut read) = ws.split();
        sinks.push(sink);

        let tx = frame_tx.clone();
        tokio::spawn(async move {
            while let Some(Ok(message)) = read.next().await {
                if let Message::Text(text) = message {
                    if tx.send((connection, text)).is_err() {
                        break;
                    }
                }
            }
        });
    }

    // Late connections (e.g. a restarted session) are parked so their
    // handshake succeeds.
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                if let Ok(mut ws) = accept_async(stream).await {
                    while let Some(Ok(_)) = ws.next().await {}
                }
            });
        }
    });

    let start = server_frame(&config.group_id, "start", 0);
    for sink in &mut sinks {
        if sink.send(text_frame(&start)).await.is_err() {
            return;
        }
    }
    tracing::debug!(parties = config.parties, "hub sent START");

    let mut registry: HashMap<PartyId, usize> = HashMap::new();
    let mut done = 0usize;

    while let Some((from, text)) = frames.recv().await {
        let Ok(frame) = serde_json::from_str::<ProtocolMessage>(&text) else {
            continue;
        };
        registry.insert(frame.from_id.clone(), from);

        if let Some((after_round, status)) = &config.fail {
            if frame.round > *after_round && frame.round < 5 {
                tracing::debug!(round = frame.round, status, "hub cutting session off");
                end_all(&mut sinks, &config.group_id, status).await;
                return;
            }
        }

        if frame.is_done() {
            done += 1;
            if done == config.parties {
                end_all(&mut sinks, &config.group_id, &config.end_status).await;
                return;
            }
            continue;
        }

        if frame.is_broadcast() {
            for (i, sink) in sinks.iter_mut().enumerate() {
                if i != from {
                    let _ = sink.send(Message::Text(text.clone())).await;
                }
            }
        } else if let Some(&target) = registry.get(&frame.to_id) {
            if let Some(sink) = sinks.get_mut(target) {
                let _ = sink.send(Message::Text(text.clone())).await;
            }
        }
    }
}

async fn end_all(sinks: &mut [WsSink], group_id: &GroupId, status: &str) {
    let end = server_frame(group_id, &format!("END:{status}"), 5);
    for sink in sinks.iter_mut() {
        let _ = sink.send(text_frame(&end)).await;
        let _ = sink.send(Message::Close(None)).await;
    }
}

fn server_frame(group_id: &GroupId, content: &str, round: u8) -> ProtocolMessage {
    ProtocolMessage {
        group_id: group_id.clone(),
        from_id: PartyId::server(),
        to_id: PartyId::broadcast(),
        content: content.to_string(),
        round,
        timestamp: quorix_types::now_ms(),
    }
}

fn text_frame(frame: &ProtocolMessage) -> Message {
    Message::Text(serde_json::to_string(frame).unwrap_or_default())
}
