// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Browser connections.
//!
//! Each socket is split in two: a reader loop that validates inbound frames
//! and a writer task that drains an unbounded channel. Everything that talks
//! to the browser (error frames, keep-alive pings, the host's response
//! handler) goes through a cloneable [`BrowserConnection`] handle feeding
//! that channel, so nothing contends for the socket itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ErrorFrame, RelayError};
use crate::models::parse_unlock_request;
use crate::relay::upstream;
use crate::state::RelayState;

/// Handle to one open browser connection.
#[derive(Clone)]
pub struct BrowserConnection {
    id: Uuid,
    outbound: mpsc::UnboundedSender<Message>,
}

impl BrowserConnection {
    pub(crate) fn new(id: Uuid, outbound: mpsc::UnboundedSender<Message>) -> Self {
        Self { id, outbound }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a JSON text frame.
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), RelayError> {
        let text = serde_json::to_string(value)?;
        self.send(Message::Text(text.into()))
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<(), RelayError> {
        self.send(Message::Text(text.into().into()))
    }

    pub fn ping(&self) -> Result<(), RelayError> {
        self.send(Message::Ping(Default::default()))
    }

    /// Ask the browser to close the connection.
    pub fn close(&self) -> Result<(), RelayError> {
        self.send(Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: "".into(),
        })))
    }

    /// Whether the connection's writer has gone away.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    fn send(&self, message: Message) -> Result<(), RelayError> {
        self.outbound.send(message).map_err(|_| RelayError::ConnectionClosed)
    }
}

impl fmt::Debug for BrowserConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserConnection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Open browser connections, read by the keep-alive job.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<Uuid, BrowserConnection>>>,
}

impl ConnectionRegistry {
    pub async fn register(&self, connection: BrowserConnection) {
        self.connections.write().await.insert(connection.id(), connection);
    }

    pub async fn remove(&self, id: Uuid) -> Option<BrowserConnection> {
        self.connections.write().await.remove(&id)
    }

    pub async fn snapshot(&self) -> Vec<BrowserConnection> {
        self.connections.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

/// Drive one upgraded browser socket until either side closes it.
pub(crate) async fn serve_connection(socket: WebSocket, state: RelayState) {
    let (sink, mut stream) = socket.split();
    let (outbound, queued) = mpsc::unbounded_channel();
    let connection = BrowserConnection::new(Uuid::new_v4(), outbound);
    let closing = state.shutdown.child_token();

    state.connections.register(connection.clone()).await;
    info!(connection_id = %connection.id(), "browser connected");

    let writer = state.tasks.spawn(write_frames(sink, queued, closing.clone()));

    loop {
        tokio::select! {
            _ = closing.cancelled() => break,
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_frame(&state, &connection, text.as_str().as_bytes()),
                Some(Ok(Message::Binary(bytes))) => handle_frame(&state, &connection, &bytes),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(connection_id = %connection.id(), %err, "browser read error");
                    break;
                }
            },
        }
    }

    state.connections.remove(connection.id()).await;
    closing.cancel();
    if let Err(err) = writer.await {
        debug!(connection_id = %connection.id(), %err, "browser writer ended abnormally");
    }
    info!(connection_id = %connection.id(), "browser disconnected");
}

/// Validate one inbound frame and either start an exchange or report why not.
fn handle_frame(state: &RelayState, connection: &BrowserConnection, raw: &[u8]) {
    match parse_unlock_request(raw) {
        Ok(request) => {
            debug!(connection_id = %connection.id(), email = %request.email, "unlock requested");
            upstream::spawn_exchange(state, connection.clone(), request);
        }
        Err(err) => {
            warn!(connection_id = %connection.id(), error = %err, "rejected browser message");
            if let Err(send_err) = connection.send_json(&ErrorFrame::from(&err)) {
                debug!(connection_id = %connection.id(), %send_err, "could not report rejection");
            }
        }
    }
}

async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut queued: mpsc::UnboundedReceiver<Message>,
    closing: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            frame = queued.recv() => match frame {
                Some(frame) => {
                    let is_close = matches!(frame, Message::Close(_));
                    if sink.send(frame).await.is_err() || is_close {
                        break;
                    }
                }
                None => break,
            },
            _ = closing.cancelled() => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::AWAY,
                        reason: "relay closing".into(),
                    })))
                    .await;
                break;
            }
        }
    }
    let _ = sink.close().await;
}
