// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The upstream leg: one short-lived authenticator socket per unlock request.
//!
//! ```text
//! Idle -> AwaitingUpstreamOpen -> AwaitingUpstreamResponse -> Done
//! ```
//!
//! There are no retries. Without a configured timeout an authenticator that
//! never answers leaves the exchange pending until the relay is closed.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::error::UpstreamError;
use crate::models::{RelayedResponse, UnlockRequest, UpstreamRequest};
use crate::relay::BrowserConnection;
use crate::state::RelayState;

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    AwaitingUpstreamOpen,
    AwaitingUpstreamResponse,
    Done,
}

struct Exchange<'a> {
    email: &'a str,
    state: ExchangeState,
}

impl<'a> Exchange<'a> {
    fn new(email: &'a str) -> Self {
        Self {
            email,
            state: ExchangeState::Idle,
        }
    }

    fn advance(&mut self, next: ExchangeState) {
        debug!(email = %self.email, from = ?self.state, to = ?next, "upstream exchange");
        self.state = next;
    }
}

/// Run one exchange in the background and hand its result to the host.
///
/// Cancelled without calling the handler if the relay closes first.
pub(crate) fn spawn_exchange(state: &RelayState, connection: BrowserConnection, request: UnlockRequest) {
    let config = Arc::clone(&state.config);
    let cancelled = state.shutdown.child_token();

    state.tasks.spawn(async move {
        let outcome = tokio::select! {
            _ = cancelled.cancelled() => {
                debug!(connection_id = %connection.id(), "upstream exchange cancelled");
                return;
            }
            outcome = run_exchange(&config, &request) => outcome,
        };

        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                warn!(connection_id = %connection.id(), email = %request.email, error = %err, "upstream exchange failed");
                RelayedResponse::from_upstream_error(&err)
            }
        };

        (config.on_response)(connection, response);
    });
}

/// Perform one exchange, bounded by the configured timeout if any.
pub async fn run_exchange(config: &RelayConfig, request: &UnlockRequest) -> Result<RelayedResponse, UpstreamError> {
    match config.upstream_timeout {
        Some(limit) => tokio::time::timeout(limit, exchange(config, request))
            .await
            .map_err(|_| UpstreamError::Timeout(limit))?,
        None => exchange(config, request).await,
    }
}

async fn exchange(config: &RelayConfig, request: &UnlockRequest) -> Result<RelayedResponse, UpstreamError> {
    let mut exchange = Exchange::new(&request.email);
    let body = serde_json::to_string(&UpstreamRequest::new(config, request)).map_err(UpstreamError::Encode)?;

    install_crypto_provider();
    exchange.advance(ExchangeState::AwaitingUpstreamOpen);
    let (mut socket, _) = connect_async(config.authenticator_url.as_str())
        .await
        .map_err(UpstreamError::Connect)?;

    socket
        .send(Message::Text(body.into()))
        .await
        .map_err(UpstreamError::Transport)?;
    exchange.advance(ExchangeState::AwaitingUpstreamResponse);

    let outcome = read_response(&mut socket).await;
    if let Err(err) = socket.close(None).await {
        debug!(email = %request.email, %err, "upstream close failed");
    }
    exchange.advance(ExchangeState::Done);
    outcome
}

/// The first data frame is the response; control frames are skipped.
async fn read_response(socket: &mut UpstreamSocket) -> Result<RelayedResponse, UpstreamError> {
    loop {
        let value: Value = match socket.next().await {
            Some(Ok(Message::Text(text))) => {
                serde_json::from_str(text.as_str()).map_err(UpstreamError::InvalidResponse)?
            }
            Some(Ok(Message::Binary(bytes))) => {
                serde_json::from_slice(&bytes).map_err(UpstreamError::InvalidResponse)?
            }
            Some(Ok(Message::Close(_))) | None => return Err(UpstreamError::ClosedWithoutResponse),
            Some(Ok(_)) => continue,
            Some(Err(err)) => return Err(UpstreamError::Transport(err)),
        };
        return Ok(RelayedResponse::from_value(value));
    }
}

/// `wss://` needs a process-wide rustls provider. Hosts that already
/// installed one keep theirs.
fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}
