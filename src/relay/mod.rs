// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Connection Relay
//!
//! Attaches a WebSocket route to the host's router and brokers `unlock`
//! requests between browsers and the authenticator.
//!
//! ## Lifecycle
//!
//! 1. [`Relay::start`] validates the options, mounts the route and starts
//!    the keep-alive job.
//! 2. Each browser connection is served until either side closes it. Every
//!    valid request gets its own upstream exchange; its single response goes
//!    to the host's `onResponse` handler.
//! 3. [`Relay::close`] stops accepting upgrades, closes every browser
//!    connection, cancels in-flight exchanges and waits for all relay tasks.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` with a child token per
//! connection and per exchange, and a `TaskTracker` so `close` can wait.

pub mod connection;
pub mod keepalive;
mod upstream;

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::info;

pub use connection::{BrowserConnection, ConnectionRegistry};
pub use keepalive::{KeepAlive, KEEP_ALIVE_INTERVAL};
pub use upstream::ExchangeState;

use crate::auth::TokenVerifier;
use crate::client::AuthenticatorClient;
use crate::config::{RelayConfig, RelayOptions};
use crate::error::{ConfigError, RelayError};
use crate::state::RelayState;

/// A running relay. Cheap to clone; all clones control the same relay.
#[derive(Clone)]
pub struct Relay {
    state: RelayState,
    router: Router,
}

impl Relay {
    /// Validate `options`, mount the relay route on the supplied server and
    /// start the keep-alive job.
    ///
    /// Nothing is mounted or spawned if validation fails, or if there is no
    /// tokio runtime to spawn the keep-alive job on. The route must not
    /// already exist on the host router.
    pub fn start(options: RelayOptions) -> Result<Relay, ConfigError> {
        if Handle::try_current().is_err() {
            return Err(ConfigError::NoRuntime);
        }
        let (config, server) = RelayConfig::from_options(&options)?;
        let state = RelayState::new(config);

        let router = server.route(&state.config.path, get(upgrade).with_state(state.clone()));

        state
            .tasks
            .spawn(KeepAlive::new(state.connections.clone()).run(state.shutdown.child_token()));

        info!(
            path = %state.config.path,
            authenticator = %state.config.authenticator_url,
            version = state.config.version,
            "relay started"
        );
        Ok(Relay { state, router })
    }

    /// The host router with the relay route attached. Serve this one.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &Arc<RelayConfig> {
        &self.state.config
    }

    /// Token verifier sharing this relay's configuration, for
    /// [`verify_request`](crate::auth::verify_request).
    pub fn verifier(&self) -> TokenVerifier {
        TokenVerifier::new(Arc::clone(&self.state.config))
    }

    /// REST client for the authenticator, keyed by this relay's secret.
    pub fn client(&self) -> Result<AuthenticatorClient, RelayError> {
        AuthenticatorClient::from_config(&self.state.config)
    }

    pub async fn connection_count(&self) -> usize {
        self.state.connections.len().await
    }

    pub fn is_closed(&self) -> bool {
        self.state.shutdown.is_cancelled()
    }

    /// Shut the relay down and wait for every relay task to finish.
    ///
    /// Safe to call more than once, from any clone; later calls wait for the
    /// same shutdown and return.
    pub async fn close(&self) {
        if !self.state.shutdown.is_cancelled() {
            let connections = self.state.connections.len().await;
            info!(connections, "relay closing");
            self.state.shutdown.cancel();
        }
        self.state.tasks.close();
        self.state.tasks.wait().await;
    }

    /// Callback form of [`close`](Self::close): `done` runs exactly once,
    /// after shutdown completes.
    pub fn close_with<F>(&self, done: F) -> JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let relay = self.clone();
        tokio::spawn(async move {
            relay.close().await;
            done();
        })
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("config", &self.state.config)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

async fn upgrade(State(state): State<RelayState>, ws: WebSocketUpgrade) -> Response {
    if state.shutdown.is_cancelled() {
        return (StatusCode::SERVICE_UNAVAILABLE, "relay is closed").into_response();
    }
    let tasks = state.tasks.clone();
    ws.on_upgrade(move |socket| tasks.track_future(connection::serve_connection(socket, state)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    fn options() -> RelayOptions {
        RelayOptions::new()
            .server(Router::new().route("/health", get(|| async { "ok" })))
            .secret("k")
            .version(1)
            .on_response(|_, _| {})
            .path("/unlock")
    }

    #[tokio::test]
    async fn invalid_options_fail_before_anything_starts() {
        let err = Relay::start(options().remove("secret")).unwrap_err();
        assert_eq!(err, ConfigError::MissingRequiredField("secret".into()));
    }

    #[test]
    fn start_outside_a_runtime_is_an_error() {
        let err = Relay::start(options()).unwrap_err();
        assert_eq!(err, ConfigError::NoRuntime);
    }

    #[tokio::test]
    async fn close_future_can_be_spawned() {
        let relay = Relay::start(options()).unwrap();
        let closing = relay.clone();
        tokio::spawn(async move { closing.close().await }).await.unwrap();
        assert!(relay.is_closed());
    }

    #[tokio::test]
    async fn host_routes_survive_and_plain_get_is_not_upgraded() {
        let relay = Relay::start(options()).unwrap();

        let response = relay
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Without upgrade headers the WebSocket extractor rejects the request.
        let response = relay
            .router()
            .oneshot(Request::get("/unlock").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());

        relay.close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent_and_callback_runs_once() {
        let relay = Relay::start(options()).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        relay.close_with(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();
        assert!(relay.is_closed());

        tokio::time::timeout(Duration::from_secs(1), relay.close()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), relay.clone().close()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn verifier_and_client_share_the_relay_config() {
        let relay = Relay::start(options().cookie_name("auth")).unwrap();
        assert_eq!(relay.verifier().cookie_name(), Some("auth"));
        assert!(relay.client().is_ok());
        assert_eq!(relay.connection_count().await, 0);
        relay.close().await;
    }
}
