// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Demo host: serves a relay at `/unlock`, an account endpoint behind the
//! token middleware, and a delete-user endpoint.

use std::{env, fs, net::SocketAddr};

use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use unlock_relay::auth::{verify_request, Authentication, RequireAuth};
use unlock_relay::config::{
    API_VERSION_ENV, CONFIG_FILE_ENV, COOKIE_NAME_ENV, HOST_ENV, LOG_FORMAT_ENV, PORT_ENV, SECRET_ENV,
};
use unlock_relay::{AuthenticatorClient, Relay, RelayOptions};

#[tokio::main]
async fn main() {
    init_tracing();

    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let secret = env::var(SECRET_ENV).unwrap_or_else(|_| panic!("{SECRET_ENV} must be set"));
    let version: i64 = env::var(API_VERSION_ENV)
        .unwrap_or_else(|_| "1".to_string())
        .parse()
        .unwrap_or(1);

    let mut options = RelayOptions::new()
        .secret(secret)
        .version(version)
        .path("/unlock")
        .payload_builder(|email, _extra| json!({ "email": email }))
        .on_response(|connection, response| {
            info!(connection_id = %connection.id(), kind = ?response.type_name(), "relaying response");
            if let Err(err) = connection.send_json(&response) {
                error!(connection_id = %connection.id(), %err, "browser went away before the response");
            }
        });
    if let Ok(cookie_name) = env::var(COOKIE_NAME_ENV) {
        options = options.cookie_name(cookie_name);
    }
    if let Ok(path) = env::var(CONFIG_FILE_ENV) {
        let raw = fs::read_to_string(&path).expect("Failed to read relay config file");
        let value: Value = serde_json::from_str(&raw).expect("Relay config file is not valid JSON");
        options = options.merge(RelayOptions::from_json(value).expect("Relay config file must be a JSON object"));
    }

    // The verifier needs the relay's config, so the protected routes are
    // layered onto the router the relay hands back.
    let relay = Relay::start(options.server(Router::new())).expect("Invalid relay configuration");
    let client = relay.client().expect("Failed to build authenticator client");

    let protected = Router::new()
        .route("/account", get(account))
        .route("/delete", post(delete_account))
        .with_state(client)
        .layer(from_fn_with_state(relay.verifier(), verify_request));

    let app = relay
        .router()
        .route("/", get(|| async { "unlock relay demo" }))
        .merge(protected)
        .layer(TraceLayer::new_for_http());

    let host = env::var(HOST_ENV).unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var(PORT_ENV)
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .unwrap_or(3000);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .expect("Failed to parse bind address");
    let listener = TcpListener::bind(addr).await.expect("Failed to bind");

    info!(%addr, "unlock relay demo listening (relay at /unlock)");

    // Open WebSocket connections keep the server busy until the relay closes
    // them, so the relay is closed as part of the shutdown signal.
    let closing = relay.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            closing.close().await;
        })
        .await
        .expect("HTTP server failed");

    info!("server stopped");
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,unlock_relay=debug"));

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter).with_target(true);
    match env::var(LOG_FORMAT_ENV).as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.pretty().init(),
    }
}

async fn account(Authentication(outcome): Authentication) -> impl IntoResponse {
    if outcome.authenticated {
        (StatusCode::OK, Json(json!({ "authenticated": true, "user": outcome.decoded })))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "authenticated": false })))
    }
}

async fn delete_account(
    State(client): State<AuthenticatorClient>,
    RequireAuth(claims): RequireAuth,
) -> impl IntoResponse {
    let Some(email) = claims.get("email").and_then(Value::as_str) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "deleted": false })));
    };
    match client.delete_user(email).await {
        Ok(response) if response.is_success() => (StatusCode::OK, Json(json!({ "deleted": true }))),
        Ok(response) => {
            error!(status = response.status, "authenticator refused delete");
            (StatusCode::BAD_GATEWAY, Json(json!({ "deleted": false, "data": response.data })))
        }
        Err(err) => {
            error!(%err, "delete request failed");
            (StatusCode::BAD_GATEWAY, Json(json!({ "deleted": false })))
        }
    }
}
