// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Unlock Relay - passwordless sign-in relay for Axum hosts
//!
//! This crate brokers `unlock` requests between browsers and a remote
//! authenticator over WebSockets, and verifies the tokens the authenticator
//! issues on later HTTP requests.
//!
//! ## Modules
//!
//! - `schema` - Closed-schema validator shared by options and socket messages
//! - `relay` - WebSocket relay, upstream exchanges, keep-alive
//! - `auth` - Token resolution and verification middleware (HS256 JWT)
//! - `client` - Authenticator REST calls
//! - `config` - Relay options and validated configuration

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod relay;
pub mod schema;
pub mod state;

pub use auth::{verify_request, AuthenticationOutcome, TokenVerifier};
pub use client::{AuthenticatorClient, DeleteUserResponse};
pub use config::{RelayConfig, RelayOptions};
pub use error::{ConfigError, RelayError};
pub use models::{ErrorCode, RelayedResponse};
pub use relay::{BrowserConnection, Relay};
