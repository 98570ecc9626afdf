// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error types for the relay.
//!
//! - [`ConfigError`]: bad arguments at a call site. Fatal, never retried.
//! - [`ProtocolError`]: a browser sent something the relay cannot use. Reported
//!   back on the same connection as an error frame.
//! - [`UpstreamError`]: the authenticator leg failed. Surfaced to the host's
//!   response handler as an `error` response.
//! - [`RelayError`]: umbrella for the public fallible operations.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::schema::FieldType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing options")]
    MissingOptions,

    #[error("unrecognized option {0}")]
    UnrecognizedOption(String),

    #[error("missing required field {0}")]
    MissingRequiredField(String),

    #[error("wrong type for {key}")]
    WrongType { key: String, expected: FieldType },

    #[error("invalid value for {0}")]
    InvalidValue(String),

    #[error("relay must be started inside a tokio runtime")]
    NoRuntime,
}

/// Why an inbound browser message was refused.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("could not parse as structured data")]
    Unparseable(#[source] serde_json::Error),

    #[error("invalid request: need type 'unlock' and an email")]
    InvalidRequest(#[source] ConfigError),
}

/// Frame sent back to a browser whose message was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorFrame {
    pub error: bool,
    pub message: String,
}

impl From<&ProtocolError> for ErrorFrame {
    fn from(err: &ProtocolError) -> Self {
        Self {
            error: true,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("could not reach the authenticator: {0}")]
    Connect(#[source] tokio_tungstenite::tungstenite::Error),

    #[error("authenticator connection failed: {0}")]
    Transport(#[source] tokio_tungstenite::tungstenite::Error),

    #[error("authenticator closed the connection without responding")]
    ClosedWithoutResponse,

    #[error("authenticator response was not valid JSON: {0}")]
    InvalidResponse(#[source] serde_json::Error),

    #[error("authenticator did not respond within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("could not encode the upstream request: {0}")]
    Encode(#[source] serde_json::Error),
}

impl UpstreamError {
    /// Whether the authenticator never produced a response at all.
    pub fn is_no_response(&self) -> bool {
        matches!(
            self,
            UpstreamError::Connect(_) | UpstreamError::ClosedWithoutResponse | UpstreamError::Timeout(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("authenticator request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("could not encode message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("browser connection is closed")]
    ConnectionClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_render_browser_messages() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let frame = ErrorFrame::from(&ProtocolError::Unparseable(parse_err));
        assert!(frame.error);
        assert_eq!(frame.message, "could not parse as structured data");

        let frame = ErrorFrame::from(&ProtocolError::InvalidRequest(ConfigError::MissingOptions));
        assert_eq!(frame.message, "invalid request: need type 'unlock' and an email");
        assert_eq!(
            serde_json::to_string(&frame).unwrap(),
            r#"{"error":true,"message":"invalid request: need type 'unlock' and an email"}"#
        );
    }

    #[test]
    fn no_response_classification() {
        assert!(UpstreamError::ClosedWithoutResponse.is_no_response());
        assert!(UpstreamError::Timeout(Duration::from_secs(5)).is_no_response());
        let parse_err = serde_json::from_str::<serde_json::Value>("?").unwrap_err();
        assert!(!UpstreamError::InvalidResponse(parse_err).is_no_response());
    }

    #[test]
    fn timeout_message_names_the_duration() {
        let err = UpstreamError::Timeout(Duration::from_secs(12));
        assert_eq!(err.to_string(), "authenticator did not respond within 12s");
    }
}
