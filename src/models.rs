// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wire Models
//!
//! Message shapes exchanged on both legs of the relay:
//!
//! - **Browser → relay**: [`UnlockRequest`], checked against
//!   [`message_schema`] before use.
//! - **Relay → authenticator**: [`UpstreamRequest`].
//! - **Authenticator → relay → host**: [`RelayedResponse`].
//!
//! Responses are not validated against a fixed shape. Anything the relay
//! cannot classify is handed to the host as [`RelayedResponse::Other`].

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::config::RelayConfig;
use crate::error::{ProtocolError, UpstreamError};
use crate::schema::{self, FieldSpec, FieldType};

/// Request type literal used on both legs.
pub const UNLOCK: &str = "unlock";

// =============================================================================
// Browser Requests
// =============================================================================

/// An `unlock` request sent by a browser.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UnlockRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub email: String,
    #[serde(default)]
    pub extra: Option<Map<String, Value>>,
}

/// Schema every inbound browser message must satisfy.
pub fn message_schema() -> Vec<FieldSpec<Value>> {
    vec![
        FieldSpec::required("type", FieldType::String).equal_to(Value::from(UNLOCK)),
        FieldSpec::required("email", FieldType::String),
        FieldSpec::optional("extra", FieldType::Object),
    ]
}

/// Parse and validate one inbound frame.
///
/// JSON that is not an object counts as a missing request and fails schema
/// validation rather than parsing.
pub fn parse_unlock_request(raw: &[u8]) -> Result<UnlockRequest, ProtocolError> {
    let value: Value = serde_json::from_slice(raw).map_err(ProtocolError::Unparseable)?;
    let normalized =
        schema::validate(value.as_object(), &message_schema()).map_err(ProtocolError::InvalidRequest)?;
    serde_json::from_value(normalized.into_json()).map_err(ProtocolError::Unparseable)
}

// =============================================================================
// Upstream Requests
// =============================================================================

/// Request forwarded to the authenticator. Unset optional fields are omitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub version: i64,
    pub email: &'a str,
    pub api_key: &'a str,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_fields: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_type: Option<&'a str>,
}

impl<'a> UpstreamRequest<'a> {
    pub fn new(config: &'a RelayConfig, request: &'a UnlockRequest) -> Self {
        Self {
            kind: UNLOCK,
            version: config.version,
            email: &request.email,
            api_key: config.secret(),
            payload: (config.payload_builder)(&request.email, request.extra.as_ref()),
            required_fields: config.required_fields.as_ref(),
            exp: config.token_expiry_seconds,
            request_type: config.request_type_label.as_deref(),
        }
    }
}

// =============================================================================
// Authenticator Responses
// =============================================================================

/// Successful unlock. `token` is signed with the relay secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unlocked {
    pub token: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// The user declined, or the request could not be honoured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotUnlocked {
    #[serde(default)]
    pub reason: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// The authenticator (or the upstream leg) failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    #[serde(default)]
    pub reason: Value,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Tagged {
    Unlocked(Unlocked),
    NotUnlocked(NotUnlocked),
    Error(Failure),
}

/// One response relayed to the host's handler.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayedResponse {
    Unlocked(Unlocked),
    NotUnlocked(NotUnlocked),
    Error(Failure),
    /// A shape the relay does not recognise, passed through as received.
    Other(Value),
}

impl RelayedResponse {
    pub const UNLOCKED: &'static str = "unlocked";
    pub const NOT_UNLOCKED: &'static str = "notUnlocked";
    pub const ERROR: &'static str = "error";

    /// Classify a decoded authenticator message.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<Tagged>(value.clone()) {
            Ok(Tagged::Unlocked(inner)) => RelayedResponse::Unlocked(inner),
            Ok(Tagged::NotUnlocked(inner)) => RelayedResponse::NotUnlocked(inner),
            Ok(Tagged::Error(inner)) => RelayedResponse::Error(inner),
            Err(_) => RelayedResponse::Other(value),
        }
    }

    /// Build the `error` response reported when the upstream leg fails.
    pub fn from_upstream_error(err: &UpstreamError) -> Self {
        let mut details = Map::new();
        if err.is_no_response() {
            details.insert("code".to_string(), Value::from(ErrorCode::NoResponse.code()));
        }
        RelayedResponse::Error(Failure {
            reason: Value::from(err.to_string()),
            details,
        })
    }

    /// The `type` discriminator, if any.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            RelayedResponse::Unlocked(_) => Some(Self::UNLOCKED),
            RelayedResponse::NotUnlocked(_) => Some(Self::NOT_UNLOCKED),
            RelayedResponse::Error(_) => Some(Self::ERROR),
            RelayedResponse::Other(value) => value.get("type").and_then(Value::as_str),
        }
    }

    /// Token carried by an `unlocked` response.
    pub fn token(&self) -> Option<&str> {
        match self {
            RelayedResponse::Unlocked(inner) => Some(&inner.token),
            _ => None,
        }
    }

    /// Numeric status code sent alongside the response, if the authenticator
    /// included one.
    pub fn error_code(&self) -> Option<ErrorCode> {
        let details = match self {
            RelayedResponse::Unlocked(inner) => &inner.details,
            RelayedResponse::NotUnlocked(inner) => &inner.details,
            RelayedResponse::Error(inner) => &inner.details,
            RelayedResponse::Other(value) => {
                return value.get("code").and_then(Value::as_u64).and_then(ErrorCode::from_code);
            }
        };
        details.get("code").and_then(Value::as_u64).and_then(ErrorCode::from_code)
    }

    pub fn to_value(&self) -> Value {
        let (type_name, body) = match self {
            RelayedResponse::Other(value) => return value.clone(),
            RelayedResponse::Unlocked(inner) => (Self::UNLOCKED, serde_json::to_value(inner)),
            RelayedResponse::NotUnlocked(inner) => (Self::NOT_UNLOCKED, serde_json::to_value(inner)),
            RelayedResponse::Error(inner) => (Self::ERROR, serde_json::to_value(inner)),
        };
        let mut object = match body {
            Ok(Value::Object(object)) => object,
            _ => Map::new(),
        };
        object.insert("type".to_string(), Value::from(type_name));
        Value::Object(object)
    }
}

impl Serialize for RelayedResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

// =============================================================================
// Authenticator Status Codes
// =============================================================================

/// Status codes used by the authenticator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    UserNotFound,
    UserDeclined,
    InvalidToken,
    BadPass,
    NameUsed,
    EmailUsed,
    PassMismatch,
    PassInvalid,
    ActiveRequest,
    NoResponse,
    NotRegistered,
    NotVerified,
    TooSoon,
    UsersExceeded,
    RequestsExceeded,
    InvalidApiKey,
}

impl ErrorCode {
    pub fn code(self) -> u64 {
        match self {
            ErrorCode::UserNotFound => 0,
            ErrorCode::UserDeclined => 1,
            ErrorCode::InvalidToken => 2,
            ErrorCode::BadPass => 4,
            ErrorCode::NameUsed => 5,
            ErrorCode::EmailUsed => 6,
            ErrorCode::PassMismatch => 7,
            ErrorCode::PassInvalid => 8,
            ErrorCode::ActiveRequest => 9,
            ErrorCode::NoResponse => 10,
            ErrorCode::NotRegistered => 11,
            ErrorCode::NotVerified => 12,
            ErrorCode::TooSoon => 14,
            ErrorCode::UsersExceeded => 15,
            ErrorCode::RequestsExceeded => 16,
            ErrorCode::InvalidApiKey => 21,
        }
    }

    pub fn from_code(code: u64) -> Option<ErrorCode> {
        let code = match code {
            0 => ErrorCode::UserNotFound,
            1 => ErrorCode::UserDeclined,
            2 => ErrorCode::InvalidToken,
            4 => ErrorCode::BadPass,
            5 => ErrorCode::NameUsed,
            6 => ErrorCode::EmailUsed,
            7 => ErrorCode::PassMismatch,
            8 => ErrorCode::PassInvalid,
            9 => ErrorCode::ActiveRequest,
            10 => ErrorCode::NoResponse,
            11 => ErrorCode::NotRegistered,
            12 => ErrorCode::NotVerified,
            14 => ErrorCode::TooSoon,
            15 => ErrorCode::UsersExceeded,
            16 => ErrorCode::RequestsExceeded,
            21 => ErrorCode::InvalidApiKey,
            _ => return None,
        };
        Some(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use serde_json::json;

    #[test]
    fn parses_minimal_unlock_request() {
        let request = parse_unlock_request(br#"{"type":"unlock","email":"a@b.com"}"#).unwrap();
        assert_eq!(request.kind, "unlock");
        assert_eq!(request.email, "a@b.com");
        assert!(request.extra.is_none());
    }

    #[test]
    fn keeps_extra_object() {
        let request =
            parse_unlock_request(br#"{"type":"unlock","email":"a@b.com","extra":{"plan":"pro"}}"#).unwrap();
        assert_eq!(request.extra.unwrap().get("plan"), Some(&json!("pro")));
    }

    #[test]
    fn garbage_is_unparseable() {
        let err = parse_unlock_request(b"not json at all").unwrap_err();
        assert!(matches!(err, ProtocolError::Unparseable(_)));
    }

    #[test]
    fn wrong_type_or_missing_email_is_invalid() {
        for raw in [
            &br#"{"type":"lock","email":"a@b.com"}"#[..],
            br#"{"type":"unlock"}"#,
            br#"{"email":"a@b.com"}"#,
            br#"{"type":"unlock","email":"a@b.com","admin":true}"#,
            br#"{"type":"unlock","email":"a@b.com","extra":"x"}"#,
            br#"{"type":"unlock","email":"a@b.com","extra":null}"#,
        ] {
            let err = parse_unlock_request(raw).unwrap_err();
            assert!(matches!(err, ProtocolError::InvalidRequest(_)), "{raw:?}");
        }
    }

    #[test]
    fn non_object_json_is_invalid_not_unparseable() {
        let err = parse_unlock_request(b"[1,2,3]").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidRequest(ConfigError::MissingOptions)));
    }

    #[test]
    fn classifies_known_responses() {
        let unlocked = RelayedResponse::from_value(json!({"type": "unlocked", "token": "abc"}));
        assert_eq!(unlocked.type_name(), Some("unlocked"));
        assert_eq!(unlocked.token(), Some("abc"));

        let declined = RelayedResponse::from_value(json!({
            "type": "notUnlocked",
            "reason": "declined",
            "passable": true,
            "userMessage": "Try again",
            "code": 1
        }));
        match &declined {
            RelayedResponse::NotUnlocked(inner) => {
                assert_eq!(inner.passable, Some(true));
                assert_eq!(inner.user_message.as_deref(), Some("Try again"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(declined.error_code(), Some(ErrorCode::UserDeclined));

        let error = RelayedResponse::from_value(json!({"type": "error", "reason": "bad key"}));
        assert_eq!(error.type_name(), Some("error"));
    }

    #[test]
    fn unknown_shapes_pass_through() {
        let value = json!({"type": "mystery", "payload": [1]});
        let response = RelayedResponse::from_value(value.clone());
        assert_eq!(response, RelayedResponse::Other(value.clone()));
        assert_eq!(response.type_name(), Some("mystery"));
        assert_eq!(response.to_value(), value);
    }

    #[test]
    fn serializes_with_type_tag_and_extra_fields() {
        let response = RelayedResponse::from_value(json!({"type": "unlocked", "token": "t", "user": "u1"}));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"type": "unlocked", "token": "t", "user": "u1"})
        );
    }

    #[test]
    fn upstream_failures_carry_no_response_code() {
        let response = RelayedResponse::from_upstream_error(&UpstreamError::ClosedWithoutResponse);
        assert_eq!(response.type_name(), Some("error"));
        assert_eq!(response.error_code(), Some(ErrorCode::NoResponse));
    }

    #[test]
    fn error_codes_map_both_ways() {
        for code in 0..=30 {
            if let Some(error_code) = ErrorCode::from_code(code) {
                assert_eq!(error_code.code(), code);
            }
        }
        assert_eq!(ErrorCode::from_code(3), None);
        assert_eq!(ErrorCode::InvalidApiKey.code(), 21);
    }
}
