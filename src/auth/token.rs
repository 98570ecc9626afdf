// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HS256 token signing and verification with the relay secret.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::Value;
use tracing::debug;

use super::{AuthError, Claims};
use crate::config::RelayConfig;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = CLOCK_SKEW_LEEWAY;
    // Tokens minted with `tokenExpirySeconds = -1` carry no `exp`.
    validation.required_spec_claims.clear();
    validation.validate_aud = false;
    validation
}

/// Verify `token` and return its claims, or the reason it was rejected.
pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation())?;
    Ok(data.claims)
}

/// Verify `token`. Every failure (malformed, bad signature, expired) is `None`.
pub fn verify_token(token: &str, secret: &str) -> Option<Claims> {
    match decode_token(token, secret) {
        Ok(claims) => Some(claims),
        Err(err) => {
            debug!(error_code = err.error_code(), "token rejected");
            None
        }
    }
}

/// Sign `claims`, adding `exp` when `expires_in` is given.
pub fn sign_token(claims: &Claims, secret: &str, expires_in: Option<Duration>) -> Result<String, AuthError> {
    let mut claims = claims.clone();
    if let Some(expires_in) = expires_in {
        let exp = chrono::Utc::now().timestamp() + expires_in.as_secs() as i64;
        claims.insert("exp".to_string(), Value::from(exp));
    }
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::SigningFailed(e.to_string()))
}

/// Verifier bound to a relay configuration: its secret, cookie name and
/// token lifetime.
#[derive(Clone)]
pub struct TokenVerifier {
    config: Arc<RelayConfig>,
}

impl TokenVerifier {
    pub fn new(config: Arc<RelayConfig>) -> Self {
        Self { config }
    }

    pub fn cookie_name(&self) -> Option<&str> {
        self.config.cookie_name.as_deref()
    }

    pub fn verify_token(&self, token: &str) -> Option<Claims> {
        verify_token(token, self.config.secret())
    }

    /// Sign with the configured secret. A positive `tokenExpirySeconds`
    /// becomes the `exp` claim; `-1` or unset means no expiry.
    pub fn sign_token(&self, claims: &Claims) -> Result<String, AuthError> {
        let expires_in = self
            .config
            .token_expiry_seconds
            .filter(|seconds| *seconds > 0)
            .map(|seconds| Duration::from_secs(seconds as u64));
        sign_token(claims, self.config.secret(), expires_in)
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("cookie_name", &self.cookie_name())
            .finish_non_exhaustive()
    }
}
