// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors over the outcome left by [`verify_request`](super::verify_request).
//!
//! ```rust,ignore
//! async fn account(RequireAuth(claims): RequireAuth) -> impl IntoResponse {
//!     // claims are the verified token payload
//! }
//! ```

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::{AuthError, AuthenticationOutcome, Claims};

/// The request's authentication outcome. Never rejects; routes not behind
/// the middleware see an anonymous outcome.
pub struct Authentication(pub AuthenticationOutcome);

impl<S: Send + Sync> FromRequestParts<S> for Authentication {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let outcome = parts
            .extensions
            .get::<AuthenticationOutcome>()
            .cloned()
            .unwrap_or_default();
        Ok(Authentication(outcome))
    }
}

/// Claims of a verified token, or a 401 JSON error.
pub struct RequireAuth(pub Claims);

impl<S: Send + Sync> FromRequestParts<S> for RequireAuth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(Authentication(outcome)) = Authentication::from_request_parts(parts, state).await;

        match outcome.decoded {
            Some(claims) if outcome.authenticated => Ok(RequireAuth(claims)),
            _ => Err(AuthError::Unauthenticated),
        }
    }
}
