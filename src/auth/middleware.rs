// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request authentication middleware for Axum.
//!
//! Annotates every request with an [`AuthenticationOutcome`] and always
//! passes it on. Handlers decide what anonymous access means for them.
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .route("/account", get(account))
//!     .layer(axum::middleware::from_fn_with_state(
//!         relay.verifier(),
//!         verify_request,
//!     ));
//! ```

use axum::{
    body::{to_bytes, Body, HttpBody},
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use super::resolver;
use super::{AuthenticationOutcome, TokenSource, TokenVerifier};

/// Largest body buffered while looking for a body token. Larger bodies, and
/// bodies of unknown length, pass through unread.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Authentication middleware function.
pub async fn verify_request(State(verifier): State<TokenVerifier>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();

    let mut found = resolver::resolve_token(&parts.uri, &parts.headers, verifier.cookie_name(), None);

    // The body is only read when nothing earlier matched, then restored.
    let body = if found.is_none() && resolver::body_may_carry_token(&parts.headers) && fits_buffer(&body) {
        match to_bytes(body, MAX_BODY_BYTES).await {
            Ok(bytes) => {
                found = resolver::from_body(&parts.headers, &bytes).map(|token| (TokenSource::Body, token));
                Body::from(bytes)
            }
            Err(err) => {
                // The stream failed mid-read; the handler would have seen the same error.
                warn!(error = %err, "could not buffer request body");
                Body::empty()
            }
        }
    } else {
        body
    };

    let outcome = match found {
        None => AuthenticationOutcome::anonymous(),
        Some((source, token)) => match verifier.verify_token(&token) {
            Some(claims) => AuthenticationOutcome::verified(claims, source),
            None => {
                debug!(source = source.as_str(), "token present but not verified");
                AuthenticationOutcome::anonymous()
            }
        },
    };
    debug!(
        path = %parts.uri.path(),
        authenticated = outcome.authenticated,
        source = outcome.source.map(TokenSource::as_str),
        "request authentication resolved"
    );

    parts.extensions.insert(outcome);
    next.run(Request::from_parts(parts, body)).await
}

fn fits_buffer(body: &Body) -> bool {
    body.size_hint()
        .upper()
        .is_some_and(|len| len <= MAX_BODY_BYTES as u64)
}
