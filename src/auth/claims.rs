// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verified claims and the per-request authentication outcome.

use serde::Serialize;
use serde_json::{Map, Value};

/// Decoded payload of a verified token.
///
/// The authenticator decides what goes into the payload (via the host's
/// payload builder), so claims stay an open JSON object.
pub type Claims = Map<String, Value>;

/// Where a token was found on the request, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    Query,
    Header,
    Cookie,
    Body,
}

impl TokenSource {
    pub const PRECEDENCE: [TokenSource; 4] =
        [TokenSource::Query, TokenSource::Header, TokenSource::Cookie, TokenSource::Body];

    pub fn as_str(self) -> &'static str {
        match self {
            TokenSource::Query => "query",
            TokenSource::Header => "header",
            TokenSource::Cookie => "cookie",
            TokenSource::Body => "body",
        }
    }
}

/// Result of running the middleware on one request. Stored in the request
/// extensions for downstream handlers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuthenticationOutcome {
    pub authenticated: bool,
    /// Present only when `authenticated`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoded: Option<Claims>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<TokenSource>,
}

impl AuthenticationOutcome {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn verified(claims: Claims, source: TokenSource) -> Self {
        Self {
            authenticated: true,
            decoded: Some(claims),
            source: Some(source),
        }
    }

    /// Look up a single claim on a verified token.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.decoded.as_ref().and_then(|claims| claims.get(name))
    }
}
