// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Verifies the tokens the authenticator issues after a successful unlock.
//!
//! ## Auth Flow
//!
//! 1. A browser unlocks over the relay and receives a token signed with the
//!    relay secret.
//! 2. The browser presents it on later HTTP requests (query, header, cookie
//!    or body).
//! 3. [`verify_request`] resolves and verifies it, then stores an
//!    [`AuthenticationOutcome`] in the request extensions:
//!    - `authenticated`: whether a token was found and verified
//!    - `decoded`: the token's claims when verified
//!
//! ## Security
//!
//! - HS256 only, keyed by the relay secret
//! - Clock skew tolerance is 60 seconds
//! - The middleware never rejects; use [`RequireAuth`] on routes that need a user

pub mod claims;
pub mod error;
pub mod extractor;
pub mod middleware;
pub mod resolver;
pub mod token;

pub use claims::{AuthenticationOutcome, Claims, TokenSource};
pub use error::AuthError;
pub use extractor::{Authentication, RequireAuth};
pub use middleware::verify_request;
pub use token::{decode_token, sign_token, verify_token, TokenVerifier};
