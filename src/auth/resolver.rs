// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token lookup across the four carriers, in fixed precedence:
//!
//! 1. query parameter `authToken`
//! 2. header `x-access-token`
//! 3. cookie named by `cookieName` (skipped when none is configured)
//! 4. body field `authToken` (JSON or urlencoded bodies)
//!
//! The first carrier holding a non-empty value wins, even if that token later
//! fails verification.

use axum::http::{header, HeaderMap, Uri};
use serde_json::Value;
use url::form_urlencoded;

use super::TokenSource;

pub const QUERY_PARAM: &str = "authToken";
pub const HEADER_NAME: &str = "x-access-token";
pub const BODY_FIELD: &str = "authToken";

/// Look through every carrier. `body` is only consulted when given.
pub fn resolve_token(
    uri: &Uri,
    headers: &HeaderMap,
    cookie_name: Option<&str>,
    body: Option<&[u8]>,
) -> Option<(TokenSource, String)> {
    from_query(uri)
        .map(|token| (TokenSource::Query, token))
        .or_else(|| from_header(headers).map(|token| (TokenSource::Header, token)))
        .or_else(|| {
            cookie_name
                .and_then(|name| from_cookie(headers, name))
                .map(|token| (TokenSource::Cookie, token))
        })
        .or_else(|| {
            body.and_then(|body| from_body(headers, body))
                .map(|token| (TokenSource::Body, token))
        })
}

pub fn from_query(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}

pub fn from_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(HEADER_NAME)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

pub fn from_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(header::COOKIE) {
        let Ok(cookie) = cookie.to_str() else { continue };
        for part in cookie.split(';') {
            let Some((key, value)) = part.trim().split_once('=') else { continue };
            if key == name && !value.is_empty() {
                return Some(value.trim_matches('"').to_string());
            }
        }
    }
    None
}

/// Whether the body could carry a token, judged by its content type.
pub fn body_may_carry_token(headers: &HeaderMap) -> bool {
    body_kind(headers).is_some()
}

pub fn from_body(headers: &HeaderMap, body: &[u8]) -> Option<String> {
    let token = match body_kind(headers)? {
        BodyKind::Json => serde_json::from_slice::<Value>(body)
            .ok()?
            .get(BODY_FIELD)?
            .as_str()?
            .to_string(),
        BodyKind::Form => form_urlencoded::parse(body)
            .find(|(key, _)| key == BODY_FIELD)
            .map(|(_, value)| value.into_owned())?,
    };
    (!token.is_empty()).then_some(token)
}

enum BodyKind {
    Json,
    Form,
}

fn body_kind(headers: &HeaderMap) -> Option<BodyKind> {
    let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
    if mime == "application/json" || mime.ends_with("+json") {
        Some(BodyKind::Json)
    } else if mime == "application/x-www-form-urlencoded" {
        Some(BodyKind::Form)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const COOKIE: &str = "auth";

    fn carriers(in_query: bool, in_header: bool, in_cookie: bool, in_body: bool) -> (Uri, HeaderMap, Vec<u8>) {
        let path = if in_query { "/account?authToken=q-token" } else { "/account" };
        let uri: Uri = path.parse().unwrap();
        let mut headers = HeaderMap::new();
        if in_header {
            headers.insert(HEADER_NAME, HeaderValue::from_static("h-token"));
        }
        if in_cookie {
            headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; auth=c-token"));
        }
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let body = if in_body { br#"{"authToken":"b-token"}"#.to_vec() } else { b"{}".to_vec() };
        (uri, headers, body)
    }

    #[test]
    fn first_present_carrier_wins_in_every_combination() {
        for mask in 0u8..16 {
            let present = [mask & 1 != 0, mask & 2 != 0, mask & 4 != 0, mask & 8 != 0];
            let (uri, headers, body) = carriers(present[0], present[1], present[2], present[3]);
            let found = resolve_token(&uri, &headers, Some(COOKIE), Some(body.as_slice()));

            let expected = TokenSource::PRECEDENCE
                .iter()
                .zip(present)
                .find(|(_, present)| *present)
                .map(|(source, _)| *source);
            assert_eq!(found.as_ref().map(|(source, _)| *source), expected, "mask {mask:04b}");

            let expected_token = expected.map(|source| match source {
                TokenSource::Query => "q-token",
                TokenSource::Header => "h-token",
                TokenSource::Cookie => "c-token",
                TokenSource::Body => "b-token",
            });
            assert_eq!(found.as_ref().map(|(_, token)| token.as_str()), expected_token);
        }
    }

    #[test]
    fn cookie_is_skipped_without_a_cookie_name() {
        let (uri, headers, body) = carriers(false, false, true, true);
        let found = resolve_token(&uri, &headers, None, Some(body.as_slice()));
        assert_eq!(found, Some((TokenSource::Body, "b-token".to_string())));
    }

    #[test]
    fn empty_values_count_as_absent() {
        let uri: Uri = "/?authToken=".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_NAME, HeaderValue::from_static("h-token"));
        assert_eq!(
            resolve_token(&uri, &headers, None, None),
            Some((TokenSource::Header, "h-token".to_string()))
        );
    }

    #[test]
    fn cookie_lookup_matches_exact_name() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("xauth=wrong; auth=\"right\""));
        assert_eq!(from_cookie(&headers, "auth"), Some("right".to_string()));
        assert_eq!(from_cookie(&headers, "missing"), None);
    }

    #[test]
    fn form_bodies_are_read() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded; charset=utf-8"),
        );
        assert!(body_may_carry_token(&headers));
        assert_eq!(from_body(&headers, b"name=a&authToken=f-token"), Some("f-token".to_string()));
    }

    #[test]
    fn other_bodies_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!body_may_carry_token(&headers));
        assert_eq!(from_body(&headers, b"authToken=x"), None);

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert_eq!(from_body(&headers, br#"{"authToken": 42}"#), None);
        assert_eq!(from_body(&headers, b"not json"), None);
    }
}
