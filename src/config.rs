// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Relay Configuration
//!
//! Hosts describe the relay with a [`RelayOptions`] map. [`RelayConfig::from_options`]
//! runs it through the closed options schema and produces the immutable
//! configuration shared by the relay and the token verifier.
//!
//! ## Options
//!
//! | Key | Type | Required | Default |
//! |-----|------|----------|---------|
//! | `server` | host `Router` | yes | |
//! | `secret` | string | yes | |
//! | `version` | integer | yes | |
//! | `onResponse` | response handler | yes | |
//! | `cookieName` | string | no | cookie source skipped |
//! | `tokenExpirySeconds` | integer | no | none (`-1` = no expiry) |
//! | `requestTypeLabel` | string | no | none |
//! | `payloadBuilder` | payload builder | no | builds `{}` |
//! | `requiredFields` | any | no | none |
//! | `path` | string | no | `/` |
//! | `authenticatorUrl` | string | no | `wss://www.unlock-auth.com` |
//! | `apiBaseUrl` | string | no | `https://www.unlock-auth.com` |
//! | `upstreamTimeoutSeconds` | integer | no | none |
//!
//! ## Environment Variables (demo host)
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `UNLOCK_SECRET` | Authenticator API key | Required |
//! | `UNLOCK_API_VERSION` | Authenticator protocol version | `1` |
//! | `UNLOCK_COOKIE_NAME` | Cookie carrying the auth token | Optional |
//! | `UNLOCK_CONFIG_FILE` | JSON file with extra data options | Optional |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `3000` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,unlock_relay=debug` |

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use serde_json::{Map, Value};
use url::Url;

use crate::error::ConfigError;
use crate::models::RelayedResponse;
use crate::relay::BrowserConnection;
use crate::schema::{self, FieldSpec, FieldType, Normalized, SchemaValue};

pub const SECRET_ENV: &str = "UNLOCK_SECRET";
pub const API_VERSION_ENV: &str = "UNLOCK_API_VERSION";
pub const COOKIE_NAME_ENV: &str = "UNLOCK_COOKIE_NAME";
pub const CONFIG_FILE_ENV: &str = "UNLOCK_CONFIG_FILE";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_AUTHENTICATOR_URL: &str = "wss://www.unlock-auth.com";
pub const DEFAULT_API_BASE_URL: &str = "https://www.unlock-auth.com";
pub const DEFAULT_PATH: &str = "/";

/// Option keys.
pub mod keys {
    pub const SERVER: &str = "server";
    pub const SECRET: &str = "secret";
    pub const VERSION: &str = "version";
    pub const ON_RESPONSE: &str = "onResponse";
    pub const COOKIE_NAME: &str = "cookieName";
    pub const TOKEN_EXPIRY_SECONDS: &str = "tokenExpirySeconds";
    pub const REQUEST_TYPE_LABEL: &str = "requestTypeLabel";
    pub const PAYLOAD_BUILDER: &str = "payloadBuilder";
    pub const REQUIRED_FIELDS: &str = "requiredFields";
    pub const PATH: &str = "path";
    pub const AUTHENTICATOR_URL: &str = "authenticatorUrl";
    pub const API_BASE_URL: &str = "apiBaseUrl";
    pub const UPSTREAM_TIMEOUT_SECONDS: &str = "upstreamTimeoutSeconds";
}

/// Called once per completed exchange with the originating browser connection.
pub type ResponseHandler = Arc<dyn Fn(BrowserConnection, RelayedResponse) + Send + Sync>;

/// Builds the payload the authenticator signs into the token, from the
/// user's email and the browser's optional `extra` object.
pub type PayloadBuilder = Arc<dyn Fn(&str, Option<&Map<String, Value>>) -> Value + Send + Sync>;

/// A single option value.
#[derive(Clone)]
pub enum OptionValue {
    Json(Value),
    Server(Router),
    ResponseHandler(ResponseHandler),
    PayloadBuilder(PayloadBuilder),
}

impl fmt::Debug for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Json(value) => f.debug_tuple("Json").field(value).finish(),
            OptionValue::Server(_) => f.write_str("Server(..)"),
            OptionValue::ResponseHandler(_) => f.write_str("ResponseHandler(..)"),
            OptionValue::PayloadBuilder(_) => f.write_str("PayloadBuilder(..)"),
        }
    }
}

impl SchemaValue for OptionValue {
    fn field_type(&self) -> FieldType {
        match self {
            OptionValue::Json(value) => value.field_type(),
            OptionValue::Server(_) => FieldType::Server,
            OptionValue::ResponseHandler(_) | OptionValue::PayloadBuilder(_) => FieldType::Function,
        }
    }

    fn matches(&self, expected: &Self) -> bool {
        match (self, expected) {
            (OptionValue::Json(a), OptionValue::Json(b)) => a == b,
            (OptionValue::ResponseHandler(a), OptionValue::ResponseHandler(b)) => Arc::ptr_eq(a, b),
            (OptionValue::PayloadBuilder(a), OptionValue::PayloadBuilder(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Value> for OptionValue {
    fn from(value: Value) -> Self {
        OptionValue::Json(value)
    }
}

/// Schema for [`RelayOptions`].
pub fn options_schema() -> Vec<FieldSpec<OptionValue>> {
    vec![
        FieldSpec::required(keys::SERVER, FieldType::Server),
        FieldSpec::required(keys::SECRET, FieldType::String),
        FieldSpec::required(keys::VERSION, FieldType::Integer),
        FieldSpec::required(keys::ON_RESPONSE, FieldType::Function),
        FieldSpec::optional(keys::COOKIE_NAME, FieldType::String),
        FieldSpec::optional(keys::TOKEN_EXPIRY_SECONDS, FieldType::Integer),
        FieldSpec::optional(keys::REQUEST_TYPE_LABEL, FieldType::String),
        FieldSpec::optional(keys::PAYLOAD_BUILDER, FieldType::Function),
        FieldSpec::optional(keys::REQUIRED_FIELDS, FieldType::Any),
        FieldSpec::optional(keys::PATH, FieldType::String).with_default(json_value(DEFAULT_PATH)),
        FieldSpec::optional(keys::AUTHENTICATOR_URL, FieldType::String)
            .with_default(json_value(DEFAULT_AUTHENTICATOR_URL)),
        FieldSpec::optional(keys::API_BASE_URL, FieldType::String)
            .with_default(json_value(DEFAULT_API_BASE_URL)),
        FieldSpec::optional(keys::UPSTREAM_TIMEOUT_SECONDS, FieldType::Integer),
    ]
}

/// Options passed to [`Relay::start`](crate::relay::Relay::start).
///
/// ```rust,ignore
/// let options = RelayOptions::new()
///     .server(app)
///     .secret(api_key)
///     .version(1)
///     .on_response(|conn, response| {
///         let _ = conn.send_json(&response);
///     });
/// ```
#[derive(Debug, Clone, Default)]
pub struct RelayOptions {
    entries: BTreeMap<String, OptionValue>,
}

impl RelayOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load data-only options from a JSON object, e.g. a config file.
    ///
    /// Keys are not checked here; an unknown key fails at start.
    pub fn from_json(value: Value) -> Result<Self, ConfigError> {
        match value {
            Value::Object(map) => Ok(Self {
                entries: map.into_iter().map(|(k, v)| (k, OptionValue::Json(v))).collect(),
            }),
            _ => Err(ConfigError::MissingOptions),
        }
    }

    /// Set an arbitrary option.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn remove(mut self, key: &str) -> Self {
        self.entries.remove(key);
        self
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.entries.get(key)
    }

    pub fn server(self, router: Router) -> Self {
        self.set(keys::SERVER, OptionValue::Server(router))
    }

    pub fn secret(self, secret: impl Into<String>) -> Self {
        self.set(keys::SECRET, Value::from(secret.into()))
    }

    pub fn version(self, version: i64) -> Self {
        self.set(keys::VERSION, Value::from(version))
    }

    pub fn on_response<F>(self, handler: F) -> Self
    where
        F: Fn(BrowserConnection, RelayedResponse) + Send + Sync + 'static,
    {
        self.set(keys::ON_RESPONSE, OptionValue::ResponseHandler(Arc::new(handler)))
    }

    pub fn cookie_name(self, name: impl Into<String>) -> Self {
        self.set(keys::COOKIE_NAME, Value::from(name.into()))
    }

    pub fn token_expiry_seconds(self, seconds: i64) -> Self {
        self.set(keys::TOKEN_EXPIRY_SECONDS, Value::from(seconds))
    }

    pub fn request_type_label(self, label: impl Into<String>) -> Self {
        self.set(keys::REQUEST_TYPE_LABEL, Value::from(label.into()))
    }

    pub fn payload_builder<F>(self, builder: F) -> Self
    where
        F: Fn(&str, Option<&Map<String, Value>>) -> Value + Send + Sync + 'static,
    {
        self.set(keys::PAYLOAD_BUILDER, OptionValue::PayloadBuilder(Arc::new(builder)))
    }

    pub fn required_fields(self, fields: Value) -> Self {
        self.set(keys::REQUIRED_FIELDS, fields)
    }

    pub fn path(self, path: impl Into<String>) -> Self {
        self.set(keys::PATH, Value::from(path.into()))
    }

    pub fn authenticator_url(self, url: impl Into<String>) -> Self {
        self.set(keys::AUTHENTICATOR_URL, Value::from(url.into()))
    }

    pub fn api_base_url(self, url: impl Into<String>) -> Self {
        self.set(keys::API_BASE_URL, Value::from(url.into()))
    }

    pub fn upstream_timeout_seconds(self, seconds: i64) -> Self {
        self.set(keys::UPSTREAM_TIMEOUT_SECONDS, Value::from(seconds))
    }

    /// Add every entry of `other`, overwriting duplicates.
    pub fn merge(mut self, other: RelayOptions) -> Self {
        self.entries.extend(other.entries);
        self
    }
}

/// Validated relay configuration. Immutable once built.
#[derive(Clone)]
pub struct RelayConfig {
    secret: String,
    pub version: i64,
    pub cookie_name: Option<String>,
    pub token_expiry_seconds: Option<i64>,
    pub request_type_label: Option<String>,
    pub payload_builder: PayloadBuilder,
    pub on_response: ResponseHandler,
    pub required_fields: Option<Value>,
    pub path: String,
    pub authenticator_url: Url,
    pub api_base_url: Url,
    pub upstream_timeout: Option<Duration>,
}

impl RelayConfig {
    /// Validate `options` and split out the host router.
    pub fn from_options(options: &RelayOptions) -> Result<(RelayConfig, Router), ConfigError> {
        let mut fields = schema::validate(Some(&options.entries), &options_schema())?;

        let server = match fields.remove(keys::SERVER) {
            Some(OptionValue::Server(router)) => router,
            _ => return Err(ConfigError::MissingRequiredField(keys::SERVER.to_string())),
        };
        let on_response = match fields.remove(keys::ON_RESPONSE) {
            Some(OptionValue::ResponseHandler(handler)) => handler,
            _ => return Err(ConfigError::InvalidValue(keys::ON_RESPONSE.to_string())),
        };
        let payload_builder = match fields.remove(keys::PAYLOAD_BUILDER) {
            Some(OptionValue::PayloadBuilder(builder)) => builder,
            Some(_) => return Err(ConfigError::InvalidValue(keys::PAYLOAD_BUILDER.to_string())),
            None => empty_payload(),
        };

        let secret = take_string(&mut fields, keys::SECRET)?
            .ok_or_else(|| ConfigError::MissingRequiredField(keys::SECRET.to_string()))?;
        let version = take_integer(&mut fields, keys::VERSION)?
            .ok_or_else(|| ConfigError::MissingRequiredField(keys::VERSION.to_string()))?;
        if version < 0 {
            return Err(ConfigError::InvalidValue(keys::VERSION.to_string()));
        }

        let token_expiry_seconds = take_integer(&mut fields, keys::TOKEN_EXPIRY_SECONDS)?;
        if matches!(token_expiry_seconds, Some(seconds) if seconds != -1 && seconds <= 0) {
            return Err(ConfigError::InvalidValue(keys::TOKEN_EXPIRY_SECONDS.to_string()));
        }

        let path = take_string(&mut fields, keys::PATH)?.unwrap_or_else(|| DEFAULT_PATH.to_string());
        if !path.starts_with('/') {
            return Err(ConfigError::InvalidValue(keys::PATH.to_string()));
        }

        let authenticator_url = take_url(&mut fields, keys::AUTHENTICATOR_URL, &["ws", "wss"])?;
        let api_base_url = take_url(&mut fields, keys::API_BASE_URL, &["http", "https"])?;

        let upstream_timeout = match take_integer(&mut fields, keys::UPSTREAM_TIMEOUT_SECONDS)? {
            Some(seconds) if seconds > 0 => Some(Duration::from_secs(seconds as u64)),
            Some(_) => return Err(ConfigError::InvalidValue(keys::UPSTREAM_TIMEOUT_SECONDS.to_string())),
            None => None,
        };

        let required_fields = match fields.remove(keys::REQUIRED_FIELDS) {
            Some(OptionValue::Json(value)) => Some(value),
            Some(_) => return Err(ConfigError::WrongType {
                key: keys::REQUIRED_FIELDS.to_string(),
                expected: FieldType::Any,
            }),
            None => None,
        };

        let config = RelayConfig {
            secret,
            version,
            cookie_name: take_string(&mut fields, keys::COOKIE_NAME)?,
            token_expiry_seconds,
            request_type_label: take_string(&mut fields, keys::REQUEST_TYPE_LABEL)?,
            payload_builder,
            on_response,
            required_fields,
            path,
            authenticator_url,
            api_base_url,
            upstream_timeout,
        };

        Ok((config, server))
    }

    /// Shared secret used as the authenticator API key and token key.
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("secret", &"<redacted>")
            .field("version", &self.version)
            .field("cookie_name", &self.cookie_name)
            .field("token_expiry_seconds", &self.token_expiry_seconds)
            .field("request_type_label", &self.request_type_label)
            .field("required_fields", &self.required_fields)
            .field("path", &self.path)
            .field("authenticator_url", &self.authenticator_url.as_str())
            .field("api_base_url", &self.api_base_url.as_str())
            .field("upstream_timeout", &self.upstream_timeout)
            .finish_non_exhaustive()
    }
}

fn json_value(value: &str) -> OptionValue {
    OptionValue::Json(Value::from(value))
}

fn empty_payload() -> PayloadBuilder {
    Arc::new(|_email, _extra| Value::Object(Map::new()))
}

fn take_string(fields: &mut Normalized<OptionValue>, key: &str) -> Result<Option<String>, ConfigError> {
    match fields.remove(key) {
        None => Ok(None),
        Some(OptionValue::Json(Value::String(s))) => Ok(Some(s)),
        Some(_) => Err(ConfigError::WrongType {
            key: key.to_string(),
            expected: FieldType::String,
        }),
    }
}

fn take_integer(fields: &mut Normalized<OptionValue>, key: &str) -> Result<Option<i64>, ConfigError> {
    match fields.remove(key) {
        None => Ok(None),
        Some(OptionValue::Json(Value::Number(n))) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidValue(key.to_string())),
        Some(_) => Err(ConfigError::WrongType {
            key: key.to_string(),
            expected: FieldType::Integer,
        }),
    }
}

fn take_url(fields: &mut Normalized<OptionValue>, key: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let raw = take_string(fields, key)?.ok_or_else(|| ConfigError::MissingRequiredField(key.to_string()))?;
    let url = Url::parse(&raw).map_err(|_| ConfigError::InvalidValue(key.to_string()))?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidValue(key.to_string()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_options() -> RelayOptions {
        RelayOptions::new()
            .server(Router::new())
            .secret("k")
            .version(1)
            .on_response(|_, _| {})
    }

    #[test]
    fn minimal_options_get_defaults() {
        let (config, _router) = RelayConfig::from_options(&valid_options()).unwrap();
        assert_eq!(config.secret(), "k");
        assert_eq!(config.version, 1);
        assert_eq!(config.path, "/");
        assert_eq!(config.authenticator_url.as_str(), "wss://www.unlock-auth.com/");
        assert_eq!(config.api_base_url.as_str(), "https://www.unlock-auth.com/");
        assert!(config.cookie_name.is_none());
        assert!(config.token_expiry_seconds.is_none());
        assert!(config.upstream_timeout.is_none());
        assert_eq!((config.payload_builder)("a@b.com", None), json!({}));
    }

    #[test]
    fn each_required_option_is_enforced() {
        for key in [keys::SERVER, keys::SECRET, keys::VERSION, keys::ON_RESPONSE] {
            let err = RelayConfig::from_options(&valid_options().remove(key)).unwrap_err();
            assert_eq!(err, ConfigError::MissingRequiredField(key.to_string()));
        }
    }

    #[test]
    fn unknown_option_is_rejected() {
        let err = RelayConfig::from_options(&valid_options().set("apikey", json!("typo"))).unwrap_err();
        assert_eq!(err.to_string(), "unrecognized option apikey");
    }

    #[test]
    fn wrong_types_are_rejected() {
        let err = RelayConfig::from_options(&valid_options().set(keys::VERSION, json!("1"))).unwrap_err();
        assert_eq!(err.to_string(), "wrong type for version");

        let err = RelayConfig::from_options(&valid_options().set(keys::ON_RESPONSE, json!(true))).unwrap_err();
        assert_eq!(err.to_string(), "wrong type for onResponse");
    }

    #[test]
    fn optional_settings_are_carried() {
        let options = valid_options()
            .cookie_name("token")
            .token_expiry_seconds(-1)
            .request_type_label("Sign in to Example")
            .required_fields(json!(["name"]))
            .path("/unlock")
            .authenticator_url("ws://127.0.0.1:9000")
            .upstream_timeout_seconds(5)
            .payload_builder(|email, _| json!({ "email": email }));
        let (config, _) = RelayConfig::from_options(&options).unwrap();
        assert_eq!(config.cookie_name.as_deref(), Some("token"));
        assert_eq!(config.token_expiry_seconds, Some(-1));
        assert_eq!(config.request_type_label.as_deref(), Some("Sign in to Example"));
        assert_eq!(config.required_fields, Some(json!(["name"])));
        assert_eq!(config.path, "/unlock");
        assert_eq!(config.authenticator_url.as_str(), "ws://127.0.0.1:9000/");
        assert_eq!(config.upstream_timeout, Some(Duration::from_secs(5)));
        assert_eq!((config.payload_builder)("x@y.com", None), json!({"email": "x@y.com"}));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let cases = [
            valid_options().token_expiry_seconds(0),
            valid_options().token_expiry_seconds(-7),
            valid_options().version(-1),
            valid_options().path("unlock"),
            valid_options().authenticator_url("https://not-a-socket.example"),
            valid_options().authenticator_url("not a url"),
            valid_options().upstream_timeout_seconds(0),
        ];
        for options in cases {
            let err = RelayConfig::from_options(&options).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue(_)), "{err}");
        }
    }

    #[test]
    fn json_options_merge_with_callbacks() {
        let file = RelayOptions::from_json(json!({
            "secret": "from-file",
            "version": 2,
            "cookieName": "auth"
        }))
        .unwrap();
        let options = RelayOptions::new()
            .server(Router::new())
            .on_response(|_, _| {})
            .merge(file);
        let (config, _) = RelayConfig::from_options(&options).unwrap();
        assert_eq!(config.secret(), "from-file");
        assert_eq!(config.version, 2);
        assert_eq!(config.cookie_name.as_deref(), Some("auth"));
    }

    #[test]
    fn json_options_must_be_an_object() {
        assert_eq!(RelayOptions::from_json(json!([1])).unwrap_err(), ConfigError::MissingOptions);
    }

    #[test]
    fn unknown_key_in_json_fails_at_validation() {
        let options = valid_options().merge(RelayOptions::from_json(json!({"exp": 60})).unwrap());
        let err = RelayConfig::from_options(&options).unwrap_err();
        assert_eq!(err, ConfigError::UnrecognizedOption("exp".to_string()));
    }

    #[test]
    fn debug_output_redacts_secret() {
        let (config, _) = RelayConfig::from_options(&valid_options().secret("super-secret")).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
