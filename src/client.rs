// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! REST calls to the authenticator's HTTP API.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use url::Url;

use crate::config::RelayConfig;
use crate::error::{ConfigError, RelayError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const DELETE_PATH: &str = "api/delete";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteUserRequest<'a> {
    email: &'a str,
    api_key: &'a str,
}

/// Raw outcome of a delete call: the HTTP status and whatever body came back.
/// Non-2xx statuses are returned, not turned into errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteUserResponse {
    pub status: u16,
    pub data: Value,
}

impl DeleteUserResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct AuthenticatorClient {
    api_base_url: Url,
    api_key: String,
    http: Client,
}

impl AuthenticatorClient {
    pub fn new(api_base_url: Url, api_key: impl Into<String>) -> Result<Self, RelayError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            api_base_url,
            api_key: api_key.into(),
            http,
        })
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self, RelayError> {
        Self::new(config.api_base_url.clone(), config.secret())
    }

    /// Remove `email` from the authenticator's user list for this API key.
    pub async fn delete_user(&self, email: &str) -> Result<DeleteUserResponse, RelayError> {
        if email.trim().is_empty() {
            return Err(ConfigError::InvalidValue("email".to_string()).into());
        }

        let response = self
            .http
            .post(self.endpoint(DELETE_PATH)?)
            .json(&DeleteUserRequest {
                email,
                api_key: &self.api_key,
            })
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        let data = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body).unwrap_or(Value::String(body))
        };

        info!(email = %email, status, "delete user request completed");
        Ok(DeleteUserResponse { status, data })
    }

    fn endpoint(&self, path: &str) -> Result<Url, RelayError> {
        let mut base = self.api_base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path)
            .map_err(|_| ConfigError::InvalidValue(crate::config::keys::API_BASE_URL.to_string()).into())
    }
}
