// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Dhiway credential service integration for watch registration.
//!
//! The Dhiway side is treated as unreliable: transport failures, timeouts,
//! non-2xx responses, and malformed acknowledgements all surface as a
//! [`DhiwayError`] carrying the cause classification. The client performs
//! no retries of its own; retry policy belongs to the reconciliation
//! engine so batch-level accounting stays correct.

use std::{future::Future, time::Duration};

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const WATCH_PATH: &str = "/api/v1/records/watch";

/// Request to register a watch for a credential.
#[derive(Debug, Clone, Copy)]
pub struct RegisterWatchRequest<'a> {
    /// Public ID of the credential to watch.
    pub vc_public_id: &'a str,
    /// URL Dhiway should notify on credential updates.
    pub callback_url: &'a str,
    /// Optional notification email registered alongside the watch.
    pub email: Option<&'a str>,
}

/// Acknowledgement returned by Dhiway for a successful registration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatchAck {
    /// Identifier Dhiway assigned to the watched credential.
    #[serde(default)]
    pub identifier: Option<String>,
    /// Human-readable acknowledgement message.
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DhiwayError {
    #[error("Dhiway configuration missing: {0}")]
    MissingConfig(String),

    #[error("Dhiway request timed out: {0}")]
    Timeout(String),

    #[error("Dhiway request failed: {0}")]
    Network(String),

    #[error("Dhiway rejected watch registration: {0}")]
    Rejected(String),
}

/// Seam between the reconciliation engine and the remote watch service.
///
/// Production code uses [`DhiwayClient`]; tests substitute stub registrars
/// to drive failure scenarios deterministically.
pub trait WatchRegistrar: Send + Sync {
    /// Register a watch for a single credential. One in-flight registration
    /// per credential is enforced by the caller via the registry's
    /// per-credential lock.
    fn register_watch(
        &self,
        request: RegisterWatchRequest<'_>,
    ) -> impl Future<Output = Result<WatchAck, DhiwayError>> + Send;
}

/// HTTP client for the Dhiway wallet service.
#[derive(Debug, Clone)]
pub struct DhiwayClient {
    base_url: String,
    api_token: String,
    http: Client,
}

impl DhiwayClient {
    /// Build a client from `DHIWAY_*` environment variables.
    pub fn from_env() -> Result<Self, DhiwayError> {
        let base_url = env_required("DHIWAY_API_BASE_URL")?;
        let api_token = env_required("DHIWAY_API_TOKEN")?;
        let timeout = env_optional("DHIWAY_REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        Self::new(base_url, api_token, Duration::from_secs(timeout))
    }

    /// Build a client against an explicit base URL (used by tests).
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DhiwayError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DhiwayError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into(),
            api_token: api_token.into(),
            http,
        })
    }

    /// Whether the environment carries the required Dhiway configuration.
    pub fn is_configured() -> bool {
        env_optional("DHIWAY_API_BASE_URL").is_some() && env_optional("DHIWAY_API_TOKEN").is_some()
    }
}

impl WatchRegistrar for DhiwayClient {
    async fn register_watch(
        &self,
        request: RegisterWatchRequest<'_>,
    ) -> Result<WatchAck, DhiwayError> {
        let mut payload = json!({
            "recordPublicId": request.vc_public_id,
            "callbackUrl": request.callback_url,
        });
        if let Some(email) = request.email {
            payload["email"] = json!(email);
        }

        debug!(
            vc_public_id = %request.vc_public_id,
            callback_url = %request.callback_url,
            "Dhiway register_watch: sending request"
        );

        let response = self
            .http
            .post(format!(
                "{}{WATCH_PATH}",
                self.base_url.trim_end_matches('/')
            ))
            .header("Authorization", format!("Bearer {}", self.api_token))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DhiwayError::Timeout(format!("POST {WATCH_PATH}: {e}"))
                } else {
                    DhiwayError::Network(format!("POST {WATCH_PATH}: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DhiwayError::Rejected(format!(
                "POST {WATCH_PATH} returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| DhiwayError::Rejected(format!("invalid acknowledgement: {e}")))
    }
}

fn env_required(name: &str) -> Result<String, DhiwayError> {
    env_optional(name).ok_or_else(|| DhiwayError::MissingConfig(name.to_string()))
}

fn env_optional(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        }
        Err(_) => None,
    }
}
