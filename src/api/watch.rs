// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! VC watch registration and the Dhiway callback webhook.

use axum::{extract::State, Json};
use tracing::{info, warn};
use url::Url;

use crate::{
    auth::Auth,
    error::ApiError,
    models::{WatchCallbackPayload, WatchResponse, WatchVcRequest, WatcherSummary},
    providers::{DhiwayError, RegisterWatchRequest, WatchRegistrar},
    state::AppState,
    storage::WatcherRecord,
};

/// Maximum accepted length for caller-supplied URLs.
const MAX_WATCH_URL_LEN: usize = 1500;

fn validate_watch_url(field: &str, value: &str) -> Result<(), ApiError> {
    if value.len() > MAX_WATCH_URL_LEN {
        return Err(ApiError::bad_request(format!(
            "{field} must be at most {MAX_WATCH_URL_LEN} characters"
        )));
    }
    let parsed =
        Url::parse(value).map_err(|_| ApiError::bad_request(format!("{field} must be a valid URL")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::bad_request(format!(
            "{field} must be an http(s) URL"
        )));
    }
    Ok(())
}

fn map_dhiway_error(error: DhiwayError) -> ApiError {
    match error {
        DhiwayError::MissingConfig(message) => ApiError::service_unavailable(format!(
            "Dhiway is not configured: {message}"
        )),
        DhiwayError::Timeout(message)
        | DhiwayError::Network(message)
        | DhiwayError::Rejected(message) => {
            ApiError::service_unavailable(format!("Dhiway watch registration failed: {message}"))
        }
    }
}

fn summary(record: &WatcherRecord) -> WatcherSummary {
    WatcherSummary {
        vc_public_id: record.credential_public_id.clone(),
        identifier: record.credential_identifier.clone(),
        status: record.status,
        callback_url: record.callback_url.clone(),
        forward_url: record.forward_url.clone(),
    }
}

/// Register a VC for update monitoring.
///
/// Creates or updates the watcher record and registers the watch with
/// Dhiway synchronously. The per-credential lock is held across the remote
/// call so this endpoint and the reconciliation engine cannot issue
/// duplicate registrations for the same credential.
#[utoipa::path(
    post,
    path = "/api/wallet/vcs/watch",
    tag = "Wallet",
    request_body = WatchVcRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "VC watch registered successfully", body = WatchResponse),
        (status = 400, description = "Bad request - validation failed"),
        (status = 401, description = "Unauthorized"),
        (status = 503, description = "Dhiway registration failed")
    )
)]
pub async fn watch_vc(
    State(state): State<AppState>,
    Auth(user): Auth,
    Json(request): Json<WatchVcRequest>,
) -> Result<Json<WatchResponse>, ApiError> {
    let vc_public_id = request.vc_public_id.trim().to_string();
    if vc_public_id.is_empty() {
        return Err(ApiError::bad_request("vcPublicId must not be empty"));
    }
    if let Some(email) = &request.email {
        if !email.contains('@') {
            return Err(ApiError::bad_request("email must be a valid email address"));
        }
    }
    if let Some(url) = &request.callback_url {
        validate_watch_url("callbackUrl", url)?;
    }
    if let Some(url) = &request.forward_watcher_callback_url {
        validate_watch_url("forwardWatcherCallbackUrl", url)?;
    }

    let callback_url = request
        .callback_url
        .clone()
        .unwrap_or_else(|| state.callback_url.clone());

    state
        .registry
        .record_credential(&vc_public_id, request.identifier.as_deref())?;

    let _guard = state.registry.credential_lock(&vc_public_id).await;
    state.registry.stage_registration(
        &vc_public_id,
        request.identifier.as_deref(),
        &callback_url,
        request.forward_watcher_callback_url.as_deref(),
    )?;

    let register = RegisterWatchRequest {
        vc_public_id: &vc_public_id,
        callback_url: &callback_url,
        email: request.email.as_deref(),
    };
    match state.dhiway.register_watch(register).await {
        Ok(ack) => {
            let record = state
                .registry
                .mark_active(&vc_public_id, ack.identifier.as_deref())?;
            info!(
                user_id = %user.user_id,
                vc_public_id = %vc_public_id,
                "VC watch registered"
            );
            Ok(Json(WatchResponse {
                success: true,
                message: "VC watch registered successfully".to_string(),
                data: Some(summary(&record)),
            }))
        }
        Err(e) => {
            warn!(
                user_id = %user.user_id,
                vc_public_id = %vc_public_id,
                error = %e,
                "VC watch registration failed"
            );
            state.registry.mark_failed(&vc_public_id)?;
            Err(map_dhiway_error(e))
        }
    }
}

/// Webhook endpoint for VC update notifications from Dhiway.
///
/// Always acknowledges structurally valid payloads, matched or not, so
/// Dhiway does not retry indefinitely for unknown credentials. Malformed
/// bodies are rejected by the JSON extractor before this handler runs.
#[utoipa::path(
    post,
    path = "/api/wallet/vcs/watch/callback",
    tag = "Wallet",
    request_body = WatchCallbackPayload,
    responses(
        (status = 200, description = "Callback processed successfully", body = WatchResponse),
        (status = 400, description = "Malformed payload"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn watch_callback(
    State(state): State<AppState>,
    Json(payload): Json<WatchCallbackPayload>,
) -> Result<Json<WatchResponse>, ApiError> {
    state.relay.process(payload).await?;
    Ok(Json(WatchResponse {
        success: true,
        message: "Callback processed successfully".to_string(),
        data: None,
    }))
}
