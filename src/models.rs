// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response data structures used by the REST API. All types
//! derive `Serialize`/`Deserialize` and `ToSchema` for automatic JSON
//! handling and OpenAPI documentation.
//!
//! Field names follow the external wire format (camelCase, plus the odd
//! snake_case field Dhiway sends as-is), so most structs carry serde
//! renames.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::WatchStatus;

// =============================================================================
// Watch Registration
// =============================================================================

/// Request to watch a Verifiable Credential for updates.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WatchVcRequest {
    /// Public ID of the Verifiable Credential to watch.
    pub vc_public_id: String,
    /// Email address for watcher notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// VC identifier assigned by the credential service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Callback URL Dhiway should notify on VC updates (max 1500 chars).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    /// External URL this service forwards callback notifications to
    /// (max 1500 chars).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_watcher_callback_url: Option<String>,
}

/// Watcher summary returned after a watch registration.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WatcherSummary {
    /// Public ID of the watched credential.
    pub vc_public_id: String,
    /// Identifier assigned by the credential service, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Current watch status.
    pub status: WatchStatus,
    /// Callback URL registered with Dhiway.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    /// Forward URL for relayed notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward_url: Option<String>,
}

// =============================================================================
// Watch Callback (webhook payload from Dhiway)
// =============================================================================

/// Webhook payload received from Dhiway when a watched VC changes.
///
/// Every field is optional: the payload is untrusted input and its shape
/// has drifted between Dhiway releases. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct WatchCallbackPayload {
    /// VC identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Public ID of the record being updated.
    #[serde(
        default,
        rename = "recordPublicId",
        skip_serializing_if = "Option::is_none"
    )]
    pub record_public_id: Option<String>,
    /// Type of the callback event (e.g. `vc_updated`).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Callback message or description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// User ID associated with the callback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Status of the VC update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Timestamp of the callback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Notification forwarded to a watcher's configured forward URL.
///
/// A subset of the received callback fields plus this service's own view
/// of the watcher status. The forward URL itself always comes from the
/// stored watcher record, never from the callback payload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ForwardedNotification {
    /// Public ID of the watched credential.
    #[serde(rename = "recordPublicId")]
    pub record_public_id: String,
    /// VC identifier, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Type of the originating callback event.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Callback message, passed through.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Status reported by Dhiway.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Timestamp reported by Dhiway.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// This service's watch status for the credential.
    #[serde(rename = "watcherStatus")]
    pub watcher_status: WatchStatus,
}

// =============================================================================
// Housekeeping
// =============================================================================

/// Request body for `POST /housekeeping/add-watchers`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddWatchersRequest {
    /// Number of VCs to process in this batch (positive; default 100).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<i64>,
}

/// Per-run reconciliation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileCounts {
    /// Candidates attempted (successes + failures).
    pub total_processed: u64,
    /// Watchers successfully registered.
    pub watchers_added: u64,
    /// Candidates whose registration failed.
    pub errors: u64,
}

/// Response envelope for `POST /housekeeping/add-watchers`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddWatchersResponse {
    /// Whether the run completed (individual registrations may still fail).
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// Per-run counters.
    pub data: ReconcileCounts,
}

/// Response for `GET /housekeeping/stats`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WatcherStatsResponse {
    /// Total watcher records.
    pub total_watchers: u64,
    /// Watchers confirmed active by Dhiway.
    pub active_watchers: u64,
    /// Watchers in any non-active state.
    pub inactive_watchers: u64,
    /// Total tracked credentials.
    #[serde(rename = "totalVCs")]
    pub total_vcs: u64,
    /// Credentials with an active watcher.
    #[serde(rename = "watchedVCs")]
    pub watched_vcs: u64,
    /// Credentials without an active watcher.
    #[serde(rename = "unwatchedVCs")]
    pub unwatched_vcs: u64,
}

/// Generic success envelope used by the watch endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WatchResponse {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    /// Watcher state after the operation, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<WatcherSummary>,
}
