// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Watcher and credential record types stored in the registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Watch registration status for a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum WatchStatus {
    /// No registration attempt has been made yet.
    Unwatched,
    /// A registration attempt is in flight.
    Pending,
    /// Dhiway confirmed the watch registration.
    Active,
    /// The last registration attempt failed; retried on the next
    /// reconciliation pass.
    Failed,
}

impl Default for WatchStatus {
    fn default() -> Self {
        Self::Unwatched
    }
}

/// A tracked Verifiable Credential.
///
/// Credentials are recorded when a watch request first names them. The
/// `seq` field preserves creation order so reconciliation batches are
/// deterministic across repeated scans.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CredentialRecord {
    /// Stable public identifier assigned by Dhiway (unique key).
    pub public_id: String,
    /// Secondary identifier supplied by Dhiway, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Monotonic creation sequence number within the registry.
    pub seq: u64,
    /// When this credential was first recorded.
    pub created_at: DateTime<Utc>,
}

/// A watch registration record, one per tracked credential.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WatcherRecord {
    /// Public ID of the watched credential (unique key).
    pub credential_public_id: String,
    /// Secondary identifier supplied by Dhiway, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_identifier: Option<String>,
    /// Current registration status.
    pub status: WatchStatus,
    /// URL Dhiway is told to notify on credential updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    /// URL this service relays derived notifications to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward_url: Option<String>,
    /// When the last callback for this credential was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<DateTime<Utc>>,
    /// When this record was created.
    pub created_at: DateTime<Utc>,
    /// When this record was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl WatcherRecord {
    /// Create a fresh unwatched record for a credential.
    pub fn new(credential_public_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            credential_public_id: credential_public_id.into(),
            credential_identifier: None,
            status: WatchStatus::Unwatched,
            callback_url: None,
            forward_url: None,
            last_event_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a registration for this record is settled or in flight,
    /// i.e. the record should be excluded from reconciliation.
    pub fn is_covered(&self) -> bool {
        matches!(self.status, WatchStatus::Active | WatchStatus::Pending)
    }
}

/// Watcher counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub unwatched: u64,
    pub pending: u64,
    pub active: u64,
    pub failed: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.unwatched + self.pending + self.active + self.failed
    }
}

/// Aggregate registry statistics for the housekeeping endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherStats {
    pub total_watchers: u64,
    pub active_watchers: u64,
    pub inactive_watchers: u64,
    pub total_vcs: u64,
    pub watched_vcs: u64,
    pub unwatched_vcs: u64,
}
