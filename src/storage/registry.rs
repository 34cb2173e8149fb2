// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded watcher registry backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `credentials`: public_id → serialized CredentialRecord
//! - `credential_seq`: creation sequence (u64 BE) → public_id
//! - `watchers`: public_id → serialized WatcherRecord
//! - `watcher_identifiers`: Dhiway identifier → public_id
//! - `registry_state`: key → value bytes (sequence counter, event counters)
//!
//! Every mutation commits before the call returns, so a crash mid-batch
//! leaves a consistent partial result and never a phantom ACTIVE watcher.
//!
//! ## Write Serialization
//!
//! Registry writes for a single credential are serialized through
//! [`WatcherRegistry::credential_lock`], a keyed async lock table. Holding
//! the guard across mark-PENDING → remote registration → mark-ACTIVE/FAILED
//! guarantees at most one in-flight registration per credential without a
//! global lock.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tokio::sync::OwnedMutexGuard;

use super::watchers::{CredentialRecord, StatusCounts, WatchStatus, WatcherRecord, WatcherStats};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary credential table: public_id → serialized CredentialRecord (JSON).
const CREDENTIALS: TableDefinition<&str, &[u8]> = TableDefinition::new("credentials");

/// Creation-order index: sequence number (big-endian sort) → public_id.
const CREDENTIAL_SEQ: TableDefinition<u64, &str> = TableDefinition::new("credential_seq");

/// Primary watcher table: public_id → serialized WatcherRecord (JSON).
const WATCHERS: TableDefinition<&str, &[u8]> = TableDefinition::new("watchers");

/// Secondary index: Dhiway-assigned identifier → public_id.
const WATCHER_IDENTIFIERS: TableDefinition<&str, &str> =
    TableDefinition::new("watcher_identifiers");

/// Registry state: key → value bytes (e.g. "next_seq" → u64 big-endian).
const REGISTRY_STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("registry_state");

const NEXT_SEQ_KEY: &str = "next_seq";
const UNMATCHED_EVENTS_KEY: &str = "unmatched_events";

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

// =============================================================================
// WatcherRegistry
// =============================================================================

/// Persistent registry of tracked credentials and their watch registrations.
pub struct WatcherRegistry {
    db: Database,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl WatcherRegistry {
    /// Open (or create) the registry database at the given path.
    pub fn open(path: &Path) -> RegistryResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(CREDENTIALS)?;
            let _ = write_txn.open_table(CREDENTIAL_SEQ)?;
            let _ = write_txn.open_table(WATCHERS)?;
            let _ = write_txn.open_table(WATCHER_IDENTIFIERS)?;
            let _ = write_txn.open_table(REGISTRY_STATE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Acquire the per-credential write lock.
    ///
    /// The guard must be held across the full mark-PENDING → remote call →
    /// mark-ACTIVE/FAILED sequence. Locks for different credentials are
    /// independent.
    pub async fn credential_lock(&self, public_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.locks.lock().expect("credential lock table poisoned");
            table
                .entry(public_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    // =========================================================================
    // Credentials
    // =========================================================================

    /// Record a credential, assigning it the next creation sequence number.
    ///
    /// Idempotent: re-recording the same public_id preserves the original
    /// sequence and `created_at`, and only fills in a previously unknown
    /// identifier.
    pub fn record_credential(
        &self,
        public_id: &str,
        identifier: Option<&str>,
    ) -> RegistryResult<CredentialRecord> {
        let write_txn = self.db.begin_write()?;
        let record = {
            let mut credentials = write_txn.open_table(CREDENTIALS)?;

            let existing: Option<CredentialRecord> = match credentials.get(public_id)? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };

            let record = match existing {
                Some(mut record) => {
                    if record.identifier.is_none() {
                        record.identifier = identifier.map(str::to_string);
                    }
                    record
                }
                None => {
                    let mut state = write_txn.open_table(REGISTRY_STATE)?;
                    let seq = match state.get(NEXT_SEQ_KEY)? {
                        Some(v) => decode_u64(v.value()),
                        None => 0,
                    };
                    state.insert(NEXT_SEQ_KEY, (seq + 1).to_be_bytes().as_slice())?;

                    let mut seq_index = write_txn.open_table(CREDENTIAL_SEQ)?;
                    seq_index.insert(seq, public_id)?;

                    CredentialRecord {
                        public_id: public_id.to_string(),
                        identifier: identifier.map(str::to_string),
                        seq,
                        created_at: Utc::now(),
                    }
                }
            };

            let json = serde_json::to_vec(&record)?;
            credentials.insert(public_id, json.as_slice())?;
            record
        };
        write_txn.commit()?;
        Ok(record)
    }

    /// Look up a credential by public ID.
    pub fn credential(&self, public_id: &str) -> RegistryResult<Option<CredentialRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CREDENTIALS)?;
        match table.get(public_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Credential public IDs lacking an ACTIVE or PENDING watcher, in
    /// creation order, up to `limit`.
    pub fn find_unwatched(&self, limit: usize) -> RegistryResult<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let seq_index = read_txn.open_table(CREDENTIAL_SEQ)?;
        let watchers = read_txn.open_table(WATCHERS)?;

        let mut unwatched = Vec::new();
        for entry in seq_index.iter()? {
            if unwatched.len() >= limit {
                break;
            }
            let entry = entry?;
            let public_id = entry.1.value().to_string();

            let covered = match watchers.get(public_id.as_str())? {
                Some(value) => {
                    let record: WatcherRecord = serde_json::from_slice(value.value())?;
                    record.is_covered()
                }
                None => false,
            };
            if !covered {
                unwatched.push(public_id);
            }
        }
        Ok(unwatched)
    }

    // =========================================================================
    // Watchers
    // =========================================================================

    /// Look up a watcher record by credential public ID.
    pub fn watcher(&self, public_id: &str) -> RegistryResult<Option<WatcherRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WATCHERS)?;
        match table.get(public_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Resolve a watcher from callback correlation fields.
    ///
    /// Prefers the record public ID; falls back to the Dhiway identifier
    /// index.
    pub fn resolve_watcher(
        &self,
        record_public_id: Option<&str>,
        identifier: Option<&str>,
    ) -> RegistryResult<Option<WatcherRecord>> {
        if let Some(public_id) = record_public_id {
            if let Some(record) = self.watcher(public_id)? {
                return Ok(Some(record));
            }
        }

        if let Some(identifier) = identifier {
            let indexed = {
                let read_txn = self.db.begin_read()?;
                let index = read_txn.open_table(WATCHER_IDENTIFIERS)?;
                index.get(identifier)?.map(|v| v.value().to_string())
            };
            if let Some(public_id) = indexed {
                return self.watcher(&public_id);
            }
        }

        Ok(None)
    }

    /// Insert or overwrite a watcher record.
    ///
    /// `created_at` of an existing record is preserved; the identifier
    /// index is maintained.
    pub fn upsert(&self, mut record: WatcherRecord) -> RegistryResult<WatcherRecord> {
        let write_txn = self.db.begin_write()?;
        {
            let mut watchers = write_txn.open_table(WATCHERS)?;

            if let Some(existing) = watchers.get(record.credential_public_id.as_str())? {
                let existing: WatcherRecord = serde_json::from_slice(existing.value())?;
                record.created_at = existing.created_at;
            }
            record.updated_at = Utc::now();

            let json = serde_json::to_vec(&record)?;
            watchers.insert(record.credential_public_id.as_str(), json.as_slice())?;

            if let Some(identifier) = &record.credential_identifier {
                let mut index = write_txn.open_table(WATCHER_IDENTIFIERS)?;
                index.insert(identifier.as_str(), record.credential_public_id.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(record)
    }

    /// Stage a watch registration: upsert the forwarding configuration and
    /// move the record to PENDING.
    pub fn stage_registration(
        &self,
        public_id: &str,
        identifier: Option<&str>,
        callback_url: &str,
        forward_url: Option<&str>,
    ) -> RegistryResult<WatcherRecord> {
        let mut record = self
            .watcher(public_id)?
            .unwrap_or_else(|| WatcherRecord::new(public_id));
        if identifier.is_some() {
            record.credential_identifier = identifier.map(str::to_string);
        }
        record.callback_url = Some(callback_url.to_string());
        if forward_url.is_some() {
            record.forward_url = forward_url.map(str::to_string);
        }
        record.status = WatchStatus::Pending;
        self.upsert(record)
    }

    /// Confirm a registration: PENDING → ACTIVE, storing the identifier
    /// Dhiway returned in its acknowledgement when present.
    pub fn mark_active(
        &self,
        public_id: &str,
        identifier: Option<&str>,
    ) -> RegistryResult<WatcherRecord> {
        let mut record = self
            .watcher(public_id)?
            .ok_or_else(|| RegistryError::NotFound(format!("Watcher {public_id}")))?;
        if identifier.is_some() {
            record.credential_identifier = identifier.map(str::to_string);
        }
        record.status = WatchStatus::Active;
        self.upsert(record)
    }

    /// Record a failed registration attempt. The record is kept for retry
    /// on the next reconciliation pass.
    pub fn mark_failed(&self, public_id: &str) -> RegistryResult<WatcherRecord> {
        let mut record = self
            .watcher(public_id)?
            .ok_or_else(|| RegistryError::NotFound(format!("Watcher {public_id}")))?;
        record.status = WatchStatus::Failed;
        self.upsert(record)
    }

    /// Record a received callback on the matched watcher.
    pub fn touch_event(
        &self,
        public_id: &str,
        at: DateTime<Utc>,
    ) -> RegistryResult<WatcherRecord> {
        let mut record = self
            .watcher(public_id)?
            .ok_or_else(|| RegistryError::NotFound(format!("Watcher {public_id}")))?;
        record.last_event_at = Some(at);
        self.upsert(record)
    }

    // =========================================================================
    // Observability
    // =========================================================================

    /// Count an inbound callback that matched no watcher record.
    pub fn record_unmatched_event(&self) -> RegistryResult<u64> {
        let write_txn = self.db.begin_write()?;
        let total = {
            let mut state = write_txn.open_table(REGISTRY_STATE)?;
            let current = match state.get(UNMATCHED_EVENTS_KEY)? {
                Some(v) => decode_u64(v.value()),
                None => 0,
            };
            let total = current + 1;
            state.insert(UNMATCHED_EVENTS_KEY, total.to_be_bytes().as_slice())?;
            total
        };
        write_txn.commit()?;
        Ok(total)
    }

    /// Total callbacks received that matched no watcher record.
    pub fn unmatched_events(&self) -> RegistryResult<u64> {
        let read_txn = self.db.begin_read()?;
        let state = read_txn.open_table(REGISTRY_STATE)?;
        Ok(match state.get(UNMATCHED_EVENTS_KEY)? {
            Some(v) => decode_u64(v.value()),
            None => 0,
        })
    }

    /// Watcher counts per status.
    pub fn count_by_status(&self) -> RegistryResult<StatusCounts> {
        let read_txn = self.db.begin_read()?;
        let watchers = read_txn.open_table(WATCHERS)?;

        let mut counts = StatusCounts::default();
        for entry in watchers.iter()? {
            let entry = entry?;
            let record: WatcherRecord = serde_json::from_slice(entry.1.value())?;
            match record.status {
                WatchStatus::Unwatched => counts.unwatched += 1,
                WatchStatus::Pending => counts.pending += 1,
                WatchStatus::Active => counts.active += 1,
                WatchStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    /// Aggregate statistics over credentials and watchers.
    pub fn stats(&self) -> RegistryResult<WatcherStats> {
        let counts = self.count_by_status()?;

        let read_txn = self.db.begin_read()?;
        let credentials = read_txn.open_table(CREDENTIALS)?;
        let watchers = read_txn.open_table(WATCHERS)?;

        let mut total_vcs = 0;
        let mut watched_vcs = 0;
        for entry in credentials.iter()? {
            let entry = entry?;
            total_vcs += 1;

            let public_id = entry.0.value();
            if let Some(value) = watchers.get(public_id)? {
                let record: WatcherRecord = serde_json::from_slice(value.value())?;
                if record.status == WatchStatus::Active {
                    watched_vcs += 1;
                }
            }
        }

        Ok(WatcherStats {
            total_watchers: counts.total(),
            active_watchers: counts.active,
            inactive_watchers: counts.total() - counts.active,
            total_vcs,
            watched_vcs,
            unwatched_vcs: total_vcs - watched_vcs,
        })
    }
}

fn decode_u64(bytes: &[u8]) -> u64 {
    if bytes.len() >= 8 {
        u64::from_be_bytes(bytes[..8].try_into().unwrap())
    } else {
        0
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_registry() -> (WatcherRegistry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let registry = WatcherRegistry::open(&dir.path().join("test.redb")).unwrap();
        (registry, dir)
    }

    #[test]
    fn record_credential_is_idempotent() {
        let (registry, _dir) = temp_registry();

        let first = registry.record_credential("vc_1", None).unwrap();
        let second = registry.record_credential("vc_1", Some("ident_1")).unwrap();

        assert_eq!(first.seq, second.seq);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.identifier.as_deref(), Some("ident_1"));

        // A later call never overwrites a known identifier
        let third = registry.record_credential("vc_1", Some("other")).unwrap();
        assert_eq!(third.identifier.as_deref(), Some("ident_1"));
    }

    #[test]
    fn find_unwatched_preserves_creation_order() {
        let (registry, _dir) = temp_registry();
        for id in ["vc_a", "vc_b", "vc_c", "vc_d"] {
            registry.record_credential(id, None).unwrap();
        }

        let unwatched = registry.find_unwatched(10).unwrap();
        assert_eq!(unwatched, vec!["vc_a", "vc_b", "vc_c", "vc_d"]);

        let limited = registry.find_unwatched(2).unwrap();
        assert_eq!(limited, vec!["vc_a", "vc_b"]);
    }

    #[test]
    fn find_unwatched_excludes_active_and_pending_only() {
        let (registry, _dir) = temp_registry();
        for id in ["vc_a", "vc_b", "vc_c", "vc_d"] {
            registry.record_credential(id, None).unwrap();
        }

        registry
            .stage_registration("vc_a", None, "http://cb.example/hook", None)
            .unwrap();
        registry.mark_active("vc_a", None).unwrap();

        registry
            .stage_registration("vc_b", None, "http://cb.example/hook", None)
            .unwrap();

        registry
            .stage_registration("vc_c", None, "http://cb.example/hook", None)
            .unwrap();
        registry.mark_failed("vc_c").unwrap();

        // ACTIVE (a) and PENDING (b) excluded; FAILED (c) retries; d untouched
        let unwatched = registry.find_unwatched(10).unwrap();
        assert_eq!(unwatched, vec!["vc_c", "vc_d"]);
    }

    #[test]
    fn upsert_preserves_created_at() {
        let (registry, _dir) = temp_registry();
        let original = registry.upsert(WatcherRecord::new("vc_1")).unwrap();

        let mut update = WatcherRecord::new("vc_1");
        update.status = WatchStatus::Active;
        let updated = registry.upsert(update).unwrap();

        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(updated.status, WatchStatus::Active);
        assert!(updated.updated_at >= original.updated_at);
    }

    #[test]
    fn resolve_watcher_prefers_public_id_then_identifier() {
        let (registry, _dir) = temp_registry();
        registry
            .stage_registration("vc_1", Some("ident_1"), "http://cb.example/hook", None)
            .unwrap();

        let by_id = registry
            .resolve_watcher(Some("vc_1"), None)
            .unwrap()
            .unwrap();
        assert_eq!(by_id.credential_public_id, "vc_1");

        let by_identifier = registry
            .resolve_watcher(None, Some("ident_1"))
            .unwrap()
            .unwrap();
        assert_eq!(by_identifier.credential_public_id, "vc_1");

        assert!(registry
            .resolve_watcher(Some("missing"), Some("missing"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn mark_active_records_acknowledged_identifier() {
        let (registry, _dir) = temp_registry();
        registry
            .stage_registration("vc_1", None, "http://cb.example/hook", None)
            .unwrap();
        registry.mark_active("vc_1", Some("ident_from_ack")).unwrap();

        let record = registry.watcher("vc_1").unwrap().unwrap();
        assert_eq!(record.status, WatchStatus::Active);
        assert_eq!(record.credential_identifier.as_deref(), Some("ident_from_ack"));

        // The acknowledged identifier is resolvable for future callbacks
        let resolved = registry
            .resolve_watcher(None, Some("ident_from_ack"))
            .unwrap();
        assert!(resolved.is_some());
    }

    #[test]
    fn mark_failed_keeps_record() {
        let (registry, _dir) = temp_registry();
        registry
            .stage_registration("vc_1", None, "http://cb.example/hook", None)
            .unwrap();
        registry.mark_failed("vc_1").unwrap();

        let record = registry.watcher("vc_1").unwrap().unwrap();
        assert_eq!(record.status, WatchStatus::Failed);
    }

    #[test]
    fn touch_event_sets_last_event_at() {
        let (registry, _dir) = temp_registry();
        registry
            .stage_registration("vc_1", None, "http://cb.example/hook", None)
            .unwrap();

        let at = Utc::now();
        registry.touch_event("vc_1", at).unwrap();

        let record = registry.watcher("vc_1").unwrap().unwrap();
        assert_eq!(record.last_event_at, Some(at));
        // Status untouched by event recording
        assert_eq!(record.status, WatchStatus::Pending);
    }

    #[test]
    fn stats_invariants_hold() {
        let (registry, _dir) = temp_registry();
        for id in ["vc_a", "vc_b", "vc_c"] {
            registry.record_credential(id, None).unwrap();
        }
        registry
            .stage_registration("vc_a", None, "http://cb.example/hook", None)
            .unwrap();
        registry.mark_active("vc_a", None).unwrap();
        registry
            .stage_registration("vc_b", None, "http://cb.example/hook", None)
            .unwrap();
        registry.mark_failed("vc_b").unwrap();

        let stats = registry.stats().unwrap();
        assert_eq!(stats.total_watchers, 2);
        assert_eq!(stats.active_watchers, 1);
        assert_eq!(
            stats.active_watchers + stats.inactive_watchers,
            stats.total_watchers
        );
        assert_eq!(stats.total_vcs, 3);
        assert_eq!(stats.watched_vcs, 1);
        assert_eq!(stats.watched_vcs + stats.unwatched_vcs, stats.total_vcs);
    }

    #[test]
    fn unmatched_event_counter_increments() {
        let (registry, _dir) = temp_registry();
        assert_eq!(registry.unmatched_events().unwrap(), 0);
        assert_eq!(registry.record_unmatched_event().unwrap(), 1);
        assert_eq!(registry.record_unmatched_event().unwrap(), 2);
        assert_eq!(registry.unmatched_events().unwrap(), 2);
    }

    #[tokio::test]
    async fn credential_lock_serializes_same_id() {
        let (registry, _dir) = temp_registry();
        let registry = Arc::new(registry);

        let guard = registry.credential_lock("vc_1").await;

        // Same id: second acquisition must wait
        let contended = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            registry.credential_lock("vc_1"),
        )
        .await;
        assert!(contended.is_err());

        // Different id: independent lock
        let other = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            registry.credential_lock("vc_2"),
        )
        .await;
        assert!(other.is_ok());

        drop(guard);
        let released = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            registry.credential_lock("vc_1"),
        )
        .await;
        assert!(released.is_ok());
    }
}
