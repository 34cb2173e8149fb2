// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Watcher Reconciliation Engine
//!
//! Finds credentials without an active watcher and registers watchers for
//! them in bounded batches with partial-failure accounting: one
//! credential's failure never aborts the batch, and every attempted
//! candidate is counted as either a success or an error.
//!
//! Registration is best-effort infrastructure, not a transactional
//! requirement of credential issuance. FAILED records are not retried
//! within a run; they become eligible again on the next pass because
//! `find_unwatched` only excludes ACTIVE and PENDING records.
//!
//! Runs are serialized by a run gate. The scheduled trigger uses
//! [`Reconciler::try_reconcile`], which skips (never queues) when a
//! previous run is still executing.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::RECONCILE_WORKER_CAP;
use crate::models::ReconcileCounts;
use crate::providers::{RegisterWatchRequest, WatchRegistrar};
use crate::storage::{RegistryError, WatcherRegistry};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("chunkSize must be a positive integer")]
    InvalidChunkSize,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Outcome for a single reconciliation candidate.
enum CandidateOutcome {
    /// Watch registered and confirmed.
    Added,
    /// Registration attempted and failed.
    Failed,
    /// Candidate was already covered by the time its lock was acquired;
    /// not counted as processed.
    Skipped,
}

/// Batch reconciliation engine over the watcher registry.
pub struct Reconciler<C> {
    registry: Arc<WatcherRegistry>,
    registrar: Arc<C>,
    callback_url: String,
    worker_cap: usize,
    run_gate: tokio::sync::Mutex<()>,
}

impl<C: WatchRegistrar + 'static> Reconciler<C> {
    /// Create an engine registering watchers via `registrar`, pointing
    /// Dhiway callbacks at `callback_url`.
    pub fn new(
        registry: Arc<WatcherRegistry>,
        registrar: Arc<C>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            registrar,
            callback_url: callback_url.into(),
            worker_cap: RECONCILE_WORKER_CAP,
            run_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Run one reconciliation batch of up to `chunk_size` candidates.
    ///
    /// Waits for any in-flight run to finish first, so operator-triggered
    /// runs serialize instead of storming the remote service.
    pub async fn reconcile(&self, chunk_size: usize) -> Result<ReconcileCounts, ReconcileError> {
        if chunk_size == 0 {
            return Err(ReconcileError::InvalidChunkSize);
        }
        let _run = self.run_gate.lock().await;
        self.run_chunk(chunk_size).await
    }

    /// Run one batch unless a run is already in flight, in which case
    /// `None` is returned and nothing is queued.
    pub async fn try_reconcile(
        &self,
        chunk_size: usize,
    ) -> Option<Result<ReconcileCounts, ReconcileError>> {
        if chunk_size == 0 {
            return Some(Err(ReconcileError::InvalidChunkSize));
        }
        let Ok(_run) = self.run_gate.try_lock() else {
            return None;
        };
        Some(self.run_chunk(chunk_size).await)
    }

    async fn run_chunk(&self, chunk_size: usize) -> Result<ReconcileCounts, ReconcileError> {
        let candidates = self.registry.find_unwatched(chunk_size)?;
        if candidates.is_empty() {
            return Ok(ReconcileCounts::default());
        }

        info!(
            candidates = candidates.len(),
            chunk_size, "Reconciliation: registering missing watchers"
        );

        let semaphore = Arc::new(Semaphore::new(self.worker_cap));
        let mut workers = JoinSet::new();
        for public_id in candidates {
            let registry = Arc::clone(&self.registry);
            let registrar = Arc::clone(&self.registrar);
            let callback_url = self.callback_url.clone();
            let semaphore = Arc::clone(&semaphore);

            workers.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return CandidateOutcome::Skipped,
                };
                register_candidate(&registry, &*registrar, &callback_url, &public_id).await
            });
        }

        let mut counts = ReconcileCounts::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(CandidateOutcome::Added) => {
                    counts.total_processed += 1;
                    counts.watchers_added += 1;
                }
                Ok(CandidateOutcome::Failed) => {
                    counts.total_processed += 1;
                    counts.errors += 1;
                }
                Ok(CandidateOutcome::Skipped) => {}
                Err(e) => {
                    warn!(error = %e, "Reconciliation: worker task failed");
                    counts.total_processed += 1;
                    counts.errors += 1;
                }
            }
        }

        info!(
            total_processed = counts.total_processed,
            watchers_added = counts.watchers_added,
            errors = counts.errors,
            "Reconciliation: run complete"
        );
        Ok(counts)
    }
}

/// Register a watcher for one credential under its per-credential lock.
async fn register_candidate<C: WatchRegistrar>(
    registry: &WatcherRegistry,
    registrar: &C,
    callback_url: &str,
    public_id: &str,
) -> CandidateOutcome {
    let _guard = registry.credential_lock(public_id).await;

    // Re-check under the lock: the watch endpoint may have registered this
    // credential while the candidate list was being processed. A previously
    // configured callback URL wins over the default.
    let callback_url = match registry.watcher(public_id) {
        Ok(Some(record)) if record.is_covered() => return CandidateOutcome::Skipped,
        Ok(Some(record)) => record
            .callback_url
            .unwrap_or_else(|| callback_url.to_string()),
        Ok(None) => callback_url.to_string(),
        Err(e) => {
            warn!(vc_public_id = %public_id, error = %e, "Reconciliation: watcher lookup failed");
            return CandidateOutcome::Failed;
        }
    };
    let callback_url = callback_url.as_str();

    if let Err(e) = registry.stage_registration(public_id, None, callback_url, None) {
        warn!(vc_public_id = %public_id, error = %e, "Reconciliation: failed to stage watcher");
        return CandidateOutcome::Failed;
    }

    let request = RegisterWatchRequest {
        vc_public_id: public_id,
        callback_url,
        email: None,
    };
    match registrar.register_watch(request).await {
        Ok(ack) => match registry.mark_active(public_id, ack.identifier.as_deref()) {
            Ok(_) => {
                info!(vc_public_id = %public_id, "Reconciliation: watcher registered");
                CandidateOutcome::Added
            }
            Err(e) => {
                warn!(vc_public_id = %public_id, error = %e, "Reconciliation: failed to persist active watcher");
                CandidateOutcome::Failed
            }
        },
        Err(e) => {
            warn!(vc_public_id = %public_id, error = %e, "Reconciliation: watch registration failed");
            if let Err(persist) = registry.mark_failed(public_id) {
                warn!(vc_public_id = %public_id, error = %persist, "Reconciliation: failed to persist failed watcher");
            }
            CandidateOutcome::Failed
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use tokio::sync::Notify;

    use crate::providers::{DhiwayError, WatchAck};
    use crate::storage::WatchStatus;

    /// Registrar succeeding for every credential except the listed ones.
    struct StubRegistrar {
        fail_ids: HashSet<String>,
    }

    impl StubRegistrar {
        fn succeeding() -> Self {
            Self {
                fail_ids: HashSet::new(),
            }
        }

        fn failing_for(ids: &[&str]) -> Self {
            Self {
                fail_ids: ids.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    impl WatchRegistrar for StubRegistrar {
        async fn register_watch(
            &self,
            request: RegisterWatchRequest<'_>,
        ) -> Result<WatchAck, DhiwayError> {
            if self.fail_ids.contains(request.vc_public_id) {
                Err(DhiwayError::Rejected("stubbed rejection".into()))
            } else {
                Ok(WatchAck {
                    identifier: Some(format!("ident_{}", request.vc_public_id)),
                    message: None,
                })
            }
        }
    }

    /// Registrar that signals when a registration starts and blocks until
    /// released, used to hold a run open.
    struct BlockingRegistrar {
        started: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl WatchRegistrar for BlockingRegistrar {
        async fn register_watch(
            &self,
            _request: RegisterWatchRequest<'_>,
        ) -> Result<WatchAck, DhiwayError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(WatchAck::default())
        }
    }

    const CALLBACK: &str = "http://localhost:3018/api/wallet/vcs/watch/callback";

    fn seeded_registry(ids: &[&str]) -> (Arc<WatcherRegistry>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let registry = WatcherRegistry::open(&dir.path().join("test.redb")).unwrap();
        for id in ids {
            registry.record_credential(id, None).unwrap();
        }
        (Arc::new(registry), dir)
    }

    #[tokio::test]
    async fn zero_chunk_size_is_rejected_before_any_work() {
        let (registry, _dir) = seeded_registry(&["vc_a"]);
        let reconciler = Reconciler::new(
            Arc::clone(&registry),
            Arc::new(StubRegistrar::succeeding()),
            CALLBACK,
        );

        let err = reconciler.reconcile(0).await.unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidChunkSize));
        assert!(registry.watcher("vc_a").unwrap().is_none());
    }

    #[tokio::test]
    async fn processes_at_most_chunk_size_candidates() {
        let (registry, _dir) = seeded_registry(&["vc_a", "vc_b", "vc_c", "vc_d", "vc_e"]);
        let reconciler = Reconciler::new(
            Arc::clone(&registry),
            Arc::new(StubRegistrar::succeeding()),
            CALLBACK,
        );

        let counts = reconciler.reconcile(3).await.unwrap();
        assert_eq!(counts.total_processed, 3);
        assert_eq!(counts.watchers_added, 3);
        assert_eq!(counts.errors, 0);
    }

    #[tokio::test]
    async fn partial_failure_accounting() {
        let (registry, _dir) = seeded_registry(&["vc_a", "vc_b", "vc_c", "vc_d", "vc_e"]);
        let reconciler = Reconciler::new(
            Arc::clone(&registry),
            Arc::new(StubRegistrar::failing_for(&["vc_a"])),
            CALLBACK,
        );

        // Creation order makes the chunk deterministic: vc_a, vc_b
        let counts = reconciler.reconcile(2).await.unwrap();
        assert_eq!(counts.total_processed, 2);
        assert_eq!(counts.watchers_added, 1);
        assert_eq!(counts.errors, 1);

        let failed = registry.watcher("vc_a").unwrap().unwrap();
        assert_eq!(failed.status, WatchStatus::Failed);
        let active = registry.watcher("vc_b").unwrap().unwrap();
        assert_eq!(active.status, WatchStatus::Active);

        // Untouched candidates have no watcher record at all
        for id in ["vc_c", "vc_d", "vc_e"] {
            assert!(registry.watcher(id).unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn second_run_finds_nothing_after_full_success() {
        let (registry, _dir) = seeded_registry(&["vc_a", "vc_b", "vc_c"]);
        let reconciler = Reconciler::new(
            Arc::clone(&registry),
            Arc::new(StubRegistrar::succeeding()),
            CALLBACK,
        );

        let first = reconciler.reconcile(10).await.unwrap();
        assert_eq!(first.watchers_added, 3);

        let second = reconciler.reconcile(10).await.unwrap();
        assert_eq!(second.total_processed, 0);
        assert_eq!(second.watchers_added, 0);
        assert_eq!(second.errors, 0);
    }

    #[tokio::test]
    async fn failed_records_are_retried_on_the_next_pass() {
        let (registry, _dir) = seeded_registry(&["vc_a", "vc_b"]);

        let failing = Reconciler::new(
            Arc::clone(&registry),
            Arc::new(StubRegistrar::failing_for(&["vc_a", "vc_b"])),
            CALLBACK,
        );
        let counts = failing.reconcile(10).await.unwrap();
        assert_eq!(counts.errors, 2);

        let recovering = Reconciler::new(
            Arc::clone(&registry),
            Arc::new(StubRegistrar::succeeding()),
            CALLBACK,
        );
        let counts = recovering.reconcile(10).await.unwrap();
        assert_eq!(counts.total_processed, 2);
        assert_eq!(counts.watchers_added, 2);
    }

    #[tokio::test]
    async fn overlapping_run_is_skipped_not_queued() {
        let (registry, _dir) = seeded_registry(&["vc_a"]);
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());

        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&registry),
            Arc::new(BlockingRegistrar {
                started: Arc::clone(&started),
                release: Arc::clone(&release),
            }),
            CALLBACK,
        ));

        let running = {
            let reconciler = Arc::clone(&reconciler);
            tokio::spawn(async move { reconciler.reconcile(10).await })
        };

        // Wait until the first run is inside the remote call, then verify
        // the second invocation skips instead of queueing.
        started.notified().await;
        assert!(reconciler.try_reconcile(10).await.is_none());

        release.notify_one();
        let counts = running.await.unwrap().unwrap();
        assert_eq!(counts.total_processed, 1);

        // Gate released: the next invocation runs (and finds nothing).
        let after = reconciler.try_reconcile(10).await;
        assert!(matches!(after, Some(Ok(c)) if c.total_processed == 0));
    }
}
