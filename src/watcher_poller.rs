// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Watcher Reconciliation Poller
//!
//! Background task that periodically runs the watcher reconciliation
//! engine, registering Dhiway watchers for credentials that lack one
//! without operator intervention.
//!
//! ## Strategy
//!
//! Every `poll_interval` (default 300 s) the poller invokes
//! `try_reconcile` with the default chunk size. If the previous run is
//! still executing when the timer fires, the tick is skipped (never
//! queued) so overlapping timer firings cannot storm the Dhiway API with
//! concurrent registration batches.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{DEFAULT_RECONCILE_CHUNK_SIZE, DEFAULT_RECONCILE_INTERVAL_SECS};
use crate::providers::WatchRegistrar;
use crate::reconcile::Reconciler;

/// Background reconciliation poller.
pub struct WatcherPoller<C> {
    reconciler: Arc<Reconciler<C>>,
    poll_interval: Duration,
    chunk_size: usize,
}

impl<C: WatchRegistrar + 'static> WatcherPoller<C> {
    /// Create a poller with the default interval and chunk size.
    pub fn new(reconciler: Arc<Reconciler<C>>) -> Self {
        Self {
            reconciler,
            poll_interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
            chunk_size: DEFAULT_RECONCILE_CHUNK_SIZE,
        }
    }

    /// Override the sweep interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the per-run chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Run the poller loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(poller.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            chunk_size = self.chunk_size,
            "Watcher reconciliation poller starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Watcher reconciliation poller shutting down");
                return;
            }

            self.poll_step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Watcher reconciliation poller shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one sweep: reconcile unless a run is already in flight.
    async fn poll_step(&self) {
        match self.reconciler.try_reconcile(self.chunk_size).await {
            None => {
                info!("Watcher poller: previous reconciliation still running, skipping tick");
            }
            Some(Ok(counts)) => {
                if counts.total_processed > 0 {
                    info!(
                        total_processed = counts.total_processed,
                        watchers_added = counts.watchers_added,
                        errors = counts.errors,
                        "Watcher poller: reconciliation sweep complete"
                    );
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, "Watcher poller: reconciliation sweep failed");
            }
        }
    }
}
