// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Watcher Registry Storage
//!
//! Persistent storage for tracked credentials and their watch
//! registrations, backed by an embedded redb database.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   watchers.redb    # credentials, watchers, indexes, registry state
//! ```
//!
//! The registry is the single shared mutable resource of the service. It is
//! written by the reconciliation engine and the watch endpoint (status and
//! forwarding configuration) and by the callback relay (`last_event_at`);
//! the two writer groups touch disjoint field groups, and writes for a
//! single credential are serialized via the registry's keyed lock table.

pub mod registry;
pub mod watchers;

pub use registry::{RegistryError, RegistryResult, WatcherRegistry};
pub use watchers::{CredentialRecord, StatusCounts, WatchStatus, WatcherRecord, WatcherStats};
