// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! UBI Wallet Server - VC Watcher Reconciliation & Callback Relay
//!
//! This crate provides the wallet backend that tracks watch registrations
//! for Verifiable Credentials held by the Dhiway wallet service,
//! reconciles credentials lacking a watcher in bounded batches, and relays
//! asynchronous update callbacks to configured forward URLs.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Bearer JWT authentication
//! - `storage` - Embedded watcher registry (redb)
//! - `providers` - Dhiway credential service client
//! - `reconcile` - Batch watcher reconciliation engine
//! - `relay` - Inbound watch callback relay
//! - `watcher_poller` - Scheduled reconciliation trigger

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod providers;
pub mod reconcile;
pub mod relay;
pub mod state;
pub mod storage;
pub mod watcher_poller;
