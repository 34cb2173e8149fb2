// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound service integrations.

pub mod dhiway;

pub use dhiway::{DhiwayClient, DhiwayError, RegisterWatchRequest, WatchAck, WatchRegistrar};
