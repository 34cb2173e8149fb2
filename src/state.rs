// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::providers::DhiwayClient;
use crate::reconcile::Reconciler;
use crate::relay::CallbackRelay;
use crate::storage::WatcherRegistry;

/// Authentication configuration carried on the application state.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// HS256 verification secret. Unset enables development-mode decode
    /// (structure and expiry validation only).
    pub secret: Option<String>,
    /// Expected JWT issuer claim, when verification is enabled.
    pub issuer: Option<String>,
}

impl AuthConfig {
    /// Load from `WALLET_JWT_SECRET` / `WALLET_JWT_ISSUER`.
    pub fn from_env() -> Self {
        Self {
            secret: std::env::var(crate::config::JWT_SECRET_ENV).ok(),
            issuer: std::env::var(crate::config::JWT_ISSUER_ENV).ok(),
        }
    }
}

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Persistent watcher registry.
    pub registry: Arc<WatcherRegistry>,
    /// Dhiway credential service client.
    pub dhiway: Arc<DhiwayClient>,
    /// Batch reconciliation engine.
    pub reconciler: Arc<Reconciler<DhiwayClient>>,
    /// Inbound callback relay.
    pub relay: Arc<CallbackRelay>,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Default callback URL registered with Dhiway watches.
    pub callback_url: String,
}

impl AppState {
    pub fn new(
        registry: Arc<WatcherRegistry>,
        dhiway: Arc<DhiwayClient>,
        reconciler: Arc<Reconciler<DhiwayClient>>,
        relay: Arc<CallbackRelay>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            dhiway,
            reconciler,
            relay,
            auth: AuthConfig::default(),
            callback_url: callback_url.into(),
        }
    }

    pub fn with_auth_config(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }
}
