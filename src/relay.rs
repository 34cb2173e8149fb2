// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Watch Callback Relay
//!
//! Processes asynchronous VC update notifications from Dhiway: waits out a
//! short settle window, correlates the payload to a watcher record, stamps
//! `last_event_at`, and forwards a derived notification when the watcher
//! has a forward URL configured.
//!
//! Webhook semantics rule the error handling here: an unmatched payload is
//! recorded for observability but still acknowledged (so Dhiway does not
//! retry indefinitely for unknown credentials), and a forwarding failure is
//! logged but never surfaced to Dhiway, since the inbound call already
//! succeeded from its point of view.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{ForwardedNotification, WatchCallbackPayload};
use crate::storage::{RegistryError, WatcherRecord, WatcherRegistry};

/// Timeout for best-effort forward POSTs.
const FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

/// How a callback was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Matched a watcher; no forward URL configured.
    Matched,
    /// Matched a watcher and the derived notification was posted.
    Forwarded,
    /// Matched a watcher but the forward POST failed (logged only).
    ForwardFailed,
    /// No watcher record matched the payload.
    Unmatched,
}

/// Relay for inbound watch callbacks.
pub struct CallbackRelay {
    registry: Arc<WatcherRegistry>,
    http: Client,
    settle_delay: Duration,
}

impl CallbackRelay {
    /// Create a relay over the given registry.
    ///
    /// `settle_delay` is waited out before each callback is processed, to
    /// accommodate Dhiway's eventual-consistency window between sending the
    /// notification and finishing its own record update. The delay suspends
    /// only the task handling that one callback.
    pub fn new(
        registry: Arc<WatcherRegistry>,
        settle_delay: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(FORWARD_TIMEOUT).build()?;
        Ok(Self {
            registry,
            http,
            settle_delay,
        })
    }

    /// Process one callback payload.
    ///
    /// Returns `Err` only on a registry fault; every match outcome,
    /// including unmatched, is a success from the caller's perspective.
    pub async fn process(
        &self,
        payload: WatchCallbackPayload,
    ) -> Result<CallbackOutcome, RegistryError> {
        let event_id = Uuid::new_v4();

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let record = self.registry.resolve_watcher(
            payload.record_public_id.as_deref(),
            payload.identifier.as_deref(),
        )?;

        let Some(record) = record else {
            let total = self.registry.record_unmatched_event()?;
            warn!(
                %event_id,
                record_public_id = payload.record_public_id.as_deref().unwrap_or("-"),
                identifier = payload.identifier.as_deref().unwrap_or("-"),
                unmatched_total = total,
                "Watch callback matched no watcher record"
            );
            return Ok(CallbackOutcome::Unmatched);
        };

        let record = self
            .registry
            .touch_event(&record.credential_public_id, Utc::now())?;

        info!(
            %event_id,
            vc_public_id = %record.credential_public_id,
            event_type = payload.event_type.as_deref().unwrap_or("-"),
            "Watch callback received"
        );

        let Some(forward_url) = record.forward_url.clone() else {
            return Ok(CallbackOutcome::Matched);
        };

        match self.forward(&forward_url, &record, &payload).await {
            Ok(()) => {
                info!(
                    %event_id,
                    vc_public_id = %record.credential_public_id,
                    forward_url = %forward_url,
                    "Watch callback forwarded"
                );
                Ok(CallbackOutcome::Forwarded)
            }
            Err(message) => {
                warn!(
                    %event_id,
                    vc_public_id = %record.credential_public_id,
                    forward_url = %forward_url,
                    error = %message,
                    "Watch callback forwarding failed"
                );
                Ok(CallbackOutcome::ForwardFailed)
            }
        }
    }

    /// POST the derived notification to the watcher's forward URL.
    async fn forward(
        &self,
        forward_url: &str,
        record: &WatcherRecord,
        payload: &WatchCallbackPayload,
    ) -> Result<(), String> {
        let notification = ForwardedNotification {
            record_public_id: record.credential_public_id.clone(),
            identifier: record
                .credential_identifier
                .clone()
                .or_else(|| payload.identifier.clone()),
            event_type: payload.event_type.clone(),
            message: payload.message.clone(),
            status: payload.status.clone(),
            timestamp: payload.timestamp.clone(),
            watcher_status: record.status,
        };

        let response = self
            .http
            .post(forward_url)
            .json(&notification)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("forward target returned {}", response.status()))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{routing::post, Json, Router};
    use tokio::sync::mpsc;

    fn temp_registry() -> (Arc<WatcherRegistry>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let registry = WatcherRegistry::open(&dir.path().join("test.redb")).unwrap();
        (Arc::new(registry), dir)
    }

    fn relay(registry: &Arc<WatcherRegistry>) -> CallbackRelay {
        CallbackRelay::new(Arc::clone(registry), Duration::ZERO).unwrap()
    }

    fn payload_for(public_id: &str) -> WatchCallbackPayload {
        WatchCallbackPayload {
            record_public_id: Some(public_id.to_string()),
            event_type: Some("vc_updated".to_string()),
            status: Some("updated".to_string()),
            ..Default::default()
        }
    }

    /// Spawn a capture server; forwards received JSON bodies to the channel.
    async fn capture_server() -> (String, mpsc::UnboundedReceiver<serde_json::Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new().route(
            "/hook",
            post(move |Json(body): Json<serde_json::Value>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(body);
                    Json(serde_json::json!({"received": true}))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/hook"), rx)
    }

    #[tokio::test]
    async fn matched_callback_updates_last_event_at() {
        let (registry, _dir) = temp_registry();
        registry.record_credential("vc_1", None).unwrap();
        registry
            .stage_registration("vc_1", None, "http://cb.example/hook", None)
            .unwrap();
        registry.mark_active("vc_1", None).unwrap();

        let outcome = relay(&registry).process(payload_for("vc_1")).await.unwrap();
        assert_eq!(outcome, CallbackOutcome::Matched);

        let record = registry.watcher("vc_1").unwrap().unwrap();
        assert!(record.last_event_at.is_some());
    }

    #[tokio::test]
    async fn matched_by_identifier_when_public_id_absent() {
        let (registry, _dir) = temp_registry();
        registry.record_credential("vc_1", None).unwrap();
        registry
            .stage_registration("vc_1", Some("ident_1"), "http://cb.example/hook", None)
            .unwrap();

        let payload = WatchCallbackPayload {
            identifier: Some("ident_1".to_string()),
            ..Default::default()
        };
        let outcome = relay(&registry).process(payload).await.unwrap();
        assert_eq!(outcome, CallbackOutcome::Matched);
    }

    #[tokio::test]
    async fn unmatched_callback_is_acknowledged_without_creating_a_record() {
        let (registry, _dir) = temp_registry();

        let outcome = relay(&registry)
            .process(payload_for("unknown"))
            .await
            .unwrap();
        assert_eq!(outcome, CallbackOutcome::Unmatched);

        assert!(registry.watcher("unknown").unwrap().is_none());
        assert_eq!(registry.unmatched_events().unwrap(), 1);
    }

    #[tokio::test]
    async fn forwarding_posts_derived_notification_exactly_once() {
        let (registry, _dir) = temp_registry();
        let (forward_url, mut received) = capture_server().await;

        registry.record_credential("vc_1", None).unwrap();
        registry
            .stage_registration(
                "vc_1",
                Some("ident_1"),
                "http://cb.example/hook",
                Some(&forward_url),
            )
            .unwrap();
        registry.mark_active("vc_1", None).unwrap();

        let outcome = relay(&registry).process(payload_for("vc_1")).await.unwrap();
        assert_eq!(outcome, CallbackOutcome::Forwarded);

        let body = received.recv().await.unwrap();
        assert_eq!(body["recordPublicId"], "vc_1");
        assert_eq!(body["identifier"], "ident_1");
        assert_eq!(body["type"], "vc_updated");
        assert_eq!(body["status"], "updated");
        assert_eq!(body["watcherStatus"], "active");

        // Exactly one POST
        assert!(received.try_recv().is_err());
    }

    #[tokio::test]
    async fn forward_failure_is_swallowed() {
        let (registry, _dir) = temp_registry();
        registry.record_credential("vc_1", None).unwrap();
        registry
            .stage_registration(
                "vc_1",
                None,
                "http://cb.example/hook",
                // Nothing listens on port 9; the POST fails fast.
                Some("http://127.0.0.1:9/hook"),
            )
            .unwrap();
        registry.mark_active("vc_1", None).unwrap();

        let outcome = relay(&registry).process(payload_for("vc_1")).await.unwrap();
        assert_eq!(outcome, CallbackOutcome::ForwardFailed);

        // The event itself is still recorded
        let record = registry.watcher("vc_1").unwrap().unwrap();
        assert!(record.last_event_at.is_some());
    }
}
