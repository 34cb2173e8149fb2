// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Housekeeping endpoints: watcher statistics and on-demand reconciliation.

use axum::{extract::State, Json};

use crate::{
    config::DEFAULT_RECONCILE_CHUNK_SIZE,
    error::ApiError,
    models::{AddWatchersRequest, AddWatchersResponse, WatcherStatsResponse},
    reconcile::ReconcileError,
    state::AppState,
};

/// Watcher and credential statistics.
#[utoipa::path(
    get,
    path = "/housekeeping/stats",
    tag = "Housekeeping",
    responses(
        (status = 200, description = "Statistics retrieved successfully", body = WatcherStatsResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn stats(State(state): State<AppState>) -> Result<Json<WatcherStatsResponse>, ApiError> {
    let stats = state.registry.stats()?;
    Ok(Json(WatcherStatsResponse {
        total_watchers: stats.total_watchers,
        active_watchers: stats.active_watchers,
        inactive_watchers: stats.inactive_watchers,
        total_vcs: stats.total_vcs,
        watched_vcs: stats.watched_vcs,
        unwatched_vcs: stats.unwatched_vcs,
    }))
}

/// Register watchers for credentials that lack one.
///
/// Individual registration failures are counted, not propagated: the run
/// reports its counters even when `errors > 0`.
#[utoipa::path(
    post,
    path = "/housekeeping/add-watchers",
    tag = "Housekeeping",
    request_body = AddWatchersRequest,
    responses(
        (status = 200, description = "Watchers added successfully", body = AddWatchersResponse),
        (status = 400, description = "Invalid chunk size"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn add_watchers(
    State(state): State<AppState>,
    body: Option<Json<AddWatchersRequest>>,
) -> Result<Json<AddWatchersResponse>, ApiError> {
    let requested = body.and_then(|Json(request)| request.chunk_size);

    let chunk_size = match requested {
        None => DEFAULT_RECONCILE_CHUNK_SIZE,
        Some(value) if value > 0 => value as usize,
        Some(_) => {
            return Err(ApiError::bad_request("chunkSize must be a positive integer"));
        }
    };

    let counts = state
        .reconciler
        .reconcile(chunk_size)
        .await
        .map_err(|e| match e {
            ReconcileError::InvalidChunkSize => ApiError::bad_request(e.to_string()),
            ReconcileError::Registry(e) => ApiError::from(e),
        })?;

    Ok(Json(AddWatchersResponse {
        success: true,
        message: "Watchers added successfully".to_string(),
        data: counts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::test_state;

    #[tokio::test]
    async fn stats_start_at_zero() {
        let (state, _dir) = test_state();
        let Json(stats) = stats(State(state)).await.unwrap();
        assert_eq!(stats.total_watchers, 0);
        assert_eq!(stats.total_vcs, 0);
        assert_eq!(
            stats.active_watchers + stats.inactive_watchers,
            stats.total_watchers
        );
    }

    #[tokio::test]
    async fn add_watchers_rejects_non_positive_chunk() {
        let (state, _dir) = test_state();

        for bad in [0, -5] {
            let err = add_watchers(
                State(state.clone()),
                Some(Json(AddWatchersRequest {
                    chunk_size: Some(bad),
                })),
            )
            .await
            .unwrap_err();
            assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn add_watchers_with_no_candidates_reports_zero() {
        let (state, _dir) = test_state();

        let Json(response) = add_watchers(State(state), None).await.unwrap();
        assert!(response.success);
        assert_eq!(response.data.total_processed, 0);
        assert_eq!(response.data.watchers_added, 0);
        assert_eq!(response.data.errors, 0);
    }

    #[tokio::test]
    async fn add_watchers_counts_registration_failures() {
        // The test state's Dhiway endpoint is unroutable, so every
        // registration attempt fails and is counted.
        let (state, _dir) = test_state();
        state.registry.record_credential("vc_1", None).unwrap();
        state.registry.record_credential("vc_2", None).unwrap();

        let Json(response) = add_watchers(
            State(state.clone()),
            Some(Json(AddWatchersRequest {
                chunk_size: Some(10),
            })),
        )
        .await
        .unwrap();

        assert!(response.success);
        assert_eq!(response.data.total_processed, 2);
        assert_eq!(response.data.watchers_added, 0);
        assert_eq!(response.data.errors, 2);

        let stats = state.registry.stats().unwrap();
        assert_eq!(stats.total_watchers, 2);
        assert_eq!(stats.active_watchers, 0);
    }
}
