// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        AddWatchersRequest, AddWatchersResponse, ForwardedNotification, ReconcileCounts,
        WatchCallbackPayload, WatchResponse, WatchVcRequest, WatcherStatsResponse, WatcherSummary,
    },
    state::AppState,
    storage::WatchStatus,
};

pub mod health;
pub mod housekeeping;
pub mod watch;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/housekeeping/stats", get(housekeeping::stats))
        .route(
            "/housekeeping/add-watchers",
            post(housekeeping::add_watchers),
        )
        .route("/api/wallet/vcs/watch", post(watch::watch_vc))
        .route(
            "/api/wallet/vcs/watch/callback",
            post(watch::watch_callback),
        )
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::root,
        health::health,
        health::liveness,
        housekeeping::stats,
        housekeeping::add_watchers,
        watch::watch_vc,
        watch::watch_callback
    ),
    components(
        schemas(
            WatchVcRequest,
            WatcherSummary,
            WatchCallbackPayload,
            ForwardedNotification,
            AddWatchersRequest,
            AddWatchersResponse,
            ReconcileCounts,
            WatcherStatsResponse,
            WatchResponse,
            WatchStatus,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Service health probes"),
        (name = "Housekeeping", description = "System maintenance and monitoring"),
        (name = "Wallet", description = "VC watch registration and callbacks")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::test_state;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn json_post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let (state, _dir) = test_state();
        let app = router(state);
        // Ensure the router can be converted into a service without panicking.
        let _ = app.into_make_service();
    }

    #[tokio::test]
    async fn root_route_responds() {
        let (state, _dir) = test_state();
        let response = router(state)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn stats_route_responds() {
        let (state, _dir) = test_state();
        let response = router(state)
            .oneshot(
                Request::builder()
                    .uri("/housekeeping/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_callback_body_is_a_client_error() {
        let (state, _dir) = test_state();
        let app = router(state);

        let broken = app
            .clone()
            .oneshot(json_post("/api/wallet/vcs/watch/callback", "{not json"))
            .await
            .unwrap();
        assert!(broken.status().is_client_error());

        let not_an_object = app
            .oneshot(json_post("/api/wallet/vcs/watch/callback", "[1,2,3]"))
            .await
            .unwrap();
        assert!(not_an_object.status().is_client_error());
    }

    #[tokio::test]
    async fn well_formed_callback_is_acknowledged() {
        let (state, _dir) = test_state();
        let response = router(state)
            .oneshot(json_post("/api/wallet/vcs/watch/callback", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn watch_route_requires_authentication() {
        let (state, _dir) = test_state();
        let response = router(state)
            .oneshot(json_post(
                "/api/wallet/vcs/watch",
                r#"{"vcPublicId":"vc_1"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
