// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{env, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ubi_wallet_server::{
    api::router,
    config::{
        CALLBACK_BASE_URL_ENV, DATA_DIR_ENV, DEFAULT_CALLBACK_BASE_URL, DEFAULT_DATA_DIR,
        DEFAULT_RECONCILE_CHUNK_SIZE, DEFAULT_RECONCILE_INTERVAL_SECS, DEFAULT_SETTLE_DELAY_SECS,
        RECONCILE_CHUNK_ENV, RECONCILE_INTERVAL_ENV, SETTLE_DELAY_ENV, WATCHER_DB_FILE,
        WATCH_CALLBACK_PATH,
    },
    providers::DhiwayClient,
    reconcile::Reconciler,
    relay::CallbackRelay,
    state::{AppState, AuthConfig},
    storage::WatcherRegistry,
    watcher_poller::WatcherPoller,
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let json = env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[tokio::main]
async fn main() {
    init_tracing();

    // Open the watcher registry (durable, embedded)
    let data_dir = env::var(DATA_DIR_ENV).unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string());
    let db_path = PathBuf::from(&data_dir).join(WATCHER_DB_FILE);
    let registry = Arc::new(
        WatcherRegistry::open(&db_path).expect("Failed to open watcher registry database"),
    );

    // Dhiway client is mandatory - this service is a pass-through without it
    let dhiway = Arc::new(DhiwayClient::from_env().expect(
        "Dhiway configuration missing (set DHIWAY_API_BASE_URL and DHIWAY_API_TOKEN)",
    ));

    // Default callback URL registered with Dhiway watches
    let callback_base =
        env::var(CALLBACK_BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_CALLBACK_BASE_URL.to_string());
    let callback_url = format!(
        "{}{WATCH_CALLBACK_PATH}",
        callback_base.trim_end_matches('/')
    );

    let settle_delay =
        Duration::from_secs(env_u64(SETTLE_DELAY_ENV, DEFAULT_SETTLE_DELAY_SECS));
    let relay = Arc::new(
        CallbackRelay::new(Arc::clone(&registry), settle_delay)
            .expect("Failed to build callback relay HTTP client"),
    );

    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&registry),
        Arc::clone(&dhiway),
        callback_url.clone(),
    ));

    let state = AppState::new(
        Arc::clone(&registry),
        dhiway,
        Arc::clone(&reconciler),
        relay,
        callback_url,
    )
    .with_auth_config(AuthConfig::from_env());
    let app = router(state);

    // Background reconciliation poller
    let shutdown = CancellationToken::new();
    let poller = WatcherPoller::new(reconciler)
        .with_interval(Duration::from_secs(env_u64(
            RECONCILE_INTERVAL_ENV,
            DEFAULT_RECONCILE_INTERVAL_SECS,
        )))
        .with_chunk_size(env_u64(RECONCILE_CHUNK_ENV, DEFAULT_RECONCILE_CHUNK_SIZE as u64) as usize);
    tokio::spawn(poller.run(shutdown.clone()));

    // Parse bind address
    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "3018".to_string())
        .parse()
        .unwrap_or(3018);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .expect("Failed to parse bind address");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server address");
    info!(%addr, "UBI wallet server listening (docs at /docs)");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            server_shutdown.cancel();
        })
        .await
        .expect("HTTP server failed");
}
