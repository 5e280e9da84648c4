//! Documentation of the policy acknowledgment service of the security training portal.
//!
//!
//!
//! # General Infrastructure
//! - Employees reach the portal front end, which proxies API calls here
//! - The proxy authenticates the session and forwards `X-User-Id` / `X-User-Role`
//! - This service only tracks policy views/downloads and reports on them
//! - Users, policies, training modules and quizzes are managed elsewhere; this service
//!   only needs to know which policy ids exist
//!
//!
//!
//! # Endpoints
//!
//! | method | path                                  | who              |
//! |--------|---------------------------------------|------------------|
//! | GET    | `/health`                             | anyone           |
//! | POST   | `/policies/{policy_id}/view`          | any caller       |
//! | POST   | `/policies/{policy_id}/download`      | any caller       |
//! | GET    | `/policies/{policy_id}/acknowledgment`| any caller, own record |
//! | GET    | `/policies/{policy_id}/stats`         | admin            |
//! | GET    | `/policies/{policy_id}/events`        | admin, SSE       |
//! | GET    | `/users/{user_id}/summary`            | self or admin    |
//!
//! Admin views and downloads return an all-zero outcome and are not recorded, so
//! authoring a policy does not inflate its compliance numbers.
//!
//!
//!
//! # Notes
//!
//! ## Tracking never gates access
//! The front end fires the view/download call and shows the document regardless of the
//! response. A 503 here means "try again later", never "you may not read this".
//!
//! ## Redis
//! Same reasoning as any small-record workload: O(1) lookups per (policy, user), atomic
//! per-key writes, tiny dataset. Without `REDIS_URL` the service falls back to an
//! in-memory store, which is only suitable for local runs.
//!
//!
//!
//! # Configuration
//!
//! | variable            | default | meaning |
//! |---------------------|---------|---------|
//! | `RUST_PORT`         | 1111    | listen port |
//! | `REDIS_URL`         | unset   | Redis connection, also read from `/run/secrets/REDIS_URL` |
//! | `CORS_MAX_AGE_SECS` | 3600    | preflight cache |
//! | `EVENT_BUFFER`      | 64      | per-policy update backlog before subscribers lag |
//! | `SEED_POLICIES`     | empty   | comma separated policy ids registered at startup |
//! | `RUST_LOG`          | unset   | `tracing` filter, e.g. `server=debug,compliance=debug` |
//!
//!
//!
//! # Setup
//!
//! Run locally against the in-memory store.
//! ```sh
//! SEED_POLICIES=acceptable-use,passwords RUST_LOG=info cargo run -p portal
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod caller;
pub mod config;
pub mod error;
pub mod notify;
pub mod routes;
pub mod state;
pub mod tracker;
pub mod utils;

use config::Config;
use routes::{
    download_handler, events_handler, health_handler, policy_stats_handler, record_handler,
    user_summary_handler, view_handler,
};
use state::AppState;

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = AppState::new(config).await?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    let app = router(state);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(state.config.cors_max_age_secs));

    Router::new()
        .route("/health", get(health_handler))
        .route("/policies/{policy_id}/view", post(view_handler))
        .route("/policies/{policy_id}/download", post(download_handler))
        .route("/policies/{policy_id}/acknowledgment", get(record_handler))
        .route("/policies/{policy_id}/stats", get(policy_stats_handler))
        .route("/policies/{policy_id}/events", get(events_handler))
        .route("/users/{user_id}/summary", get(user_summary_handler))
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
