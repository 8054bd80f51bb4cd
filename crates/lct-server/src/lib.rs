//! LCT pairing host library logic.

pub mod api;
pub mod api_components;
pub mod api_observe;
pub mod api_pairing;
pub mod api_queue;
pub mod background;
pub mod config;
pub mod orchestrator;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use config::Config;
use lct_db::DbPool;
use lct_pairing::PairingManager;
use lct_queue::OfflineQueue;
use lct_registry::SqliteRegistry;
use lct_types::Clock;
use orchestrator::{LedgerOperationHandlers, PresenceWindow, SessionRequestExecutor};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    pub pairing: Arc<PairingManager>,
    pub queue: Arc<OfflineQueue>,
    pub presence: PresenceWindow,
}

/// Wires the registry, pairing manager and queue over one pool.
pub fn build_state(pool: DbPool, clock: Arc<dyn Clock>, config: &Config) -> AppState {
    let collaborators = Arc::new(SqliteRegistry);
    let presence = PresenceWindow::new(clock.clone(), config.presence.online_window_secs);

    let pairing = Arc::new(
        PairingManager::new(collaborators.clone(), collaborators.clone(), clock.clone())
            .with_trust_engine(collaborators.clone())
            .with_session_ttl(config.pairing.session_ttl_secs),
    );

    let handlers = Arc::new(LedgerOperationHandlers::new(pairing.clone(), presence.clone()));
    let executor = Arc::new(SessionRequestExecutor::new(pairing.clone(), presence.clone()));
    let queue = Arc::new(
        OfflineQueue::new(collaborators, handlers, clock)
            .with_policy(config.queue.retry_policy())
            .with_health_thresholds(config.queue.health_thresholds())
            .with_request_executor(executor),
    );

    AppState {
        pool,
        pairing,
        queue,
        presence,
    }
}

/// Maximum request body size (64 KiB).
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/components",
            post(api_components::register_component_handler),
        )
        .route(
            "/api/components/{componentId}",
            get(api_components::get_component_handler),
        )
        .route(
            "/api/components/{componentId}/verification",
            post(api_components::set_verification_handler),
        )
        .route(
            "/api/components/{componentId}/grants",
            post(api_components::grant_pairing_handler),
        )
        .route(
            "/api/components/{componentId}/grants/{partnerId}",
            delete(api_components::revoke_grant_handler),
        )
        .route(
            "/api/components/{componentId}/heartbeat",
            post(api_components::heartbeat_handler),
        )
        .route(
            "/api/pairing/initiate",
            post(api_pairing::initiate_pairing_handler),
        )
        .route(
            "/api/pairing/complete",
            post(api_pairing::complete_pairing_handler),
        )
        .route("/api/pairing/auth", get(api_pairing::validate_auth_handler))
        .route("/api/pairing/revoke", post(api_pairing::revoke_pairing_handler))
        .route(
            "/api/pairing/sessions/{sessionId}",
            get(api_pairing::get_pairing_status_handler),
        )
        .route(
            "/api/pairing/active",
            get(api_pairing::list_active_pairings_handler),
        )
        .route(
            "/api/queue/requests",
            post(api_queue::queue_pairing_request_handler),
        )
        .route(
            "/api/queue/requests/{requestId}",
            get(api_queue::get_request_status_handler),
        )
        .route(
            "/api/queue/requests/{requestId}/cancel",
            post(api_queue::cancel_request_handler),
        )
        .route(
            "/api/queue/operations",
            post(api_queue::queue_offline_operation_handler),
        )
        .route(
            "/api/queue/components/{componentId}/requests",
            get(api_queue::get_queued_requests_handler),
        )
        .route(
            "/api/queue/components/{componentId}/process",
            post(api_queue::process_queue_handler),
        )
        .route(
            "/api/queue/components/{componentId}/status",
            get(api_queue::get_queue_status_handler),
        )
        .route(
            "/api/queue/proxies/{proxyId}",
            get(api_queue::list_proxy_queue_handler),
        )
        .route("/api/events", get(api_observe::get_events_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
