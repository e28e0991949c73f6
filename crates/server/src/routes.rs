use std::sync::Arc;

use axum::{
    handler::HandlerWithoutStateExt,
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use common::types::Health;
use service::LockBackend;

use crate::errors::{self, ApiError};

pub mod tables;

/// Shared handler state: the lock backend, injected at startup.
#[derive(Clone)]
pub struct ServerState {
    pub locks: Arc<dyn LockBackend>,
}

impl ServerState {
    pub fn new(locks: Arc<dyn LockBackend>) -> Self {
        Self { locks }
    }
}

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

pub async fn not_found() -> ApiError {
    ApiError::not_found()
}

/// Build the application router: lock API, health, static files, and the
/// JSON 404/500 fallbacks.
pub fn build_router(state: ServerState, static_dir: &str, cors: CorsLayer) -> Router {
    let static_files = ServeDir::new(static_dir)
        .call_fallback_on_method_not_allowed(true)
        .not_found_service(not_found.into_service());

    let api = Router::new()
        .route("/api/tables/lock", post(tables::lock_table).fallback(not_found))
        .route("/api/tables/unlock", post(tables::unlock_table).fallback(not_found))
        .route("/api/tables/:tableId/status", get(tables::table_status).fallback(not_found));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .fallback_service(static_files)
        .with_state(state)
        .layer(CatchPanicLayer::custom(errors::handle_panic))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                .on_request(
                    DefaultOnRequest::new()
                        .level(Level::INFO),
                )
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                // 5xx
                .on_failure(
                    DefaultOnFailure::new()
                        .level(Level::ERROR),
                )
        )
}
