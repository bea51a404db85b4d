//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::handlers::{admin, documents, health, history, query, upload};
use crate::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

/// Report, query and document routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/upload", post(upload::upload_report))
        .route("/query", post(query::query_handler))
        .route("/query/stream", post(query::query_stream_handler))
        .route("/delete_index", delete(documents::delete_index))
        .route(
            "/documents",
            get(documents::list_documents).delete(documents::delete_document),
        )
        .route("/usage", get(documents::usage))
        .route(
            "/history",
            get(history::get_history).delete(history::clear_history),
        )
}

/// Routes guarded by the admin key
pub fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/delete/all", delete(admin::delete_all))
        .route("/admin/index", post(admin::ensure_index))
}

/// Health checks and metrics
pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::prometheus_metrics))
}
