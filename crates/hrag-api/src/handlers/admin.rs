//! Admin handlers guarded by the shared admin key
//!
//! Author: hephaex@gmail.com

use super::StatusResponse;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

pub const INVALID_KEY: &str = "Invalid Key";
pub const ALL_DELETED: &str = "All user indices have been deleted successfully.";

/// Admin key query parameter
#[derive(Debug, Deserialize, IntoParams)]
pub struct AdminKeyQuery {
    /// Shared admin key
    pub key: Option<String>,
}

fn authorize(state: &AppState, params: &AdminKeyQuery) -> Result<(), (StatusCode, Json<StatusResponse>)> {
    if state.config.admin.key.is_none() {
        tracing::warn!("Admin request refused: no admin key configured");
    }

    let candidate = params.key.as_deref().unwrap_or_default();
    if state.admin_key_matches(candidate) {
        Ok(())
    } else {
        Err((
            StatusCode::BAD_REQUEST,
            Json(StatusResponse::new(400, INVALID_KEY)),
        ))
    }
}

/// Delete every user's chunks by recreating the index
#[utoipa::path(
    delete,
    path = "/delete/all",
    tag = "admin",
    params(AdminKeyQuery),
    responses(
        (status = 200, description = "Index cleared", body = StatusResponse),
        (status = 400, description = "Wrong or missing admin key", body = StatusResponse),
        (status = 502, description = "Vector store failure", body = crate::error::ApiError)
    )
)]
pub async fn delete_all(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AdminKeyQuery>,
) -> Result<(StatusCode, Json<StatusResponse>), AppError> {
    if let Err(refused) = authorize(&state, &params) {
        return Ok(refused);
    }

    tracing::warn!("Clearing the whole vector index");
    state.store.clear_index().await?;

    Ok((StatusCode::OK, Json(StatusResponse::new(200, ALL_DELETED))))
}

/// Create the index and its namespace field index if missing
#[utoipa::path(
    post,
    path = "/admin/index",
    tag = "admin",
    params(AdminKeyQuery),
    responses(
        (status = 200, description = "Index exists", body = StatusResponse),
        (status = 400, description = "Wrong or missing admin key", body = StatusResponse),
        (status = 502, description = "Vector store failure", body = crate::error::ApiError)
    )
)]
pub async fn ensure_index(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AdminKeyQuery>,
) -> Result<(StatusCode, Json<StatusResponse>), AppError> {
    if let Err(refused) = authorize(&state, &params) {
        return Ok(refused);
    }

    state.store.ensure_index().await?;

    Ok((StatusCode::OK, Json(StatusResponse::new(200, "Index is ready"))))
}
