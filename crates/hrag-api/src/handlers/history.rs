//! Query history handlers

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use hrag_core::Namespace;
use hrag_quota::HistoryEntry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

pub const HISTORY_CLEARED: &str = "Query history cleared";

/// Query parameters for one document's history
#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    pub user_id: String,
    pub filename: String,
}

/// One history message
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntryInfo {
    pub content: String,
    /// True for questions, false for answers
    pub by_user: bool,
    /// RFC 3339
    pub created_at: String,
}

impl From<HistoryEntry> for HistoryEntryInfo {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            content: entry.content,
            by_user: entry.by_user,
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}

/// A document's questions and answers, oldest first
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub user_id: String,
    #[schema(example = "blood_test_2024.pdf")]
    pub filename: String,
    pub description: Option<String>,
    pub entries: Vec<HistoryEntryInfo>,
    /// Entries kept per document
    pub limit: usize,
}

/// Question and answer history of one report
#[utoipa::path(
    get,
    path = "/history",
    tag = "documents",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Document history", body = HistoryResponse),
        (status = 400, description = "Invalid user id", body = crate::error::ApiError),
        (status = 404, description = "No such document", body = crate::error::ApiError)
    )
)]
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let namespace = Namespace::parse(&params.user_id)?;

    let indexed = state
        .store
        .list_documents(&namespace)
        .await?
        .iter()
        .any(|doc| doc.source == params.filename);
    if !indexed {
        return Err(AppError::NotFound(format!(
            "Document '{}' not found",
            params.filename
        )));
    }

    let entries = state.history.entries(&namespace, &params.filename).await?;
    let description = state.history.description(&namespace, &params.filename).await?;

    Ok(Json(HistoryResponse {
        user_id: namespace.to_string(),
        filename: params.filename,
        description,
        entries: entries.into_iter().map(HistoryEntryInfo::from).collect(),
        limit: state.history.per_document(),
    }))
}

/// Clear-history request; without a filename every document is cleared
#[derive(Debug, Deserialize, ToSchema)]
pub struct ClearHistoryRequest {
    pub user_id: String,
    pub filename: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClearHistoryResponse {
    #[schema(example = 200)]
    pub status_code: u16,
    pub message: String,
    /// Documents whose history was cleared
    pub documents: usize,
}

/// Clear the question and answer history of one or all reports
#[utoipa::path(
    delete,
    path = "/history",
    tag = "documents",
    request_body = ClearHistoryRequest,
    responses(
        (status = 200, description = "History cleared", body = ClearHistoryResponse),
        (status = 400, description = "Invalid user id", body = crate::error::ApiError)
    )
)]
pub async fn clear_history(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClearHistoryRequest>,
) -> Result<Json<ClearHistoryResponse>, AppError> {
    let namespace = Namespace::parse(&req.user_id)?;

    let sources: Vec<String> = match req.filename {
        Some(filename) => vec![filename],
        None => state
            .store
            .list_documents(&namespace)
            .await?
            .into_iter()
            .map(|doc| doc.source)
            .collect(),
    };
    state.history.clear(&namespace, &sources).await?;
    tracing::info!(user = %namespace, documents = sources.len(), "Query history cleared");

    Ok(Json(ClearHistoryResponse {
        status_code: 200,
        message: HISTORY_CLEARED.to_string(),
        documents: sources.len(),
    }))
}
