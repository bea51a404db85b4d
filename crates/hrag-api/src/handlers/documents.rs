//! Document management handlers
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    Json,
};
use hrag_core::{DocumentSummary, Namespace};
use hrag_quota::QuotaUsage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

pub const INDEX_DELETED: &str = "User index deleted successfully";

const DEFAULT_PAGE: usize = 1;
const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 100;

/// Query parameters for document listing
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListDocumentsQuery {
    pub user_id: String,

    /// Page number (1-indexed)
    #[param(default = 1)]
    pub page: Option<usize>,

    /// Items per page
    #[param(default = 10, maximum = 100)]
    pub limit: Option<usize>,
}

/// Pagination block
#[derive(Debug, Serialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub has_more: bool,
}

/// One indexed report
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    #[schema(example = "blood_test_2024.pdf")]
    pub filename: String,

    #[schema(example = 42)]
    pub chunk_count: u64,

    /// RFC 3339 ingestion time
    pub ingested_at: Option<String>,

    /// Note given at upload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<DocumentSummary> for DocumentInfo {
    fn from(doc: DocumentSummary) -> Self {
        Self {
            filename: doc.source,
            chunk_count: doc.chunk_count,
            ingested_at: doc.ingested_at.map(|t| t.to_rfc3339()),
            description: None,
        }
    }
}

/// Document list response
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentListResponse {
    pub user_id: String,
    pub documents: Vec<DocumentInfo>,
    pub pagination: Pagination,
}

/// Slice one page out of `items`
fn paginate<T>(items: Vec<T>, page: Option<usize>, limit: Option<usize>) -> (Vec<T>, Pagination) {
    let page = page.unwrap_or(DEFAULT_PAGE).max(1);
    let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let total = items.len();
    let skip = (page - 1).saturating_mul(limit);

    let slice: Vec<T> = items.into_iter().skip(skip).take(limit).collect();
    let has_more = skip.saturating_add(slice.len()) < total;

    (
        slice,
        Pagination {
            page,
            limit,
            total,
            has_more,
        },
    )
}

/// List a user's indexed reports
#[utoipa::path(
    get,
    path = "/documents",
    tag = "documents",
    params(ListDocumentsQuery),
    responses(
        (status = 200, description = "Document list", body = DocumentListResponse),
        (status = 400, description = "Invalid user id", body = crate::error::ApiError)
    )
)]
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListDocumentsQuery>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let namespace = Namespace::parse(&params.user_id)?;

    let documents = state.store.list_documents(&namespace).await?;
    let (page, pagination) = paginate(documents, params.page, params.limit);

    let mut infos = Vec::with_capacity(page.len());
    for doc in page {
        let description = state.history.description(&namespace, &doc.source).await?;
        infos.push(DocumentInfo {
            description,
            ..DocumentInfo::from(doc)
        });
    }

    Ok(Json(DocumentListResponse {
        user_id: namespace.to_string(),
        documents: infos,
        pagination,
    }))
}

/// Delete-one-document request
#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteDocumentRequest {
    pub user_id: String,
    #[schema(example = "blood_test_2024.pdf")]
    pub filename: String,
}

/// Deletion result
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    #[schema(example = 200)]
    pub status_code: u16,
    pub message: String,
    /// Chunks removed
    pub deleted: u64,
}

/// Delete one report from a user's namespace
#[utoipa::path(
    delete,
    path = "/documents",
    tag = "documents",
    request_body = DeleteDocumentRequest,
    responses(
        (status = 200, description = "Document deleted", body = DeleteResponse),
        (status = 404, description = "No such document", body = crate::error::ApiError)
    )
)]
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeleteDocumentRequest>,
) -> Result<Json<DeleteResponse>, AppError> {
    let namespace = Namespace::parse(&req.user_id)?;

    let deleted = state.store.delete_document(&namespace, &req.filename).await?;
    if deleted == 0 {
        return Err(AppError::NotFound(format!(
            "Document '{}' not found",
            req.filename
        )));
    }

    state
        .history
        .forget(&namespace, std::slice::from_ref(&req.filename))
        .await?;
    tracing::info!(user = %namespace, filename = %req.filename, deleted, "Document deleted");
    Ok(Json(DeleteResponse {
        status_code: 200,
        message: "Document deleted successfully".to_string(),
        deleted,
    }))
}

/// Delete-namespace request
#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteIndexRequest {
    pub user_id: String,
}

/// Delete every chunk a user owns
#[utoipa::path(
    delete,
    path = "/delete_index",
    tag = "documents",
    request_body = DeleteIndexRequest,
    responses(
        (status = 200, description = "Namespace cleared (also when already empty)", body = DeleteResponse),
        (status = 400, description = "Invalid user id", body = crate::error::ApiError)
    )
)]
pub async fn delete_index(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeleteIndexRequest>,
) -> Result<Json<DeleteResponse>, AppError> {
    let namespace = Namespace::parse(&req.user_id)?;

    let sources: Vec<String> = state
        .store
        .list_documents(&namespace)
        .await?
        .into_iter()
        .map(|doc| doc.source)
        .collect();
    let deleted = state.store.delete_namespace(&namespace).await?;
    state.history.forget(&namespace, &sources).await?;
    tracing::info!(user = %namespace, deleted, "User index deleted");

    Ok(Json(DeleteResponse {
        status_code: 200,
        message: INDEX_DELETED.to_string(),
        deleted,
    }))
}

/// User id query parameter
#[derive(Debug, Deserialize, IntoParams)]
pub struct UserQuery {
    pub user_id: String,
}

/// Today's usage against the daily limits
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub user_id: String,
    pub uploads_used: u32,
    pub uploads_limit: u32,
    pub queries_used: u32,
    pub queries_limit: u32,
    pub documents: usize,
    pub documents_limit: usize,
}

impl UsageResponse {
    fn new(user_id: String, usage: QuotaUsage, documents: usize, documents_limit: usize) -> Self {
        Self {
            user_id,
            uploads_used: usage.uploads_used,
            uploads_limit: usage.uploads_limit,
            queries_used: usage.queries_used,
            queries_limit: usage.queries_limit,
            documents,
            documents_limit,
        }
    }
}

/// Report today's upload and query usage
#[utoipa::path(
    get,
    path = "/usage",
    tag = "documents",
    params(UserQuery),
    responses(
        (status = 200, description = "Usage for today (UTC)", body = UsageResponse),
        (status = 400, description = "Invalid user id", body = crate::error::ApiError)
    )
)]
pub async fn usage(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserQuery>,
) -> Result<Json<UsageResponse>, AppError> {
    let namespace = Namespace::parse(&params.user_id)?;

    let usage = state.quota.usage(&namespace).await?;
    let documents = state.store.list_documents(&namespace).await?.len();

    Ok(Json(UsageResponse::new(
        namespace.to_string(),
        usage,
        documents,
        state.config.limits.max_documents_per_user,
    )))
}
