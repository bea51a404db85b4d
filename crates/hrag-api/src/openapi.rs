//! OpenAPI / Swagger UI documentation
//!
//! - Swagger UI: `/swagger-ui`
//! - OpenAPI JSON: `/api-docs/openapi.json`

use utoipa::OpenApi;

use crate::error::ApiError;
use crate::handlers::{admin, documents, health, history, query, upload, StatusResponse};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "hrag API",
        description = "Per-user PDF report indexing and question answering"
    ),
    paths(
        health::health_check,
        health::readiness_check,
        health::prometheus_metrics,
        upload::upload_report,
        query::query_handler,
        query::query_stream_handler,
        documents::list_documents,
        documents::delete_document,
        documents::delete_index,
        documents::usage,
        history::get_history,
        history::clear_history,
        admin::delete_all,
        admin::ensure_index,
    ),
    components(schemas(
        ApiError,
        StatusResponse,
        health::HealthResponse,
        health::ReadinessResponse,
        health::ReadinessChecks,
        upload::UploadResponse,
        upload::UploadForm,
        query::QueryRequest,
        query::QueryResponse,
        documents::DocumentInfo,
        documents::DocumentListResponse,
        documents::Pagination,
        documents::DeleteDocumentRequest,
        documents::DeleteIndexRequest,
        documents::DeleteResponse,
        documents::UsageResponse,
        history::HistoryEntryInfo,
        history::HistoryResponse,
        history::ClearHistoryRequest,
        history::ClearHistoryResponse,
    )),
    tags(
        (name = "reports", description = "Report upload and indexing"),
        (name = "query", description = "Questions over a user's reports"),
        (name = "documents", description = "Per-user document management"),
        (name = "admin", description = "Operations guarded by the admin key"),
        (name = "health", description = "Health checks and metrics")
    )
)]
pub struct ApiDoc;
