//! Report upload handler
//!
//! Author: hephaex@gmail.com

use crate::error::{limit_message, AppError};
use crate::state::AppState;
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use hrag_core::{HragError, Namespace, QuotaKind};
use hrag_rag::{pdf_filename, TempUpload};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

pub const UPLOAD_OK: &str = "Report processed and indexed successfully.";
pub const UPLOAD_FAILED: &str = "Failed to process and index the PDF.";

/// Upload outcome
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    #[schema(example = 200)]
    pub status_code: u16,

    #[schema(example = "blood_test_2024.pdf")]
    pub filename: String,

    pub message: String,

    /// Chunks indexed for the document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,

    /// Whether the text came from OCR
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_applied: Option<bool>,
}

impl UploadResponse {
    fn failure(status: StatusCode, filename: impl Into<String>, message: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            status,
            Json(Self {
                status_code: status.as_u16(),
                filename: filename.into(),
                message: message.into(),
                chunk_count: None,
                ocr_applied: None,
            }),
        )
    }
}

/// Multipart form for uploads (documentation only)
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// Owner of the report
    user_id: String,
    /// Optional note shown with the document
    description: Option<String>,
    /// PDF file
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

struct UploadFields {
    user_id: Option<String>,
    description: Option<String>,
    filename: Option<String>,
    bytes: Vec<u8>,
}

async fn read_fields(mut multipart: Multipart) -> Result<UploadFields, AppError> {
    let mut fields = UploadFields {
        user_id: None,
        description: None,
        filename: None,
        bytes: Vec::new(),
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("user_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Invalid user_id field: {e}")))?;
                fields.user_id = Some(text);
            }
            Some("description") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Invalid description field: {e}")))?;
                fields.description = Some(text);
            }
            Some("file") => {
                fields.filename = field.file_name().map(str::to_string);
                fields.bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read file: {e}")))?
                    .to_vec();
            }
            _ => {}
        }
    }

    Ok(fields)
}

/// Upload a PDF report and index it into the user's namespace
#[utoipa::path(
    post,
    path = "/upload",
    tag = "reports",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Report indexed", body = UploadResponse),
        (status = 400, description = "Invalid file or empty document", body = UploadResponse),
        (status = 429, description = "Daily upload limit or document cap reached", body = UploadResponse),
        (status = 500, description = "Ingestion failed", body = UploadResponse)
    )
)]
pub async fn upload_report(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let fields = read_fields(multipart).await?;

    let user_id = fields
        .user_id
        .ok_or_else(|| AppError::BadRequest("user_id is required".to_string()))?;
    let namespace = Namespace::parse(&user_id)?;

    let filename = match pdf_filename(fields.filename.as_deref()) {
        Ok(name) => name,
        Err(HragError::ValidationError(msg)) => {
            return Ok(UploadResponse::failure(StatusCode::BAD_REQUEST, "", msg));
        }
        Err(e) => return Err(e.into()),
    };

    let decision = state.quota.check(&namespace, QuotaKind::Upload).await?;
    if let Err(denied) = decision.into_result() {
        tracing::info!(user = %namespace, "Upload refused: {denied}");
        return Ok(UploadResponse::failure(
            StatusCode::TOO_MANY_REQUESTS,
            filename,
            limit_message(&denied),
        ));
    }

    let upload = match TempUpload::write(
        &state.config.ingest.temp_dir,
        &namespace,
        &filename,
        &fields.bytes,
    )
    .await
    {
        Ok(upload) => upload,
        Err(HragError::ValidationError(msg)) => {
            return Ok(UploadResponse::failure(StatusCode::BAD_REQUEST, filename, msg));
        }
        Err(e) => {
            tracing::error!(user = %namespace, filename = %filename, "Failed to stage upload: {e}");
            return Ok(UploadResponse::failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                filename,
                UPLOAD_FAILED,
            ));
        }
    };

    tracing::info!(user = %namespace, filename = %filename, bytes = fields.bytes.len(), "Processing upload");
    match state.ingest.ingest(&namespace, upload.path(), &filename).await {
        Ok(report) => {
            reset_history(&state, &namespace, &filename, fields.description.as_deref()).await;
            Ok((
                StatusCode::OK,
                Json(UploadResponse {
                    status_code: 200,
                    filename,
                    message: UPLOAD_OK.to_string(),
                    chunk_count: Some(report.chunk_count),
                    ocr_applied: Some(report.ocr_applied),
                }),
            ))
        }
        Err(HragError::ValidationError(msg)) => {
            Ok(UploadResponse::failure(StatusCode::BAD_REQUEST, filename, msg))
        }
        Err(e @ HragError::DocumentLimit { .. }) => Ok(UploadResponse::failure(
            StatusCode::TOO_MANY_REQUESTS,
            filename,
            limit_message(&e),
        )),
        Err(e) => {
            tracing::error!(user = %namespace, filename = %filename, "Ingestion failed: {e}");
            Ok(UploadResponse::failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                filename,
                UPLOAD_FAILED,
            ))
        }
    }
}

/// A freshly indexed document starts with an empty history
async fn reset_history(
    state: &AppState,
    namespace: &Namespace,
    filename: &str,
    description: Option<&str>,
) {
    let sources = [filename.to_string()];
    let result = async {
        state.history.forget(namespace, &sources).await?;
        state.history.set_description(namespace, filename, description).await
    }
    .await;
    if let Err(e) = result {
        tracing::warn!(user = %namespace, filename, "Failed to reset document history: {e}");
    }
}
