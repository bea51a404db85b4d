//! API error handling
//!
//! Author: hephaex@gmail.com

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hrag_core::HragError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    TooManyRequests(String),
    /// A backing service (Qdrant, Redis, embedder, LLM) failed
    Upstream { service: &'static str, message: String },
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            AppError::NotFound(msg) => ApiError::new("NOT_FOUND", msg),
            AppError::BadRequest(msg) => ApiError::new("BAD_REQUEST", msg),
            AppError::TooManyRequests(msg) => ApiError::new("RATE_LIMITED", msg),
            AppError::Upstream { service, message } => {
                tracing::error!(service, "Upstream failure: {message}");
                ApiError::new("UPSTREAM_ERROR", format!("{service} request failed"))
                    .with_details(message)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                ApiError::internal_error().with_details(msg)
            }
        };

        (status, Json(error)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<HragError> for AppError {
    fn from(err: HragError) -> Self {
        match err {
            HragError::NotFound(msg) => AppError::NotFound(msg),
            HragError::ValidationError(msg) => AppError::BadRequest(msg),
            err @ (HragError::RateLimited { .. } | HragError::DocumentLimit { .. }) => {
                AppError::TooManyRequests(limit_message(&err))
            }
            HragError::StoreError(message) => AppError::Upstream {
                service: "counter store",
                message,
            },
            HragError::VectorStoreError(message) => AppError::Upstream {
                service: "vector store",
                message,
            },
            HragError::EmbeddingError(message) => AppError::Upstream {
                service: "embedding",
                message,
            },
            HragError::LlmError(message) => AppError::Upstream {
                service: "llm",
                message,
            },
            HragError::ExtractionError(msg) => {
                AppError::Internal(format!("Text extraction error: {msg}"))
            }
            HragError::ConfigError(msg) => AppError::Internal(format!("Configuration error: {msg}")),
            HragError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}

/// User-facing wording for quota and capacity denials
pub fn limit_message(err: &HragError) -> String {
    match err {
        HragError::RateLimited { kind, limit } => format!(
            "Daily {kind} limit reached ({limit} per day). Please try again tomorrow."
        ),
        HragError::DocumentLimit { limit } => format!(
            "You've reached the maximum saved document limit ({limit} documents)."
        ),
        other => other.to_string(),
    }
}
