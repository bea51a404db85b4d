//! API handlers
//!
//! Author: hephaex@gmail.com

pub mod admin;
pub mod documents;
pub mod health;
pub mod history;
pub mod query;
pub mod upload;

use serde::Serialize;
use utoipa::ToSchema;

/// Plain status reply
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[schema(example = 200)]
    pub status_code: u16,
    pub message: String,
}

impl StatusResponse {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }
}
