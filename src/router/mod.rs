//! HTTP routes.
pub mod register;
pub mod status;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

/// Success envelope.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub status_code: u16,
    pub data: T,
    pub message: String,
    pub success: bool,
}

impl<T> ApiResponse<T> {
    /// Create a new [`ApiResponse`].
    pub fn new(status: StatusCode, data: T, message: &str) -> Self {
        Self {
            status_code: status.as_u16(),
            data,
            message: message.to_owned(),
            success: status.is_success(),
        }
    }
}
