//! Error handler for registra.

use axum::extract::multipart::MultipartError;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sqlx::Error as SQLxError;
use thiserror::Error;
use validator::ValidationErrors;

use crate::account::AssetField;
use crate::asset::AssetError;
use crate::crypto::CryptoError;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("all fields are required")]
    Validation(#[from] ValidationErrors),

    #[error("error parsing form data: {0}")]
    Multipart(#[from] MultipartError),

    #[error("{0} field is required")]
    MissingAsset(AssetField),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("user with email or username already exists")]
    Conflict,

    #[error("error uploading assets: {}", join(.failures))]
    Upload {
        record_id: String,
        failures: Vec<AssetError>,
    },

    #[error("something went wrong while registering the user")]
    NotFound,

    #[error("{field} of {record_id} is already settled")]
    SlotSettled { record_id: String, field: AssetField },

    #[error("SQL request failed: {0}")]
    Sql(#[from] SQLxError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

fn join(failures: &[AssetError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ServerError {
    /// HTTP status code carried by the error envelope.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Multipart(err) => err.status(),
            ServerError::Validation(_) | ServerError::MissingAsset(_) => {
                StatusCode::BAD_REQUEST
            },
            ServerError::Asset(err) if err.is_client_error() => {
                StatusCode::BAD_REQUEST
            },
            ServerError::Conflict => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseError {
    status_code: u16,
    message: String,
    success: bool,
    errors: Vec<FieldError>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status_code = code.as_u16();
        self
    }

    /// Update `message` field.
    pub fn message(mut self, message: &str) -> Self {
        self.message = message.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = parse_validation_errors(errors);
        self
    }

    /// Add one error per failed asset.
    pub fn asset_errors(mut self, failures: &[AssetError]) -> Self {
        self.errors = failures
            .iter()
            .map(|failure| FieldError {
                field: failure.field().to_string(),
                message: failure.to_string(),
            })
            .collect();
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status_code)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            status_code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            message: "Internal server error.".to_owned(),
            success: false,
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue.to_string(),
            })
        })
        .collect()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .status(self.status())
            .message(&self.to_string());

        let response = match &self {
            ServerError::Validation(validation_errors) => {
                response.errors(validation_errors)
            },

            ServerError::Upload {
                record_id,
                failures,
            } => {
                tracing::error!(%record_id, error = %self, "registration left incomplete");
                response.asset_errors(failures)
            },

            ServerError::Asset(err) if !err.is_client_error() => {
                tracing::error!(error = %err, "asset collection failed");
                response
            },

            ServerError::Sql(err) => {
                tracing::error!(error = %err, "server returned 500 status");
                ResponseError::default()
            },

            ServerError::Internal { details, source } => {
                tracing::error!(err = ?source, %details, "server returned 500 status");
                ResponseError::default()
            },

            ServerError::NotFound
            | ServerError::SlotSettled { .. }
            | ServerError::Crypto(_) => {
                tracing::error!(error = %self, "server returned 500 status");
                response
            },

            _ => response,
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "statusCode": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "message": "Internal server error.",
                "success": false,
                "errors": [],
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
