//! Binary assets attached to a registration.
pub mod cloudinary;
mod collector;
mod store;

pub use collector::*;
pub use store::*;

use bytes::Bytes;

use crate::account::AssetField;

/// A fully buffered asset.
#[derive(Clone, Debug, PartialEq)]
pub struct Asset {
    pub field: AssetField,
    /// Declared media type, e.g. `image/png`.
    pub media_type: Option<String>,
    pub data: Bytes,
}

/// Failures while collecting or uploading one asset.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AssetError {
    #[error("no {field} provided, image is required")]
    Empty { field: AssetField },
    #[error("error reading {field} stream: {message}")]
    StreamIo { field: AssetField, message: String },
    #[error("{field} is larger than {limit} bytes")]
    TooLarge { field: AssetField, limit: usize },
    #[error("invalid {field} file type `{media_type}`")]
    UnsupportedMediaType {
        field: AssetField,
        media_type: String,
    },
    #[error("error uploading {field}: {message}")]
    Upload { field: AssetField, message: String },
}

impl AssetError {
    pub fn field(&self) -> AssetField {
        match self {
            AssetError::Empty { field }
            | AssetError::StreamIo { field, .. }
            | AssetError::TooLarge { field, .. }
            | AssetError::UnsupportedMediaType { field, .. }
            | AssetError::Upload { field, .. } => *field,
        }
    }

    /// Whether the caller sent a bad asset, as opposed to an I/O failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AssetError::Empty { .. }
                | AssetError::TooLarge { .. }
                | AssetError::UnsupportedMediaType { .. }
        )
    }
}
