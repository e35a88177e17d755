//! Remote object store port.
//!
//! Stores report completion through a callback. [`ObjectStoreUploader`]
//! turns that into a single awaited result so callers never see the
//! callback.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::account::AssetField;
use crate::asset::AssetError;

/// Object accepted by the remote store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// Public URL of the object.
    pub url: String,
    pub public_id: Option<String>,
}

/// Errors reported by a remote store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Rejected(String),
    #[error("invalid store configuration: {0}")]
    Configuration(String),
    #[error("invalid store response: {0}")]
    InvalidResponse(String),
}

/// Completion callback, called at most once.
pub type UploadCallback =
    Box<dyn FnOnce(Result<StoredObject, StoreError>) + Send + 'static>;

/// Callback-based upload primitive.
pub trait ObjectStore: Send + Sync {
    /// Start uploading `buffer` and return immediately.
    fn upload_stream(
        &self,
        field: AssetField,
        buffer: Bytes,
        callback: UploadCallback,
    );
}

/// Adapter from [`ObjectStore`] to an `async` call.
///
/// Never retries.
#[derive(Clone)]
pub struct ObjectStoreUploader {
    store: Arc<dyn ObjectStore>,
    timeout: Option<Duration>,
}

impl ObjectStoreUploader {
    /// Create a new [`ObjectStoreUploader`].
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            timeout: None,
        }
    }

    /// Bound every upload. `None` waits forever.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Upload `buffer` as `field` and return its public URL.
    pub async fn upload(
        &self,
        field: AssetField,
        buffer: Bytes,
    ) -> Result<String, AssetError> {
        if buffer.is_empty() {
            return Err(AssetError::Empty { field });
        }

        let (tx, rx) = oneshot::channel();
        self.store.upload_stream(
            field,
            buffer,
            Box::new(move |result| {
                // receiver is gone only if the caller stopped waiting.
                let _ = tx.send(result);
            }),
        );

        let received = match self.timeout {
            Some(limit) => {
                tokio::time::timeout(limit, rx).await.map_err(|_| {
                    AssetError::Upload {
                        field,
                        message: format!(
                            "timed out after {}ms",
                            limit.as_millis()
                        ),
                    }
                })?
            },
            None => rx.await,
        };

        match received {
            Ok(Ok(object)) => {
                tracing::debug!(%field, url = %object.url, "asset uploaded");
                Ok(object.url)
            },
            Ok(Err(err)) => {
                tracing::warn!(%field, error = %err, "object store rejected upload");
                Err(AssetError::Upload {
                    field,
                    message: err.to_string(),
                })
            },
            Err(_) => Err(AssetError::Upload {
                field,
                message: "store dropped the upload without a result".into(),
            }),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn uploader(store: ScriptedStore) -> ObjectStoreUploader {
        ObjectStoreUploader::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_upload_returns_url() {
        let url = uploader(ScriptedStore::succeeding())
            .upload(AssetField::Avatar, Bytes::from_static(b"me.png"))
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.test/avatar/me.png");
    }

    #[tokio::test]
    async fn test_store_error_is_wrapped() {
        let store = ScriptedStore::new(|_, _| Script::Fail {
            message: "invalid api key".into(),
            delay: Duration::ZERO,
        });

        let err = uploader(store)
            .upload(AssetField::CoverImage, Bytes::from_static(b"c"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AssetError::Upload {
                field: AssetField::CoverImage,
                message: "invalid api key".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_dropped_callback() {
        let err = uploader(ScriptedStore::new(|_, _| Script::Drop))
            .upload(AssetField::Avatar, Bytes::from_static(b"a"))
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::Upload { .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let err = uploader(ScriptedStore::new(|_, _| Script::Hang))
            .timeout(Some(Duration::from_millis(20)))
            .upload(AssetField::Avatar, Bytes::from_static(b"a"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AssetError::Upload {
                field: AssetField::Avatar,
                message: "timed out after 20ms".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_empty_buffer_is_not_sent() {
        let store = Arc::new(ScriptedStore::succeeding());
        let err = ObjectStoreUploader::new(store.clone())
            .upload(AssetField::Avatar, Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AssetError::Empty {
                field: AssetField::Avatar
            }
        );
        assert_eq!(store.calls(), 0);
    }
}
