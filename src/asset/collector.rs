//! Buffer an incoming byte stream into one asset.

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

use crate::account::AssetField;
use crate::asset::AssetError;

/// Default ceiling for a single asset, 50 MiB.
pub const DEFAULT_MAX_SIZE: usize = 50 * 1024 * 1024;

/// Collects a stream of chunks into a single buffer.
#[derive(Debug, Clone, Copy)]
pub struct StreamCollector {
    limit: usize,
}

impl Default for StreamCollector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl StreamCollector {
    /// Create a new [`StreamCollector`] accepting at most `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    /// Drain `stream` until it ends.
    ///
    /// # Errors
    ///
    /// - [`AssetError::StreamIo`] if the source fails before its end.
    /// - [`AssetError::TooLarge`] as soon as the limit is crossed.
    /// - [`AssetError::Empty`] if no byte was received.
    pub async fn collect<S, E>(
        &self,
        field: AssetField,
        stream: S,
    ) -> Result<Bytes, AssetError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        let mut stream = std::pin::pin!(stream);
        let mut buffer = BytesMut::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| AssetError::StreamIo {
                field,
                message: err.to_string(),
            })?;

            if buffer.len() + chunk.len() > self.limit {
                return Err(AssetError::TooLarge {
                    field,
                    limit: self.limit,
                });
            }
            buffer.extend_from_slice(&chunk);
        }

        if buffer.is_empty() {
            return Err(AssetError::Empty { field });
        }

        tracing::trace!(%field, size_bytes = buffer.len(), "asset collected");
        Ok(buffer.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    type Chunk = Result<Bytes, std::io::Error>;

    #[tokio::test]
    async fn test_concatenates_chunks() {
        let chunks: Vec<Chunk> = vec![
            Ok(Bytes::from_static(b"GIF8")),
            Ok(Bytes::new()),
            Ok(Bytes::from_static(b"9a")),
        ];

        let buffer = StreamCollector::default()
            .collect(AssetField::Avatar, stream::iter(chunks))
            .await
            .unwrap();
        assert_eq!(&buffer[..], b"GIF89a");
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let chunks: Vec<Chunk> = vec![Ok(Bytes::new())];

        let err = StreamCollector::default()
            .collect(AssetField::CoverImage, stream::iter(chunks))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AssetError::Empty {
                field: AssetField::CoverImage
            }
        );
    }

    #[tokio::test]
    async fn test_stream_error_is_surfaced() {
        let chunks: Vec<Chunk> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "peer went away",
            )),
            Ok(Bytes::from_static(b"never read")),
        ];

        let err = StreamCollector::default()
            .collect(AssetField::Avatar, stream::iter(chunks))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AssetError::StreamIo {
                field: AssetField::Avatar,
                message: "peer went away".into(),
            }
        );
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn test_limit() {
        let chunks: Vec<Chunk> =
            vec![Ok(Bytes::from_static(b"1234")), Ok(Bytes::from_static(b"5"))];

        let err = StreamCollector::new(4)
            .collect(AssetField::Avatar, stream::iter(chunks))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AssetError::TooLarge {
                field: AssetField::Avatar,
                limit: 4
            }
        );
    }
}
