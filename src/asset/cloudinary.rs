//! Cloudinary-compatible upload API.

use bytes::Bytes;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::{Digest, Sha1};

use crate::account::AssetField;
use crate::asset::{ObjectStore, StoreError, StoredObject, UploadCallback};
use crate::config::Store as StoreConfig;

const DEFAULT_ENDPOINT: &str = "https://api.cloudinary.com";

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
    public_id: Option<String>,
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Signed uploads to `<endpoint>/v1_1/<cloud>/auto/upload`.
#[derive(Clone)]
pub struct CloudinaryStore {
    client: reqwest::Client,
    upload_url: String,
    api_key: String,
    api_secret: String,
    folder: Option<String>,
}

impl CloudinaryStore {
    /// Create a new [`CloudinaryStore`].
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .unwrap_or(DEFAULT_ENDPOINT)
            .trim_end_matches('/');
        let upload_url = url::Url::parse(&format!(
            "{endpoint}/v1_1/{}/auto/upload",
            config.cloud_name
        ))
        .map_err(|err| StoreError::Configuration(err.to_string()))?;

        Ok(Self {
            client: reqwest::Client::new(),
            upload_url: upload_url.to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            folder: config.folder.clone(),
        })
    }

    /// SHA-1 of the alphabetically sorted parameters followed by the secret.
    fn sign(&self, params: &[(&str, String)]) -> String {
        let mut params = params.to_vec();
        params.sort_by(|a, b| a.0.cmp(b.0));

        let to_sign = params
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha1::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn send(
        &self,
        field: AssetField,
        buffer: Bytes,
    ) -> Result<StoredObject, StoreError> {
        let mut params = vec![("timestamp", Utc::now().timestamp().to_string())];
        if let Some(folder) = &self.folder {
            params.push(("folder", folder.clone()));
        }
        let signature = self.sign(&params);

        let mut form = Form::new()
            .text("api_key", self.api_key.clone())
            .text("signature", signature)
            .part(
                "file",
                Part::stream(reqwest::Body::from(buffer))
                    .file_name(field.as_str()),
            );
        for (key, value) in params {
            form = form.text(key, value);
        }

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        // error bodies are not always JSON, e.g. a proxy's HTML 502.
        let parsed = serde_json::from_slice::<UploadResponse>(&body).ok();

        if !status.is_success() {
            let message = match parsed.and_then(|body| body.error) {
                Some(error) => format!("status {status}: {}", error.message),
                None => format!("status {status}"),
            };
            return Err(StoreError::Rejected(message));
        }

        let body = parsed.ok_or_else(|| {
            StoreError::InvalidResponse("body is not an upload result".into())
        })?;
        if let Some(error) = body.error {
            return Err(StoreError::Rejected(error.message));
        }

        body.secure_url
            .or(body.url)
            .map(|url| StoredObject {
                url,
                public_id: body.public_id,
            })
            .ok_or_else(|| StoreError::InvalidResponse("missing url".into()))
    }
}

impl ObjectStore for CloudinaryStore {
    fn upload_stream(
        &self,
        field: AssetField,
        buffer: Bytes,
        callback: UploadCallback,
    ) {
        let store = self.clone();
        tokio::spawn(async move {
            callback(store.send(field, buffer).await);
        });
    }
}
