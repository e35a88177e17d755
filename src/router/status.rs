//! Public instance description, used by front-ends to identify the server.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::config::Configuration;

/// Structured configuration.
#[derive(Debug, Serialize)]
pub struct Status {
    name: String,
    version: String,
    url: String,
    max_upload_size: usize,
}

/// Public server status (configuration).
pub async fn status(State(config): State<Arc<Configuration>>) -> Json<Status> {
    Json(Status {
        name: config.name.clone(),
        version: env!("CARGO_PKG_VERSION").into(),
        url: config.url.clone(),
        max_upload_size: config.upload.max_size,
    })
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;

    use crate::asset::testing::ScriptedStore;
    use crate::*;

    #[tokio::test]
    async fn test_status_handler() {
        let (state, _, _) = test_state(ScriptedStore::succeeding());

        let response = make_request(
            app(state),
            Method::GET,
            "/status.json",
            "application/json",
            Vec::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["max_upload_size"], 50 * 1024 * 1024);
    }
}
