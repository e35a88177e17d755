use axum::extract::{Multipart, State};
use axum::{Json, http::StatusCode};

use crate::AppState;
use crate::account::{AssetField, SanitizedRecord};
use crate::asset::{Asset, AssetError, StreamCollector};
use crate::error::Result;
use crate::router::ApiResponse;
use crate::upload::Registration;

pub const SUCCESS_MESSAGE: &str = "User registered successfully";

/// Handler to register a user with `multipart/form-data`.
///
/// Text parts: `fullName`, `email`, `username`, `password`.
/// File parts: `avatar`, `coverImage`.
pub async fn handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<SanitizedRecord>>)> {
    let collector = StreamCollector::new(state.config.upload.max_size);
    let mut registration = Registration::default();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(ToOwned::to_owned) else {
            continue;
        };

        match name.as_str() {
            "fullName" => registration.full_name = field.text().await?,
            "email" => registration.email = field.text().await?,
            "username" => registration.username = field.text().await?,
            "password" => registration.password = field.text().await?,
            _ => {
                let Some(asset_field) = AssetField::from_name(&name) else {
                    tracing::debug!(field = %name, "ignoring unknown form field");
                    continue;
                };

                let media_type = field.content_type().map(ToOwned::to_owned);
                if !media_type
                    .as_deref()
                    .is_some_and(|media_type| state.config.upload.accepts(media_type))
                {
                    return Err(AssetError::UnsupportedMediaType {
                        field: asset_field,
                        media_type: media_type.unwrap_or_default(),
                    }
                    .into());
                }

                let data = collector.collect(asset_field, field).await?;
                registration.attach(Asset {
                    field: asset_field,
                    media_type,
                    data,
                });
            },
        }
    }

    let record = state.registrations.register(registration).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            StatusCode::CREATED,
            record,
            SUCCESS_MESSAGE,
        )),
    ))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;

    use super::*;
    use crate::asset::testing::{Script, ScriptedStore};
    use crate::*;

    const PATH: &str = "/api/v1/users/register";
    const BOUNDARY: &str = "X-REGISTRA-BOUNDARY";

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a [u8]),
    }

    fn multipart(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                        )
                        .as_bytes(),
                    );
                },
                Part::File(name, media_type, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{name}.bin\"\r\nContent-Type: {media_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                    body.extend_from_slice(b"\r\n");
                },
            }
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn form<'a>(username: &'a str, email: &'a str) -> Vec<Part<'a>> {
        vec![
            Part::Text("fullName", "Jane Roe"),
            Part::Text("email", email),
            Part::Text("username", username),
            Part::Text("password", "P$soW%920$n&"),
            Part::File("avatar", "image/png", b"png-bytes"),
            Part::File("coverImage", "image/jpeg", b"jpeg-bytes"),
        ]
    }

    async fn send(
        state: &AppState,
        parts: &[Part<'_>],
    ) -> (StatusCode, Value) {
        let response = make_request(
            app(state.clone()),
            Method::POST,
            PATH,
            &format!("multipart/form-data; boundary={BOUNDARY}"),
            multipart(parts),
        )
        .await;

        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_register_handler() {
        let (state, repo, _) = test_state(ScriptedStore::succeeding());

        let (status, body) =
            send(&state, &form("Jane", "jane@example.com")).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["statusCode"], 201);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], SUCCESS_MESSAGE);
        assert_eq!(body["data"]["username"], "jane");
        assert_eq!(body["data"]["avatar"], "https://cdn.test/avatar/png-bytes");
        assert_eq!(
            body["data"]["coverImage"],
            "https://cdn.test/coverImage/jpeg-bytes"
        );
        assert!(body["data"].get("password").is_none());
        assert!(body["data"].get("refreshToken").is_none());
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_register_duplicate() {
        let (state, _, store) = test_state(ScriptedStore::succeeding());
        let (status, _) = send(&state, &form("jane", "jane@example.com")).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) =
            send(&state, &form("jane", "other@example.com")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test]
    async fn test_register_without_cover() {
        let (state, repo, store) = test_state(ScriptedStore::succeeding());
        let mut parts = form("jane", "jane@example.com");
        parts.pop();

        let (status, body) = send(&state, &parts).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "coverImage field is required");
        assert_eq!(repo.len(), 0);
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_register_empty_avatar() {
        let (state, repo, store) = test_state(ScriptedStore::succeeding());
        let mut parts = form("jane", "jane@example.com");
        parts[4] = Part::File("avatar", "image/png", b"");

        let (status, _) = send(&state, &parts).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(repo.len(), 0);
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_register_rejects_media_type() {
        let (state, repo, _) = test_state(ScriptedStore::succeeding());
        let mut parts = form("jane", "jane@example.com");
        parts[5] = Part::File("coverImage", "application/pdf", b"%PDF");

        let (status, _) = send(&state, &parts).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(repo.len(), 0);
    }

    #[tokio::test]
    async fn test_register_upload_failure() {
        let (state, repo, _) = test_state(ScriptedStore::new(|field, _| match field {
            AssetField::Avatar => Script::Succeed {
                delay: std::time::Duration::ZERO,
            },
            AssetField::CoverImage => Script::Fail {
                message: "invalid signature".into(),
                delay: std::time::Duration::ZERO,
            },
        }));

        let (status, body) =
            send(&state, &form("jane", "jane@example.com")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["errors"][0]["field"], "coverImage");
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .contains("invalid signature")
        );
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_register_body_limit() {
        let (mut state, repo, store) = test_state(ScriptedStore::succeeding());
        let mut config = crate::config::Configuration::default();
        config.upload.max_size = 16;
        state.config = std::sync::Arc::new(config);

        let bio = "a".repeat(128 * 1024);
        let mut parts = form("jane", "jane@example.com");
        parts[0] = Part::Text("fullName", &bio);

        let (status, body) = send(&state, &parts).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["statusCode"], 413);
        assert_eq!(repo.len(), 0);
        assert_eq!(store.calls(), 0);
    }
}
