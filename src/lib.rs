//! Registra registers accounts together with their avatar and cover image.
//!
//! A registration reserves the identity first, then pushes both assets to the
//! object store concurrently and settles each asset slot as its upload ends.

#![forbid(unsafe_code)]
pub mod account;
pub mod asset;
pub mod config;
pub mod crypto;
mod database;
pub mod error;
mod router;
pub mod telemetry;
pub mod upload;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::account::{PendingRecordManager, PgAccountRepository};
use crate::asset::ObjectStoreUploader;
use crate::asset::cloudinary::CloudinaryStore;
use crate::crypto::PasswordManager;
use crate::upload::UploadOrchestrator;

pub const REGISTER_PATH: &str = "/api/v1/users/register";
const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
/// Room left for reading the body and writing records.
const REQUEST_MARGIN: Duration = Duration::from_secs(30);
const UNBOUNDED_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);
/// Multipart overhead on top of both assets.
const FORM_OVERHEAD: usize = 64 * 1024;

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    content_type: &str,
    body: Vec<u8>,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    app.oneshot(
        Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, content_type)
            .body(axum::body::Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// State backed by memory, with `store` answering uploads.
#[cfg(test)]
pub(crate) fn test_state(
    store: asset::testing::ScriptedStore,
) -> (
    AppState,
    Arc<account::memory::MemoryAccountRepository>,
    Arc<asset::testing::ScriptedStore>,
) {
    let config = Arc::new(config::Configuration::default());
    let repo = Arc::new(account::memory::MemoryAccountRepository::default());
    let store = Arc::new(store);
    let passwords = PasswordManager::new(Some(config::Argon2::light()))
        .expect("light argon2 parameters are valid");

    let registrations = UploadOrchestrator::new(
        PendingRecordManager::new(repo.clone()),
        ObjectStoreUploader::new(store.clone())
            .timeout(config.upload.timeout()),
        Arc::new(passwords),
    );

    let state = AppState {
        config,
        registrations,
        metrics: None,
    };

    (state, repo, store)
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub registrations: UploadOrchestrator,
    pub metrics: Option<PrometheusHandle>,
}

fn cors(origin: Option<&str>) -> CorsLayer {
    let origin = match origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => AllowOrigin::exact(origin),
        Some(Err(err)) => {
            tracing::warn!(error = %err, "invalid `cors_origin`, allowing any origin");
            AllowOrigin::from(Any)
        },
        None => AllowOrigin::from(Any),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let upload = &state.config.upload;
    let request_timeout = upload
        .timeout()
        .map_or(UNBOUNDED_REQUEST_TIMEOUT, |timeout| timeout + REQUEST_MARGIN);
    let body_limit = upload.max_size.saturating_mul(2) + FORM_OVERHEAD;

    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        .layer(cors(state.config.cors_origin.as_deref()));

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .route("/metrics", get(telemetry::render))
        .route(
            REGISTER_PATH,
            post(router::register::handler)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .with_state(state)
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>>
{
    let mut config = config::Configuration::default();
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        config = config.path(path.into());
    }
    let config = config.read()?;

    let Some(postgres) = &config.postgres else {
        return Err("missing `postgres` entry on `config.yaml` file".into());
    };
    let db = database::Database::new(
        &postgres.address,
        postgres
            .username
            .as_deref()
            .unwrap_or(database::DEFAULT_CREDENTIALS),
        postgres
            .password
            .as_deref()
            .unwrap_or(database::DEFAULT_CREDENTIALS),
        postgres
            .database
            .as_deref()
            .unwrap_or(database::DEFAULT_DATABASE_NAME),
        postgres.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
    )
    .await?;

    // execute migrations scripts on start.
    db.migrate().await?;

    let Some(store) = &config.store else {
        return Err("missing `store` entry on `config.yaml` file".into());
    };
    let store = CloudinaryStore::new(store)?;
    let passwords = PasswordManager::new(config.argon2.clone())?;

    let registrations = UploadOrchestrator::new(
        PendingRecordManager::new(Arc::new(PgAccountRepository::new(
            db.postgres,
        ))),
        ObjectStoreUploader::new(Arc::new(store))
            .timeout(config.upload.timeout()),
        Arc::new(passwords),
    );

    let metrics = match telemetry::setup_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!(error = %err, "prometheus recorder not installed");
            None
        },
    };

    Ok(AppState {
        config,
        registrations,
        metrics,
    })
}
