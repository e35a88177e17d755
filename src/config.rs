//! Configuration manager for registra.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;
use crate::asset::DEFAULT_MAX_SIZE;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_ADDRESS: &str = "0.0.0.0:8000";
const STORE_SECRET_ENV: &str = "STORE_API_SECRET";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Domain name of current instance.
    pub url: String,
    /// Socket address to listen on.
    pub address: String,
    /// Allowed CORS origin. Any origin when unset.
    pub cors_origin: Option<String>,
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Related to remote asset storage.
    #[serde(skip_serializing)]
    pub store: Option<Store>,
    /// Related to asset ingestion.
    pub upload: Upload,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").into(),
            url: String::default(),
            address: DEFAULT_ADDRESS.into(),
            cors_origin: None,
            version: VERSION.into(),
            path: PathBuf::default(),
            postgres: None,
            argon2: None,
            store: None,
            upload: Upload::default(),
        }
    }
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

#[cfg(test)]
impl Argon2 {
    /// Cheapest accepted parameters.
    pub fn light() -> Self {
        Self {
            memory_cost: 64,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        }
    }
}

/// Cloudinary-compatible store configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub cloud_name: String,
    pub api_key: String,
    /// Overridden by `STORE_API_SECRET` when set.
    #[serde(default)]
    pub api_secret: String,
    /// Folder receiving every asset.
    pub folder: Option<String>,
    /// API base URL. Default is `https://api.cloudinary.com`.
    pub endpoint: Option<String>,
}

/// Asset ingestion limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Upload {
    /// Maximum size of one asset, in bytes.
    pub max_size: usize,
    /// Per-asset upload timeout. `0` disables it.
    pub timeout_secs: u64,
    /// Accepted media types.
    pub allowed_types: Vec<String>,
}

impl Default for Upload {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            timeout_secs: 60,
            allowed_types: [
                "image/jpeg",
                "image/png",
                "image/gif",
                "video/mp4",
                "video/mpeg",
                "video/quicktime",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

impl Upload {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Whether `media_type` is in the allow-list. Parameters and case are
    /// ignored.
    pub fn accepts(&self, media_type: &str) -> bool {
        let essence = media_type.split(';').next().unwrap_or_default().trim();
        self.allowed_types
            .iter()
            .any(|allowed| allowed.trim().eq_ignore_ascii_case(essence))
    }
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            self.path.clone()
        } else {
            PathBuf::from(DEFAULT_CONFIG_PATH)
        };

        match File::open(&file_path) {
            Ok(file) => {
                let config: Configuration =
                    match serde_yaml::from_reader(file) {
                        Ok(config) => config,
                        Err(err) => {
                            return Ok(Arc::new(self.error(err)));
                        },
                    };

                Ok(Arc::new(self.finish(config)?))
            },
            Err(err) => Ok(Arc::new(self.error(err))),
        }
    }

    fn finish(&self, mut config: Configuration) -> Result<Self, url::ParseError> {
        // set app version.
        config.version = VERSION.to_owned();

        if !config.url.is_empty() {
            config.url = self.normalize_url(&config.url)?;
        }

        if let (Some(store), Ok(secret)) =
            (config.store.as_mut(), std::env::var(STORE_SECRET_ENV))
        {
            store.api_secret = secret;
        }

        Ok(config)
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found");
        Self::default()
    }
}
