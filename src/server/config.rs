use crate::core::StoreError;
use crate::web::router::DEFAULT_MAX_BODY_BYTES;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "docgate.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid store connection: {0}")]
    Connection(#[from] StoreError),
}

/// Gateway settings, read from a JSON file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Store connection string
    pub connection: String,
    pub web_port: u16,
    pub web_host: String,
    /// Driver options, merged over the connection string's own
    pub client: Map<String, Value>,
    pub request_timeout_ms: u64,
    /// Larger request bodies are rejected with `invalid_body`
    pub max_body_bytes: usize,
    /// Host an in-process deployment at the connection address
    pub embedded_store: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            connection: "docstore://localhost:27017".to_string(),
            web_port: 8081,
            web_host: "0.0.0.0".to_string(),
            client: Map::new(),
            request_timeout_ms: 10_000,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            embedded_store: true,
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.web_host, self.web_port)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `path`, first writing the defaults there if it does not exist
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            let defaults = Self::default();
            defaults.save(path)?;
            warn!(path = %path.display(), "config file not found, wrote defaults");
        }
        Self::load(path)
    }

    /// Atomic write: temp file in the target directory, then rename
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut file = NamedTempFile::new_in(dir).map_err(io_error)?;
        file.write_all(json.as_bytes()).map_err(io_error)?;
        file.write_all(b"\n").map_err(io_error)?;
        file.persist(path).map_err(|err| io_error(err.error))?;
        Ok(())
    }
}
