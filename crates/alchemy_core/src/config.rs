//! World configuration

use crate::ecs::storage::DEFAULT_CHUNK_BYTES;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Tunables for a [`World`](crate::ecs::World).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Byte budget of each chunk.
    pub chunk_bytes: usize,
    /// Entity table slots reserved up front.
    pub initial_entity_capacity: usize,
    /// Size of a dedicated pool for parallel queries. `None` uses rayon's
    /// global pool.
    pub worker_threads: Option<usize>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            initial_entity_capacity: 1024,
            worker_threads: None,
        }
    }
}

impl WorldConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "chunk_bytes",
                reason: "must be greater than zero",
            });
        }
        if self.worker_threads == Some(0) {
            return Err(ConfigError::Invalid {
                field: "worker_threads",
                reason: "must be at least 1 when set",
            });
        }
        Ok(())
    }
}

/// Errors raised while loading a [`WorldConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}
