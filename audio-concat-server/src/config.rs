//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, ServerError};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level for the audio_concat crates (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (`pretty` or `json`)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }

    /// Filter directive used when `RUST_LOG` is not set
    pub fn default_filter(&self) -> String {
        format!(
            "audio_concat={0},audio_concat_server={0},ffmpeg=warn,tower_http=debug",
            self.level
        )
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Directory relative input and output paths are resolved against
    pub media_root: PathBuf,

    /// Sessions allowed to run at the same time; further requests wait
    pub max_concurrent_sessions: usize,

    /// Enable CORS
    pub cors_enabled: bool,

    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            media_root: PathBuf::from("."),
            max_concurrent_sessions: 4,
            cors_enabled: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| ServerError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Resolve a request path inside `media_root`.
    ///
    /// Only relative paths made of plain components are accepted, and the
    /// deepest existing ancestor must not leave the root through a symlink.
    pub fn resolve(&self, path: &Path) -> Result<PathBuf> {
        let plain = path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !plain || path.as_os_str().is_empty() {
            return Err(ServerError::PathOutsideRoot(path.to_path_buf()));
        }

        let resolved = self.media_root.join(path);
        let root = self.media_root.canonicalize()?;
        let mut existing = resolved.as_path();
        while !existing.exists() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => break,
            }
        }
        if !existing.canonicalize()?.starts_with(&root) {
            return Err(ServerError::PathOutsideRoot(path.to_path_buf()));
        }

        Ok(resolved)
    }
}
