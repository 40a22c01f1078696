//! Audio Concatenation Server
//!
//! Serves the audio-concat library over HTTP: a client posts an ordered list
//! of segment files and an output path, the server writes the joined file
//! and answers with the session report.

mod config;
mod error;
mod http;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audio_concat::{ConcatError, EncoderRegistry};

use crate::config::{LoggingConfig, ServerConfig};
use crate::error::{Result, ServerError};
use crate::http::create_router;
use crate::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "audio-concat-server";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let loaded = if std::path::Path::new(&config_path).exists() {
        Some(ServerConfig::from_file(&config_path))
    } else {
        None
    };

    // Logging settings come from the file, so the load outcome is reported
    // once the subscriber is up.
    let config = match loaded {
        Some(Ok(config)) => {
            init_logging(&config.logging);
            config
        }
        Some(Err(e)) => {
            let config = ServerConfig::default();
            init_logging(&config.logging);
            tracing::warn!(
                "Failed to load config file {}: {}. Using defaults.",
                config_path,
                e
            );
            config
        }
        None => {
            let config = ServerConfig::default();
            init_logging(&config.logging);
            config
        }
    };

    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    tracing::info!("FFmpeg version: {}", audio_concat::ffmpeg_version_info());

    audio_concat::init().map_err(ConcatError::from)?;
    audio_concat::install_log_filter();
    tracing::info!("FFmpeg initialized successfully");
    tracing::info!("Configuration loaded: {:?}", config);

    let registry = EncoderRegistry::probe();
    let state = Arc::new(AppState::new(config.clone(), registry));

    let app = create_router(state);

    let addr: SocketAddr = config
        .socket_addr()
        .parse()
        .map_err(|e| ServerError::Config(format!("bad listen address: {}", e)))?;
    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Initialize logging with tracing
fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.default_filter().into());
    let registry = tracing_subscriber::registry().with(filter);

    if logging.is_json() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
