//! Application state shared across all handlers

use std::sync::Arc;
use tokio::sync::Semaphore;

use audio_concat::EncoderRegistry;

use crate::config::ServerConfig;

pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,

    /// Encoders found in the linked FFmpeg build, probed once at startup
    pub registry: Arc<EncoderRegistry>,

    /// One permit per running concatenation session
    pub sessions: Arc<Semaphore>,
}

impl AppState {
    pub fn new(config: ServerConfig, registry: EncoderRegistry) -> Self {
        let permits = config.max_concurrent_sessions.max(1);
        Self {
            config,
            registry: Arc::new(registry),
            sessions: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Sessions that could start right now without waiting
    pub fn idle_session_slots(&self) -> usize {
        self.sessions.available_permits()
    }
}
