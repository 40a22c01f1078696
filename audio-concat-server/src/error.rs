//! Server-specific error types

use audio_concat::ConcatError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Library error: {0}")]
    Library(#[from] ConcatError),

    #[error("Path {} is not inside the media root", .0.display())]
    PathOutsideRoot(std::path::PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
