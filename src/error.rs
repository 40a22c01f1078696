use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for a concatenation session
#[derive(Error, Debug)]
pub enum ConcatError {
    /// An input file is missing, unreadable or not a media container
    #[error("Failed to open input {}: {source}", .path.display())]
    OpenInput {
        path: PathBuf,
        #[source]
        source: FfmpegError,
    },

    /// The input container carries no audio track
    #[error("No audio stream found in {}", .path.display())]
    NoAudioStream { path: PathBuf },

    /// Neither the requested encoder nor its fallback exists in this FFmpeg build
    #[error("No usable encoder: {requested} unavailable{}", fallback_suffix(.fallback))]
    EncoderUnavailable {
        requested: &'static str,
        fallback: Option<&'static str>,
    },

    /// Decoding a segment failed midway
    #[error("Decode error in {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: FfmpegError,
    },

    /// Building or driving the filter graph failed
    #[error("Filter graph error in {}: {source}", .path.display())]
    Filter {
        path: PathBuf,
        #[source]
        source: FfmpegError,
    },

    /// The encoder rejected a frame or could not be opened
    #[error("Encode error in {}: {source}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: FfmpegError,
    },

    /// Writing the output container failed (disk full, permissions, muxer rejection)
    #[error("Write error on {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: FfmpegError,
    },

    /// Nothing could be written: the input list was empty or no segment produced audio
    #[error("No usable segments ({skipped} skipped)")]
    NoUsableSegments { skipped: usize },

    /// An error originating from FFmpeg outside of a specific segment
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] FfmpegError),
}

fn fallback_suffix(fallback: &Option<&'static str>) -> String {
    fallback
        .map(|f| format!(", fallback {} unavailable", f))
        .unwrap_or_default()
}

/// Pipeline stage an error (or a skipped segment) is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Open,
    Probe,
    Negotiate,
    Decode,
    Filter,
    Encode,
    Write,
    Session,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Open => "open",
            Stage::Probe => "probe",
            Stage::Negotiate => "negotiate",
            Stage::Decode => "decode",
            Stage::Filter => "filter",
            Stage::Encode => "encode",
            Stage::Write => "write",
            Stage::Session => "session",
        };
        f.write_str(name)
    }
}

impl ConcatError {
    /// The stage this error is attributed to.
    pub fn stage(&self) -> Stage {
        match self {
            ConcatError::OpenInput { .. } => Stage::Open,
            ConcatError::NoAudioStream { .. } => Stage::Probe,
            ConcatError::EncoderUnavailable { .. } => Stage::Negotiate,
            ConcatError::Decode { .. } => Stage::Decode,
            ConcatError::Filter { .. } => Stage::Filter,
            ConcatError::Encode { .. } => Stage::Encode,
            ConcatError::Write { .. } => Stage::Write,
            ConcatError::NoUsableSegments { .. }
            | ConcatError::Ffmpeg(_) => Stage::Session,
        }
    }

    /// The file that caused the error, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConcatError::OpenInput { path, .. }
            | ConcatError::NoAudioStream { path }
            | ConcatError::Decode { path, .. }
            | ConcatError::Filter { path, .. }
            | ConcatError::Encode { path, .. }
            | ConcatError::Write { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Whether this error ends the whole session even when it happens on a
    /// segment after the first one.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            ConcatError::EncoderUnavailable { .. }
                | ConcatError::Write { .. }
                | ConcatError::NoUsableSegments { .. }
                | ConcatError::Ffmpeg(_)
        )
    }
}

/// FFmpeg-specific errors
#[derive(Error, Debug)]
pub enum FfmpegError {
    /// Failure during global FFmpeg initialization
    #[error("FFmpeg initialization failed: {0}")]
    InitFailed(String),

    /// Failure opening an input media file
    #[error("Failed to open input file: {0}")]
    OpenInput(String),

    /// The requested decoder for a specific codec ID was not found
    #[error("Failed to find decoder: codec_id={0}")]
    DecoderNotFound(String),

    /// Failure instantiating a decoder
    #[error("Failed to create decoder: {0}")]
    DecoderCreate(String),

    /// The requested encoder for a specific codec ID was not found
    #[error("Failed to find encoder: codec_id={0}")]
    EncoderNotFound(String),

    /// Failure instantiating or opening an encoder
    #[error("Failed to create encoder: {0}")]
    EncoderCreate(String),

    /// Failure building, configuring or driving the filter graph
    #[error("Filter graph failure: {0}")]
    FilterGraph(String),

    /// Failure creating an output format muxer
    #[error("Failed to create muxer: {0}")]
    MuxerCreate(String),

    /// Failure configuring the output stream
    #[error("Stream configuration failed: {0}")]
    StreamConfig(String),

    /// Failure writing the container header
    #[error("Failed to write header: {0}")]
    WriteHeader(String),

    /// Failure writing a media packet to the container
    #[error("Failed to write packet: {0}")]
    WritePacket(String),

    /// Failure writing the container trailer
    #[error("Failed to write trailer: {0}")]
    WriteTrailer(String),

    /// Failure decoding a single packet into a frame
    #[error("Failed to decode packet: {0}")]
    DecodePacket(String),

    /// Failure encoding a single frame into a packet
    #[error("Failed to encode frame: {0}")]
    EncodeFrame(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ConcatError>;
