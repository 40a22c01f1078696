//! Gapless concatenation of audio segments into one MP3 or AAC file.
//!
//! ```no_run
//! use audio_concat::{ConcatSession, EncoderRegistry};
//!
//! audio_concat::init()?;
//! let registry = EncoderRegistry::probe();
//! let report = ConcatSession::new(["001.wav", "002.mp3"], "chapter.m4a", &registry).run()?;
//! println!("{} segments, {:.1}s", report.segments_written, report.duration_secs);
//! # Ok::<(), audio_concat::ConcatError>(())
//! ```

pub mod capabilities;
pub mod error;
pub mod ffmpeg_utils;
pub mod mux;
pub mod negotiate;
pub mod probe;
pub mod session;
pub mod timeline;
pub mod transcode;

#[cfg(test)]
pub(crate) mod tests;

use std::path::{Path, PathBuf};

pub use capabilities::{CodecCapabilities, EncoderCapability, EncoderRegistry, StaticCapabilities};
pub use error::{ConcatError, FfmpegError, Result, Stage};
pub use ffmpeg_utils::version_info as ffmpeg_version_info;
pub use ffmpeg_utils::{init, install_log_filter};
pub use negotiate::{ContainerKind, OutputCodec, OutputTarget};
pub use session::{ConcatReport, ConcatSession, SegmentWarning, SkippedSegment, WarningKind};

/// Concatenate `inputs` into `output` in one blocking call.
pub fn concatenate<P: AsRef<Path>>(
    inputs: &[P],
    output: &Path,
    caps: &dyn CodecCapabilities,
) -> Result<ConcatReport> {
    let inputs: Vec<PathBuf> = inputs.iter().map(|p| p.as_ref().to_path_buf()).collect();
    ConcatSession::new(inputs, output, caps).run()
}
