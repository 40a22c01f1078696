//! Segment prober
//!
//! Opens one input file, picks its first audio stream and reads the
//! stream's native parameters.

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::format::sample::Sample;

use crate::error::{ConcatError, FfmpegError, Result};
use crate::ffmpeg_utils::helpers::{
    codec_params_bit_rate, codec_params_channels, codec_params_sample_rate,
    context_sample_format,
};
use crate::ffmpeg_utils::utils::{rescale_ts, AV_TIME_BASE_Q};

/// Parameters of the audio stream selected from one input segment
#[derive(Debug, Clone)]
pub struct SegmentInfo {
    pub path: PathBuf,
    /// Index of the first audio stream in the container
    pub stream_index: usize,
    pub codec_id: ffmpeg::codec::Id,
    pub sample_rate: u32,
    pub sample_format: Sample,
    pub channels: u16,
    /// Declared bit rate, 0 when unknown
    pub bit_rate: u64,
    /// Time base of the audio stream's packets
    pub time_base: ffmpeg::Rational,
    /// Duration in microseconds, `None` when neither the container nor the
    /// stream declares one
    pub duration_us: Option<i64>,
}

impl SegmentInfo {
    /// Duration expressed in `time_base`, when known.
    pub fn duration_in(&self, time_base: ffmpeg::Rational) -> Option<i64> {
        self.duration_us
            .map(|us| rescale_ts(us, AV_TIME_BASE_Q, time_base))
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_us.map(|us| us as f64 / 1_000_000.0)
    }
}

/// An opened input segment: the demuxer plus the probed audio stream.
///
/// Dropping it closes the input.
pub struct SegmentSource {
    input: ffmpeg::format::context::Input,
    info: SegmentInfo,
}

impl SegmentSource {
    /// Open `path` and select its first audio stream.
    pub fn open(path: &Path) -> Result<Self> {
        let input = ffmpeg::format::input(path).map_err(|e| ConcatError::OpenInput {
            path: path.to_path_buf(),
            source: FfmpegError::OpenInput(e.to_string()),
        })?;

        let info = probe_input(path, &input)?;

        tracing::debug!(
            segment = %path.display(),
            stream_index = info.stream_index,
            codec = info.codec_id.name(),
            sample_rate = info.sample_rate,
            sample_format = info.sample_format.name(),
            channels = info.channels,
            bit_rate = info.bit_rate,
            duration_us = ?info.duration_us,
            "segment probed"
        );

        Ok(Self { input, info })
    }

    pub fn info(&self) -> &SegmentInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.info.path
    }

    /// Mutable access to the demuxer for packet reading.
    pub fn input_mut(&mut self) -> &mut ffmpeg::format::context::Input {
        &mut self.input
    }

    /// The selected audio stream.
    pub fn stream(&self) -> Option<ffmpeg::Stream<'_>> {
        self.input.stream(self.info.stream_index)
    }
}

/// Locate the first audio stream of an opened input and read its parameters.
fn probe_input(path: &Path, input: &ffmpeg::format::context::Input) -> Result<SegmentInfo> {
    let stream = input
        .streams()
        .find(|s| s.parameters().medium() == ffmpeg::media::Type::Audio)
        .ok_or_else(|| ConcatError::NoAudioStream {
            path: path.to_path_buf(),
        })?;

    let params = stream.parameters();
    let context = ffmpeg::codec::Context::from_parameters(params.clone()).map_err(|e| {
        ConcatError::OpenInput {
            path: path.to_path_buf(),
            source: FfmpegError::DecoderCreate(format!(
                "cannot read codec parameters of stream {}: {}",
                stream.index(),
                e
            )),
        }
    })?;

    Ok(SegmentInfo {
        path: path.to_path_buf(),
        stream_index: stream.index(),
        codec_id: params.id(),
        sample_rate: codec_params_sample_rate(&params),
        sample_format: context_sample_format(&context),
        channels: codec_params_channels(&params),
        bit_rate: codec_params_bit_rate(&params),
        time_base: stream.time_base(),
        duration_us: resolve_duration_us(
            input.duration(),
            stream.duration(),
            stream.time_base(),
        ),
    })
}

/// Container duration when declared, else the stream's own duration.
///
/// Both are `AV_NOPTS_VALUE` (or non-positive) when unknown.
pub fn resolve_duration_us(
    container_us: i64,
    stream_duration: i64,
    stream_time_base: ffmpeg::Rational,
) -> Option<i64> {
    if container_us > 0 && container_us != ffmpeg::ffi::AV_NOPTS_VALUE {
        return Some(container_us);
    }
    if stream_duration > 0
        && stream_duration != ffmpeg::ffi::AV_NOPTS_VALUE
        && stream_time_base.denominator() != 0
    {
        return Some(rescale_ts(stream_duration, stream_time_base, AV_TIME_BASE_Q));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_duration_prefers_container() {
        let tb = ffmpeg::Rational::new(1, 48000);
        assert_eq!(resolve_duration_us(2_500_000, 48000, tb), Some(2_500_000));
    }

    #[test]
    fn test_resolve_duration_falls_back_to_stream() {
        let tb = ffmpeg::Rational::new(1, 48000);
        assert_eq!(
            resolve_duration_us(ffmpeg::ffi::AV_NOPTS_VALUE, 96000, tb),
            Some(2_000_000)
        );
    }

    #[test]
    fn test_resolve_duration_unknown() {
        let tb = ffmpeg::Rational::new(1, 48000);
        assert_eq!(resolve_duration_us(0, ffmpeg::ffi::AV_NOPTS_VALUE, tb), None);
        assert_eq!(resolve_duration_us(-1, 0, ffmpeg::Rational::new(0, 1)), None);
    }

    #[test]
    fn test_duration_in_output_time_base() {
        let info = SegmentInfo {
            path: PathBuf::from("a.wav"),
            stream_index: 0,
            codec_id: ffmpeg::codec::Id::PCM_S16LE,
            sample_rate: 16000,
            sample_format: Sample::I16(ffmpeg::util::format::sample::Type::Packed),
            channels: 1,
            bit_rate: 256_000,
            time_base: ffmpeg::Rational::new(1, 16000),
            duration_us: Some(1_500_000),
        };
        assert_eq!(info.duration_in(ffmpeg::Rational::new(1, 44100)), Some(66150));
        assert_eq!(info.duration_secs(), Some(1.5));
    }

    #[test]
    fn test_open_missing_file() {
        crate::ffmpeg_utils::init().unwrap();
        match SegmentSource::open(Path::new("/definitely/not/here.wav")) {
            Err(ConcatError::OpenInput { path, .. }) => {
                assert_eq!(path, PathBuf::from("/definitely/not/here.wav"))
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("opening a missing file should fail"),
        }
    }
}
