//! Audio filter chain for the transcoding pipeline
//!
//! Converts decoded PCM frames to the encoder's sample format, the output
//! sample rate and a mono/stereo layout, then regroups them into frames of
//! exactly the encoder's frame size:
//!
//! ```text
//! abuffer -> aformat -> aresample -> asetnsamples -> abuffersink
//! ```
//!
//! Frames leaving the chain are timestamped in `1 / sample_rate`, which is
//! also the encoder time base.

use crate::error::FfmpegError;
use crate::ffmpeg_utils::helpers::{abuffer_layout_arg, frame_channel_layout};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::filter;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::Sample;

/// Where the chain converts to
#[derive(Debug, Clone, Copy)]
pub struct FilterTarget {
    pub sample_format: Sample,
    pub sample_rate: u32,
    pub channel_layout: ChannelLayout,
    /// Samples per channel in every emitted frame but the last
    pub frame_size: usize,
}

/// Filter graph bound to one segment.
///
/// The source side is configured from the first decoded frame, so a new
/// chain is built for every segment.
pub struct AudioFilterChain {
    graph: filter::Graph,
}

impl AudioFilterChain {
    /// Build the chain for frames shaped like `first_frame`.
    ///
    /// `time_base` is the time base of the decoded frames' timestamps.
    pub fn new(
        first_frame: &ffmpeg::util::frame::Audio,
        time_base: ffmpeg::Rational,
        target: &FilterTarget,
    ) -> Result<Self, FfmpegError> {
        let layout = frame_channel_layout(first_frame);
        let source_args = abuffer_args(
            time_base,
            first_frame.rate(),
            first_frame.format(),
            layout.bits(),
            first_frame.channels(),
        );
        let spec = filter_spec(
            target.sample_format.name(),
            target.sample_rate,
            layout_name(target.channel_layout),
            target.frame_size,
        );

        tracing::debug!(
            source = %source_args,
            filters = %spec,
            "building audio filter chain"
        );

        let mut graph = filter::Graph::new();
        graph
            .add(&find_filter("abuffer")?, "in", &source_args)
            .map_err(|e| graph_error("cannot create abuffer", e))?;
        graph
            .add(&find_filter("abuffersink")?, "out", "")
            .map_err(|e| graph_error("cannot create abuffersink", e))?;

        graph
            .output("in", 0)
            .and_then(|parser| parser.input("out", 0))
            .and_then(|parser| parser.parse(&spec))
            .map_err(|e| graph_error("cannot parse filter chain", e))?;
        graph
            .validate()
            .map_err(|e| graph_error("filter chain does not validate", e))?;

        Ok(Self { graph })
    }

    /// Feed one decoded frame.
    pub fn push(&mut self, frame: &ffmpeg::util::frame::Audio) -> Result<(), FfmpegError> {
        self.endpoint("in")?
            .source()
            .add(frame)
            .map_err(|e| graph_error("cannot push frame", e))
    }

    /// Signal end of input so the chain releases its buffered samples.
    pub fn flush(&mut self) -> Result<(), FfmpegError> {
        self.endpoint("in")?
            .source()
            .flush()
            .map_err(|e| graph_error("cannot flush", e))
    }

    /// Pull one converted frame, or `None` when the chain needs more input
    /// (or is drained after `flush`).
    pub fn pull(&mut self) -> Result<Option<ffmpeg::util::frame::Audio>, FfmpegError> {
        let mut frame = ffmpeg::util::frame::Audio::empty();
        match self.endpoint("out")?.sink().frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(graph_error("cannot pull frame", e)),
        }
    }

    fn endpoint(&mut self, name: &str) -> Result<filter::Context<'_>, FfmpegError> {
        self.graph
            .get(name)
            .ok_or_else(|| FfmpegError::FilterGraph(format!("filter {:?} missing from graph", name)))
    }
}

/// The conversion part of the chain, between `abuffer` and `abuffersink`.
///
/// Resampling with `async=1:first_pts=0` stretches or pads small timestamp
/// gaps so the chain emits a continuous run of samples starting at zero.
/// Padding the last frame is disabled; encoders accept a short final frame.
pub fn filter_spec(
    sample_format: &str,
    sample_rate: u32,
    channel_layout: &str,
    frame_size: usize,
) -> String {
    format!(
        "aformat=sample_fmts={}:sample_rates={}:channel_layouts={},\
         aresample=async=1:first_pts=0,\
         asetnsamples=n={}:p=0",
        sample_format, sample_rate, channel_layout, frame_size
    )
}

/// Arguments of the `abuffer` source.
pub fn abuffer_args(
    time_base: ffmpeg::Rational,
    sample_rate: u32,
    sample_format: Sample,
    layout_bits: u64,
    channels: u16,
) -> String {
    format!(
        "time_base={}/{}:sample_rate={}:sample_fmt={}:channel_layout={}",
        time_base.numerator(),
        time_base.denominator(),
        sample_rate,
        sample_format.name(),
        abuffer_layout_arg(layout_bits, channels)
    )
}

/// Layout name understood by `aformat`.
pub fn layout_name(layout: ChannelLayout) -> &'static str {
    if layout.channels() == 1 {
        "mono"
    } else {
        "stereo"
    }
}

fn find_filter(name: &str) -> Result<filter::Filter, FfmpegError> {
    filter::find(name)
        .ok_or_else(|| FfmpegError::FilterGraph(format!("filter {} not available", name)))
}

fn graph_error(what: &str, e: ffmpeg::Error) -> FfmpegError {
    FfmpegError::FilterGraph(format!("{}: {}", what, e))
}
