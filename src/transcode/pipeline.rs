//! Per-segment transcoding pipeline
//!
//! Drives one input segment through `AudioDecoder` → `AudioFilterChain` →
//! `AudioEncoder` and appends the encoded packets to the session's output,
//! shifted onto the session timeline by the `TimestampTracker`.
//!
//! Every FFmpeg handle created here belongs to the segment and is released
//! when this function returns, on success and on every error path.

use std::path::Path;

use ffmpeg_next as ffmpeg;

use crate::error::{ConcatError, FfmpegError, Result};
use crate::mux::OutputSink;
use crate::negotiate::OutputTarget;
use crate::probe::SegmentSource;
use crate::timeline::TimestampTracker;

use super::decoder::AudioDecoder;
use super::encoder::AudioEncoder;
use super::filter::{AudioFilterChain, FilterTarget};

/// Counters for one transcoded segment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentStats {
    pub frames_decoded: u64,
    pub frames_encoded: u64,
    pub packets_written: u64,
}

/// Transcode `source` toward `target` and append it to `sink`.
///
/// The caller brackets the call with `tracker.begin_segment()` and
/// `tracker.end_segment(..)`. On error, packets already written stay in the
/// output.
pub fn transcode_segment(
    source: &mut SegmentSource,
    target: &OutputTarget,
    sink: &mut OutputSink,
    tracker: &mut TimestampTracker,
) -> Result<SegmentStats> {
    let path = source.path().to_path_buf();
    let stream_index = source.info().stream_index;
    let input_time_base = source.info().time_base;

    // ── 1. Decoder for the probed stream ──────────────────────────────────
    let decoder = {
        let stream = source.stream().ok_or_else(|| ConcatError::NoAudioStream {
            path: path.clone(),
        })?;
        AudioDecoder::open(&stream).map_err(|source| ConcatError::Decode {
            path: path.clone(),
            source,
        })?
    };

    // ── 2. Encoder for the session target, rebuilt per segment ────────────
    let encoder = AudioEncoder::open(target, sink.global_header()).map_err(|source| {
        ConcatError::Encode {
            path: path.clone(),
            source,
        }
    })?;

    let filter_target = FilterTarget {
        sample_format: encoder.format(),
        sample_rate: target.sample_rate,
        channel_layout: target.channel_layout,
        frame_size: encoder.frame_size(),
    };

    tracing::debug!(
        segment = %path.display(),
        stream_index,
        decoder_rate = decoder.sample_rate(),
        decoder_format = decoder.format().name(),
        encoder_format = encoder.format().name(),
        frame_size = encoder.frame_size(),
        "transcode_segment: starting"
    );

    let mut stages = Stages {
        path: &path,
        input_time_base,
        decoder,
        filter: None,
        filter_target,
        encoder,
        sink,
        tracker,
        stats: SegmentStats::default(),
    };

    // ── 3. Demux → decode → filter → encode → write ───────────────────────
    for (stream, packet) in source.input_mut().packets() {
        if stream.index() != stream_index {
            continue;
        }
        stages
            .decoder
            .send_packet(&packet)
            .map_err(|e| stages.decode_error(e))?;
        stages.drain_decoder()?;
    }

    // ── 4. Flush decoder, then filter, then encoder ───────────────────────
    stages.decoder.send_eof().map_err(|e| stages.decode_error(e))?;
    stages.drain_decoder()?;

    if let Some(filter) = stages.filter.as_mut() {
        filter.flush().map_err(|source| ConcatError::Filter {
            path: path.clone(),
            source,
        })?;
    }
    stages.drain_filter()?;

    stages.encoder.send_eof().map_err(|e| stages.encode_error(e))?;
    stages.drain_encoder()?;

    let stats = stages.stats;
    tracing::debug!(
        segment = %path.display(),
        frames_decoded = stats.frames_decoded,
        frames_encoded = stats.frames_encoded,
        packets = stats.packets_written,
        "transcode_segment: done"
    );

    Ok(stats)
}

/// The three stages of one segment plus where their output goes
struct Stages<'a> {
    path: &'a Path,
    input_time_base: ffmpeg::Rational,
    decoder: AudioDecoder,
    /// Built from the first decoded frame
    filter: Option<AudioFilterChain>,
    filter_target: FilterTarget,
    encoder: AudioEncoder,
    sink: &'a mut OutputSink,
    tracker: &'a mut TimestampTracker,
    stats: SegmentStats,
}

impl Stages<'_> {
    fn drain_decoder(&mut self) -> Result<()> {
        while let Some(frame) = self.decoder.receive_frame().map_err(|e| self.decode_error(e))? {
            self.stats.frames_decoded += 1;

            if self.filter.is_none() {
                tracing::debug!(
                    sample_rate = frame.rate(),
                    channels = frame.channels(),
                    format = frame.format().name(),
                    "creating filter chain from first frame"
                );
                let chain =
                    AudioFilterChain::new(&frame, self.input_time_base, &self.filter_target)
                        .map_err(|e| self.filter_error(e))?;
                self.filter = Some(chain);
            }
            if let Some(filter) = self.filter.as_mut() {
                if let Err(e) = filter.push(&frame) {
                    return Err(self.filter_error(e));
                }
            }
            self.drain_filter()?;
        }
        Ok(())
    }

    fn drain_filter(&mut self) -> Result<()> {
        loop {
            let pulled = match self.filter.as_mut() {
                Some(filter) => filter.pull(),
                None => return Ok(()),
            };
            let Some(frame) = pulled.map_err(|e| self.filter_error(e))? else {
                return Ok(());
            };
            self.encoder
                .send_frame(&frame)
                .map_err(|e| self.encode_error(e))?;
            self.stats.frames_encoded += 1;
            self.drain_encoder()?;
        }
    }

    fn drain_encoder(&mut self) -> Result<()> {
        while let Some(mut packet) = self
            .encoder
            .receive_packet()
            .map_err(|e| self.encode_error(e))?
        {
            packet.rescale_ts(self.encoder.time_base(), self.sink.time_base());
            let stamped = self
                .tracker
                .stamp(packet.pts(), packet.dts(), packet.duration());
            packet.set_pts(Some(stamped.pts));
            packet.set_dts(Some(stamped.dts));
            self.sink.write_packet(&mut packet)?;
            self.stats.packets_written += 1;
        }
        Ok(())
    }

    fn decode_error(&self, source: FfmpegError) -> ConcatError {
        ConcatError::Decode {
            path: self.path.to_path_buf(),
            source,
        }
    }

    fn filter_error(&self, source: FfmpegError) -> ConcatError {
        ConcatError::Filter {
            path: self.path.to_path_buf(),
            source,
        }
    }

    fn encode_error(&self, source: FfmpegError) -> ConcatError {
        ConcatError::Encode {
            path: self.path.to_path_buf(),
            source,
        }
    }
}
