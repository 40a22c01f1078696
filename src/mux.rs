//! Output container
//!
//! Opens the destination file with the negotiated muxer, declares the single
//! audio stream, writes the header once and the trailer once. Until the
//! trailer has been written the file is treated as partial and removed when
//! the sink is dropped.

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;

use crate::error::{ConcatError, FfmpegError, Result};
use crate::ffmpeg_utils::helpers::stream_reset_codec_tag;
use crate::negotiate::OutputTarget;
use crate::transcode::encoder::AudioEncoder;

/// Deletes the output file on drop unless disarmed.
#[derive(Debug)]
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::warn!(output = %self.path.display(), "removed partial output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                output = %self.path.display(),
                error = %e,
                "could not remove partial output"
            ),
        }
    }
}

/// What the sink wrote
#[derive(Debug, Clone, Copy)]
pub struct SinkSummary {
    pub packets: u64,
    pub time_base: ffmpeg::Rational,
}

/// The session's output file with its one audio stream
pub struct OutputSink {
    // Declared before `partial` so the file is closed before it is removed.
    output: ffmpeg::format::context::Output,
    path: PathBuf,
    global_header: bool,
    /// Stream time base chosen by the muxer when the header was written
    time_base: ffmpeg::Rational,
    packets: u64,
    partial: PartialFile,
}

impl OutputSink {
    /// Create the output file, declare the stream for `target` and write the
    /// header.
    ///
    /// An encoder for `target` is opened once here so the stream carries the
    /// exact codec parameters (including extradata) the per-segment encoders
    /// will produce.
    pub fn create(path: &Path, target: &OutputTarget) -> Result<Self> {
        let output = match target.container.muxer_name() {
            Some(muxer) => ffmpeg::format::output_as(path, muxer),
            None => ffmpeg::format::output(path),
        }
        .map_err(|e| write_error(path, FfmpegError::MuxerCreate(e.to_string())))?;
        let partial = PartialFile::new(path);

        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let encoder =
            AudioEncoder::open(target, global_header).map_err(|source| ConcatError::Encode {
                path: path.to_path_buf(),
                source,
            })?;

        let mut sink = Self {
            output,
            path: path.to_path_buf(),
            global_header,
            time_base: target.time_base,
            packets: 0,
            partial,
        };
        sink.declare_stream(&encoder)?;

        sink.output.write_header().map_err(|e| {
            write_error(path, FfmpegError::WriteHeader(e.to_string()))
        })?;
        sink.time_base = sink
            .output
            .stream(0)
            .map(|s| s.time_base())
            .unwrap_or(target.time_base);

        tracing::info!(
            output = %path.display(),
            muxer = sink.output.format().name(),
            global_header,
            time_base = ?sink.time_base,
            "output header written"
        );

        Ok(sink)
    }

    fn declare_stream(&mut self, encoder: &AudioEncoder) -> Result<()> {
        let mut stream = self
            .output
            .add_stream(ffmpeg::encoder::find(ffmpeg::codec::Id::None))
            .map_err(|e| {
                write_error(
                    &self.path,
                    FfmpegError::StreamConfig(format!("add_stream: {}", e)),
                )
            })?;
        stream.set_parameters(encoder.codec_parameters());
        stream_reset_codec_tag(&mut stream);
        stream.set_time_base(encoder.time_base());
        Ok(())
    }

    /// Write one packet whose timestamps are already in
    /// [`time_base`](Self::time_base).
    pub fn write_packet(&mut self, packet: &mut ffmpeg::Packet) -> Result<()> {
        packet.set_stream(0);
        packet.set_position(-1);
        packet
            .write_interleaved(&mut self.output)
            .map_err(|e| write_error(&self.path, FfmpegError::WritePacket(e.to_string())))?;
        self.packets += 1;
        Ok(())
    }

    /// Write the trailer and keep the file.
    pub fn finish(mut self) -> Result<SinkSummary> {
        self.output
            .write_trailer()
            .map_err(|e| write_error(&self.path, FfmpegError::WriteTrailer(e.to_string())))?;
        self.partial.disarm();

        tracing::debug!(
            output = %self.path.display(),
            packets = self.packets,
            "output trailer written"
        );

        Ok(SinkSummary {
            packets: self.packets,
            time_base: self.time_base,
        })
    }

    /// Whether encoders must be opened with out-of-band headers
    pub fn global_header(&self) -> bool {
        self.global_header
    }

    /// Effective stream time base
    pub fn time_base(&self) -> ffmpeg::Rational {
        self.time_base
    }

    pub fn packets_written(&self) -> u64 {
        self.packets
    }
}

fn write_error(path: &Path, source: FfmpegError) -> ConcatError {
    ConcatError::Write {
        path: path.to_path_buf(),
        source,
    }
}
