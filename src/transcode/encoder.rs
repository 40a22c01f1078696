//! Audio encoder for the transcoding pipeline
//!
//! Wraps an FFmpeg `AVCodecContext` to encode PCM frames into MP3 or AAC
//! packets for the session's output target.

use crate::error::FfmpegError;
use crate::ffmpeg_utils::helpers::{encoder_codec_parameters, encoder_sample_formats};
use crate::negotiate::{preferred_sample_format, OutputTarget, DEFAULT_FRAME_SIZE};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec;

/// Encoder for the session's output codec, rebuilt for every segment
pub struct AudioEncoder {
    encoder: ffmpeg::encoder::Audio,
    frame_size: usize,
    time_base: ffmpeg::Rational,
}

impl AudioEncoder {
    /// Open an encoder for `target`.
    ///
    /// The sample format is the encoder's own preferred one, so the filter
    /// chain converts to exactly what the codec accepts. Set `global_header`
    /// when the output container wants codec headers out of band.
    pub fn open(target: &OutputTarget, global_header: bool) -> Result<Self, FfmpegError> {
        let codec = codec::encoder::find(target.codec.id()).ok_or_else(|| {
            FfmpegError::EncoderNotFound(format!(
                "{} encoder not found in this FFmpeg build",
                target.codec
            ))
        })?;
        let sample_format = preferred_sample_format(&encoder_sample_formats(&codec));

        // Build context and configure the audio encoder BEFORE opening
        let mut context = codec::Context::new_with_codec(codec);
        context.set_time_base(target.time_base);
        if global_header {
            context.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut audio_enc = context.encoder().audio().map_err(|e| {
            FfmpegError::EncoderCreate(format!("Cannot get audio encoder handle: {}", e))
        })?;

        audio_enc.set_rate(target.sample_rate as i32);
        audio_enc.set_format(sample_format);
        audio_enc.set_channel_layout(target.channel_layout);
        audio_enc.set_bit_rate(target.bit_rate as usize);

        let encoder = audio_enc.open_as(codec).map_err(|e| {
            FfmpegError::EncoderCreate(format!(
                "Failed to open {} encoder ({} Hz, {}, {} ch, {} bps): {}",
                target.codec,
                target.sample_rate,
                sample_format.name(),
                target.channels(),
                target.bit_rate,
                e
            ))
        })?;

        let frame_size = match encoder.frame_size() {
            0 => DEFAULT_FRAME_SIZE,
            n => n as usize,
        };

        Ok(Self {
            encoder,
            frame_size,
            time_base: target.time_base,
        })
    }

    /// Send one PCM frame to the encoder.
    pub fn send_frame(&mut self, frame: &ffmpeg::util::frame::Audio) -> Result<(), FfmpegError> {
        self.encoder
            .send_frame(frame)
            .map_err(|e| FfmpegError::EncodeFrame(format!("send_frame error: {}", e)))
    }

    /// Send EOF to flush the encoder's buffered output.
    pub fn send_eof(&mut self) -> Result<(), FfmpegError> {
        match self.encoder.send_eof() {
            Ok(()) | Err(ffmpeg::Error::Eof) => Ok(()),
            Err(e) => Err(FfmpegError::EncodeFrame(format!("send_eof error: {}", e))),
        }
    }

    /// Receive one encoded packet, or `None` if the encoder needs more input.
    ///
    /// Packet timestamps are in [`time_base`](Self::time_base).
    pub fn receive_packet(&mut self) -> Result<Option<ffmpeg::codec::packet::Packet>, FfmpegError> {
        let mut packet = ffmpeg::codec::packet::Packet::empty();
        match self.encoder.receive_packet(&mut packet) {
            Ok(()) => Ok(Some(packet)),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(FfmpegError::EncodeFrame(format!(
                "receive_packet error: {}",
                e
            ))),
        }
    }

    /// The number of samples per channel the encoder expects per frame.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// The sample format the encoder was opened with.
    pub fn format(&self) -> ffmpeg::util::format::sample::Sample {
        self.encoder.format()
    }

    /// The encoder time base (1 / sample_rate).
    pub fn time_base(&self) -> ffmpeg::Rational {
        self.time_base
    }

    /// Codec parameters for the encoded stream (for muxer stream setup).
    pub fn codec_parameters(&self) -> ffmpeg::codec::Parameters {
        encoder_codec_parameters(&self.encoder)
    }
}
