//! Audio decoder for the transcoding pipeline
//!
//! Wraps an FFmpeg `AVCodecContext` to decode compressed audio packets
//! (MP3, AAC, Opus, FLAC, PCM, …) into raw PCM `AVFrame`s.

use crate::error::FfmpegError;
use ffmpeg_next as ffmpeg;

/// Audio decoder bound to one input stream
pub struct AudioDecoder {
    /// The FFmpeg decoder context
    decoder: ffmpeg::decoder::Audio,
    /// Stream index in the source file
    stream_index: usize,
}

impl AudioDecoder {
    /// Open a decoder for the given stream.
    ///
    /// Uses the stream's own codec parameters to initialise the context so no
    /// external configuration is needed.
    pub fn open(stream: &ffmpeg::format::stream::Stream) -> Result<Self, FfmpegError> {
        let stream_index = stream.index();
        let context =
            ffmpeg::codec::Context::from_parameters(stream.parameters()).map_err(|e| {
                FfmpegError::DecoderCreate(format!(
                    "Failed to create codec context for stream {}: {}",
                    stream_index, e
                ))
            })?;

        let decoder = context.decoder().audio().map_err(|e| {
            FfmpegError::DecoderNotFound(format!(
                "Failed to open audio decoder for stream {}: {}",
                stream_index, e
            ))
        })?;

        Ok(Self {
            decoder,
            stream_index,
        })
    }

    /// Send a compressed packet to the decoder.
    ///
    /// `AVERROR_INVALIDDATA` is treated as non-fatal and returns `Ok(())` with
    /// a debug log; a single corrupt packet in a clip is not worth dropping
    /// the rest of it.
    pub fn send_packet(
        &mut self,
        packet: &ffmpeg::codec::packet::Packet,
    ) -> Result<(), FfmpegError> {
        match self.decoder.send_packet(packet) {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::InvalidData) => {
                tracing::debug!(
                    stream_index = self.stream_index,
                    "send_packet: skipping invalid packet"
                );
                Ok(())
            }
            Err(e) => Err(FfmpegError::DecodePacket(format!(
                "send_packet error on stream {}: {}",
                self.stream_index, e
            ))),
        }
    }

    /// Send EOF to flush the decoder's internal buffers.
    ///
    /// EAGAIN and EOF responses are silently ignored: they mean the decoder
    /// has nothing buffered or is already finished.
    pub fn send_eof(&mut self) -> Result<(), FfmpegError> {
        match self.decoder.send_eof() {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(()),
            Err(ffmpeg::Error::Eof) => Ok(()),
            Err(e) => Err(FfmpegError::DecodePacket(format!(
                "send_eof error on stream {}: {}",
                self.stream_index, e
            ))),
        }
    }

    /// Receive one decoded PCM frame, or `None` if the decoder needs more
    /// input.
    ///
    /// The frame's PTS is replaced by its best-effort timestamp, expressed in
    /// the stream time base.
    pub fn receive_frame(
        &mut self,
    ) -> Result<Option<ffmpeg::util::frame::Audio>, FfmpegError> {
        let mut frame = ffmpeg::util::frame::Audio::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => {
                let timestamp = frame.timestamp();
                frame.set_pts(timestamp);
                Ok(Some(frame))
            }
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(FfmpegError::DecodePacket(format!(
                "receive_frame error on stream {}: {}",
                self.stream_index, e
            ))),
        }
    }

    /// Sample rate of decoded frames.
    pub fn sample_rate(&self) -> u32 {
        self.decoder.rate()
    }

    /// Sample format of decoded frames.
    pub fn format(&self) -> ffmpeg::util::format::sample::Sample {
        self.decoder.format()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_input_decoders_registered() {
        crate::ffmpeg_utils::init().unwrap();
        for id in [
            ffmpeg::codec::Id::MP3,
            ffmpeg::codec::Id::AAC,
            ffmpeg::codec::Id::PCM_S16LE,
            ffmpeg::codec::Id::FLAC,
        ] {
            let decoder = ffmpeg::codec::decoder::find(id);
            assert!(decoder.is_some(), "no decoder for {:?}", id);
            assert_eq!(decoder.unwrap().id(), id);
        }
    }
}
