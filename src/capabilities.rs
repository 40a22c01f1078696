//! Codec capability registry
//!
//! Answers "is encoder X available" for the output negotiation. The FFmpeg
//! registry is queried once at startup; afterwards the result is read-only
//! and passed by reference into every session.

use ffmpeg_next as ffmpeg;
use serde::Serialize;

use crate::ffmpeg_utils::helpers::encoder_sample_formats;
use crate::negotiate::OutputCodec;

/// Encoder availability as seen by the output negotiation.
pub trait CodecCapabilities: Send + Sync {
    /// Whether an encoder for `codec` can be opened.
    fn is_encoder_available(&self, codec: OutputCodec) -> bool;
}

/// Audio encoders worth reporting on at startup.
const REPORTED_ENCODERS: &[(ffmpeg::codec::Id, &str)] = &[
    (ffmpeg::codec::Id::MP3, "MP3"),
    (ffmpeg::codec::Id::AAC, "AAC"),
    (ffmpeg::codec::Id::OPUS, "Opus"),
    (ffmpeg::codec::Id::VORBIS, "Vorbis"),
    (ffmpeg::codec::Id::MP2, "MP2"),
    (ffmpeg::codec::Id::FLAC, "FLAC"),
];

/// One line of the capability report
#[derive(Debug, Clone, Serialize)]
pub struct EncoderCapability {
    /// Human-readable codec label
    pub label: &'static str,
    /// FFmpeg codec name (`mp3`, `aac`, ...)
    pub codec: &'static str,
    /// Name of the encoder implementation FFmpeg picked (`libmp3lame`, `aac`, ...)
    pub encoder: Option<String>,
    /// Whether the encoder is registered in this FFmpeg build
    pub available: bool,
    /// Accepted sample formats, in the encoder's order of preference
    pub sample_formats: Vec<String>,
}

/// Encoder registry backed by the linked FFmpeg build.
#[derive(Debug, Clone, Serialize)]
pub struct EncoderRegistry {
    encoders: Vec<EncoderCapability>,
}

impl EncoderRegistry {
    /// Query FFmpeg for every reported encoder.
    ///
    /// `ffmpeg_utils::init()` must have been called first.
    pub fn probe() -> Self {
        let encoders = REPORTED_ENCODERS
            .iter()
            .map(|&(id, label)| match ffmpeg::encoder::find(id) {
                Some(codec) => EncoderCapability {
                    label,
                    codec: id.name(),
                    encoder: Some(codec.name().to_string()),
                    available: true,
                    sample_formats: encoder_sample_formats(&codec)
                        .into_iter()
                        .map(|f| f.name().to_string())
                        .collect(),
                },
                None => EncoderCapability {
                    label,
                    codec: id.name(),
                    encoder: None,
                    available: false,
                    sample_formats: Vec::new(),
                },
            })
            .collect();

        let registry = Self { encoders };
        registry.log_report();
        registry
    }

    /// All reported encoders, available or not.
    pub fn encoders(&self) -> &[EncoderCapability] {
        &self.encoders
    }

    /// Look up the report line for a codec name.
    pub fn get(&self, codec: &str) -> Option<&EncoderCapability> {
        self.encoders.iter().find(|e| e.codec == codec)
    }

    fn log_report(&self) {
        for enc in &self.encoders {
            if enc.available {
                tracing::info!(
                    codec = enc.codec,
                    encoder = enc.encoder.as_deref().unwrap_or_default(),
                    sample_formats = ?enc.sample_formats,
                    "{} encoder available",
                    enc.label
                );
            } else {
                tracing::info!(codec = enc.codec, "{} encoder not available", enc.label);
            }
        }
    }
}

impl CodecCapabilities for EncoderRegistry {
    fn is_encoder_available(&self, codec: OutputCodec) -> bool {
        self.get(codec.name()).map(|e| e.available).unwrap_or(false)
    }
}

/// A fixed set of available output codecs.
///
/// Used to pin the negotiation policy regardless of the FFmpeg build, and as
/// the fake registry in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticCapabilities {
    available: Vec<OutputCodec>,
}

impl StaticCapabilities {
    pub fn new(available: impl IntoIterator<Item = OutputCodec>) -> Self {
        Self {
            available: available.into_iter().collect(),
        }
    }

    /// Only AAC is available.
    pub fn aac_only() -> Self {
        Self::new([OutputCodec::Aac])
    }
}

impl CodecCapabilities for StaticCapabilities {
    fn is_encoder_available(&self, codec: OutputCodec) -> bool {
        self.available.contains(&codec)
    }
}

impl<T: CodecCapabilities + ?Sized> CodecCapabilities for std::sync::Arc<T> {
    fn is_encoder_available(&self, codec: OutputCodec) -> bool {
        (**self).is_encoder_available(codec)
    }
}
