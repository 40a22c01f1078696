//! Output target negotiation
//!
//! Decides, from the output path and the first segment, what the whole
//! session encodes to. Every later segment is converted toward this target.

use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::Sample;
use serde::Serialize;

use crate::capabilities::CodecCapabilities;
use crate::error::{ConcatError, Result};
use crate::ffmpeg_utils::helpers::encoder_sample_formats;
use crate::probe::SegmentInfo;

/// Output sample rate, whatever the inputs use
pub const OUTPUT_SAMPLE_RATE: u32 = 44100;
/// Bit rate used for MP3 when the source does not declare one
pub const MP3_DEFAULT_BIT_RATE: u64 = 192_000;
/// Bit rate used for AAC when the source does not declare one
pub const AAC_DEFAULT_BIT_RATE: u64 = 128_000;
/// Highest bit rate handed to either encoder; PCM and lossless sources
/// declare far more than a lossy codec can use
pub const MAX_BIT_RATE: u64 = 320_000;
/// Frame size used when the encoder does not require a specific one
pub const DEFAULT_FRAME_SIZE: usize = 1024;
/// Sample format used when the encoder advertises none
pub const FALLBACK_SAMPLE_FORMAT: Sample =
    Sample::F32(ffmpeg::util::format::sample::Type::Planar);

/// Codecs a session can encode to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputCodec {
    Mp3,
    Aac,
}

impl OutputCodec {
    pub fn id(self) -> ffmpeg::codec::Id {
        match self {
            OutputCodec::Mp3 => ffmpeg::codec::Id::MP3,
            OutputCodec::Aac => ffmpeg::codec::Id::AAC,
        }
    }

    /// FFmpeg codec name
    pub fn name(self) -> &'static str {
        match self {
            OutputCodec::Mp3 => "mp3",
            OutputCodec::Aac => "aac",
        }
    }

    /// Bit rate applied when the source bit rate is unknown.
    pub fn default_bit_rate(self) -> u64 {
        match self {
            OutputCodec::Mp3 => MP3_DEFAULT_BIT_RATE,
            OutputCodec::Aac => AAC_DEFAULT_BIT_RATE,
        }
    }
}

impl std::fmt::Display for OutputCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Output container, derived from the file extension and the final codec
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    /// MPEG audio layer 3 stream
    Mp3,
    /// Raw AAC with ADTS headers
    Adts,
    /// MPEG-4 audio (`.m4a`/`.m4b`, muxed by `ipod`)
    M4a,
    /// MPEG-4 (`.mp4`)
    Mp4,
    /// Anything else: FFmpeg picks the muxer from the file name
    Guessed(String),
}

impl ContainerKind {
    /// Muxer name to force, or `None` to let FFmpeg guess from the path.
    pub fn muxer_name(&self) -> Option<&'static str> {
        match self {
            ContainerKind::Mp3 => Some("mp3"),
            ContainerKind::Adts => Some("adts"),
            ContainerKind::M4a => Some("ipod"),
            ContainerKind::Mp4 => Some("mp4"),
            ContainerKind::Guessed(_) => None,
        }
    }
}

/// Which codec the output path asks for and which one will be used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecChoice {
    pub requested: OutputCodec,
    pub codec: OutputCodec,
}

impl CodecChoice {
    /// Whether the requested codec was replaced by the fallback
    pub fn substituted(&self) -> bool {
        self.requested != self.codec
    }
}

/// Everything the session encodes to. Fixed once the first segment has been
/// negotiated.
#[derive(Debug, Clone)]
pub struct OutputTarget {
    pub container: ContainerKind,
    pub codec: OutputCodec,
    /// Set when `.mp3` was requested but AAC is used instead
    pub substituted: bool,
    pub sample_rate: u32,
    pub sample_format: Sample,
    pub channel_layout: ChannelLayout,
    pub bit_rate: u64,
    pub time_base: ffmpeg::Rational,
}

impl OutputTarget {
    /// Negotiate the session target from the output path and the first
    /// segment's probed parameters.
    pub fn negotiate(
        output: &Path,
        first: &SegmentInfo,
        caps: &dyn CodecCapabilities,
    ) -> Result<Self> {
        let extension = output_extension(output);
        let choice = select_codec(&extension, caps)?;
        if choice.substituted() {
            tracing::warn!(
                output = %output.display(),
                requested = %choice.requested,
                using = %choice.codec,
                "requested encoder unavailable, substituting"
            );
        }

        let encoder = ffmpeg::encoder::find(choice.codec.id()).ok_or(
            ConcatError::EncoderUnavailable {
                requested: choice.codec.name(),
                fallback: None,
            },
        )?;
        let sample_format = preferred_sample_format(&encoder_sample_formats(&encoder));

        let target = Self {
            container: select_container(&extension, choice.codec),
            codec: choice.codec,
            substituted: choice.substituted(),
            sample_rate: OUTPUT_SAMPLE_RATE,
            sample_format,
            channel_layout: target_channel_layout(first.channels),
            bit_rate: target_bit_rate(choice.codec, first.bit_rate),
            time_base: ffmpeg::Rational::new(1, OUTPUT_SAMPLE_RATE as i32),
        };

        tracing::info!(
            codec = %target.codec,
            container = ?target.container,
            sample_rate = target.sample_rate,
            sample_format = target.sample_format.name(),
            channels = target.channels(),
            bit_rate = target.bit_rate,
            "output target negotiated"
        );

        Ok(target)
    }

    /// Output channel count (1 or 2)
    pub fn channels(&self) -> u16 {
        self.channel_layout.channels() as u16
    }
}

/// Lowercased output extension without the dot, empty when there is none.
pub fn output_extension(output: &Path) -> String {
    output
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// `.mp3` asks for MP3 and falls back to AAC; everything else is AAC.
pub fn select_codec(extension: &str, caps: &dyn CodecCapabilities) -> Result<CodecChoice> {
    let requested = match extension {
        "mp3" => OutputCodec::Mp3,
        _ => OutputCodec::Aac,
    };

    if caps.is_encoder_available(requested) {
        return Ok(CodecChoice {
            requested,
            codec: requested,
        });
    }

    if requested != OutputCodec::Aac && caps.is_encoder_available(OutputCodec::Aac) {
        return Ok(CodecChoice {
            requested,
            codec: OutputCodec::Aac,
        });
    }

    Err(ConcatError::EncoderUnavailable {
        requested: requested.name(),
        fallback: (requested != OutputCodec::Aac).then_some(OutputCodec::Aac.name()),
    })
}

/// Pick the muxer so the requested path is always a valid file for `codec`.
pub fn select_container(extension: &str, codec: OutputCodec) -> ContainerKind {
    match (extension, codec) {
        ("mp3", OutputCodec::Mp3) => ContainerKind::Mp3,
        // The mp3 muxer cannot carry AAC; keep the name, write raw ADTS.
        ("mp3", OutputCodec::Aac) => ContainerKind::Adts,
        ("aac", _) => ContainerKind::Adts,
        ("m4a" | "m4b", _) => ContainerKind::M4a,
        ("mp4", _) => ContainerKind::Mp4,
        (other, _) => ContainerKind::Guessed(other.to_string()),
    }
}

/// Mono stays mono; everything else, including multichannel, becomes stereo.
pub fn target_channel_layout(source_channels: u16) -> ChannelLayout {
    if source_channels == 1 {
        ChannelLayout::MONO
    } else {
        ChannelLayout::STEREO
    }
}

/// The source bit rate when known (capped at [`MAX_BIT_RATE`]), otherwise
/// the codec default.
///
/// The cap only makes the clamping explicit: libmp3lame stops at 320 kbps
/// and the native AAC encoder clamps to its per-frame bit budget, so a PCM
/// source's 1411 kbps would never be honoured either way.
pub fn target_bit_rate(codec: OutputCodec, source_bit_rate: u64) -> u64 {
    if source_bit_rate > 0 {
        source_bit_rate.min(MAX_BIT_RATE)
    } else {
        codec.default_bit_rate()
    }
}

/// First advertised sample format, or planar float.
pub fn preferred_sample_format(advertised: &[Sample]) -> Sample {
    advertised
        .first()
        .copied()
        .unwrap_or(FALLBACK_SAMPLE_FORMAT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::StaticCapabilities;
    use std::path::PathBuf;

    fn both() -> StaticCapabilities {
        StaticCapabilities::new([OutputCodec::Mp3, OutputCodec::Aac])
    }

    #[test]
    fn test_output_extension() {
        assert_eq!(output_extension(Path::new("/out/Book.MP3")), "mp3");
        assert_eq!(output_extension(Path::new("out.m4a")), "m4a");
        assert_eq!(output_extension(Path::new("noext")), "");
    }

    #[test]
    fn test_select_codec_mp3_available() {
        let choice = select_codec("mp3", &both()).unwrap();
        assert_eq!(choice.codec, OutputCodec::Mp3);
        assert!(!choice.substituted());
    }

    #[test]
    fn test_select_codec_mp3_falls_back_to_aac() {
        let choice = select_codec("mp3", &StaticCapabilities::aac_only()).unwrap();
        assert_eq!(choice.requested, OutputCodec::Mp3);
        assert_eq!(choice.codec, OutputCodec::Aac);
        assert!(choice.substituted());
    }

    #[test]
    fn test_select_codec_defaults_to_aac() {
        for ext in ["m4a", "wav", "", "ogg"] {
            let choice = select_codec(ext, &both()).unwrap();
            assert_eq!(choice.codec, OutputCodec::Aac, "extension {:?}", ext);
            assert!(!choice.substituted());
        }
    }

    #[test]
    fn test_select_codec_nothing_available() {
        let none = StaticCapabilities::default();
        match select_codec("mp3", &none) {
            Err(ConcatError::EncoderUnavailable {
                requested,
                fallback,
            }) => {
                assert_eq!(requested, "mp3");
                assert_eq!(fallback, Some("aac"));
            }
            other => panic!("unexpected: {:?}", other),
        }
        match select_codec("m4a", &none) {
            Err(ConcatError::EncoderUnavailable { requested, fallback }) => {
                assert_eq!(requested, "aac");
                assert_eq!(fallback, None);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_select_container() {
        assert_eq!(select_container("mp3", OutputCodec::Mp3), ContainerKind::Mp3);
        assert_eq!(select_container("mp3", OutputCodec::Aac), ContainerKind::Adts);
        assert_eq!(select_container("m4a", OutputCodec::Aac), ContainerKind::M4a);
        assert_eq!(select_container("mp4", OutputCodec::Aac), ContainerKind::Mp4);
        assert_eq!(
            select_container("mka", OutputCodec::Aac),
            ContainerKind::Guessed("mka".into())
        );
        assert_eq!(ContainerKind::M4a.muxer_name(), Some("ipod"));
        assert_eq!(ContainerKind::Guessed("mka".into()).muxer_name(), None);
    }

    #[test]
    fn test_target_channel_layout() {
        assert_eq!(target_channel_layout(1), ChannelLayout::MONO);
        assert_eq!(target_channel_layout(2), ChannelLayout::STEREO);
        assert_eq!(target_channel_layout(6), ChannelLayout::STEREO);
        assert_eq!(target_channel_layout(0), ChannelLayout::STEREO);
    }

    #[test]
    fn test_target_bit_rate() {
        assert_eq!(target_bit_rate(OutputCodec::Mp3, 0), 192_000);
        assert_eq!(target_bit_rate(OutputCodec::Aac, 0), 128_000);
        assert_eq!(target_bit_rate(OutputCodec::Aac, 96_000), 96_000);
        // 16-bit stereo PCM at 44.1 kHz
        assert_eq!(target_bit_rate(OutputCodec::Mp3, 1_411_200), MAX_BIT_RATE);
        assert_eq!(target_bit_rate(OutputCodec::Aac, 1_411_200), MAX_BIT_RATE);
        assert_eq!(target_bit_rate(OutputCodec::Mp3, MAX_BIT_RATE), MAX_BIT_RATE);
    }

    #[test]
    fn test_preferred_sample_format() {
        let s16 = Sample::I16(ffmpeg::util::format::sample::Type::Packed);
        assert_eq!(preferred_sample_format(&[s16, FALLBACK_SAMPLE_FORMAT]), s16);
        assert_eq!(preferred_sample_format(&[]), FALLBACK_SAMPLE_FORMAT);
    }

    #[test]
    fn test_negotiate_from_probed_segment() {
        crate::ffmpeg_utils::init().unwrap();
        let first = SegmentInfo {
            path: PathBuf::from("/clips/001.wav"),
            stream_index: 0,
            codec_id: ffmpeg::codec::Id::PCM_S16LE,
            sample_rate: 22050,
            sample_format: Sample::I16(ffmpeg::util::format::sample::Type::Packed),
            channels: 1,
            bit_rate: 0,
            time_base: ffmpeg::Rational::new(1, 22050),
            duration_us: Some(1_000_000),
        };
        let target = OutputTarget::negotiate(
            Path::new("/out/chapter.mp3"),
            &first,
            &StaticCapabilities::aac_only(),
        )
        .unwrap();

        assert_eq!(target.codec, OutputCodec::Aac);
        assert!(target.substituted);
        assert_eq!(target.container, ContainerKind::Adts);
        assert_eq!(target.sample_rate, 44100);
        assert_eq!(target.channels(), 1);
        assert_eq!(target.bit_rate, AAC_DEFAULT_BIT_RATE);
        assert_eq!(target.time_base, ffmpeg::Rational::new(1, 44100));
        assert_eq!(target.sample_format, FALLBACK_SAMPLE_FORMAT);
    }
}
