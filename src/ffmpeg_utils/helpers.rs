//! Safe wrappers around FFmpeg FFI calls.
//!
//! Every function in this module is `pub` and **safe** to call.  All `unsafe`
//! blocks are contained here with explicit safety arguments.  Callers outside
//! this module should never need to write `unsafe` for routine FFmpeg access.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::Sample;

// ── Codec-parameter field accessors ─────────────────────────────────────────

/// Read `sample_rate` from an `AVCodecParameters` struct.
///
/// `ffmpeg-next` does not expose this field through a safe accessor.
pub fn codec_params_sample_rate(params: &ffmpeg::codec::parameters::Parameters) -> u32 {
    // SAFETY: `params.as_ptr()` returns a valid non-null pointer for the
    // lifetime of `params`.  `sample_rate` is a plain i32 field with no
    // ownership semantics.
    unsafe { (*params.as_ptr()).sample_rate.max(0) as u32 }
}

/// Read `ch_layout.nb_channels` from an `AVCodecParameters` struct.
pub fn codec_params_channels(params: &ffmpeg::codec::parameters::Parameters) -> u16 {
    // SAFETY: same as `codec_params_sample_rate`.
    unsafe { (*params.as_ptr()).ch_layout.nb_channels.max(0) as u16 }
}

/// Read `bit_rate` from an `AVCodecParameters` struct.
pub fn codec_params_bit_rate(params: &ffmpeg::codec::parameters::Parameters) -> u64 {
    // SAFETY: same as `codec_params_sample_rate`.
    unsafe { (*params.as_ptr()).bit_rate.max(0) as u64 }
}

/// Read the sample format of an (unopened) codec context.
///
/// After `avcodec_parameters_to_context` the context carries the typed
/// `sample_fmt` of the stream, which `AVCodecParameters` only stores as a raw
/// integer.
pub fn context_sample_format(context: &ffmpeg::codec::Context) -> Sample {
    // SAFETY: `context.as_ptr()` is valid for the lifetime of `context`;
    // `sample_fmt` is a plain enum field.
    unsafe { Sample::from((*context.as_ptr()).sample_fmt) }
}

// ── Encoder capability queries ───────────────────────────────────────────────

/// Sample formats an encoder accepts, in the encoder's order of preference.
///
/// Returns an empty `Vec` when the encoder does not advertise any (it then
/// accepts whatever it is configured with).
pub fn encoder_sample_formats(codec: &ffmpeg::Codec) -> Vec<Sample> {
    let mut configs: *const std::ffi::c_void = std::ptr::null();
    let mut count: std::ffi::c_int = 0;

    // SAFETY: a null `AVCodecContext` is explicitly allowed by
    // `avcodec_get_supported_config`.  `codec.as_ptr()` is a static registry
    // entry.  On success `configs` points at `count` `AVSampleFormat` values
    // owned by the codec, valid for the whole process lifetime.
    unsafe {
        let ret = ffmpeg::ffi::avcodec_get_supported_config(
            std::ptr::null(),
            codec.as_ptr(),
            ffmpeg::ffi::AVCodecConfig::AV_CODEC_CONFIG_SAMPLE_FORMAT,
            0,
            &mut configs,
            &mut count,
        );
        if ret < 0 || configs.is_null() || count <= 0 {
            return Vec::new();
        }
        std::slice::from_raw_parts(
            configs as *const ffmpeg::ffi::AVSampleFormat,
            count as usize,
        )
        .iter()
        .map(|f| Sample::from(*f))
        .collect()
    }
}

/// Allocate a fresh `AVCodecParameters`, copy the encoder context into it,
/// and return it as a safe `ffmpeg::codec::Parameters`.
///
/// Used to extract codec parameters from an encoder for muxer stream setup.
pub fn encoder_codec_parameters(
    encoder: &ffmpeg::codec::encoder::Audio,
) -> ffmpeg::codec::Parameters {
    use std::ops::Deref;
    use std::rc::Rc;
    let ctx: &ffmpeg::codec::Context = encoder.deref();
    // SAFETY: `avcodec_parameters_alloc` returns a valid pointer or null
    // (only under OOM).  `avcodec_parameters_from_context` copies fields from
    // a valid, open encoder context.
    unsafe {
        let params = ffmpeg::ffi::avcodec_parameters_alloc();
        ffmpeg::ffi::avcodec_parameters_from_context(params, ctx.as_ptr());
        ffmpeg::codec::Parameters::wrap(params, None::<Rc<dyn std::any::Any>>)
    }
}

/// Clear the codec tag of an output stream so the muxer picks its own.
pub fn stream_reset_codec_tag(out_stream: &mut ffmpeg::format::stream::StreamMut) {
    // SAFETY: `out_stream.as_mut_ptr()` is valid for the lifetime of the
    // stream.  `codecpar` is set by `set_parameters` and is non-null.
    unsafe {
        (*(*out_stream.as_mut_ptr()).codecpar).codec_tag = 0;
    }
}

// ── Channel layouts ──────────────────────────────────────────────────────────

/// Resolve the layout of a decoded frame, falling back on the channel count
/// when the source did not declare one.
pub fn frame_channel_layout(frame: &ffmpeg::util::frame::Audio) -> ChannelLayout {
    let layout = frame.channel_layout();
    if layout.bits() != 0 {
        return layout;
    }
    match frame.channels() {
        1 => ChannelLayout::MONO,
        _ => ChannelLayout::STEREO,
    }
}

/// Describe a channel layout the way the `abuffer` filter parses it.
///
/// A known mask is written as hex; an unordered layout is written as `<n>c`.
pub fn abuffer_layout_arg(layout_bits: u64, channels: u16) -> String {
    if layout_bits != 0 {
        format!("0x{:x}", layout_bits)
    } else {
        format!("{}c", channels.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abuffer_layout_arg_mask() {
        assert_eq!(abuffer_layout_arg(ChannelLayout::STEREO.bits(), 2), "0x3");
        assert_eq!(abuffer_layout_arg(ChannelLayout::MONO.bits(), 1), "0x4");
    }

    #[test]
    fn test_abuffer_layout_arg_unordered() {
        assert_eq!(abuffer_layout_arg(0, 6), "6c");
        assert_eq!(abuffer_layout_arg(0, 0), "1c");
    }

    #[test]
    fn test_aac_encoder_advertises_fltp() {
        crate::ffmpeg_utils::init().unwrap();
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::AAC).expect("aac encoder");
        let formats = encoder_sample_formats(&codec);
        assert_eq!(
            formats.first().copied(),
            Some(Sample::F32(ffmpeg::util::format::sample::Type::Planar))
        );
    }
}
