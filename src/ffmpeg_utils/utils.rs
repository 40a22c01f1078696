//! FFmpeg utility functions

use ffmpeg_next as ffmpeg;

/// Microsecond time base used by `AVFormatContext::duration`.
pub const AV_TIME_BASE_Q: ffmpeg::Rational = ffmpeg::Rational(1, ffmpeg::ffi::AV_TIME_BASE as i32);

/// Convert timestamps from one timebase to another
pub fn rescale_ts(ts: i64, from: ffmpeg::Rational, to: ffmpeg::Rational) -> i64 {
    unsafe { ffmpeg::ffi::av_rescale_q(ts, from.into(), to.into()) }
}

/// Convert a timestamp to seconds.
pub fn ts_to_secs(ts: i64, time_base: ffmpeg::Rational) -> f64 {
    if time_base.denominator() == 0 {
        return 0.0;
    }
    ts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64
}

/// Map an FFmpeg `AV_LOG_*` level to a tracing level name.
pub fn log_level_name(level: i32) -> &'static str {
    match level {
        l if l <= ffmpeg::ffi::AV_LOG_ERROR as i32 => "error",
        l if l <= ffmpeg::ffi::AV_LOG_WARNING as i32 => "warn",
        l if l <= ffmpeg::ffi::AV_LOG_INFO as i32 => "info",
        l if l <= ffmpeg::ffi::AV_LOG_DEBUG as i32 => "debug",
        _ => "trace",
    }
}
