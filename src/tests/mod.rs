//! Session-level tests
//!
//! These run real FFmpeg sessions over WAV clips generated on the fly:
//! - Order preservation and duration additivity
//! - Timestamp monotonicity of the written file
//! - MP3 → AAC fallback
//! - Skip-and-continue and first-segment failures
//! - Repeatability

pub mod session;
