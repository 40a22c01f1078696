//! Per-segment transcoding
//!
//! Every input segment is decoded, converted to the session's output format,
//! regrouped into encoder-sized frames and re-encoded, in that order:
//!
//! ```text
//! AudioDecoder -> AudioFilterChain -> AudioEncoder -> OutputSink
//! ```

pub mod decoder;
pub mod encoder;
pub mod filter;
pub mod pipeline;

pub use decoder::AudioDecoder;
pub use encoder::AudioEncoder;
pub use filter::{AudioFilterChain, FilterTarget};
pub use pipeline::{transcode_segment, SegmentStats};
