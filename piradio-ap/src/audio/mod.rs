//! Audio subsystem
//!
//! Decoding (symphonia, with MPEG-TS demuxing via mpeg2ts), resampling
//! (rubato) and device output (cpal + ringbuf).

pub mod decoder;
pub mod output;
pub mod resampler;
pub mod stream_decoder;
pub mod types;

pub use decoder::{SegmentDecoder, TsSegmentDecoder};
pub use output::{AudioSink, CpalSink};
pub use resampler::{resample, TARGET_SAMPLE_RATE};
pub use stream_decoder::{streaming_decoder, StreamEvent, StreamFeeder, StreamingDecoder};
pub use types::PcmBuffer;
