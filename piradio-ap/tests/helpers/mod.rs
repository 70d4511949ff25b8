//! Test helpers for piradio-ap integration tests
//!
//! In-memory stand-ins for the three outside collaborators of a session:
//! - ScriptedFetcher: per-URL canned responses plus a request log
//! - FakeDecoder: "decodes" any bytes to a short PCM buffer
//! - RecordingSink: records configure/write/drain/close calls

#![allow(dead_code)]

pub mod fake_audio;
pub mod fake_fetcher;

pub use fake_audio::{FakeDecoder, RecordingSink, SinkLog};
pub use fake_fetcher::ScriptedFetcher;

pub const HLS: &str = "application/vnd.apple.mpegurl";
pub const TS: &str = "video/mp2t";
