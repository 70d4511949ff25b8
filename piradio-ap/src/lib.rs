//! # piradio Audio Player Library (piradio-ap)
//!
//! Plays live internet radio: HLS live playlists (MPEG-TS segments played
//! in media-sequence order), `.m3u` single-track playlists and plain MP3
//! streams.
//!
//! **Architecture:** one [`session::LiveSession`] owns the stream state and
//! polls the live playlist; [`scheduler::SegmentScheduler`] fetches, decodes
//! (symphonia + mpeg2ts + rubato) and plays (cpal) new segments strictly in
//! order.

pub mod audio;
pub mod classifier;
pub mod error;
pub mod http;
pub mod playlist;
pub mod scheduler;
pub mod scratch;
pub mod sequence;
pub mod session;

pub use error::{Error, Result};
