//! Content classification
//!
//! Maps a declared media type to the handling path. Pure: callers decide
//! what to do with the returned [`ContentKind`].

use crate::playlist::Playlist;
use std::fmt;

/// Flavor of a raw compressed stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// MPEG transport stream segment (`video/mp2t`)
    TransportStream,
    /// Endless MP3 stream (`audio/mpeg`), played frame by frame
    Mp3,
}

/// Handling path for a fetched resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// HLS playlist naming a further playlist
    MasterPlaylist,
    /// HLS playlist listing media segments
    LiveSubPlaylist,
    /// `.m3u` playlist naming one track
    SingleTrackPlaylist,
    /// Compressed audio, not a playlist
    RawCompressedStream(StreamFormat),
    /// Anything else
    Unsupported,
}

impl ContentKind {
    pub fn is_hls_playlist(self) -> bool {
        matches!(self, ContentKind::MasterPlaylist | ContentKind::LiveSubPlaylist)
    }

    /// Confirm an HLS classification against the parsed document
    ///
    /// The media type alone cannot tell a master from a live playlist. A
    /// singleton document is (possibly) a master, anything longer is live.
    /// Other kinds pass through unchanged.
    pub fn refine(self, playlist: &Playlist) -> ContentKind {
        if !self.is_hls_playlist() {
            return self;
        }
        if playlist.is_singleton() {
            ContentKind::MasterPlaylist
        } else {
            ContentKind::LiveSubPlaylist
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentKind::MasterPlaylist => "master playlist",
            ContentKind::LiveSubPlaylist => "live sub-playlist",
            ContentKind::SingleTrackPlaylist => "single-track playlist",
            ContentKind::RawCompressedStream(StreamFormat::TransportStream) => "TS segment",
            ContentKind::RawCompressedStream(StreamFormat::Mp3) => "MP3 stream",
            ContentKind::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}

/// Classify a declared media type
///
/// Only the first token is compared (parameters such as `; charset=utf-8`
/// are dropped), case-insensitively. `application/vnd.apple.mpegurl`
/// classifies provisionally as [`ContentKind::MasterPlaylist`]; use
/// [`ContentKind::refine`] once the body is parsed.
pub fn classify(media_type: &str) -> ContentKind {
    let token = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match token.as_str() {
        "application/vnd.apple.mpegurl" => ContentKind::MasterPlaylist,
        "audio/mpegurl" | "audio/x-mpegurl" => ContentKind::SingleTrackPlaylist,
        "video/mp2t" => ContentKind::RawCompressedStream(StreamFormat::TransportStream),
        "audio/mpeg" => ContentKind::RawCompressedStream(StreamFormat::Mp3),
        // audio/aac is recognised but has no playback path
        "audio/aac" => ContentKind::Unsupported,
        _ => ContentKind::Unsupported,
    }
}
