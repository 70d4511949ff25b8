//! Playlist parsing
//!
//! Line-oriented M3U/M3U8 reader. Only `#EXT-X-MEDIA-SEQUENCE` is
//! interpreted; every other `#` line is skipped. Each remaining non-empty
//! line is one entry, kept in file order.

use crate::error::{Error, Result};
use std::fmt;
use url::Url;

/// Directive carrying the sequence number of the first listed segment
pub const MEDIA_SEQUENCE_TAG: &str = "#EXT-X-MEDIA-SEQUENCE:";

/// One decoded playlist document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    /// Value of the media-sequence directive, if the document had one
    pub media_sequence: Option<i64>,

    /// Entry URIs in playback order, as written in the document
    pub entries: Vec<String>,
}

/// One media-sequence-numbered chunk of audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub sequence: i64,
    pub uri: String,
}

impl Playlist {
    pub fn new(media_sequence: Option<i64>, entries: Vec<String>) -> Self {
        Self {
            media_sequence,
            entries,
        }
    }

    /// Sequence number of the first entry (0 without a directive)
    pub fn starting_sequence(&self) -> i64 {
        self.media_sequence.unwrap_or(0)
    }

    /// Sequence number of the last entry
    pub fn last_sequence(&self) -> i64 {
        self.starting_sequence() + self.entries.len() as i64 - 1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A one-entry document, possibly a master naming its live variant
    pub fn is_singleton(&self) -> bool {
        self.entries.len() == 1
    }

    /// The sole entry of a singleton document
    pub fn singleton_entry(&self) -> Option<&str> {
        if self.is_singleton() {
            self.entries.first().map(String::as_str)
        } else {
            None
        }
    }

    /// False for a single evergreen entry without sequence numbering
    pub fn tracks_sequence(&self) -> bool {
        !(self.starting_sequence() == 0 && self.is_singleton())
    }

    /// Entries paired with their implied sequence numbers
    pub fn segments(&self) -> impl Iterator<Item = Segment> + '_ {
        let start = self.starting_sequence();
        self.entries.iter().enumerate().map(move |(index, uri)| Segment {
            sequence: start + index as i64,
            uri: uri.clone(),
        })
    }
}

impl fmt::Display for Playlist {
    /// Renders the document back to M3U8 text
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#EXTM3U")?;
        if let Some(sequence) = self.media_sequence {
            writeln!(f, "{}{}", MEDIA_SEQUENCE_TAG, sequence)?;
        }
        for entry in &self.entries {
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}

/// Parse playlist text
///
/// # Errors
/// - `MalformedPlaylist` if the media-sequence value is not a non-negative
///   integer, or if the document lists no entries at all
pub fn parse_playlist(text: &str) -> Result<Playlist> {
    let mut media_sequence = None;
    let mut entries = Vec::new();

    for raw_line in text.lines() {
        let line = raw_line.trim();

        if let Some(value) = line.strip_prefix(MEDIA_SEQUENCE_TAG) {
            let sequence: i64 = value.trim().parse().map_err(|_| {
                Error::MalformedPlaylist(format!("invalid media sequence '{}'", value.trim()))
            })?;
            if sequence < 0 {
                return Err(Error::MalformedPlaylist(format!(
                    "negative media sequence {}",
                    sequence
                )));
            }
            media_sequence = Some(sequence);
            continue;
        }

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Entry is the first whitespace-delimited token
        if let Some(entry) = line.split_whitespace().next() {
            entries.push(entry.to_string());
        }
    }

    if entries.is_empty() {
        return Err(Error::MalformedPlaylist(
            "playlist contains no entries".to_string(),
        ));
    }

    // Every implied sequence number must fit in i64
    if let Some(start) = media_sequence {
        let last_offset = entries.len() as i64 - 1;
        if start.checked_add(last_offset).is_none() {
            return Err(Error::MalformedPlaylist(format!(
                "media sequence {} overflows with {} entries",
                start,
                entries.len()
            )));
        }
    }

    Ok(Playlist {
        media_sequence,
        entries,
    })
}

/// Resolve a playlist entry against the URL of the playlist listing it
pub fn resolve_entry(base: &str, entry: &str) -> Result<String> {
    if let Ok(absolute) = Url::parse(entry) {
        return Ok(absolute.into());
    }
    let base = Url::parse(base)
        .map_err(|e| Error::MalformedPlaylist(format!("invalid playlist URL '{}': {}", base, e)))?;
    base.join(entry)
        .map(Into::into)
        .map_err(|e| Error::MalformedPlaylist(format!("invalid entry '{}': {}", entry, e)))
}
