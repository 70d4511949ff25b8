//! Media sequence tracking
//!
//! Holds the last-fetched and last-played sequence numbers of a session
//! and computes which listed segments are new. Playback may only move
//! forward; any attempt to go back is a `SequenceRegression`.

use crate::error::{Error, Result};
use crate::playlist::{Playlist, Segment};
use tracing::debug;

/// Segments of `playlist` with a sequence number above `last_played`,
/// ascending
pub fn compute_delta(playlist: &Playlist, last_played: i64) -> Vec<Segment> {
    // Listing order is ascending by construction
    playlist
        .segments()
        .filter(|segment| segment.sequence > last_played)
        .collect()
}

/// Sequence state of one session
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    last_fetched: Option<i64>,
    last_played: Option<i64>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session at the head of `playlist`
    ///
    /// `last_played` becomes `start - 1` so the first poll catches up with
    /// every segment currently listed.
    pub fn start_at(playlist: &Playlist) -> Self {
        let start = playlist.starting_sequence();
        Self {
            last_fetched: Some(start),
            last_played: Some(start - 1),
        }
    }

    pub fn last_fetched(&self) -> Option<i64> {
        self.last_fetched
    }

    pub fn last_played(&self) -> Option<i64> {
        self.last_played
    }

    /// Accept a freshly parsed playlist
    ///
    /// A stale copy (every entry already played, start not moved back) is
    /// accepted; its delta is simply empty.
    ///
    /// # Errors
    /// `SequenceRegression` if the starting sequence moved below the previous
    /// one. The tracker is left unchanged in that case.
    pub fn observe(&mut self, playlist: &Playlist) -> Result<()> {
        let start = playlist.starting_sequence();

        if let Some(previous) = self.last_fetched {
            if start < previous {
                return Err(Error::SequenceRegression {
                    current: previous,
                    reported: start,
                });
            }
        }
        self.last_fetched = Some(start);
        Ok(())
    }

    /// New segments of `playlist`, ascending
    ///
    /// Before anything was played, every listed segment is new.
    pub fn delta(&self, playlist: &Playlist) -> Vec<Segment> {
        match self.last_played {
            Some(played) => compute_delta(playlist, played),
            None => playlist.segments().collect(),
        }
    }

    /// Record that `sequence` finished playing
    ///
    /// # Errors
    /// `SequenceRegression` if `sequence` is below the current last-played
    /// number. `last_played` is unchanged on error.
    pub fn record_played(&mut self, sequence: i64) -> Result<()> {
        if let Some(played) = self.last_played {
            if sequence < played {
                return Err(Error::SequenceRegression {
                    current: played,
                    reported: sequence,
                });
            }
        }
        debug!("last played sequence now {}", sequence);
        self.last_played = Some(sequence);
        Ok(())
    }
}
