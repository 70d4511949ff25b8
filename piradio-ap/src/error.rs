//! Error types for piradio-ap
//!
//! One variant per failure class of the player. Whether a failure is retried
//! or ends the session is decided by [`Error::is_retryable`].

use thiserror::Error;

/// Main error type for the player
#[derive(Error, Debug)]
pub enum Error {
    /// Transport failure, timeout, or non-success HTTP status
    #[error("Fetch error for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Media type that the current step cannot handle
    #[error("Classification error: {0}")]
    Classification(String),

    /// Playlist that cannot be parsed or nests illegally
    #[error("Malformed playlist: {0}")]
    MalformedPlaylist(String),

    /// Upstream moved the media sequence backwards
    #[error("Sequence regression: reported {reported} but already at {current}")]
    SequenceRegression { current: i64, reported: i64 },

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio sink error: {0}")]
    Sink(String),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] piradio_common::Error),

    /// File I/O error
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Error::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a steady-state poll may retry after this error
    ///
    /// Network and upstream noise is retried on the next tick. Sequence
    /// regressions, decode and sink failures end the session.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Fetch { .. } | Error::MalformedPlaylist(_) | Error::Classification(_)
        )
    }
}

/// Convenience Result type using the player Error
pub type Result<T> = std::result::Result<T, Error>;
