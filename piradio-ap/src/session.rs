//! Live session loop
//!
//! Drives one radio stream from its root URL:
//!
//! ```text
//! ResolvingMaster → ResolvingSubPlaylist → SteadyPolling → Terminated
//!        └────────→ DirectStreaming (MP3) ─────────────────↗
//! ```
//!
//! Resolution errors are fatal. While polling, transient errors (see
//! [`Error::is_retryable`]) are logged and retried on the next tick; the
//! rest end the session. The audio sink is closed however the session ends.

use crate::audio::{streaming_decoder, AudioSink, SegmentDecoder};
use crate::classifier::{classify, ContentKind, StreamFormat};
use crate::error::{Error, Result};
use crate::http::{Fetched, Fetcher, Resource};
use crate::playlist::{parse_playlist, resolve_entry, Playlist};
use crate::scheduler::{SegmentScheduler, StreamStop};
use crate::scratch::Artifact;
use crate::sequence::SequenceTracker;
use futures::StreamExt;
use piradio_common::PlayerConfig;
use std::fmt;
use std::time::Duration;
use tokio::task::block_in_place;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Singleton playlists followed while resolving
const MAX_REDIRECTS: usize = 1;

/// Loop settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Sleep between polls that found nothing new
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(4),
        }
    }
}

impl From<&PlayerConfig> for SessionConfig {
    fn from(config: &PlayerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    ResolvingMaster,
    ResolvingSubPlaylist,
    SteadyPolling,
    DirectStreaming,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::ResolvingMaster => "RESOLVING_MASTER",
            SessionState::ResolvingSubPlaylist => "RESOLVING_SUBPLAYLIST",
            SessionState::SteadyPolling => "STEADY_POLLING",
            SessionState::DirectStreaming => "DIRECT_STREAMING",
            SessionState::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}

/// State of one stream, owned by the loop
#[derive(Debug, Clone)]
pub struct Session {
    root_url: String,
    live_url: Option<String>,
    tracker: SequenceTracker,
    content_kind: Option<ContentKind>,
    state: SessionState,
}

impl Session {
    pub fn new(root_url: impl Into<String>) -> Self {
        Self {
            root_url: root_url.into(),
            live_url: None,
            tracker: SequenceTracker::new(),
            content_kind: None,
            state: SessionState::ResolvingMaster,
        }
    }

    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    /// URL of the live sub-playlist, once resolved
    pub fn live_url(&self) -> Option<&str> {
        self.live_url.as_deref()
    }

    pub fn tracker(&self) -> &SequenceTracker {
        &self.tracker
    }

    /// Classification of the most recently resolved resource
    pub fn content_kind(&self) -> Option<ContentKind> {
        self.content_kind
    }

    pub fn state(&self) -> SessionState {
        self.state
    }
}

/// Where resolution ended up
pub enum Resolution {
    /// Live sub-playlist to poll; `playlist` is the parse that proved it live
    Live { url: String, playlist: Playlist },
    /// Endless MP3 stream, headers read, body untouched
    DirectStream(Resource),
    /// One TS segment named by a single-track playlist, played once
    SingleSegment(Fetched),
}

/// How a session ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Cancelled,
    /// Unsequenced source ran out (MP3 connection closed, single segment done)
    StreamEnded,
}

/// Result of one steady-state poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Played(usize),
    /// No new segments
    Idle,
    Cancelled,
}

/// The top-level poll loop
pub struct LiveSession<F, D, S> {
    fetcher: F,
    scheduler: SegmentScheduler<D, S>,
    config: SessionConfig,
    session: Session,
    cancel: CancellationToken,
}

impl<F: Fetcher, D: SegmentDecoder, S: AudioSink> LiveSession<F, D, S> {
    pub fn new(
        root_url: impl Into<String>,
        fetcher: F,
        scheduler: SegmentScheduler<D, S>,
        config: SessionConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            scheduler,
            config,
            session: Session::new(root_url),
            cancel,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    fn set_state(&mut self, state: SessionState) {
        if self.session.state != state {
            info!("Session state: {} -> {}", self.session.state, state);
            self.session.state = state;
        }
    }

    /// Run until cancelled, a fatal error, or an unsequenced source ends
    ///
    /// The sink is drained after a source ended on its own and closed in
    /// every case.
    pub async fn run(&mut self) -> Result<SessionOutcome> {
        let result = self.drive().await;

        if let Ok(SessionOutcome::StreamEnded) = result {
            if let Err(e) = self.scheduler.drain() {
                warn!("Failed to drain audio output: {}", e);
            }
        }
        if let Err(e) = self.scheduler.close() {
            warn!("Failed to close audio output: {}", e);
        }
        self.set_state(SessionState::Terminated);

        match &result {
            Ok(outcome) => info!("Session finished: {:?}", outcome),
            Err(e) => error!("Session failed: {}", e),
        }
        result
    }

    async fn drive(&mut self) -> Result<SessionOutcome> {
        let Some(resolution) = self.resolve().await? else {
            return Ok(SessionOutcome::Cancelled);
        };

        match resolution {
            Resolution::Live { url, playlist } => {
                info!(
                    url = %url,
                    start = playlist.starting_sequence(),
                    segments = playlist.len(),
                    "Live playlist resolved"
                );
                self.session.tracker = SequenceTracker::start_at(&playlist);
                self.session.live_url = Some(url.clone());
                self.steady_poll(&url).await
            }
            Resolution::DirectStream(resource) => self.stream_direct(resource).await,
            Resolution::SingleSegment(fetched) => {
                self.scheduler.play_unsequenced(&fetched)?;
                Ok(SessionOutcome::StreamEnded)
            }
        }
    }

    /// Classify the root URL and follow it to something playable
    ///
    /// Returns None when cancelled first.
    ///
    /// # Errors
    /// Any fetch, parse or classification failure; none are retried here.
    pub async fn resolve(&mut self) -> Result<Option<Resolution>> {
        self.set_state(SessionState::ResolvingMaster);
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        let root_url = self.session.root_url.clone();
        let resource = self.fetcher.open(&root_url).await?;
        let kind = classify(&resource.media_type);
        info!(
            url = %resource.url,
            media_type = %resource.media_type,
            kind = %kind,
            "Classified root resource"
        );
        self.session.content_kind = Some(kind);

        match kind {
            ContentKind::RawCompressedStream(StreamFormat::Mp3) => {
                Ok(Some(Resolution::DirectStream(resource)))
            }
            ContentKind::SingleTrackPlaylist => self.resolve_single_track(resource).await,
            kind if kind.is_hls_playlist() => {
                let fetched = resource.collect().await?;
                self.resolve_sub_playlist(root_url, fetched, MAX_REDIRECTS)
                    .await
            }
            other => Err(Error::Classification(format!(
                "{} is {} ('{}'), not a playable stream",
                root_url, other, resource.media_type
            ))),
        }
    }

    /// Follow the one entry of an `.m3u` playlist
    async fn resolve_single_track(&mut self, resource: Resource) -> Result<Option<Resolution>> {
        let fetched = resource.collect().await?;
        self.scheduler.scratch().stage(Artifact::Playlist, &fetched.body);
        let playlist = parse_playlist(&fetched.text())?;

        // Extra entries are ignored; the first one is the stream
        let entry = playlist
            .entries
            .first()
            .ok_or_else(|| Error::MalformedPlaylist(format!("{} lists no tracks", fetched.url)))?;
        let target = resolve_entry(&fetched.url, entry)?;

        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        let nested = self.fetcher.open(&target).await?;
        let kind = classify(&nested.media_type);
        info!(
            url = %nested.url,
            media_type = %nested.media_type,
            kind = %kind,
            "Classified single-track entry"
        );
        self.session.content_kind = Some(kind);

        match kind {
            ContentKind::RawCompressedStream(StreamFormat::Mp3) => {
                Ok(Some(Resolution::DirectStream(nested)))
            }
            ContentKind::RawCompressedStream(StreamFormat::TransportStream) => {
                Ok(Some(Resolution::SingleSegment(nested.collect().await?)))
            }
            // The m3u hop used up the one permitted redirection
            kind if kind.is_hls_playlist() => {
                let fetched = nested.collect().await?;
                self.resolve_sub_playlist(target, fetched, 0).await
            }
            other => Err(Error::Classification(format!(
                "single-track entry {} is {} ('{}')",
                target, other, nested.media_type
            ))),
        }
    }

    /// Parse an HLS document, following at most `redirects` singletons
    ///
    /// `requested_url` is the URL that was asked for; it becomes the live
    /// URL polled from then on. Relative entries resolve against the URL
    /// the document was actually served from.
    async fn resolve_sub_playlist(
        &mut self,
        requested_url: String,
        fetched: Fetched,
        redirects: usize,
    ) -> Result<Option<Resolution>> {
        self.set_state(SessionState::ResolvingSubPlaylist);

        let mut requested_url = requested_url;
        let mut fetched = fetched;
        let mut redirects_left = redirects;

        loop {
            self.scheduler.scratch().stage(Artifact::Playlist, &fetched.body);
            let playlist = parse_playlist(&fetched.text())?;
            let kind = ContentKind::MasterPlaylist.refine(&playlist);
            self.session.content_kind = Some(kind);

            let Some(entry) = playlist.singleton_entry() else {
                return Ok(Some(Resolution::Live {
                    url: requested_url,
                    playlist,
                }));
            };

            if redirects_left == 0 {
                return Err(Error::MalformedPlaylist(format!(
                    "{} names a single entry where a live playlist was expected",
                    fetched.url
                )));
            }
            redirects_left -= 1;

            let target = resolve_entry(&fetched.url, entry)?;
            info!("Following master playlist {} to {}", fetched.url, target);
            if self.cancel.is_cancelled() {
                return Ok(None);
            }

            let next = self.fetcher.fetch(&target).await?;
            let next_kind = classify(&next.media_type);
            debug!(url = %next.url, media_type = %next.media_type, kind = %next_kind, "Fetched variant");
            if !next_kind.is_hls_playlist() {
                return Err(Error::Classification(format!(
                    "variant {} is {} ('{}'), expected an HLS playlist",
                    target, next_kind, next.media_type
                )));
            }

            requested_url = target;
            fetched = next;
        }
    }

    /// The steady-state loop; only returns on cancellation or a fatal error
    async fn steady_poll(&mut self, live_url: &str) -> Result<SessionOutcome> {
        self.set_state(SessionState::SteadyPolling);

        loop {
            if self.cancel.is_cancelled() {
                return Ok(SessionOutcome::Cancelled);
            }

            match self.poll_once(live_url).await {
                Ok(PollOutcome::Played(count)) => {
                    debug!("Played {} segments", count);
                }
                Ok(PollOutcome::Idle) => {
                    if !self.pause().await {
                        return Ok(SessionOutcome::Cancelled);
                    }
                }
                Ok(PollOutcome::Cancelled) => return Ok(SessionOutcome::Cancelled),
                Err(e) if e.is_retryable() => {
                    warn!(
                        "Poll failed, retrying in {:?}: {}",
                        self.config.poll_interval, e
                    );
                    if !self.pause().await {
                        return Ok(SessionOutcome::Cancelled);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetch the live playlist once and play whatever is new
    pub async fn poll_once(&mut self, live_url: &str) -> Result<PollOutcome> {
        if self.cancel.is_cancelled() {
            return Ok(PollOutcome::Cancelled);
        }

        let fetched = self.fetcher.fetch(live_url).await?;
        let kind = classify(&fetched.media_type);
        if !kind.is_hls_playlist() {
            return Err(Error::Classification(format!(
                "live playlist {} is {} ('{}')",
                live_url, kind, fetched.media_type
            )));
        }

        self.scheduler.scratch().stage(Artifact::Playlist, &fetched.body);
        let playlist = parse_playlist(&fetched.text())?;
        if !playlist.tracks_sequence() {
            return Err(Error::MalformedPlaylist(format!(
                "live playlist {} lost its media sequence",
                live_url
            )));
        }

        self.session.tracker.observe(&playlist)?;
        let delta = self.session.tracker.delta(&playlist);
        let Some(first) = delta.first() else {
            debug!(
                start = playlist.starting_sequence(),
                "No new segments"
            );
            return Ok(PollOutcome::Idle);
        };
        info!(
            count = delta.len(),
            first = first.sequence,
            "New segments available"
        );

        let outcome = self
            .scheduler
            .run(
                &self.fetcher,
                &fetched.url,
                &delta,
                &mut self.session.tracker,
                &self.cancel,
            )
            .await?;

        if outcome.cancelled {
            Ok(PollOutcome::Cancelled)
        } else {
            Ok(PollOutcome::Played(outcome.played))
        }
    }

    /// Sleep one poll interval; false if cancelled meanwhile
    async fn pause(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.poll_interval) => true,
        }
    }

    /// Play an MP3 body as it arrives, until it ends or the session is cancelled
    async fn stream_direct(&mut self, resource: Resource) -> Result<SessionOutcome> {
        self.set_state(SessionState::DirectStreaming);
        info!(url = %resource.url, "Streaming MP3");

        let Resource { url, body, .. } = resource;
        let (feeder, mut decoder) = streaming_decoder();

        let pump_cancel = self.cancel.clone();
        let mut body = body;
        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = pump_cancel.cancelled() => return Ok(()),
                    chunk = body.next() => match chunk {
                        Some(Ok(bytes)) => {
                            // Waits here while the decoder is behind
                            if block_in_place(|| feeder.feed(bytes)).is_err() {
                                return Ok(());
                            }
                        }
                        Some(Err(e)) => return Err(e),
                        None => return Ok(()),
                    },
                }
            }
        });

        let cancel = self.cancel.clone();
        let stopped = block_in_place(|| self.scheduler.play_stream(&mut decoder, &cancel));
        // Unblocks a pump waiting on a full feed
        drop(decoder);

        match stopped {
            Err(e) => {
                pump.abort();
                Err(e)
            }
            Ok(StreamStop::Cancelled) => {
                pump.abort();
                Ok(SessionOutcome::Cancelled)
            }
            Ok(StreamStop::Ended) => match pump.await {
                Ok(Ok(())) => {
                    info!("MP3 stream ended");
                    Ok(SessionOutcome::StreamEnded)
                }
                Ok(Err(e)) => Err(e),
                Err(e) => Err(Error::fetch(url, e)),
            },
        }
    }
}
