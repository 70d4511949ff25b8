//! Segment scheduler
//!
//! Plays a batch of segments strictly in order: fetch, decode, write to
//! the sink, then record the sequence number as played. One segment is
//! finished before the next one is fetched. The first failure aborts the
//! rest of the batch.

use crate::audio::{AudioSink, PcmBuffer, SegmentDecoder, StreamEvent, StreamingDecoder};
use crate::error::Result;
use crate::http::{Fetched, Fetcher};
use crate::playlist::{resolve_entry, Segment};
use crate::scratch::{Artifact, ScratchArea};
use crate::sequence::SequenceTracker;
use tokio::task::block_in_place;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Result of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    /// Segments played to completion
    pub played: usize,
    /// Cancellation stopped the batch early
    pub cancelled: bool,
}

/// Why an unsequenced stream stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStop {
    /// The source ran out of data
    Ended,
    Cancelled,
}

/// Serial fetch → decode → play pipeline
pub struct SegmentScheduler<D, S> {
    decoder: D,
    sink: S,
    scratch: ScratchArea,
    /// Format the sink is currently configured for
    sink_format: Option<(u32, u16)>,
}

impl<D: SegmentDecoder, S: AudioSink> SegmentScheduler<D, S> {
    pub fn new(decoder: D, sink: S, scratch: ScratchArea) -> Self {
        Self {
            decoder,
            sink,
            scratch,
            sink_format: None,
        }
    }

    pub fn scratch(&self) -> &ScratchArea {
        &self.scratch
    }

    /// Play `segments` in order
    ///
    /// Entries are resolved against `base_url`. Each segment is recorded in
    /// `tracker` once its audio has been written. Cancellation is checked
    /// before each segment; a segment already started is played out.
    ///
    /// # Errors
    /// The first fetch, decode, sink or sequence error; segments after the
    /// failing one are not attempted.
    pub async fn run<F: Fetcher>(
        &mut self,
        fetcher: &F,
        base_url: &str,
        segments: &[Segment],
        tracker: &mut SequenceTracker,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for segment in segments {
            if cancel.is_cancelled() {
                debug!("Batch cancelled after {} segments", outcome.played);
                outcome.cancelled = true;
                return Ok(outcome);
            }

            let url = resolve_entry(base_url, &segment.uri)?;
            let fetched = fetcher.fetch(&url).await?;
            self.scratch.stage(Artifact::Segment, &fetched.body);

            block_in_place(|| self.decode_and_play(&fetched.body))?;
            tracker.record_played(segment.sequence)?;
            info!(sequence = segment.sequence, url = %url, "Played segment");
            outcome.played += 1;
        }

        Ok(outcome)
    }

    /// Play one already fetched segment outside of sequence tracking
    pub fn play_unsequenced(&mut self, fetched: &Fetched) -> Result<()> {
        self.scratch.stage(Artifact::Segment, &fetched.body);
        block_in_place(|| self.decode_and_play(&fetched.body))?;
        info!(url = %fetched.url, "Played unsequenced segment");
        Ok(())
    }

    /// Decode one segment and write it to the sink
    pub fn decode_and_play(&mut self, bytes: &[u8]) -> Result<()> {
        let pcm = self.decoder.decode(bytes)?;
        self.scratch.stage(Artifact::Pcm, &pcm.to_le_bytes());
        debug!(
            frames = pcm.frames(),
            duration_ms = pcm.duration_ms(),
            "Decoded segment"
        );
        self.write_pcm(&pcm)
    }

    fn write_pcm(&mut self, pcm: &PcmBuffer) -> Result<()> {
        self.ensure_format(pcm.sample_rate, pcm.channels)?;
        self.sink.write(&pcm.samples)?;
        Ok(())
    }

    fn ensure_format(&mut self, sample_rate: u32, channels: u16) -> Result<()> {
        if self.sink_format != Some((sample_rate, channels)) {
            self.sink.configure(sample_rate, channels)?;
            self.sink_format = Some((sample_rate, channels));
        }
        Ok(())
    }

    /// Play a streaming decoder until it runs dry or `cancel` fires
    ///
    /// Blocking; the sink is reconfigured whenever the stream reports a new
    /// format.
    pub fn play_stream(
        &mut self,
        stream: &mut StreamingDecoder,
        cancel: &CancellationToken,
    ) -> Result<StreamStop> {
        loop {
            if cancel.is_cancelled() {
                return Ok(StreamStop::Cancelled);
            }
            match stream.next_event()? {
                Some(StreamEvent::Format {
                    sample_rate,
                    channels,
                }) => {
                    info!(sample_rate, channels, "Stream format");
                    self.ensure_format(sample_rate, channels)?;
                }
                Some(StreamEvent::Frames(samples)) => {
                    self.sink.write(&samples)?;
                }
                None => {
                    return Ok(if cancel.is_cancelled() {
                        StreamStop::Cancelled
                    } else {
                        StreamStop::Ended
                    });
                }
            }
        }
    }

    /// Let queued audio play out
    pub fn drain(&mut self) -> Result<()> {
        block_in_place(|| self.sink.drain())
    }

    pub fn close(&mut self) -> Result<()> {
        self.sink_format = None;
        self.sink.close()
    }
}
