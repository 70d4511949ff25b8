//! Streaming MP3 decoder
//!
//! Push side: [`StreamFeeder::feed`] hands over bytes as they arrive from
//! the network. Pull side: [`StreamingDecoder::next_event`] blocks until a
//! frame can be decoded and reports the stream format whenever it is first
//! discovered or changes.
//!
//! The two halves talk over a bounded crossbeam channel, so the feeder can
//! live on an async task while decoding runs on a blocking thread. A full
//! channel makes the feeder wait, which in turn stops reading the network.

use crate::audio::types::append_interleaved;
use crate::error::{Error, Result};
use bytes::{Buf, Bytes};
use crossbeam_channel::{Receiver, Sender};
use std::io::Read;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

/// Chunks queued between the network and the decoder
pub const FEED_CAPACITY: usize = 64;

/// Decoded output of the stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Format discovered or changed; precedes the frames it describes
    Format { sample_rate: u32, channels: u16 },
    /// Interleaved f32 samples in the last reported format
    Frames(Vec<f32>),
}

/// Push half
#[derive(Clone)]
pub struct StreamFeeder {
    sender: Sender<Bytes>,
}

impl StreamFeeder {
    /// Queue bytes for decoding
    ///
    /// Blocks while [`FEED_CAPACITY`] chunks are waiting. Fails once the
    /// decoder has been dropped, including while blocked.
    pub fn feed(&self, bytes: Bytes) -> Result<()> {
        self.sender
            .send(bytes)
            .map_err(|_| Error::Decode("Streaming decoder has shut down".to_string()))
    }
}

/// Blocking `Read` over the feed channel; EOF once every feeder is gone
struct ChannelReader {
    receiver: Receiver<Bytes>,
    current: Bytes,
}

impl ChannelReader {
    /// Wait for unread bytes; false once the feed is closed and drained
    fn fill(&mut self) -> bool {
        while !self.current.has_remaining() {
            match self.receiver.recv() {
                Ok(bytes) => self.current = bytes,
                Err(_) => return false,
            }
        }
        true
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() || !self.fill() {
            return Ok(0);
        }
        let n = buf.len().min(self.current.remaining());
        self.current.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }
}

struct DecodeState {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
}

/// Pull half
pub struct StreamingDecoder {
    source: Option<ChannelReader>,
    state: Option<DecodeState>,
    format: Option<(u32, u16)>,
    pending: Option<Vec<f32>>,
}

/// Create a connected feeder/decoder pair
pub fn streaming_decoder() -> (StreamFeeder, StreamingDecoder) {
    let (sender, receiver) = crossbeam_channel::bounded(FEED_CAPACITY);
    let decoder = StreamingDecoder {
        source: Some(ChannelReader {
            receiver,
            current: Bytes::new(),
        }),
        state: None,
        format: None,
        pending: None,
    };
    (StreamFeeder { sender }, decoder)
}

impl StreamingDecoder {
    /// Probe the stream once enough bytes have arrived
    ///
    /// Returns false when the feed ended before anything could be probed.
    fn open(&mut self) -> Result<bool> {
        let Some(mut source) = self.source.take() else {
            return Ok(false);
        };
        if !source.fill() {
            debug!("Stream closed before any data arrived");
            return Ok(false);
        }

        let mss = MediaSourceStream::new(Box::new(ReadOnlySource::new(source)), Default::default());
        let mut hint = Hint::new();
        hint.with_extension("mp3");

        let probed = match symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        ) {
            Ok(probed) => probed,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("Stream ended before it could be probed");
                return Ok(false);
            }
            Err(e) => return Err(Error::Decode(format!("Failed to probe stream: {}", e))),
        };

        let format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track in stream".to_string()))?;
        let track_id = track.id;
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        info!("Streaming decoder ready (track {})", track_id);
        self.state = Some(DecodeState {
            format,
            decoder,
            track_id,
        });
        Ok(true)
    }

    /// Next decoded event, or None at end of stream
    ///
    /// Blocks while waiting for more bytes.
    pub fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        if let Some(frames) = self.pending.take() {
            return Ok(Some(StreamEvent::Frames(frames)));
        }
        if self.state.is_none() && !self.open()? {
            return Ok(None);
        }
        let Some(state) = self.state.as_mut() else {
            return Ok(None);
        };

        loop {
            let packet = match state.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!("End of stream");
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    state.decoder.reset();
                    continue;
                }
                Err(e) => return Err(Error::Decode(format!("Stream read failed: {}", e))),
            };

            if packet.track_id() != state.track_id {
                continue;
            }

            match state.decoder.decode(&packet) {
                Ok(decoded) => {
                    let mut samples = Vec::new();
                    let spec = append_interleaved(decoded, &mut samples);
                    if samples.is_empty() {
                        continue;
                    }

                    let format = (spec.rate, spec.channels.count() as u16);
                    if self.format != Some(format) {
                        self.format = Some(format);
                        self.pending = Some(samples);
                        return Ok(Some(StreamEvent::Format {
                            sample_rate: format.0,
                            channels: format.1,
                        }));
                    }
                    return Ok(Some(StreamEvent::Frames(samples)));
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable frame: {}", e);
                }
                Err(e) => return Err(Error::Decode(format!("Decoder failed: {}", e))),
            }
        }
    }
}
