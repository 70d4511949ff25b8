//! Segment decoder
//!
//! Turns one complete segment into PCM. MPEG-TS segments are demultiplexed
//! first (audio PIDs come from the PMT), then the elementary stream (ADTS
//! AAC or MPEG audio) is decoded with symphonia. Data that is not a
//! transport stream is handed to symphonia as-is.
//!
//! Output is always stereo at [`TARGET_SAMPLE_RATE`].

use crate::audio::resampler::{resample, TARGET_SAMPLE_RATE};
use crate::audio::types::{append_interleaved, PcmBuffer};
use crate::error::{Error, Result};
use mpeg2ts::ts::{ReadTsPacket, TsPacketReader, TsPayload};
use std::io::Cursor;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

const TS_PACKET_SIZE: usize = 188;
const TS_SYNC_BYTE: u8 = 0x47;

/// Media decoder for one complete segment at a time
pub trait SegmentDecoder {
    fn decode(&mut self, segment: &[u8]) -> Result<PcmBuffer>;
}

/// Elementary audio pulled out of a transport stream
#[derive(Debug)]
struct Elementary {
    data: Vec<u8>,
    /// Extension hint for the symphonia probe
    extension: &'static str,
}

/// symphonia-backed decoder for HLS segments
pub struct TsSegmentDecoder {
    target_rate: u32,
}

impl Default for TsSegmentDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TsSegmentDecoder {
    pub fn new() -> Self {
        Self {
            target_rate: TARGET_SAMPLE_RATE,
        }
    }

    /// Decode raw elementary/container bytes with symphonia
    fn decode_with_symphonia(data: Vec<u8>, extension: Option<&str>) -> Result<PcmBuffer> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to probe segment: {}", e)))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;
        let track_id = track.id;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        let mut samples = Vec::new();
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
        let mut channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(0);

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    warn!("Error reading packet: {}", e);
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = append_interleaved(decoded, &mut samples);
                    sample_rate = spec.rate;
                    channels = spec.channels.count() as u16;
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    // Corrupt frame; the rest of the segment may still decode
                    warn!("Decode error: {}", e);
                }
                Err(e) => {
                    return Err(Error::Decode(format!("Decoder failed: {}", e)));
                }
            }
        }

        if samples.is_empty() || sample_rate == 0 || channels == 0 {
            return Err(Error::Decode("Segment produced no audio".to_string()));
        }

        Ok(PcmBuffer::new(samples, sample_rate, channels))
    }
}

impl SegmentDecoder for TsSegmentDecoder {
    fn decode(&mut self, segment: &[u8]) -> Result<PcmBuffer> {
        let pcm = if looks_like_transport_stream(segment) {
            let elementary = demux_transport_stream(segment)?;
            debug!(
                "Demuxed {} bytes of {} audio from {} byte segment",
                elementary.data.len(),
                elementary.extension,
                segment.len()
            );
            Self::decode_with_symphonia(elementary.data, Some(elementary.extension))?
        } else {
            Self::decode_with_symphonia(segment.to_vec(), None)?
        };

        resample(pcm.to_stereo(), self.target_rate)
    }
}

/// TS sync byte at the start of the first two packets
fn looks_like_transport_stream(data: &[u8]) -> bool {
    match data.len() {
        0 => false,
        len if len > TS_PACKET_SIZE => {
            data[0] == TS_SYNC_BYTE && data[TS_PACKET_SIZE] == TS_SYNC_BYTE
        }
        _ => data[0] == TS_SYNC_BYTE,
    }
}

/// Probe hint for a PMT stream type, None for non-audio or unsupported
fn audio_extension(stream_type: u8) -> Option<&'static str> {
    match stream_type {
        // MPEG-1 / MPEG-2 audio
        0x03 | 0x04 => Some("mp3"),
        // AAC in ADTS framing
        0x0F => Some("aac"),
        _ => None,
    }
}

/// Extract the first audio elementary stream of a transport stream
fn demux_transport_stream(ts_data: &[u8]) -> Result<Elementary> {
    // First pass: audio PID from the PMT
    let mut audio: Option<(u16, &'static str)> = None;
    let mut reader = TsPacketReader::new(Cursor::new(ts_data));
    while audio.is_none() {
        match reader.read_ts_packet() {
            Ok(Some(packet)) => {
                if let Some(TsPayload::Pmt(pmt)) = packet.payload {
                    audio = pmt.es_info.iter().find_map(|es| {
                        audio_extension(es.stream_type as u8)
                            .map(|ext| (es.elementary_pid.as_u16(), ext))
                    });
                }
            }
            Ok(None) => break,
            Err(e) => {
                return Err(Error::Decode(format!("Invalid transport stream: {}", e)));
            }
        }
    }

    let (audio_pid, extension) =
        audio.ok_or_else(|| Error::Decode("No supported audio stream in segment".to_string()))?;

    // Second pass: payload of that PID
    let mut data = Vec::with_capacity(ts_data.len());
    let mut reader = TsPacketReader::new(Cursor::new(ts_data));
    loop {
        match reader.read_ts_packet() {
            Ok(Some(packet)) => {
                if packet.header.pid.as_u16() != audio_pid {
                    continue;
                }
                match packet.payload {
                    // Unit start: the PES header is already stripped
                    Some(TsPayload::Pes(pes)) => data.extend_from_slice(&pes.data),
                    Some(TsPayload::Raw(bytes)) => data.extend_from_slice(&bytes),
                    _ => {}
                }
            }
            Ok(None) => break,
            Err(e) => {
                // Truncated tail packet; keep what was read
                warn!("Stopped demuxing at malformed packet: {}", e);
                break;
            }
        }
    }

    if data.is_empty() {
        return Err(Error::Decode(format!("Audio PID {} carried no data", audio_pid)));
    }

    Ok(Elementary { data, extension })
}
