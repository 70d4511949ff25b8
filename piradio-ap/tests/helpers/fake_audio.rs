//! Fake decoder and sink

use piradio_ap::audio::{AudioSink, PcmBuffer, SegmentDecoder};
use piradio_ap::{Error, Result};
use std::sync::{Arc, Mutex};

/// Decodes every segment to four stereo frames at 44.1 kHz
///
/// Segments whose bytes start with `bad` fail to decode; segments starting
/// with `mono` decode as mono 22.05 kHz. Every decoded body is recorded.
#[derive(Clone, Default)]
pub struct FakeDecoder {
    decoded: Arc<Mutex<Vec<String>>>,
}

impl FakeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bodies decoded so far, as text
    pub fn decoded(&self) -> Vec<String> {
        self.decoded.lock().unwrap().clone()
    }
}

impl SegmentDecoder for FakeDecoder {
    fn decode(&mut self, segment: &[u8]) -> Result<PcmBuffer> {
        if segment.starts_with(b"bad") {
            return Err(Error::Decode("corrupt segment".to_string()));
        }
        self.decoded
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(segment).into_owned());

        if segment.starts_with(b"mono") {
            Ok(PcmBuffer::new(vec![0.1; 4], 22050, 1))
        } else {
            Ok(PcmBuffer::new(vec![0.1; 8], 44100, 2))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SinkLog {
    pub configured: Vec<(u32, u16)>,
    pub frames_written: usize,
    pub writes: usize,
    pub drained: bool,
    pub closed: bool,
}

/// Sink that only records what it was asked to do
#[derive(Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<SinkLog>>,
    fail_writes: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every write fails like a lost device
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn log(&self) -> SinkLog {
        self.log.lock().unwrap().clone()
    }
}

impl AudioSink for RecordingSink {
    fn configure(&mut self, sample_rate: u32, channels: u16) -> Result<()> {
        self.log.lock().unwrap().configured.push((sample_rate, channels));
        Ok(())
    }

    fn write(&mut self, samples: &[f32]) -> Result<usize> {
        if self.fail_writes {
            return Err(Error::Sink("device disappeared".to_string()));
        }
        let mut log = self.log.lock().unwrap();
        let channels = log.configured.last().map(|(_, c)| *c).unwrap_or(2) as usize;
        let frames = samples.len() / channels;
        log.frames_written += frames;
        log.writes += 1;
        Ok(frames)
    }

    fn drain(&mut self) -> Result<()> {
        self.log.lock().unwrap().drained = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.log.lock().unwrap().closed = true;
        Ok(())
    }
}
