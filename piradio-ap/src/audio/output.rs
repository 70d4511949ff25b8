//! Audio output using cpal
//!
//! [`AudioSink`] is the seam the player writes PCM into. [`CpalSink`] backs
//! it with a cpal stream fed from a lock-free ring buffer.

use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long `write` sleeps while the ring buffer is full
const WRITE_BACKOFF: Duration = Duration::from_millis(5);

/// Destination for interleaved f32 PCM
///
/// Calls block; run them off the async executor.
pub trait AudioSink {
    /// (Re)open the output for the given format
    fn configure(&mut self, sample_rate: u32, channels: u16) -> Result<()>;

    /// Write interleaved samples, returning the number of frames accepted
    fn write(&mut self, samples: &[f32]) -> Result<usize>;

    /// Wait until everything written has been played
    fn drain(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release the device
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct ActiveStream {
    // Held for its Drop; audio stops when this goes away
    _stream: Stream,
    producer: HeapProd<f32>,
    channels: u16,
    sample_rate: u32,
}

/// cpal-backed [`AudioSink`]
pub struct CpalSink {
    device: Device,
    buffer_secs: u32,
    active: Option<ActiveStream>,
    /// Set by the stream's error callback
    error_flag: Arc<AtomicBool>,
}

impl CpalSink {
    /// Open an output device
    ///
    /// # Arguments
    /// - `device_name`: Optional device name (None = default device)
    /// - `buffer_secs`: Ring buffer length in seconds of audio
    ///
    /// A named device that cannot be found falls back to the default device.
    pub fn new(device_name: Option<&str>, buffer_secs: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = match device_name {
            Some(name) => {
                let mut devices = host
                    .output_devices()
                    .map_err(|e| Error::Sink(format!("Failed to enumerate devices: {}", e)))?;

                match devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                    Some(dev) => {
                        info!("Found requested audio device: {}", name);
                        dev
                    }
                    None => {
                        warn!("Requested device '{}' not found, falling back to default device", name);
                        host.default_output_device().ok_or_else(|| {
                            Error::Sink(format!(
                                "Device '{}' not found and no default device available",
                                name
                            ))
                        })?
                    }
                }
            }
            None => host
                .default_output_device()
                .ok_or_else(|| Error::Sink("No default output device found".to_string()))?,
        };

        info!(
            "Using audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        Ok(Self {
            device,
            buffer_secs: buffer_secs.max(1),
            active: None,
            error_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Find a device config with exactly this rate and channel count
    fn find_config(&self, sample_rate: u32, channels: u16) -> Result<(StreamConfig, SampleFormat)> {
        let configs = self
            .device
            .supported_output_configs()
            .map_err(|e| Error::Sink(format!("Failed to get device configs: {}", e)))?;

        let candidates: Vec<_> = configs
            .filter(|c| {
                c.channels() == channels
                    && c.min_sample_rate().0 <= sample_rate
                    && c.max_sample_rate().0 >= sample_rate
            })
            .collect();

        // Prefer f32, then whatever integer format the device offers
        let chosen = [SampleFormat::F32, SampleFormat::I16, SampleFormat::U16]
            .iter()
            .find_map(|format| candidates.iter().find(|c| c.sample_format() == *format))
            .ok_or_else(|| {
                Error::Sink(format!(
                    "Device does not support {} Hz with {} channels",
                    sample_rate, channels
                ))
            })?;

        let sample_format = chosen.sample_format();
        let config = chosen
            .clone()
            .with_sample_rate(cpal::SampleRate(sample_rate))
            .config();
        Ok((config, sample_format))
    }

    fn build_stream<T>(&self, config: &StreamConfig, mut consumer: HeapCons<f32>) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let error_flag = Arc::clone(&self.error_flag);

        self.device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    for sample in data.iter_mut() {
                        *sample = match consumer.try_pop() {
                            Some(value) => T::from_sample(value.clamp(-1.0, 1.0)),
                            None => T::EQUILIBRIUM,
                        };
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::Sink(format!("Failed to build stream: {}", e)))
    }

    fn check_stream(&self) -> Result<()> {
        if self.error_flag.load(Ordering::SeqCst) {
            return Err(Error::Sink("Audio stream reported an error".to_string()));
        }
        Ok(())
    }
}

impl AudioSink for CpalSink {
    fn configure(&mut self, sample_rate: u32, channels: u16) -> Result<()> {
        if let Some(active) = &self.active {
            if active.sample_rate == sample_rate && active.channels == channels {
                return Ok(());
            }
            // Let queued audio finish in the old format before switching
            self.drain()?;
        }
        self.active = None;
        self.error_flag.store(false, Ordering::SeqCst);

        let (config, sample_format) = self.find_config(sample_rate, channels)?;
        let capacity = sample_rate as usize * channels as usize * self.buffer_secs as usize;
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        debug!(capacity, "Ring buffer allocated");

        let stream = match sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(&config, consumer)?,
            SampleFormat::I16 => self.build_stream::<i16>(&config, consumer)?,
            SampleFormat::U16 => self.build_stream::<u16>(&config, consumer)?,
            other => {
                return Err(Error::Sink(format!("Unsupported sample format: {:?}", other)));
            }
        };

        stream
            .play()
            .map_err(|e| Error::Sink(format!("Failed to start stream: {}", e)))?;

        info!(
            sample_rate,
            channels,
            format = ?sample_format,
            "Audio output configured"
        );
        self.active = Some(ActiveStream {
            _stream: stream,
            producer,
            channels,
            sample_rate,
        });
        Ok(())
    }

    fn write(&mut self, samples: &[f32]) -> Result<usize> {
        self.check_stream()?;
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| Error::Sink("Audio output is not configured".to_string()))?;

        let mut offset = 0;
        while offset < samples.len() {
            let pushed = active.producer.push_slice(&samples[offset..]);
            offset += pushed;
            if pushed == 0 {
                if self.error_flag.load(Ordering::SeqCst) {
                    return Err(Error::Sink("Audio stream reported an error".to_string()));
                }
                std::thread::sleep(WRITE_BACKOFF);
            }
        }

        Ok(samples.len() / active.channels as usize)
    }

    fn drain(&mut self) -> Result<()> {
        let Some(active) = self.active.as_ref() else {
            return Ok(());
        };

        // Twice the buffer length is plenty for a healthy device
        let deadline = Instant::now() + Duration::from_secs(self.buffer_secs as u64 * 2);
        while !active.producer.is_empty() {
            self.check_stream()?;
            if Instant::now() >= deadline {
                warn!("Timed out waiting for audio output to drain");
                break;
            }
            std::thread::sleep(WRITE_BACKOFF);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.active.take().is_some() {
            info!("Audio output closed");
        }
        Ok(())
    }
}
