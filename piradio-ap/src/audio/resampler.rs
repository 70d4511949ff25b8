//! Sample rate conversion with rubato
//!
//! Segments arrive at whatever rate the station encoded them. They are
//! converted to [`TARGET_SAMPLE_RATE`] so the sink keeps one configuration
//! for the whole session.

use crate::audio::types::PcmBuffer;
use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

/// Output sample rate for decoded segments
pub const TARGET_SAMPLE_RATE: u32 = 44100;

/// Input frames handed to rubato per call
const CHUNK_FRAMES: usize = 1024;

/// Convert `pcm` to `output_rate`
///
/// The whole buffer is pushed through in fixed chunks and the filter is
/// flushed at the end. The result is trimmed to exactly
/// `frames * output_rate / input_rate` frames (rounded), with the filter
/// delay removed from the front.
pub fn resample(pcm: PcmBuffer, output_rate: u32) -> Result<PcmBuffer> {
    if pcm.sample_rate == output_rate {
        return Ok(pcm);
    }
    if pcm.is_empty() {
        return Ok(PcmBuffer::new(Vec::new(), output_rate, pcm.channels));
    }
    if pcm.channels == 0 || pcm.sample_rate == 0 || output_rate == 0 {
        return Err(Error::Decode(format!(
            "cannot resample {} Hz x {} channels to {} Hz",
            pcm.sample_rate, pcm.channels, output_rate
        )));
    }

    let channels = pcm.channels as usize;
    let ratio = output_rate as f64 / pcm.sample_rate as f64;
    debug!(
        from = pcm.sample_rate,
        to = output_rate,
        channels,
        "Resampling segment"
    );

    let mut resampler =
        FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Septic, CHUNK_FRAMES, channels)
            .map_err(|e| Error::Decode(format!("failed to create resampler: {}", e)))?;

    let planar = split_channels(&pcm.samples, channels);
    let total_frames = planar[0].len();
    let mut output = vec![Vec::new(); channels];

    let mut position = 0;
    while position < total_frames {
        let end = (position + CHUNK_FRAMES).min(total_frames);
        let chunk: Vec<&[f32]> = planar.iter().map(|c| &c[position..end]).collect();
        let processed = if end - position == CHUNK_FRAMES {
            resampler.process(&chunk[..], None)
        } else {
            resampler.process_partial(Some(chunk.as_slice()), None)
        }
        .map_err(|e| Error::Decode(format!("resampling failed: {}", e)))?;
        extend_channels(&mut output, processed);
        position = end;
    }

    // Whatever is still inside the filter
    let tail = resampler
        .process_partial::<&[f32]>(None, None)
        .map_err(|e| Error::Decode(format!("resampler flush failed: {}", e)))?;
    extend_channels(&mut output, tail);

    let expected = (total_frames as f64 * ratio).round() as usize;
    let samples = merge_channels(&output, resampler.output_delay(), expected);
    Ok(PcmBuffer::new(samples, output_rate, pcm.channels))
}

/// Interleaved → one Vec per channel
fn split_channels(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    (0..channels)
        .map(|ch| samples.iter().skip(ch).step_by(channels).copied().collect())
        .collect()
}

fn extend_channels(output: &mut [Vec<f32>], processed: Vec<Vec<f32>>) {
    for (channel, block) in output.iter_mut().zip(processed) {
        channel.extend(block);
    }
}

/// Planar → interleaved, frames `skip..skip + frames` only
fn merge_channels(planar: &[Vec<f32>], skip: usize, frames: usize) -> Vec<f32> {
    let available = planar.first().map_or(0, Vec::len);
    let start = skip.min(available);
    let end = (start + frames).min(available);

    (start..end)
        .flat_map(|frame| planar.iter().map(move |channel| channel[frame]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(rate: u32, frames: usize) -> PcmBuffer {
        let samples = (0..frames)
            .flat_map(|i| {
                let t = i as f32 / rate as f32;
                let s = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5;
                [s, s]
            })
            .collect();
        PcmBuffer::new(samples, rate, 2)
    }

    #[test]
    fn test_split_and_merge() {
        let planar = split_channels(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2);
        assert_eq!(planar, vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]]);
        assert_eq!(merge_channels(&planar, 1, 5), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_same_rate_is_untouched() {
        let pcm = PcmBuffer::new(vec![0.1, 0.2, 0.3, 0.4], 44100, 2);
        assert_eq!(resample(pcm.clone(), 44100).unwrap(), pcm);
    }

    #[test]
    fn test_48k_to_44k1_frame_count() {
        let output = resample(sine(48000, 4800), TARGET_SAMPLE_RATE).unwrap();
        assert_eq!(output.sample_rate, TARGET_SAMPLE_RATE);
        assert_eq!(output.channels, 2);
        assert_eq!(output.frames(), 4410);
    }

    #[test]
    fn test_upsampling_keeps_level() {
        let output = resample(sine(22050, 2205), TARGET_SAMPLE_RATE).unwrap();
        assert_eq!(output.frames(), 4410);
        let peak = output.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.4 && peak < 0.6, "peak {}", peak);
    }

    #[test]
    fn test_zero_channels_rejected() {
        let pcm = PcmBuffer::new(vec![0.0, 0.0], 48000, 0);
        assert!(resample(pcm, 44100).is_err());
    }
}
