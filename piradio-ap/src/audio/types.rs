//! Core audio data types

use symphonia::core::audio::{AudioBufferRef, SampleBuffer, SignalSpec};

/// Decoded PCM audio
///
/// **Format:**
/// - Samples are f32 (floating point -1.0 to 1.0)
/// - Interleaved: [L, R, L, R, ...] for stereo
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Number of frames (one sample per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.frames() as u64 * 1000) / self.sample_rate as u64
    }

    /// Fold to two channels
    ///
    /// Mono is duplicated to both sides; beyond two channels only the front
    /// left/right pair is kept.
    pub fn to_stereo(self) -> PcmBuffer {
        let channels = self.channels as usize;
        let samples = match channels {
            2 => return self,
            0 => Vec::new(),
            1 => self.samples.iter().flat_map(|&s| [s, s]).collect(),
            _ => self
                .samples
                .chunks_exact(channels)
                .flat_map(|frame| [frame[0], frame[1]])
                .collect(),
        };

        PcmBuffer {
            samples,
            sample_rate: self.sample_rate,
            channels: 2,
        }
    }

    /// Little-endian f32 bytes, for staging raw PCM to disk
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Append a decoded symphonia buffer as interleaved f32
///
/// Returns the buffer's signal spec (rate and channel layout).
pub fn append_interleaved(decoded: AudioBufferRef<'_>, output: &mut Vec<f32>) -> SignalSpec {
    let spec = *decoded.spec();
    let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
    buffer.copy_interleaved_ref(decoded);
    output.extend_from_slice(buffer.samples());
    spec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_and_duration() {
        let pcm = PcmBuffer::new(vec![0.0; 44100 * 2], 44100, 2);
        assert_eq!(pcm.frames(), 44100);
        assert_eq!(pcm.duration_ms(), 1000);
    }

    #[test]
    fn test_mono_to_stereo() {
        let pcm = PcmBuffer::new(vec![0.1, 0.2], 48000, 1).to_stereo();
        assert_eq!(pcm.channels, 2);
        assert_eq!(pcm.samples, vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn test_surround_to_stereo_keeps_front_pair() {
        let pcm = PcmBuffer::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 48000, 3).to_stereo();
        assert_eq!(pcm.samples, vec![1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_stereo_is_untouched() {
        let pcm = PcmBuffer::new(vec![0.5, -0.5], 44100, 2);
        assert_eq!(pcm.clone().to_stereo(), pcm);
    }

    #[test]
    fn test_le_bytes_length() {
        let pcm = PcmBuffer::new(vec![0.25, -0.25], 44100, 2);
        assert_eq!(pcm.to_le_bytes().len(), 8);
    }
}
