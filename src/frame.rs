//! Audio and analysis frames.

use std::sync::Arc;
use std::time::Duration;

use crate::analysis::SpectrumFrame;
use crate::loudness::LoudnessSnapshot;

/// A fixed-length block of captured samples with its sequence number.
///
/// `AudioFrame` is the fundamental unit flowing out of the capture engine.
/// Samples are interleaved 32-bit floats normalized to `[-1.0, 1.0]` and are
/// stored in an `Arc<[f32]>`, so cloning a frame never copies audio and no
/// holder can mutate it.
///
/// # Example
///
/// ```
/// use omega_audio::AudioFrame;
/// use std::time::Duration;
///
/// let frame = AudioFrame::new(vec![0.0; 960], 7, 48000, 2, Duration::ZERO);
/// assert_eq!(frame.frame_count(), 480);
/// assert_eq!(frame.duration(), Duration::from_millis(10));
///
/// // Cheap clone - shares sample data
/// let shared = frame.clone();
/// assert_eq!(shared.sequence, 7);
/// ```
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Interleaved samples, `frame_count() * channels` long.
    pub samples: Arc<[f32]>,

    /// Monotonically increasing sequence number. Continues across device
    /// switches; a gap means frames were dropped.
    pub sequence: u64,

    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Number of interleaved channels.
    pub channels: u16,

    /// Capture time relative to the start of the session.
    pub timestamp: Duration,
}

impl AudioFrame {
    /// Creates a new frame from interleaved samples.
    pub fn new(
        samples: Vec<f32>,
        sequence: u64,
        sample_rate: u32,
        channels: u16,
        timestamp: Duration,
    ) -> Self {
        Self {
            samples: samples.into(),
            sequence,
            sample_rate,
            channels,
            timestamp,
        }
    }

    /// Creates a zeroed frame, used as fallback while the device is lost.
    pub fn silence(
        frame_length: usize,
        sequence: u64,
        sample_rate: u32,
        channels: u16,
        timestamp: Duration,
    ) -> Self {
        Self::new(
            vec![0.0; frame_length * channels as usize],
            sequence,
            sample_rate,
            channels,
            timestamp,
        )
    }

    /// Returns the duration of this frame.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / f64::from(self.sample_rate))
    }

    /// Returns the number of sample frames (samples per channel).
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Returns `true` if this frame contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Iterates over the samples of one channel.
    ///
    /// An out-of-range channel yields nothing.
    pub fn channel(&self, index: usize) -> impl Iterator<Item = f32> + '_ {
        let channels = self.channels as usize;
        let skip = if index < channels {
            index
        } else {
            self.samples.len()
        };
        self.samples
            .iter()
            .copied()
            .skip(skip)
            .step_by(channels.max(1))
    }

    /// Averages all channels into `out`, replacing its contents.
    pub fn mixdown_into(&self, out: &mut Vec<f32>) {
        out.clear();
        let channels = self.channels.max(1) as usize;
        if channels == 1 {
            out.extend_from_slice(&self.samples);
            return;
        }
        let scale = 1.0 / channels as f32;
        out.extend(
            self.samples
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() * scale),
        );
    }
}

/// The unit handed to plugin sinks: one audio frame plus everything derived
/// from it.
///
/// All parts are reference counted, so the distributor builds one
/// `AnalysisFrame` per cycle and every sink sees the same data.
#[derive(Debug, Clone)]
pub struct AnalysisFrame {
    /// The captured audio.
    pub audio: AudioFrame,
    /// Log-spaced magnitude spectrum with peak hold.
    pub spectrum: Arc<SpectrumFrame>,
    /// Loudness, true-peak and RMS readings.
    pub loudness: Arc<LoudnessSnapshot>,
    /// Capture timestamp (same as `audio.timestamp`).
    pub timestamp: Duration,
    /// `true` when the audio was synthesized because the device is lost.
    pub silent: bool,
}

impl AnalysisFrame {
    /// Bundles a frame with its analysis results.
    pub fn new(
        audio: AudioFrame,
        spectrum: Arc<SpectrumFrame>,
        loudness: Arc<LoudnessSnapshot>,
        silent: bool,
    ) -> Self {
        Self {
            timestamp: audio.timestamp,
            audio,
            spectrum,
            loudness,
            silent,
        }
    }

    /// Sequence number shared by the audio, spectrum and loudness parts.
    pub fn sequence(&self) -> u64 {
        self.audio.sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_stereo_48khz() {
        let frame = AudioFrame::new(vec![0.0; 9600], 0, 48000, 2, Duration::ZERO);
        // 9600 samples / 2 channels = 4800 frames / 48000 Hz = 100ms
        assert_eq!(frame.duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_frame_count() {
        let frame = AudioFrame::new(vec![0.0; 200], 0, 16000, 2, Duration::ZERO);
        assert_eq!(frame.frame_count(), 100);
    }

    #[test]
    fn test_empty_frame() {
        let frame = AudioFrame::new(vec![], 0, 16000, 1, Duration::ZERO);
        assert!(frame.is_empty());
        assert_eq!(frame.frame_count(), 0);
        assert_eq!(frame.duration(), Duration::ZERO);
    }

    #[test]
    fn test_zero_channels() {
        let frame = AudioFrame::new(vec![0.0; 100], 0, 16000, 0, Duration::ZERO);
        assert_eq!(frame.duration(), Duration::ZERO);
        assert_eq!(frame.frame_count(), 0);
    }

    #[test]
    fn test_silence() {
        let frame = AudioFrame::silence(512, 3, 48000, 2, Duration::from_millis(5));
        assert_eq!(frame.samples.len(), 1024);
        assert!(frame.samples.iter().all(|&s| s == 0.0));
        assert_eq!(frame.sequence, 3);
    }

    #[test]
    fn test_channel_iter() {
        let frame = AudioFrame::new(vec![1.0, -1.0, 2.0, -2.0], 0, 48000, 2, Duration::ZERO);
        assert_eq!(frame.channel(0).collect::<Vec<_>>(), vec![1.0, 2.0]);
        assert_eq!(frame.channel(1).collect::<Vec<_>>(), vec![-1.0, -2.0]);
        assert_eq!(frame.channel(2).count(), 0);
    }

    #[test]
    fn test_mixdown() {
        let frame = AudioFrame::new(vec![1.0, 0.0, 0.5, 0.5], 0, 48000, 2, Duration::ZERO);
        let mut mono = Vec::new();
        frame.mixdown_into(&mut mono);
        assert_eq!(mono, vec![0.5, 0.5]);
    }
}
