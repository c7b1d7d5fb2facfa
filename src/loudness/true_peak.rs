//! True-peak estimation by 4x polyphase oversampling.

/// Oversampling factor.
const FACTOR: usize = 4;
/// Prototype filter length at the oversampled rate.
const PROTOTYPE_TAPS: usize = 49;
/// Taps per polyphase branch.
const PHASE_TAPS: usize = PROTOTYPE_TAPS.div_ceil(FACTOR);

/// Per-channel inter-sample peak detector.
///
/// Each input sample produces four interpolated outputs from a windowed-sinc
/// prototype split into polyphase branches. The branch history is carried
/// across frames, so peaks straddling a frame boundary are still caught.
#[derive(Debug, Clone)]
pub struct TruePeakDetector {
    phases: [[f32; PHASE_TAPS]; FACTOR],
    channels: Vec<ChannelHistory>,
    max: f32,
}

#[derive(Debug, Clone)]
struct ChannelHistory {
    /// Samples written twice so the newest `PHASE_TAPS` are always contiguous.
    buffer: [f32; PHASE_TAPS * 2],
    pos: usize,
}

impl ChannelHistory {
    fn new() -> Self {
        Self {
            buffer: [0.0; PHASE_TAPS * 2],
            pos: 0,
        }
    }

    /// Pushes a sample and returns the history, oldest first.
    fn push(&mut self, sample: f32) -> &[f32] {
        self.buffer[self.pos] = sample;
        self.buffer[self.pos + PHASE_TAPS] = sample;
        self.pos = (self.pos + 1) % PHASE_TAPS;
        &self.buffer[self.pos..self.pos + PHASE_TAPS]
    }
}

impl TruePeakDetector {
    /// Creates a detector for `channels` channels.
    pub fn new(channels: usize) -> Self {
        Self {
            phases: polyphase_bank(),
            channels: vec![ChannelHistory::new(); channels],
            max: 0.0,
        }
    }

    /// Number of channels tracked.
    pub fn channels(&self) -> usize {
        self.channels.len()
    }

    /// Processes interleaved samples and returns each channel's peak
    /// (linear) for this block: the larger of the discrete and the
    /// oversampled maximum.
    pub fn process(&mut self, interleaved: &[f32]) -> Vec<f32> {
        let count = self.channels.len();
        let mut peaks = vec![0.0f32; count];
        if count == 0 {
            return peaks;
        }

        for frame in interleaved.chunks_exact(count) {
            for ((history, peak), &sample) in self.channels.iter_mut().zip(&mut peaks).zip(frame) {
                *peak = peak.max(sample.abs());
                let window = history.push(sample);
                for taps in &self.phases {
                    // taps[k] weights the sample k steps back from the newest
                    let value: f32 = taps
                        .iter()
                        .zip(window.iter().rev())
                        .map(|(t, s)| t * s)
                        .sum();
                    *peak = peak.max(value.abs());
                }
            }
        }

        let block_max = peaks.iter().copied().fold(0.0, f32::max);
        self.max = self.max.max(block_max);
        peaks
    }

    /// Largest peak seen since creation or the last reset (linear).
    pub fn max(&self) -> f32 {
        self.max
    }

    /// Clears history and the running maximum.
    pub fn reset(&mut self) {
        self.channels.iter_mut().for_each(|c| *c = ChannelHistory::new());
        self.max = 0.0;
    }
}

/// Blackman-windowed sinc interpolator, split into unity-gain branches.
fn polyphase_bank() -> [[f32; PHASE_TAPS]; FACTOR] {
    let centre = (PROTOTYPE_TAPS - 1) as f64 / 2.0;
    let span = (PROTOTYPE_TAPS - 1) as f64;

    let prototype: Vec<f64> = (0..PROTOTYPE_TAPS)
        .map(|n| {
            let x = (n as f64 - centre) / FACTOR as f64;
            let sinc = if x == 0.0 {
                1.0
            } else {
                (std::f64::consts::PI * x).sin() / (std::f64::consts::PI * x)
            };
            let phase = 2.0 * std::f64::consts::PI * n as f64 / span;
            let window = 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos();
            sinc * window
        })
        .collect();

    let mut bank = [[0.0f32; PHASE_TAPS]; FACTOR];
    for (phase, taps) in bank.iter_mut().enumerate() {
        let branch: Vec<f64> = (0..PHASE_TAPS)
            .map(|k| prototype.get(phase + FACTOR * k).copied().unwrap_or(0.0))
            .collect();
        let sum: f64 = branch.iter().sum();
        for (tap, value) in taps.iter_mut().zip(branch) {
            *tap = (value / sum) as f32;
        }
    }
    bank
}

/// Converts a linear peak to dBTP, floored at `floor_db`.
pub fn to_dbtp(peak: f32, floor_db: f32) -> f32 {
    if peak > 0.0 {
        (20.0 * peak.log10()).max(floor_db)
    } else {
        floor_db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(step: f64, phase: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (step * n as f64 + phase).sin() as f32)
            .collect()
    }

    #[test]
    fn test_branches_have_unity_dc_gain() {
        for taps in polyphase_bank() {
            let sum: f32 = taps.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_inter_sample_peak_exceeds_sample_peak() {
        // fs/4 at 45 degrees: every sample is +-0.707, the waveform peaks at 1.0
        let signal = sine(std::f64::consts::FRAC_PI_2, std::f64::consts::FRAC_PI_4, 2000);
        let sample_peak = signal.iter().fold(0.0f32, |m, s| m.max(s.abs()));

        let mut detector = TruePeakDetector::new(1);
        let peaks = detector.process(&signal);

        let sample_db = to_dbtp(sample_peak, -100.0);
        let true_db = to_dbtp(peaks[0], -100.0);
        assert!((sample_db - -3.01).abs() < 0.01);
        assert!(true_db > sample_db + 1.0, "true peak {true_db} dBTP");
        assert!(true_db < 0.5);
    }

    #[test]
    fn test_history_carries_across_blocks() {
        let signal = sine(std::f64::consts::FRAC_PI_2, std::f64::consts::FRAC_PI_4, 2000);

        let mut whole = TruePeakDetector::new(1);
        let expected = whole.process(&signal)[0];

        let mut split = TruePeakDetector::new(1);
        for block in signal.chunks(7) {
            split.process(block);
        }
        assert!((split.max() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_channels_are_independent() {
        let mut detector = TruePeakDetector::new(2);
        let interleaved: Vec<f32> = (0..256).flat_map(|_| [0.5, 0.0]).collect();
        let peaks = detector.process(&interleaved);

        // The onset step rings a little above 0.5
        assert!(peaks[0] >= 0.5 && peaks[0] < 0.6);
        assert_eq!(peaks[1], 0.0);
    }

    #[test]
    fn test_reset_clears_max() {
        let mut detector = TruePeakDetector::new(1);
        detector.process(&[0.9; 64]);
        assert!(detector.max() > 0.8);
        detector.reset();
        assert_eq!(detector.max(), 0.0);
        assert_eq!(to_dbtp(detector.max(), -100.0), -100.0);
    }
}
