//! BS.1770 loudness meter with true peak and weighted RMS.

use std::collections::VecDeque;

use super::filter::WeightingFilter;
use super::gating::{power_to_lufs, GatedLoudness};
use super::true_peak::{to_dbtp, TruePeakDetector};
use crate::{AudioFrame, WeightingMode};

/// Floor for RMS and true-peak readings in dB.
pub const LEVEL_FLOOR_DB: f32 = -100.0;

/// Loudness hop length in seconds. Momentary and short-term windows are
/// whole multiples of it.
const HOP_SECONDS: f64 = 0.1;
const MOMENTARY_HOPS: usize = 4;
const SHORT_TERM_HOPS: usize = 30;

/// Loudness readings after one frame.
///
/// LUFS values are `NEG_INFINITY` until enough audio has been measured:
/// 400 ms for momentary, 3 s for short-term and one block above the
/// absolute gate for integrated.
#[derive(Debug, Clone, PartialEq)]
pub struct LoudnessSnapshot {
    /// Sequence number of the measured frame.
    pub sequence: u64,
    /// Loudness of the last 400 ms.
    pub momentary_lufs: f32,
    /// Loudness of the last 3 s.
    pub short_term_lufs: f32,
    /// Running integrated loudness since start or the last reset.
    pub integrated_lufs: f32,
    /// Per-channel true peak of this frame in dBTP.
    pub true_peak_dbtp: Vec<f32>,
    /// Highest true peak since start or the last reset.
    pub max_true_peak_dbtp: f32,
    /// Per-channel unweighted RMS of this frame in dBFS.
    pub rms_db: Vec<f32>,
    /// Per-channel RMS through the display weighting curve, in dB.
    pub weighted_rms_db: Vec<f32>,
    /// Weighting curve used for `weighted_rms_db`.
    pub weighting: WeightingMode,
    /// Whether `integrated_lufs` is gated.
    pub gated: bool,
}

impl LoudnessSnapshot {
    /// Highest per-channel true peak in this frame.
    pub fn peak_dbtp(&self) -> f32 {
        self.true_peak_dbtp
            .iter()
            .copied()
            .fold(LEVEL_FLOOR_DB, f32::max)
    }
}

/// Measures loudness, true peak and RMS frame by frame.
///
/// K-weighting always feeds the LUFS measurements. The selectable display
/// weighting only affects `weighted_rms_db`.
#[derive(Debug)]
pub struct LoudnessMeter {
    sample_rate: u32,
    channels: usize,
    weights: Vec<f64>,
    k_filters: Vec<WeightingFilter>,
    display_filters: Vec<WeightingFilter>,
    weighting: WeightingMode,
    true_peak: TruePeakDetector,
    hop_len: usize,
    hop_fill: usize,
    hop_sums: Vec<f64>,
    hops: VecDeque<f64>,
    integrated: GatedLoudness,
    gated: bool,
    momentary: f64,
    short_term: f64,
}

impl LoudnessMeter {
    /// Creates a meter for the given format.
    pub fn new(sample_rate: u32, channels: u16, weighting: WeightingMode, gated: bool) -> Self {
        let channels = channels.max(1) as usize;
        let hop_len = ((f64::from(sample_rate) * HOP_SECONDS).round() as usize).max(1);

        Self {
            sample_rate,
            channels,
            weights: channel_weights(channels),
            k_filters: filters(WeightingMode::K, sample_rate, channels),
            display_filters: filters(weighting, sample_rate, channels),
            weighting,
            true_peak: TruePeakDetector::new(channels),
            hop_len,
            hop_fill: 0,
            hop_sums: vec![0.0; channels],
            hops: VecDeque::with_capacity(SHORT_TERM_HOPS),
            integrated: GatedLoudness::default(),
            gated,
            momentary: f64::NEG_INFINITY,
            short_term: f64::NEG_INFINITY,
        }
    }

    /// Measures one frame.
    ///
    /// A change in channel count rebuilds the per-channel filters but keeps
    /// the loudness history.
    pub fn measure(&mut self, frame: &AudioFrame) -> LoudnessSnapshot {
        let channels = frame.channels.max(1) as usize;
        if channels != self.channels {
            tracing::debug!(from = self.channels, to = channels, "Meter channel layout changed");
            self.set_channels(channels);
        }

        let mut raw = vec![0.0f64; channels];
        let mut weighted = vec![0.0f64; channels];

        for samples in frame.samples.chunks_exact(channels) {
            for (ch, &sample) in samples.iter().enumerate() {
                let x = f64::from(sample);
                let k = self.k_filters[ch].process(x);
                let d = self.display_filters[ch].process(x);
                self.hop_sums[ch] += k * k;
                raw[ch] += x * x;
                weighted[ch] += d * d;
            }

            self.hop_fill += 1;
            if self.hop_fill == self.hop_len {
                self.complete_hop();
            }
        }

        let frames = frame.frame_count().max(1) as f64;
        let to_db = |sum: f64| {
            let rms = (sum / frames).sqrt();
            if rms > 0.0 {
                (20.0 * rms.log10()).max(f64::from(LEVEL_FLOOR_DB)) as f32
            } else {
                LEVEL_FLOOR_DB
            }
        };

        let true_peak_dbtp = self
            .true_peak
            .process(&frame.samples)
            .into_iter()
            .map(|peak| to_dbtp(peak, LEVEL_FLOOR_DB))
            .collect();

        LoudnessSnapshot {
            sequence: frame.sequence,
            momentary_lufs: self.momentary as f32,
            short_term_lufs: self.short_term as f32,
            integrated_lufs: self.integrated_lufs(),
            true_peak_dbtp,
            max_true_peak_dbtp: to_dbtp(self.true_peak.max(), LEVEL_FLOOR_DB),
            rms_db: raw.into_iter().map(to_db).collect(),
            weighted_rms_db: weighted.into_iter().map(to_db).collect(),
            weighting: self.weighting,
            gated: self.gated,
        }
    }

    fn complete_hop(&mut self) {
        let hop_len = self.hop_len as f64;
        let power: f64 = self
            .hop_sums
            .iter()
            .zip(&self.weights)
            .map(|(sum, weight)| weight * sum / hop_len)
            .sum();
        self.hop_sums.fill(0.0);
        self.hop_fill = 0;

        if self.hops.len() == SHORT_TERM_HOPS {
            self.hops.pop_front();
        }
        self.hops.push_back(power);

        if self.hops.len() >= MOMENTARY_HOPS {
            let block = mean(self.hops.iter().rev().take(MOMENTARY_HOPS));
            self.momentary = power_to_lufs(block);
            self.integrated.add_block(block);
        }
        if self.hops.len() == SHORT_TERM_HOPS {
            self.short_term = power_to_lufs(mean(self.hops.iter()));
        }
    }

    fn set_channels(&mut self, channels: usize) {
        self.channels = channels;
        self.weights = channel_weights(channels);
        self.k_filters = filters(WeightingMode::K, self.sample_rate, channels);
        self.display_filters = filters(self.weighting, self.sample_rate, channels);
        self.true_peak = TruePeakDetector::new(channels);
        self.hop_sums = vec![0.0; channels];
    }

    /// Current integrated loudness, gated or not per the gating setting.
    pub fn integrated_lufs(&self) -> f32 {
        let value = if self.gated {
            self.integrated.gated()
        } else {
            self.integrated.ungated()
        };
        value as f32
    }

    /// Switches the display weighting curve.
    pub fn set_weighting(&mut self, mode: WeightingMode) {
        if mode != self.weighting {
            self.weighting = mode;
            self.display_filters = filters(mode, self.sample_rate, self.channels);
        }
    }

    /// Enables or disables gating of the integrated value.
    pub fn set_gated(&mut self, gated: bool) {
        self.gated = gated;
    }

    /// Active display weighting.
    pub fn weighting(&self) -> WeightingMode {
        self.weighting
    }

    /// Sample rate the filters were designed for.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Clears the integrated history, block windows, filter state and the
    /// true-peak maximum. Measurement restarts with the next frame.
    pub fn reset(&mut self) {
        self.integrated.reset();
        self.hops.clear();
        self.hop_sums.fill(0.0);
        self.hop_fill = 0;
        self.k_filters.iter_mut().for_each(WeightingFilter::reset);
        self.display_filters.iter_mut().for_each(WeightingFilter::reset);
        self.true_peak.reset();
        self.momentary = f64::NEG_INFINITY;
        self.short_term = f64::NEG_INFINITY;
    }
}

fn filters(mode: WeightingMode, sample_rate: u32, channels: usize) -> Vec<WeightingFilter> {
    (0..channels)
        .map(|_| WeightingFilter::new(mode, sample_rate))
        .collect()
}

/// BS.1770 channel weights: surrounds get +1.5 dB, LFE is excluded.
fn channel_weights(channels: usize) -> Vec<f64> {
    if channels == 6 {
        // L, R, C, LFE, Ls, Rs
        vec![1.0, 1.0, 1.0, 0.0, 1.41, 1.41]
    } else {
        vec![1.0; channels]
    }
}

fn mean<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
