//! Windowed FFT spectrum on a logarithmic bar axis.

use std::sync::Arc;
use std::time::Duration;

use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::{BarLayout, PeakHold};
use crate::{AudioFrame, PipelineConfig};

/// Magnitude floor below which FFT output is treated as silence.
const MIN_MAGNITUDE: f32 = 1e-12;

/// One analyzed spectrum: `bar_count` bars with their held peaks.
#[derive(Debug, Clone)]
pub struct SpectrumFrame {
    /// Sequence number of the source [`AudioFrame`].
    pub sequence: u64,
    /// Capture timestamp of the source frame.
    pub timestamp: Duration,
    /// Centre frequency of each bar in Hz, ascending. Shared between frames.
    pub frequencies: Arc<[f32]>,
    /// Magnitude of each bar in dB relative to full scale.
    pub magnitudes_db: Arc<[f32]>,
    /// Held peak of each bar in dB.
    pub peaks_db: Arc<[f32]>,
}

impl SpectrumFrame {
    /// Number of bars.
    pub fn len(&self) -> usize {
        self.magnitudes_db.len()
    }

    /// Returns `true` if the frame has no bars.
    pub fn is_empty(&self) -> bool {
        self.magnitudes_db.is_empty()
    }

    /// Iterates `(frequency_hz, magnitude_db)` pairs.
    pub fn bars(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.frequencies
            .iter()
            .copied()
            .zip(self.magnitudes_db.iter().copied())
    }
}

/// Turns audio frames into log-spaced magnitude spectra.
///
/// Mono downmixes of incoming frames accumulate in a history ring as large
/// as the analysis window, so the window can be longer than one frame for
/// better low-frequency resolution. The analyzer owns the peak hold state;
/// rebuilding it (for example after a bar count change) clears the peaks.
pub struct SpectralAnalyzer {
    sample_rate: u32,
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    history: HeapRb<f32>,
    window: Vec<f32>,
    /// Scales bin magnitudes so a full-scale sine reads 0 dB.
    magnitude_scale: f32,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    mono: Vec<f32>,
    bins_db: Vec<f32>,
    layout: BarLayout,
    frequencies: Arc<[f32]>,
    smoothed: Option<Vec<f32>>,
    smoothing: f32,
    floor_db: f32,
    peak_hold: PeakHold,
    hold_peaks: bool,
}

impl SpectralAnalyzer {
    /// Builds an analyzer for the configured sample rate.
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_sample_rate(config, config.sample_rate)
    }

    /// Builds an analyzer for `sample_rate`, taking every other setting
    /// from `config`.
    pub fn with_sample_rate(config: &PipelineConfig, sample_rate: u32) -> Self {
        let fft_size = config.fft_size();
        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / fft_size as f32).cos())
            })
            .collect();
        let window_sum: f32 = window.iter().sum();

        let mut history = HeapRb::<f32>::new(fft_size);
        history.push_slice_overwrite(&vec![0.0; fft_size]);

        let layout = BarLayout::new(
            config.bar_count,
            config.min_frequency,
            config.max_frequency,
            sample_rate,
            fft_size,
        );

        tracing::debug!(
            fft_size,
            bar_count = config.bar_count,
            sample_rate,
            "Spectral analyzer ready"
        );

        Self {
            sample_rate,
            fft_size,
            fft,
            history,
            window,
            magnitude_scale: 2.0 / window_sum,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
            mono: Vec::new(),
            bins_db: vec![config.noise_floor_db; layout.bin_count()],
            frequencies: layout.centres(),
            layout,
            smoothed: None,
            smoothing: config.smoothing,
            floor_db: config.noise_floor_db,
            peak_hold: PeakHold::new(
                config.bar_count,
                config.peak_hold_decay_db,
                config.peak_hold_time,
                config.noise_floor_db,
            ),
            hold_peaks: config.peak_hold,
        }
    }

    /// Analyzes one frame and advances peak hold by the frame's duration.
    pub fn analyze(&mut self, frame: &AudioFrame) -> SpectrumFrame {
        frame.mixdown_into(&mut self.mono);
        let newest = &self.mono[self.mono.len().saturating_sub(self.fft_size)..];
        self.history.push_slice_overwrite(newest);

        for ((slot, &sample), &w) in self
            .buffer
            .iter_mut()
            .zip(self.history.iter())
            .zip(&self.window)
        {
            *slot = Complex::new(sample * w, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        for (db, bin) in self.bins_db.iter_mut().zip(&self.buffer) {
            let magnitude = bin.norm() * self.magnitude_scale;
            *db = (20.0 * magnitude.max(MIN_MAGNITUDE).log10()).max(self.floor_db);
        }

        let mut bars = vec![0.0; self.layout.len()];
        self.layout.map(&self.bins_db, &mut bars);
        self.apply_smoothing(&mut bars);

        let magnitudes_db: Arc<[f32]> = bars.into();
        let peaks_db = if self.hold_peaks {
            self.peak_hold.update(&magnitudes_db, frame.duration());
            self.peak_hold.peaks().into()
        } else {
            Arc::clone(&magnitudes_db)
        };

        SpectrumFrame {
            sequence: frame.sequence,
            timestamp: frame.timestamp,
            frequencies: Arc::clone(&self.frequencies),
            magnitudes_db,
            peaks_db,
        }
    }

    fn apply_smoothing(&mut self, bars: &mut [f32]) {
        if self.smoothing <= 0.0 {
            return;
        }
        match &mut self.smoothed {
            Some(previous) => {
                let keep = self.smoothing;
                for (value, prev) in bars.iter_mut().zip(previous.iter_mut()) {
                    *value = keep * *prev + (1.0 - keep) * *value;
                    *prev = *value;
                }
            }
            None => self.smoothed = Some(bars.to_vec()),
        }
    }

    /// Drops every held peak back to the floor.
    pub fn reset_peaks(&mut self) {
        self.peak_hold.reset();
    }

    /// Updates peak decay, hold time and smoothing without a restart.
    pub fn set_dynamics(&mut self, decay_db_per_sec: f32, hold_time: Duration, smoothing: f32) {
        self.peak_hold.set_timing(decay_db_per_sec, hold_time);
        if smoothing <= 0.0 {
            self.smoothed = None;
        }
        self.smoothing = smoothing;
    }

    /// Turns peak hold on or off. Held peaks start from the floor again when
    /// it is turned back on.
    pub fn set_peak_hold(&mut self, enabled: bool) {
        if enabled && !self.hold_peaks {
            self.peak_hold.reset();
        }
        self.hold_peaks = enabled;
    }

    /// Number of bars per spectrum.
    pub fn bar_count(&self) -> usize {
        self.layout.len()
    }

    /// Sample rate the bar layout was built for.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// FFT length in samples.
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Samples currently held in the analysis history.
    pub fn history_len(&self) -> usize {
        self.history.occupied_len()
    }

    /// Centre frequencies of the bars.
    pub fn frequencies(&self) -> Arc<[f32]> {
        Arc::clone(&self.frequencies)
    }
}

impl std::fmt::Debug for SpectralAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralAnalyzer")
            .field("sample_rate", &self.sample_rate)
            .field("fft_size", &self.fft_size)
            .field("bar_count", &self.layout.len())
            .finish_non_exhaustive()
    }
}
