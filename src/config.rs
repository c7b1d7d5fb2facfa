//! Configuration types for the analysis pipeline.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::ConfigError;

/// Smallest supported bar count.
pub const MIN_BAR_COUNT: usize = 64;
/// Largest supported bar count.
pub const MAX_BAR_COUNT: usize = 1024;

/// Frequency weighting applied before a level computation.
///
/// Only [`WeightingMode::K`] feeds the integrated LUFS measurement. The
/// other modes change the display meter (weighted RMS) only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WeightingMode {
    /// ITU-R BS.1770 K-weighting (high shelf + high pass).
    #[default]
    K,
    /// IEC 61672 A-weighting.
    A,
    /// IEC 61672 C-weighting.
    C,
    /// Unweighted (flat).
    Z,
}

impl WeightingMode {
    /// All modes in display cycling order.
    pub const ALL: [WeightingMode; 4] = [Self::K, Self::A, Self::C, Self::Z];

    /// Returns the next mode in cycling order (K → A → C → Z → K).
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::K => Self::A,
            Self::A => Self::C,
            Self::C => Self::Z,
            Self::Z => Self::K,
        }
    }
}

impl fmt::Display for WeightingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::K => "K",
            Self::A => "A",
            Self::C => "C",
            Self::Z => "Z",
        };
        f.write_str(label)
    }
}

impl FromStr for WeightingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "K" => Ok(Self::K),
            "A" => Ok(Self::A),
            "C" => Ok(Self::C),
            "Z" => Ok(Self::Z),
            other => Err(format!("unknown weighting mode: {other}")),
        }
    }
}

/// Configuration for capture, analysis and distribution.
///
/// Use [`PipelineConfig::default()`] for sensible defaults, or customize as
/// needed. Every field is checked by [`validate()`](Self::validate) before
/// the pipeline accepts it.
///
/// # Example
///
/// ```
/// use omega_audio::{PipelineConfig, WeightingMode};
/// use std::time::Duration;
///
/// let config = PipelineConfig {
///     bar_count: 512,
///     weighting_mode: WeightingMode::A,
///     sink_timeout: Duration::from_millis(20),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Samples per channel in each delivered frame.
    ///
    /// Default: 512
    pub frame_length: usize,

    /// Capture sample rate in Hz. Must be supported by the device.
    ///
    /// Default: 48000
    pub sample_rate: u32,

    /// Requested channel count. Clamped to what the device offers.
    ///
    /// Default: 2
    pub channels: u16,

    /// Number of log-spaced spectrum bars (64..=1024).
    ///
    /// Default: 256
    pub bar_count: usize,

    /// Weighting for the display meter.
    ///
    /// Default: [`WeightingMode::K`]
    pub weighting_mode: WeightingMode,

    /// Peak-hold decay rate in dB per second.
    ///
    /// Default: 20.0
    pub peak_hold_decay_db: f32,

    /// Track held peaks. When off, `peaks_db` follows the bar magnitudes.
    ///
    /// Default: true
    pub peak_hold: bool,

    /// How long a new peak is held before it starts decaying.
    ///
    /// Default: zero (decay starts on the next frame)
    pub peak_hold_time: Duration,

    /// Wall-clock budget for each sink's `on_frame` call.
    ///
    /// Default: 50ms
    pub sink_timeout: Duration,

    /// Depth of the frame ring between the capture callback and the distributor.
    ///
    /// If it fills, the oldest frame is dropped and
    /// [`PipelineEvent::FramesDropped`](crate::PipelineEvent::FramesDropped) is emitted.
    /// Default: 8 frames
    pub ring_capacity: usize,

    /// FFT size. `None` uses the next power of two at or above `frame_length`.
    ///
    /// A larger window improves low-frequency resolution at the cost of latency.
    /// Default: `None`
    pub analysis_window: Option<usize>,

    /// Lower edge of the lowest spectrum bar in Hz.
    ///
    /// Default: 20.0
    pub min_frequency: f32,

    /// Upper edge of the highest spectrum bar in Hz, clamped to Nyquist.
    ///
    /// Default: 20000.0
    pub max_frequency: f32,

    /// Spectrum noise floor in dB.
    ///
    /// Default: -100.0
    pub noise_floor_db: f32,

    /// Exponential spectrum smoothing (0.0 = off).
    ///
    /// Default: 0.0
    pub smoothing: f32,

    /// Apply the absolute and relative gates to integrated loudness.
    ///
    /// Default: true
    pub gated: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_length: 512,
            sample_rate: 48000,
            channels: 2,
            bar_count: 256,
            weighting_mode: WeightingMode::K,
            peak_hold_decay_db: 20.0,
            peak_hold: true,
            peak_hold_time: Duration::ZERO,
            sink_timeout: Duration::from_millis(50),
            ring_capacity: 8,
            analysis_window: None,
            min_frequency: 20.0,
            max_frequency: 20000.0,
            noise_floor_db: -100.0,
            smoothing: 0.0,
            gated: true,
        }
    }
}

impl PipelineConfig {
    /// Sets the bar count.
    #[must_use]
    pub fn with_bar_count(mut self, bar_count: usize) -> Self {
        self.bar_count = bar_count;
        self
    }

    /// Sets the frame length and sample rate together.
    #[must_use]
    pub fn with_format(mut self, sample_rate: u32, frame_length: usize) -> Self {
        self.sample_rate = sample_rate;
        self.frame_length = frame_length;
        self
    }

    /// Sets the display weighting mode.
    #[must_use]
    pub fn with_weighting(mut self, mode: WeightingMode) -> Self {
        self.weighting_mode = mode;
        self
    }

    /// Turns peak hold on or off.
    #[must_use]
    pub fn with_peak_hold(mut self, enabled: bool) -> Self {
        self.peak_hold = enabled;
        self
    }

    /// Sets the per-sink timeout.
    #[must_use]
    pub fn with_sink_timeout(mut self, timeout: Duration) -> Self {
        self.sink_timeout = timeout;
        self
    }

    /// Duration of one frame, i.e. the dispatch cadence.
    pub fn frame_period(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.frame_length as u64 * 1_000_000_000 / u64::from(self.sample_rate))
    }

    /// The FFT size actually used by the spectral analyzer.
    pub fn fft_size(&self) -> usize {
        self.analysis_window
            .unwrap_or_else(|| self.frame_length.next_power_of_two())
    }

    /// Nominal capture latency in milliseconds (one frame).
    pub fn latency_ms(&self) -> f64 {
        self.frame_period().as_secs_f64() * 1000.0
    }

    /// Checks every option and returns the first invalid one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(64..=16384).contains(&self.frame_length) {
            return Err(ConfigError::FrameLength(self.frame_length));
        }
        if !(8000..=384_000).contains(&self.sample_rate) {
            return Err(ConfigError::SampleRate(self.sample_rate));
        }
        if !(1..=8).contains(&self.channels) {
            return Err(ConfigError::Channels(self.channels));
        }
        if !(MIN_BAR_COUNT..=MAX_BAR_COUNT).contains(&self.bar_count) {
            return Err(ConfigError::BarCount(self.bar_count));
        }
        if !self.peak_hold_decay_db.is_finite() || self.peak_hold_decay_db <= 0.0 {
            return Err(ConfigError::PeakHoldDecay(self.peak_hold_decay_db));
        }
        if self.peak_hold_time > Duration::from_secs(60) {
            return Err(ConfigError::PeakHoldTime(self.peak_hold_time));
        }
        if self.sink_timeout.is_zero() {
            return Err(ConfigError::SinkTimeout);
        }
        if self.ring_capacity < 2 {
            return Err(ConfigError::RingCapacity(self.ring_capacity));
        }
        if let Some(window) = self.analysis_window {
            if !window.is_power_of_two() || window < self.frame_length {
                return Err(ConfigError::AnalysisWindow {
                    window,
                    frame_length: self.frame_length,
                });
            }
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        if !self.min_frequency.is_finite()
            || !self.max_frequency.is_finite()
            || self.min_frequency <= 0.0
            || self.min_frequency >= self.max_frequency
            || self.min_frequency >= nyquist
        {
            return Err(ConfigError::FrequencyRange {
                min_hz: self.min_frequency,
                max_hz: self.max_frequency,
            });
        }
        if !self.noise_floor_db.is_finite() || self.noise_floor_db >= 0.0 {
            return Err(ConfigError::NoiseFloor(self.noise_floor_db));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(ConfigError::Smoothing(self.smoothing));
        }
        Ok(())
    }

    /// Returns `true` if switching from `self` to `other` requires rebuilding
    /// the analysis stages (a stream restart).
    pub(crate) fn requires_restart(&self, other: &Self) -> bool {
        self.bar_count != other.bar_count
            || self.frame_length != other.frame_length
            || self.sample_rate != other.sample_rate
            || self.channels != other.channels
            || self.fft_size() != other.fft_size()
            || self.min_frequency != other.min_frequency
            || self.max_frequency != other.max_frequency
            || self.noise_floor_db != other.noise_floor_db
    }

    /// Returns `true` if switching from `self` to `other` requires reopening
    /// the capture stream.
    pub(crate) fn requires_reopen(&self, other: &Self) -> bool {
        self.frame_length != other.frame_length
            || self.sample_rate != other.sample_rate
            || self.channels != other.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame_length, 512);
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.bar_count, 256);
        assert_eq!(config.weighting_mode, WeightingMode::K);
        assert_eq!(config.sink_timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_frame_period() {
        let config = PipelineConfig::default().with_format(48000, 480);
        assert_eq!(config.frame_period(), Duration::from_millis(10));
        assert!((config.latency_ms() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_fft_size_defaults_to_frame_length() {
        let config = PipelineConfig::default();
        assert_eq!(config.fft_size(), 512);

        let config = PipelineConfig {
            frame_length: 480,
            ..Default::default()
        };
        assert_eq!(config.fft_size(), 512);
    }

    #[test]
    fn test_rejects_bar_count_out_of_range() {
        assert_eq!(
            PipelineConfig::default().with_bar_count(63).validate(),
            Err(ConfigError::BarCount(63))
        );
        assert_eq!(
            PipelineConfig::default().with_bar_count(1025).validate(),
            Err(ConfigError::BarCount(1025))
        );
        assert!(PipelineConfig::default().with_bar_count(64).validate().is_ok());
        assert!(PipelineConfig::default().with_bar_count(1024).validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let config = PipelineConfig::default().with_sink_timeout(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::SinkTimeout));
    }

    #[test]
    fn test_rejects_small_ring() {
        let config = PipelineConfig {
            ring_capacity: 1,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::RingCapacity(1)));
    }

    #[test]
    fn test_rejects_bad_analysis_window() {
        let config = PipelineConfig {
            analysis_window: Some(256),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::AnalysisWindow { window: 256, .. })
        ));

        let config = PipelineConfig {
            analysis_window: Some(3000),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            analysis_window: Some(4096),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_decay() {
        let config = PipelineConfig {
            peak_hold_decay_db: 0.0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::PeakHoldDecay(0.0)));
    }

    #[test]
    fn test_rejects_inverted_frequency_range() {
        let config = PipelineConfig {
            min_frequency: 5000.0,
            max_frequency: 100.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::FrequencyRange { .. })
        ));
    }

    #[test]
    fn test_weighting_mode_parse_and_cycle() {
        assert_eq!("k".parse::<WeightingMode>(), Ok(WeightingMode::K));
        assert_eq!(" Z ".parse::<WeightingMode>(), Ok(WeightingMode::Z));
        assert!("B".parse::<WeightingMode>().is_err());

        let mut mode = WeightingMode::K;
        for expected in [WeightingMode::A, WeightingMode::C, WeightingMode::Z, WeightingMode::K] {
            mode = mode.next();
            assert_eq!(mode, expected);
        }
        assert_eq!(WeightingMode::C.to_string(), "C");
    }

    #[test]
    fn test_bar_count_change_requires_restart() {
        let base = PipelineConfig::default();
        assert!(base.requires_restart(&base.clone().with_bar_count(128)));
        assert!(!base.requires_restart(&base.clone().with_weighting(WeightingMode::A)));
        assert!(!base.requires_restart(&base.clone().with_sink_timeout(Duration::from_millis(5))));
        assert!(!base.requires_restart(&base.clone().with_peak_hold(false)));
        assert!(!base.requires_reopen(&base.clone().with_bar_count(128)));
        assert!(base.requires_reopen(&base.clone().with_format(44100, 512)));
    }
}
