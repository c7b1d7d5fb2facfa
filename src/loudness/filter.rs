//! Weighting filters built from biquad sections.
//!
//! K-weighting uses the closed-form BS.1770 coefficients, recomputed for
//! any sample rate. A and C weighting are built from their analog pole
//! layout (IEC 61672) through a pre-warped bilinear transform and
//! normalized to unity gain at 1 kHz.

use std::f64::consts::PI;

use rustfft::num_complex::Complex64;

use crate::WeightingMode;

/// Normalized biquad coefficients (`a0 == 1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoefficients {
    /// Frequency response magnitude at `frequency` Hz.
    pub fn gain_at(&self, frequency: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * frequency / sample_rate;
        let z1 = Complex64::from_polar(1.0, -w);
        let z2 = z1 * z1;
        let num = self.b0 + z1 * self.b1 + z2 * self.b2;
        let den = 1.0 + z1 * self.a1 + z2 * self.a2;
        (num / den).norm()
    }

    /// Maps the analog section `(B2 s² + B1 s + B0) / (A2 s² + A1 s + A0)`
    /// to the z-plane with the bilinear transform.
    fn bilinear(analog_b: [f64; 3], analog_a: [f64; 3], sample_rate: f64) -> Self {
        let c = 2.0 * sample_rate;
        let c2 = c * c;
        let [bb2, bb1, bb0] = analog_b;
        let [aa2, aa1, aa0] = analog_a;

        let a0 = aa2 * c2 + aa1 * c + aa0;
        Self {
            b0: (bb2 * c2 + bb1 * c + bb0) / a0,
            b1: 2.0 * (bb0 - bb2 * c2) / a0,
            b2: (bb2 * c2 - bb1 * c + bb0) / a0,
            a1: 2.0 * (aa0 - aa2 * c2) / a0,
            a2: (aa2 * c2 - aa1 * c + aa0) / a0,
        }
    }

    fn scaled(self, gain: f64) -> Self {
        Self {
            b0: self.b0 * gain,
            b1: self.b1 * gain,
            b2: self.b2 * gain,
            ..self
        }
    }
}

/// A biquad in transposed direct form II.
#[derive(Debug, Clone)]
pub struct Biquad {
    coefficients: BiquadCoefficients,
    z1: f64,
    z2: f64,
}

impl Biquad {
    pub fn new(coefficients: BiquadCoefficients) -> Self {
        Self {
            coefficients,
            z1: 0.0,
            z2: 0.0,
        }
    }

    pub fn coefficients(&self) -> BiquadCoefficients {
        self.coefficients
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let c = &self.coefficients;
        let y = c.b0 * x + self.z1;
        self.z1 = c.b1 * x - c.a1 * y + self.z2;
        self.z2 = c.b2 * x - c.a2 * y;
        y
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

/// The BS.1770 high-shelf "head" stage.
pub fn k_shelf(sample_rate: f64) -> BiquadCoefficients {
    let f0 = 1681.974_450_955_533;
    let gain_db = 3.999_843_853_973_347;
    let q = 0.707_175_236_955_419_6;

    let k = (PI * f0 / sample_rate).tan();
    let vh = 10f64.powf(gain_db / 20.0);
    let vb = vh.powf(0.499_666_774_154_541_6);
    let a0 = 1.0 + k / q + k * k;

    BiquadCoefficients {
        b0: (vh + vb * k / q + k * k) / a0,
        b1: 2.0 * (k * k - vh) / a0,
        b2: (vh - vb * k / q + k * k) / a0,
        a1: 2.0 * (k * k - 1.0) / a0,
        a2: (1.0 - k / q + k * k) / a0,
    }
}

/// The BS.1770 RLB high-pass stage.
pub fn k_highpass(sample_rate: f64) -> BiquadCoefficients {
    let f0 = 38.135_470_876_024_44;
    let q = 0.500_327_037_323_877_3;

    let k = (PI * f0 / sample_rate).tan();
    let a0 = 1.0 + k / q + k * k;

    BiquadCoefficients {
        b0: 1.0,
        b1: -2.0,
        b2: 1.0,
        a1: 2.0 * (k * k - 1.0) / a0,
        a2: (1.0 - k / q + k * k) / a0,
    }
}

// IEC 61672 pole frequencies in Hz.
const F1: f64 = 20.598_997;
const F2: f64 = 107.652_65;
const F3: f64 = 737.862_23;
const F4: f64 = 12_194.217;

/// Pre-warped angular frequency for the bilinear transform.
fn prewarp(frequency: f64, sample_rate: f64) -> f64 {
    2.0 * sample_rate * (PI * frequency / sample_rate).tan()
}

/// Second-order high-pass with a double real pole at `frequency`.
fn double_pole_highpass(frequency: f64, sample_rate: f64) -> BiquadCoefficients {
    let w = prewarp(frequency, sample_rate);
    BiquadCoefficients::bilinear([1.0, 0.0, 0.0], [1.0, 2.0 * w, w * w], sample_rate)
}

/// Second-order low-pass with a double real pole at `frequency`.
fn double_pole_lowpass(frequency: f64, sample_rate: f64) -> BiquadCoefficients {
    let w = prewarp(frequency, sample_rate);
    BiquadCoefficients::bilinear([0.0, 0.0, w * w], [1.0, 2.0 * w, w * w], sample_rate)
}

/// Second-order high-pass with real poles at `low` and `high`.
fn split_pole_highpass(low: f64, high: f64, sample_rate: f64) -> BiquadCoefficients {
    let (w2, w3) = (prewarp(low, sample_rate), prewarp(high, sample_rate));
    BiquadCoefficients::bilinear([1.0, 0.0, 0.0], [1.0, w2 + w3, w2 * w3], sample_rate)
}

/// Coefficients for each weighting curve.
pub fn weighting_sections(mode: WeightingMode, sample_rate: f64) -> Vec<BiquadCoefficients> {
    let sections = match mode {
        WeightingMode::K => return vec![k_shelf(sample_rate), k_highpass(sample_rate)],
        WeightingMode::Z => return Vec::new(),
        WeightingMode::A => vec![
            double_pole_highpass(F1, sample_rate),
            split_pole_highpass(F2, F3, sample_rate),
            double_pole_lowpass(F4, sample_rate),
        ],
        WeightingMode::C => vec![
            double_pole_highpass(F1, sample_rate),
            double_pole_lowpass(F4, sample_rate),
        ],
    };

    let gain: f64 = sections
        .iter()
        .map(|s| s.gain_at(1000.0, sample_rate))
        .product();

    let mut sections = sections;
    if gain > 0.0 {
        sections[0] = sections[0].scaled(1.0 / gain);
    }
    sections
}

/// A cascade of biquads implementing one weighting curve.
#[derive(Debug, Clone)]
pub struct WeightingFilter {
    mode: WeightingMode,
    stages: Vec<Biquad>,
}

impl WeightingFilter {
    pub fn new(mode: WeightingMode, sample_rate: u32) -> Self {
        Self {
            mode,
            stages: weighting_sections(mode, f64::from(sample_rate))
                .into_iter()
                .map(Biquad::new)
                .collect(),
        }
    }

    pub fn mode(&self) -> WeightingMode {
        self.mode
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        self.stages.iter_mut().fold(x, |acc, stage| stage.process(acc))
    }

    pub fn reset(&mut self) {
        self.stages.iter_mut().for_each(Biquad::reset);
    }

    /// Magnitude response of the whole cascade in dB.
    pub fn response_db(&self, frequency: f64, sample_rate: f64) -> f64 {
        let gain: f64 = self
            .stages
            .iter()
            .map(|s| s.coefficients().gain_at(frequency, sample_rate))
            .product();
        20.0 * gain.log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_coefficients_at_48k() {
        let shelf = k_shelf(48000.0);
        assert!((shelf.b0 - 1.535_124_859_586_97).abs() < 1e-9);
        assert!((shelf.a1 - -1.690_659_293_182_41).abs() < 1e-9);
        assert!((shelf.a2 - 0.732_480_774_215_85).abs() < 1e-9);

        let highpass = k_highpass(48000.0);
        assert!((highpass.a1 - -1.990_047_454_833_98).abs() < 1e-9);
        assert!((highpass.a2 - 0.990_072_250_366_21).abs() < 1e-9);
    }

    #[test]
    fn test_k_weighting_gain_at_1k() {
        let filter = WeightingFilter::new(WeightingMode::K, 48000);
        let gain = filter.response_db(1000.0, 48000.0);
        // The -0.691 offset in the loudness formula cancels this
        assert!((gain - 0.691).abs() < 0.02, "K gain at 1k: {gain}");
    }

    #[test]
    fn test_a_weighting_reference_points() {
        for sample_rate in [44100.0, 48000.0, 96000.0] {
            let filter = WeightingFilter::new(WeightingMode::A, sample_rate as u32);
            assert!(filter.response_db(1000.0, sample_rate).abs() < 1e-6);
            // IEC 61672 table: 100 Hz = -19.1 dB, 10 kHz = -2.5 dB
            assert!((filter.response_db(100.0, sample_rate) - -19.1).abs() < 0.3);
            // Bilinear warping bends the top octave at low sample rates
            assert!((filter.response_db(10_000.0, sample_rate) - -2.5).abs() < 1.0);
        }
    }

    #[test]
    fn test_c_weighting_reference_points() {
        let filter = WeightingFilter::new(WeightingMode::C, 48000);
        assert!(filter.response_db(1000.0, 48000.0).abs() < 1e-6);
        // IEC 61672 table: 31.5 Hz = -3.0 dB, 100 Hz = -0.3 dB
        assert!((filter.response_db(31.5, 48000.0) - -3.0).abs() < 0.3);
        assert!((filter.response_db(100.0, 48000.0) - -0.3).abs() < 0.2);
    }

    #[test]
    fn test_z_weighting_is_passthrough() {
        let mut filter = WeightingFilter::new(WeightingMode::Z, 48000);
        assert_eq!(filter.process(0.25), 0.25);
        assert_eq!(filter.process(-1.0), -1.0);
    }

    #[test]
    fn test_highpass_removes_dc() {
        let mut filter = WeightingFilter::new(WeightingMode::K, 48000);
        let mut last = 1.0;
        for _ in 0..48000 {
            last = filter.process(1.0);
        }
        assert!(last.abs() < 1e-3);

        filter.reset();
        // Fresh state: first output is b0 of the shelf
        assert!((filter.process(1.0) - k_shelf(48000.0).b0).abs() < 1e-12);
    }
}
