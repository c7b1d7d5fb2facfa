//! Logarithmic bar layout over linear FFT bins.

use std::ops::Range;
use std::sync::Arc;

/// Maps linear FFT bins onto log-spaced bars.
///
/// Bar `i` covers `[edges[i], edges[i + 1])`. A bar whose range holds at
/// least one bin reads the mean dB of those bins; a bar narrower than a bin
/// interpolates between the two bins around its centre frequency.
#[derive(Debug, Clone)]
pub struct BarLayout {
    centres: Arc<[f32]>,
    bins: Vec<Range<usize>>,
    /// Fractional bin position of each bar's centre.
    positions: Vec<f32>,
    bin_count: usize,
}

impl BarLayout {
    /// Builds a layout of `bar_count` bars from `min_hz` up to
    /// `min(max_hz, nyquist)`.
    pub fn new(bar_count: usize, min_hz: f32, max_hz: f32, sample_rate: u32, fft_size: usize) -> Self {
        let nyquist = sample_rate as f32 / 2.0;
        let max_hz = max_hz.min(nyquist);
        let min_hz = min_hz.min(max_hz * 0.5).max(f32::MIN_POSITIVE);
        let bin_width = sample_rate as f32 / fft_size as f32;
        let bin_count = fft_size / 2 + 1;

        let ratio = (max_hz / min_hz).ln();
        let edge = |i: usize| min_hz * (ratio * i as f32 / bar_count as f32).exp();

        let mut centres = Vec::with_capacity(bar_count);
        let mut bins = Vec::with_capacity(bar_count);
        let mut positions = Vec::with_capacity(bar_count);

        for i in 0..bar_count {
            let (low, high) = (edge(i), edge(i + 1));
            let centre = (low * high).sqrt();

            let first = ((low / bin_width).ceil() as usize).min(bin_count);
            let last = ((high / bin_width).ceil() as usize).min(bin_count);

            centres.push(centre);
            bins.push(first..last.max(first));
            positions.push(centre / bin_width);
        }

        Self {
            centres: centres.into(),
            bins,
            positions,
            bin_count,
        }
    }

    /// Number of bars.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// Returns `true` if the layout has no bars.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Centre frequency of each bar in Hz.
    pub fn centres(&self) -> Arc<[f32]> {
        Arc::clone(&self.centres)
    }

    /// Number of FFT bins the layout expects.
    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    /// Resamples `bins_db` (one value per FFT bin) into `out` (one per bar).
    pub fn map(&self, bins_db: &[f32], out: &mut [f32]) {
        debug_assert_eq!(bins_db.len(), self.bin_count);
        for ((range, &position), value) in self.bins.iter().zip(&self.positions).zip(out) {
            *value = if range.is_empty() {
                interpolate(bins_db, position)
            } else {
                let slice = &bins_db[range.clone()];
                slice.iter().sum::<f32>() / slice.len() as f32
            };
        }
    }
}

fn interpolate(bins: &[f32], position: f32) -> f32 {
    let last = bins.len().saturating_sub(1);
    let low = (position.floor() as usize).min(last);
    let high = (low + 1).min(last);
    let t = (position - low as f32).clamp(0.0, 1.0);
    bins[low] + (bins[high] - bins[low]) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centres_are_log_spaced() {
        let layout = BarLayout::new(64, 20.0, 20000.0, 48000, 1024);
        let centres = layout.centres();
        assert_eq!(centres.len(), 64);

        let ratio = centres[1] / centres[0];
        for pair in centres.windows(2) {
            assert!((pair[1] / pair[0] - ratio).abs() < 1e-3);
        }
        assert!(centres[0] > 20.0);
        assert!(centres[63] < 20000.0);
    }

    #[test]
    fn test_range_capped_at_nyquist() {
        let layout = BarLayout::new(64, 20.0, 20000.0, 16000, 512);
        assert!(layout.centres().iter().all(|&c| c < 8000.0));
    }

    #[test]
    fn test_wide_bars_average_bins() {
        // 8 bars over 64 bins: the top bars each cover many bins
        let layout = BarLayout::new(8, 20.0, 24000.0, 48000, 128);
        let bins: Vec<f32> = (0..layout.bin_count()).map(|i| i as f32).collect();
        let mut out = vec![0.0; 8];
        layout.map(&bins, &mut out);

        let top = &layout.bins[7];
        let expected = top.clone().map(|i| i as f32).sum::<f32>() / top.len() as f32;
        assert!((out[7] - expected).abs() < 1e-4);
    }

    #[test]
    fn test_narrow_bars_interpolate() {
        // Low bars are far narrower than the 46.875 Hz bin width
        let layout = BarLayout::new(256, 20.0, 20000.0, 48000, 1024);
        assert!(layout.bins[0].is_empty());

        let bins: Vec<f32> = (0..layout.bin_count()).map(|i| i as f32 * 10.0).collect();
        let mut out = vec![0.0; 256];
        layout.map(&bins, &mut out);

        // Linear ramp interpolates to exactly 10 * position
        assert!((out[0] - layout.positions[0] * 10.0).abs() < 1e-3);
        // Monotonic ramp stays monotonic across bars
        assert!(out.windows(2).all(|w| w[1] >= w[0] - 1e-3));
    }
}
