//! Spectral analysis: windowed FFT, log-spaced bars and peak hold.

mod bars;
mod peak_hold;
mod spectrum;

pub use bars::BarLayout;
pub use peak_hold::PeakHold;
pub use spectrum::{SpectralAnalyzer, SpectrumFrame};
