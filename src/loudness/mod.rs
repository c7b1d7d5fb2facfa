//! Loudness measurement: K-weighted LUFS, true peak and weighted RMS.
//!
//! [`LoudnessMeter`] ties the pieces together. The filter, gating and true
//! peak building blocks are public for callers that want to run them on
//! their own buffers.

mod filter;
mod gating;
mod meter;
mod true_peak;

pub use filter::{Biquad, BiquadCoefficients, WeightingFilter};
pub use gating::{power_to_lufs, GatedLoudness, ABSOLUTE_GATE, RELATIVE_GATE};
pub use meter::{LoudnessMeter, LoudnessSnapshot, LEVEL_FLOOR_DB};
pub use true_peak::{to_dbtp, TruePeakDetector};
