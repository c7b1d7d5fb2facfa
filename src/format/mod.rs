//! Sample format conversion utilities.
//!
//! Capture devices deliver `f32`, `i16`, `u16` or `i32` samples. Everything
//! past the capture callback works on normalized `f32`.

mod convert;

pub use convert::{i16_to_f32, i32_to_f32, sanitize_f32, u16_to_f32};
