//! # omega-audio
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Real-time audio capture, spectrum and loudness analysis with isolated
//! plugin fan-out.
//!
//! `omega-audio` captures a live input device via CPAL, computes a
//! log-spaced magnitude spectrum and EBU R128 loudness (momentary,
//! short-term, integrated, true peak, weighted RMS) for every frame, and
//! hands the combined [`AnalysisFrame`] to any number of plugin sinks. A sink
//! that hangs, errors or panics is removed without disturbing the others.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use omega_audio::{AnalysisFrame, ChannelSink, Pipeline, PipelineConfig};
//! use tokio::sync::mpsc;
//!
//! // Size based on how far your consumer may fall behind
//! let (tx, mut rx) = mpsc::channel::<AnalysisFrame>(16);
//!
//! let pipeline = Pipeline::builder()
//!     .config(PipelineConfig::default().with_bar_count(128))
//!     .add_sink(ChannelSink::new(tx))
//!     .on_event(|e| tracing::warn!(?e, "pipeline event"))
//!     .start()
//!     .await?;
//!
//! while let Some(frame) = rx.recv().await {
//!     // Draw frame.spectrum, frame.loudness...
//! }
//!
//! pipeline.stop().await?;
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **Audio Thread**: backend callback that only slices samples into frames
//!   and never blocks
//! - **Frame Ring**: lock-free, drop-oldest queue of whole frames
//! - **Tokio Runtime**: distributor task that analyzes each frame once and
//!   hands it to every sink under a timeout
//! - **Sink Threads**: one per sink, so a blocking sink only stalls itself
//!
//! Slow or broken sinks can delay or lose frames for themselves, but never
//! stall capture.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

pub mod analysis;
mod builder;
mod config;
mod error;
mod event;
pub mod format;
mod frame;
pub mod loudness;
mod pipeline;
mod session;
mod sink;
pub mod source;

pub use analysis::{SpectralAnalyzer, SpectrumFrame};
pub use builder::PipelineBuilder;
pub use config::{PipelineConfig, WeightingMode, MAX_BAR_COUNT, MIN_BAR_COUNT};
pub use error::{ConfigError, PipelineError, SinkError, SinkFault};
pub use event::{event_callback, EventCallback, PipelineEvent};
pub use frame::{AnalysisFrame, AudioFrame};
pub use loudness::{LoudnessMeter, LoudnessSnapshot};
pub use pipeline::{CaptureEngine, ErrorReporter, FrameRing, FrameWriter, StreamHealth};
pub use session::{Pipeline, PipelineStats};
pub use sink::{ChannelSink, PluginSink, SinkId};
pub use source::{
    AudioBackend, CpalBackend, DeviceCatalog, DeviceChanges, DeviceDescriptor, DeviceId,
    MockBackend, MockSource, StreamFormat,
};
