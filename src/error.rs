//! Error types for omega-audio.
//!
//! Errors are split into three categories:
//! - **Fatal errors** ([`PipelineError`]): prevent a stream from opening or a
//!   device switch from completing
//! - **Configuration errors** ([`ConfigError`]): reject an invalid
//!   [`PipelineConfig`](crate::PipelineConfig) before anything changes
//! - **Recoverable events**: runtime issues (overruns, faulted sinks, device
//!   loss) surfaced via [`EventCallback`](crate::EventCallback)

use std::time::Duration;

use crate::source::DeviceId;

/// Fatal errors returned when opening a stream, switching devices or starting
/// the pipeline.
///
/// Runtime problems never show up here. Once the pipeline runs, overruns,
/// sink faults and device loss are reported as
/// [`PipelineEvent`](crate::PipelineEvent)s instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The requested device does not exist in the current catalog snapshot.
    #[error("device not found: {id}")]
    DeviceNotFound {
        /// Id of the device that wasn't found.
        id: DeviceId,
    },

    /// The device exists but cannot be used for capture.
    #[error("device unavailable: {id} - {reason}")]
    DeviceUnavailable {
        /// Id of the unavailable device.
        id: DeviceId,
        /// Reason the device is unavailable.
        reason: String,
    },

    /// No default input device is configured on this system.
    #[error("no default input device configured")]
    NoDefaultDevice,

    /// The device does not support the requested sample rate.
    #[error("sample rate {sample_rate}Hz not supported (available: {available:?})")]
    UnsupportedFormat {
        /// The requested sample rate.
        sample_rate: u32,
        /// Sample rates the device advertises.
        available: Vec<u32>,
    },

    /// The backend accepted the format but failed to build or start the stream.
    #[error("failed to open stream: {reason}")]
    StreamOpenFailed {
        /// Backend-provided description of the failure.
        reason: String,
    },

    /// An error from the underlying audio library.
    #[error("audio backend error: {0}")]
    BackendError(String),

    /// The supplied configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The pipeline has already been stopped.
    #[error("pipeline is not running")]
    PipelineStopped,
}

impl PipelineError {
    /// Creates a `DeviceUnavailable` error for the given device.
    pub fn unavailable(id: &DeviceId, reason: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            id: id.clone(),
            reason: reason.into(),
        }
    }

    /// Creates a `StreamOpenFailed` error with the given reason.
    pub fn open_failed(reason: impl Into<String>) -> Self {
        Self::StreamOpenFailed {
            reason: reason.into(),
        }
    }
}

/// An invalid configuration option.
///
/// Validation happens before any state changes, so a rejected configuration
/// leaves the pipeline running with its previous settings.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Frame length must be between 64 and 16384 samples.
    #[error("frame length {0} out of range (64..=16384)")]
    FrameLength(usize),

    /// Sample rate must be between 8 kHz and 384 kHz.
    #[error("sample rate {0}Hz out of range (8000..=384000)")]
    SampleRate(u32),

    /// Bar count must be between 64 and 1024.
    #[error("bar count {0} out of range (64..=1024)")]
    BarCount(usize),

    /// Peak hold decay must be a finite, positive dB/s rate.
    #[error("peak hold decay {0} dB/s must be finite and positive")]
    PeakHoldDecay(f32),

    /// Peak hold time must not exceed 60 seconds.
    #[error("peak hold time {0:?} exceeds 60s")]
    PeakHoldTime(Duration),

    /// Sink timeout must be non-zero.
    #[error("sink timeout must be greater than zero")]
    SinkTimeout,

    /// The frame ring must hold at least two frames.
    #[error("ring capacity {0} must be at least 2 frames")]
    RingCapacity(usize),

    /// The analysis window must be a power of two no smaller than the frame length.
    #[error("analysis window {window} must be a power of two >= frame length {frame_length}")]
    AnalysisWindow {
        /// Requested analysis window in samples.
        window: usize,
        /// Configured frame length in samples.
        frame_length: usize,
    },

    /// The spectrum frequency range is empty or outside the audible band.
    #[error("frequency range {min_hz}..{max_hz}Hz is invalid")]
    FrequencyRange {
        /// Lower edge of the lowest bar.
        min_hz: f32,
        /// Upper edge of the highest bar.
        max_hz: f32,
    },

    /// Channel count must be between 1 and 8.
    #[error("channel count {0} out of range (1..=8)")]
    Channels(u16),

    /// Smoothing factor must be in `0.0..1.0`.
    #[error("smoothing factor {0} out of range (0.0..1.0)")]
    Smoothing(f32),

    /// Noise floor must be negative and finite.
    #[error("noise floor {0} dB must be negative")]
    NoiseFloor(f32),
}

/// Errors returned by a [`PluginSink`](crate::PluginSink) implementation.
///
/// Any error returned from `on_frame` faults the sink: it is unregistered and
/// a [`PipelineEvent::SinkFaulted`](crate::PipelineEvent::SinkFaulted) is emitted.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The receiving channel was closed.
    #[error("channel closed")]
    ChannelClosed,

    /// The sink refused the frame (e.g. unsupported channel layout).
    #[error("frame rejected: {reason}")]
    Rejected {
        /// Why the frame was rejected.
        reason: String,
    },

    /// Custom error for plugin-defined failures.
    #[error("{0}")]
    Custom(String),
}

impl SinkError {
    /// Creates a custom sink error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Creates a rejected error with the given reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// Why the distributor removed a sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkFault {
    /// `on_frame` did not return within the configured budget.
    #[error("timed out after {budget:?}")]
    Timeout {
        /// The per-call budget that was exceeded.
        budget: Duration,
    },

    /// `on_frame` returned an error.
    #[error("returned error: {0}")]
    Error(String),

    /// `on_frame` panicked.
    #[error("panicked: {0}")]
    Panicked(String),
}
