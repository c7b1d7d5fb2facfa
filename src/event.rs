//! Runtime events for monitoring pipeline health.
//!
//! Events are non-fatal notifications. The pipeline keeps running after any
//! event is emitted; they exist for logging, metrics and UI status, not for
//! error handling.

use std::sync::Arc;

use crate::error::SinkFault;
use crate::sink::SinkId;
use crate::source::DeviceId;

/// Runtime events emitted by a running pipeline.
///
/// # Example
///
/// ```
/// use omega_audio::PipelineEvent;
///
/// fn handle_event(event: PipelineEvent) {
///     match event {
///         PipelineEvent::FramesDropped { dropped, total } => {
///             eprintln!("dropped {dropped} frames ({total} total)");
///         }
///         PipelineEvent::SinkFaulted { name, fault, .. } => {
///             eprintln!("sink '{name}' removed: {fault}");
///         }
///         PipelineEvent::DeviceError { device, reason } => {
///             eprintln!("{device} lost: {reason}, sending silence");
///         }
///         other => eprintln!("{other:?}"),
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The frame ring overflowed and the oldest frames were discarded.
    FramesDropped {
        /// Frames dropped since the previous report.
        dropped: u64,
        /// Frames dropped since the pipeline started.
        total: u64,
    },

    /// The distributor received a frame whose sequence number skipped ahead.
    SequenceGap {
        /// Sequence number that was expected next.
        expected: u64,
        /// Sequence number that actually arrived.
        received: u64,
    },

    /// A sink was registered and will receive the next frame.
    SinkRegistered {
        /// Handle returned to the caller.
        id: SinkId,
        /// The sink's name.
        name: String,
    },

    /// A sink was removed because it timed out, failed or panicked.
    ///
    /// The remaining sinks are unaffected.
    SinkFaulted {
        /// Handle of the removed sink.
        id: SinkId,
        /// The sink's name.
        name: String,
        /// What went wrong.
        fault: SinkFault,
    },

    /// A sink was removed on request.
    SinkUnregistered {
        /// Handle of the removed sink.
        id: SinkId,
        /// The sink's name.
        name: String,
    },

    /// The capture device failed mid-stream.
    ///
    /// Until the device recovers or is switched, the distributor delivers
    /// zeroed frames flagged as silent.
    DeviceError {
        /// The failing device.
        device: DeviceId,
        /// Backend-provided description.
        reason: String,
    },

    /// Real audio is flowing again after a [`DeviceError`](Self::DeviceError).
    DeviceRecovered {
        /// The device that recovered.
        device: DeviceId,
    },

    /// Capture moved to another device.
    DeviceSwitched {
        /// Device captured before the switch.
        previous: DeviceId,
        /// Device captured after the switch.
        current: DeviceId,
    },

    /// Analysis state was rebuilt after a reconfiguration.
    StreamRestarted {
        /// Bar count in effect after the restart.
        bar_count: usize,
        /// Sample rate in effect after the restart.
        sample_rate: u32,
    },

    /// Integrated loudness, block histories and the true-peak maximum were
    /// cleared.
    LoudnessReset,
}

/// Callback type for receiving runtime events.
///
/// Register one via [`PipelineBuilder::on_event()`].
///
/// [`PipelineBuilder::on_event()`]: crate::PipelineBuilder::on_event
///
/// # Example
///
/// ```ignore
/// use omega_audio::Pipeline;
///
/// let pipeline = Pipeline::builder()
///     .on_event(|event| {
///         tracing::warn!(?event, "pipeline event");
///     })
///     .start()
///     .await?;
/// ```
pub type EventCallback = Arc<dyn Fn(PipelineEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use omega_audio::{event_callback, PipelineEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// callback(PipelineEvent::LoudnessReset);
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(PipelineEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}
