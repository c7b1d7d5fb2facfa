//! Plugin sink contract.
//!
//! A [`PluginSink`] is anything that wants analysis frames: a visualizer, a
//! meter widget, a logger. The crate ships one built-in sink:
//!
//! - [`ChannelSink`]: forwards frames to a tokio mpsc channel
//!
//! Implement [`PluginSink`] for your own consumers and register them on a
//! running [`Pipeline`](crate::Pipeline).

mod channel;

pub use channel::ChannelSink;

use std::fmt;

use async_trait::async_trait;

use crate::source::DeviceDescriptor;
use crate::{AnalysisFrame, SinkError};

/// Handle identifying a registered sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(u64);

impl SinkId {
    /// Wraps a raw id. Ids handed out by a pipeline are never reused.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink-{}", self.0)
    }
}

/// A consumer of analysis frames.
///
/// Sinks are called sequentially, in registration order, once per frame.
///
/// # Implementation Notes
///
/// - Each sink runs on its own thread. Each call is bounded by the
///   pipeline's sink timeout in wall-clock time, whether the sink awaits or
///   blocks. A call that takes longer, returns an error or panics faults the
///   sink: it is unregistered and never called again.
/// - The frame is only borrowed for the duration of the call. Clone it (the
///   clone shares all sample and spectrum data) to keep it longer.
/// - Every sink call holds up the sinks after it. Anything slow belongs on
///   another task, fed through a channel like [`ChannelSink`] does.
///
/// # Example
///
/// ```
/// use omega_audio::{AnalysisFrame, PluginSink, SinkError};
/// use async_trait::async_trait;
///
/// struct PeakPrinter;
///
/// #[async_trait]
/// impl PluginSink for PeakPrinter {
///     fn name(&self) -> &str {
///         "peak-printer"
///     }
///
///     async fn on_frame(&mut self, frame: &AnalysisFrame) -> Result<(), SinkError> {
///         println!("#{}: {:.1} dBTP", frame.sequence(), frame.loudness.peak_dbtp());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait PluginSink: Send {
    /// Human-readable name for logging and events.
    fn name(&self) -> &str;

    /// Receives one analysis frame.
    async fn on_frame(&mut self, frame: &AnalysisFrame) -> Result<(), SinkError>;

    /// Called after the capture device changed, before the first frame from
    /// the new device.
    ///
    /// Default implementation does nothing.
    async fn on_device_changed(&mut self, device: &DeviceDescriptor) -> Result<(), SinkError> {
        let _ = device;
        Ok(())
    }
}

#[async_trait]
impl<S: PluginSink + ?Sized> PluginSink for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn on_frame(&mut self, frame: &AnalysisFrame) -> Result<(), SinkError> {
        (**self).on_frame(frame).await
    }

    async fn on_device_changed(&mut self, device: &DeviceDescriptor) -> Result<(), SinkError> {
        (**self).on_device_changed(device).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SpectralAnalyzer;
    use crate::loudness::LoudnessMeter;
    use crate::{AudioFrame, PipelineConfig};
    use std::sync::Arc;
    use std::time::Duration;

    struct CountingSink {
        name: String,
        frames: usize,
        devices: Vec<String>,
    }

    impl CountingSink {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                frames: 0,
                devices: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl PluginSink for CountingSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn on_frame(&mut self, _frame: &AnalysisFrame) -> Result<(), SinkError> {
            self.frames += 1;
            Ok(())
        }

        async fn on_device_changed(&mut self, device: &DeviceDescriptor) -> Result<(), SinkError> {
            self.devices.push(device.name.clone());
            Ok(())
        }
    }

    fn analysis_frame() -> AnalysisFrame {
        let config = PipelineConfig::default();
        let audio = AudioFrame::silence(512, 0, 48000, 2, Duration::ZERO);
        let spectrum = SpectralAnalyzer::new(&config).analyze(&audio);
        let loudness = LoudnessMeter::new(48000, 2, config.weighting_mode, true).measure(&audio);
        AnalysisFrame::new(audio, Arc::new(spectrum), Arc::new(loudness), true)
    }

    #[tokio::test]
    async fn test_sink_receives_frames_and_devices() {
        let mut sink = CountingSink::new("counter");
        let frame = analysis_frame();

        sink.on_frame(&frame).await.unwrap();
        sink.on_frame(&frame).await.unwrap();
        assert_eq!(sink.frames, 2);

        let device = DeviceDescriptor {
            id: "usb".into(),
            name: "USB Mic".to_string(),
            channels: 2,
            sample_rates: vec![48000],
            is_input: true,
            is_output: false,
            is_default: false,
        };
        sink.on_device_changed(&device).await.unwrap();
        assert_eq!(sink.devices, vec!["USB Mic".to_string()]);
    }

    #[tokio::test]
    async fn test_boxed_sink_delegates() {
        let mut sink: Box<dyn PluginSink> = Box::new(CountingSink::new("boxed"));
        assert_eq!(sink.name(), "boxed");
        sink.on_frame(&analysis_frame()).await.unwrap();
    }

    #[test]
    fn test_sink_id_display() {
        assert_eq!(SinkId::from_raw(3).to_string(), "sink-3");
        assert_eq!(SinkId::from_raw(3).as_u64(), 3);
    }

    #[test]
    fn test_sink_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Box<dyn PluginSink>>();
    }
}
