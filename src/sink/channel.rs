//! Tokio mpsc channel sink implementation.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::sink::PluginSink;
use crate::source::DeviceDescriptor;
use crate::{AnalysisFrame, SinkError};

/// A sink that forwards analysis frames to a tokio mpsc channel.
///
/// This is the easiest way to consume frames on your own task, e.g. a UI
/// render loop. Frames are sent with `try_send`: when the receiver falls
/// behind, new frames are skipped rather than stalling the pipeline. Once
/// the receiver is dropped the sink faults and is unregistered.
///
/// # Example
///
/// ```
/// use omega_audio::{AnalysisFrame, ChannelSink};
/// use tokio::sync::mpsc;
///
/// let (tx, mut rx) = mpsc::channel::<AnalysisFrame>(16);
/// let sink = ChannelSink::new(tx);
///
/// // Register the sink on a pipeline...
/// // Then receive frames:
/// // while let Some(frame) = rx.recv().await { ... }
/// ```
pub struct ChannelSink {
    name: String,
    sender: mpsc::Sender<AnalysisFrame>,
    devices: Option<mpsc::UnboundedSender<DeviceDescriptor>>,
    skipped: u64,
}

impl ChannelSink {
    /// Creates a new channel sink with the given sender.
    pub fn new(sender: mpsc::Sender<AnalysisFrame>) -> Self {
        Self::with_name("channel", sender)
    }

    /// Creates a new channel sink with a custom name.
    pub fn with_name(name: impl Into<String>, sender: mpsc::Sender<AnalysisFrame>) -> Self {
        Self {
            name: name.into(),
            sender,
            devices: None,
            skipped: 0,
        }
    }

    /// Also forwards device change notifications to `devices`.
    #[must_use]
    pub fn with_device_updates(mut self, devices: mpsc::UnboundedSender<DeviceDescriptor>) -> Self {
        self.devices = Some(devices);
        self
    }

    /// Frames skipped because the channel was full.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

#[async_trait]
impl PluginSink for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_frame(&mut self, frame: &AnalysisFrame) -> Result<(), SinkError> {
        match self.sender.try_send(frame.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.skipped += 1;
                tracing::trace!(sink = %self.name, skipped = self.skipped, "Receiver behind, frame skipped");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(SinkError::ChannelClosed),
        }
    }

    async fn on_device_changed(&mut self, device: &DeviceDescriptor) -> Result<(), SinkError> {
        if let Some(devices) = &self.devices {
            devices
                .send(device.clone())
                .map_err(|_| SinkError::ChannelClosed)?;
        }
        Ok(())
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

    fn frame(sequence: u64) -> AnalysisFrame {
        let config = PipelineConfig::default();
        let audio = AudioFrame::silence(512, sequence, 48000, 1, Duration::ZERO);
        let spectrum = SpectralAnalyzer::new(&config).analyze(&audio);
        let loudness = LoudnessMeter::new(48000, 1, config.weighting_mode, true).measure(&audio);
        AnalysisFrame::new(audio, Arc::new(spectrum), Arc::new(loudness), false)
    }

    #[tokio::test]
    async fn test_channel_sink_sends_frames() {
        let (tx, mut rx) = mpsc::channel::<AnalysisFrame>(10);
        let mut sink = ChannelSink::new(tx);

        sink.on_frame(&frame(5)).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.sequence(), 5);
    }

    #[tokio::test]
    async fn test_channel_sink_skips_when_full() {
        let (tx, mut rx) = mpsc::channel::<AnalysisFrame>(1);
        let mut sink = ChannelSink::new(tx);

        sink.on_frame(&frame(0)).await.unwrap();
        sink.on_frame(&frame(1)).await.unwrap();

        assert_eq!(sink.skipped(), 1);
        assert_eq!(rx.recv().await.unwrap().sequence(), 0);
    }

    #[tokio::test]
    async fn test_channel_sink_closed() {
        let (tx, rx) = mpsc::channel::<AnalysisFrame>(10);
        let mut sink = ChannelSink::new(tx);

        // Drop the receiver
        drop(rx);

        let result = sink.on_frame(&frame(0)).await;
        assert!(matches!(result, Err(SinkError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_devices() {
        let (tx, _rx) = mpsc::channel::<AnalysisFrame>(10);
        let (dev_tx, mut dev_rx) = mpsc::unbounded_channel();
        let mut sink = ChannelSink::with_name("ui", tx).with_device_updates(dev_tx);
        assert_eq!(sink.name(), "ui");

        let device = DeviceDescriptor {
            id: "mic".into(),
            name: "Mic".to_string(),
            channels: 1,
            sample_rates: vec![48000],
            is_input: true,
            is_output: false,
            is_default: true,
        };
        sink.on_device_changed(&device).await.unwrap();
        assert_eq!(dev_rx.recv().await.unwrap().name, "Mic");
    }
}
