//! Running pipeline handle.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::builder::PipelineBuilder;
use crate::loudness::LEVEL_FLOOR_DB;
use crate::pipeline::{CaptureEngine, DistributorCommand, DistributorStats};
use crate::sink::{PluginSink, SinkId};
use crate::source::{DeviceCatalog, DeviceDescriptor, DeviceId, StreamFormat};
use crate::{PipelineConfig, PipelineError, WeightingMode};

/// Statistics about a running pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    /// Frames published by the capture engine.
    pub frames_captured: u64,
    /// Frames analyzed and handed to sinks, silent ones included.
    pub frames_dispatched: u64,
    /// Frames discarded because the ring was full.
    pub frames_dropped: u64,
    /// Zeroed frames synthesized while the device was lost.
    pub silent_frames: u64,
    /// Sinks removed after a timeout, error or panic.
    pub sinks_faulted: u64,
    /// Sinks currently registered.
    pub sinks_registered: usize,
    /// Latest RMS level per channel in dBFS, floored at -100 dB.
    pub levels_db: Vec<f32>,
    /// Latest integrated loudness.
    pub integrated_lufs: f32,
    /// `true` while the capture device is in a failed state.
    pub device_faulted: bool,
}

/// Handle to a running pipeline.
///
/// Returned by [`PipelineBuilder::start()`]. Capture runs on the backend's
/// audio thread and analysis plus sink fan-out on a tokio task until
/// [`stop()`](Self::stop) is called or the handle is dropped.
///
/// The handle owns the capture stream, which some backends pin to the
/// thread that opened it, so `Pipeline` is not `Send`. Keep it on the task
/// that created it and talk to sinks through channels.
///
/// Control methods (register, unregister, reconfigure, reset) are queued
/// and take effect between dispatch cycles.
///
/// # Example
///
/// ```no_run
/// use omega_audio::{Pipeline, WeightingMode};
///
/// # async fn run() -> Result<(), omega_audio::PipelineError> {
/// let mut pipeline = Pipeline::builder().start().await?;
///
/// pipeline.set_weighting(WeightingMode::A)?;
/// tokio::time::sleep(std::time::Duration::from_secs(10)).await;
/// println!("{:?}", pipeline.stats());
///
/// pipeline.stop().await?;
/// # Ok(())
/// # }
/// ```
///
/// [`PipelineBuilder::start()`]: crate::PipelineBuilder::start
pub struct Pipeline {
    engine: CaptureEngine,
    catalog: DeviceCatalog,
    config: PipelineConfig,
    commands: mpsc::UnboundedSender<DistributorCommand>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<DistributorStats>,
    next_sink: u64,
}

impl Pipeline {
    /// Creates a new builder for configuring a pipeline.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub(crate) fn new(
        engine: CaptureEngine,
        catalog: DeviceCatalog,
        config: PipelineConfig,
        commands: mpsc::UnboundedSender<DistributorCommand>,
        handle: JoinHandle<()>,
        stats: Arc<DistributorStats>,
        next_sink: u64,
    ) -> Self {
        Self {
            engine,
            catalog,
            config,
            commands,
            handle: Some(handle),
            stats,
            next_sink,
        }
    }

    /// Returns `true` until [`stop()`](Self::stop) is called.
    pub fn is_running(&self) -> bool {
        self.handle.is_some() && self.engine.is_running()
    }

    /// The device currently captured.
    pub fn device(&self) -> &DeviceDescriptor {
        self.engine.device()
    }

    /// The format currently captured.
    pub fn format(&self) -> StreamFormat {
        self.engine.format()
    }

    /// The active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The catalog the pipeline resolves devices from.
    pub fn catalog(&self) -> &DeviceCatalog {
        &self.catalog
    }

    fn send(&self, command: DistributorCommand) -> Result<(), PipelineError> {
        if self.handle.is_none() {
            return Err(PipelineError::PipelineStopped);
        }
        self.commands
            .send(command)
            .map_err(|_| PipelineError::PipelineStopped)
    }

    /// Registers a sink. It receives frames from the next dispatch cycle on.
    ///
    /// # Errors
    ///
    /// Returns `PipelineStopped` if the pipeline is no longer running.
    pub fn register_sink<S: PluginSink + 'static>(&mut self, sink: S) -> Result<SinkId, PipelineError> {
        let id = SinkId::from_raw(self.next_sink);
        self.send(DistributorCommand::Register {
            id,
            sink: Box::new(sink),
        })?;
        self.next_sink += 1;
        Ok(id)
    }

    /// Unregisters a sink. Waits for an in-flight dispatch to finish, so the
    /// sink is never called after this returns.
    ///
    /// Returns `false` if no sink with this id was registered (e.g. it was
    /// already faulted).
    ///
    /// # Errors
    ///
    /// Returns `PipelineStopped` if the pipeline is no longer running.
    pub async fn unregister_sink(&self, id: SinkId) -> Result<bool, PipelineError> {
        let (ack, removed) = oneshot::channel();
        self.send(DistributorCommand::Unregister { id, ack })?;
        removed.await.map_err(|_| PipelineError::PipelineStopped)
    }

    /// Switches capture to the device with this id.
    ///
    /// The new stream is opened before the old one is closed; sequence
    /// numbers continue and at most one frame period is lost. Sinks get
    /// `on_device_changed` before the first frame from the new device.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound`, `DeviceUnavailable`, `UnsupportedFormat` or
    /// `StreamOpenFailed`. On error the current device keeps running.
    pub async fn switch_device(&mut self, id: &DeviceId) -> Result<(), PipelineError> {
        let device = self.catalog.find(id)?;
        self.switch_to(&device).await
    }

    /// Switches capture to `device`. See [`switch_device`](Self::switch_device).
    ///
    /// # Errors
    ///
    /// Same as [`switch_device`](Self::switch_device).
    pub async fn switch_to(&mut self, device: &DeviceDescriptor) -> Result<(), PipelineError> {
        if self.handle.is_none() {
            return Err(PipelineError::PipelineStopped);
        }
        self.engine.switch_device(device)?;

        let (ack, done) = oneshot::channel();
        self.send(DistributorCommand::DeviceChanged {
            device: device.clone(),
            format: self.engine.format(),
            ack,
        })?;
        done.await.map_err(|_| PipelineError::PipelineStopped)
    }

    /// Applies a new configuration.
    ///
    /// Changing the sample rate, frame length or channel count reopens the
    /// device. Changing any analysis parameter (bar count, window, frequency
    /// range, noise floor) rebuilds the analyzer and meter and emits
    /// `StreamRestarted`. Everything else applies in place. The ring
    /// capacity is fixed at start and ignored here.
    ///
    /// # Errors
    ///
    /// `Config` if the configuration is invalid, or any error from reopening
    /// the device. On error nothing changes.
    pub async fn reconfigure(&mut self, mut config: PipelineConfig) -> Result<(), PipelineError> {
        config.validate()?;
        if self.handle.is_none() {
            return Err(PipelineError::PipelineStopped);
        }
        config.ring_capacity = self.config.ring_capacity;

        if self.config.requires_reopen(&config) {
            self.engine
                .reconfigure(config.sample_rate, config.frame_length, config.channels)?;
        }

        let (ack, done) = oneshot::channel();
        self.send(DistributorCommand::Reconfigure {
            config: config.clone(),
            format: self.engine.format(),
            ack,
        })?;
        done.await.map_err(|_| PipelineError::PipelineStopped)?;

        self.config = config;
        Ok(())
    }

    /// Clears integrated loudness, block histories and the true-peak maximum.
    ///
    /// # Errors
    ///
    /// Returns `PipelineStopped` if the pipeline is no longer running.
    pub fn reset_loudness(&self) -> Result<(), PipelineError> {
        self.send(DistributorCommand::ResetLoudness)
    }

    /// Clears the spectrum peak-hold values.
    ///
    /// # Errors
    ///
    /// Returns `PipelineStopped` if the pipeline is no longer running.
    pub fn reset_peaks(&self) -> Result<(), PipelineError> {
        self.send(DistributorCommand::ResetPeaks)
    }

    /// Switches the display weighting for the weighted RMS readout.
    ///
    /// # Errors
    ///
    /// Returns `PipelineStopped` if the pipeline is no longer running.
    pub fn set_weighting(&mut self, mode: WeightingMode) -> Result<(), PipelineError> {
        self.send(DistributorCommand::SetWeighting(mode))?;
        self.config.weighting_mode = mode;
        Ok(())
    }

    /// Enables or disables gating of the integrated loudness.
    ///
    /// # Errors
    ///
    /// Returns `PipelineStopped` if the pipeline is no longer running.
    pub fn set_gated(&mut self, gated: bool) -> Result<(), PipelineError> {
        self.send(DistributorCommand::SetGated(gated))?;
        self.config.gated = gated;
        Ok(())
    }

    /// Returns current pipeline statistics.
    pub fn stats(&self) -> PipelineStats {
        let latest = self.stats.latest.lock().clone();
        let (levels_db, integrated_lufs) = match latest {
            Some(snapshot) => (snapshot.rms_db.clone(), snapshot.integrated_lufs),
            None => (
                vec![LEVEL_FLOOR_DB; self.engine.format().channels as usize],
                f32::NEG_INFINITY,
            ),
        };

        PipelineStats {
            frames_captured: self.engine.frames_captured(),
            frames_dispatched: self.stats.dispatched.load(Ordering::Relaxed),
            frames_dropped: self.engine.frames_dropped(),
            silent_frames: self.stats.silent.load(Ordering::Relaxed),
            sinks_faulted: self.stats.faulted.load(Ordering::Relaxed),
            sinks_registered: self.stats.registered.load(Ordering::Relaxed),
            levels_db,
            integrated_lufs,
            device_faulted: self.engine.is_faulted(),
        }
    }

    /// Stops capture, then waits for the distributor to finish its current
    /// cycle and exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the distributor task panicked.
    pub async fn stop(mut self) -> Result<(), PipelineError> {
        self.engine.stop();
        let _ = self.commands.send(DistributorCommand::Stop);

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|e| PipelineError::BackendError(format!("distributor task failed: {e}")))?;
        }
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.handle.take().is_some() {
            // Dropped without explicit stop() - the task exits on its own
            let _ = self.commands.send(DistributorCommand::Stop);
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockBackend;
    use crate::ConfigError;

    async fn start() -> (Pipeline, MockBackend) {
        let backend = MockBackend::new();
        backend.add_input("Mic", 2, &[44100, 48000]);
        backend.add_input("USB", 2, &[48000]);
        let pipeline = Pipeline::builder()
            .backend(backend.clone())
            .device("Mic")
            .start()
            .await
            .unwrap();
        (pipeline, backend)
    }

    #[test]
    fn test_pipeline_stats_default() {
        let stats = PipelineStats::default();
        assert_eq!(stats.frames_dispatched, 0);
        assert_eq!(stats.frames_dropped, 0);
        assert!(stats.levels_db.is_empty());
    }

    #[tokio::test]
    async fn test_stats_before_first_frame() {
        let (pipeline, _) = start().await;
        let stats = pipeline.stats();
        assert_eq!(stats.levels_db, vec![LEVEL_FLOOR_DB; 2]);
        assert_eq!(stats.integrated_lufs, f32::NEG_INFINITY);
        assert!(!stats.device_faulted);
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_reconfigure_keeps_state() {
        let (mut pipeline, _) = start().await;
        let bad = PipelineConfig::default().with_bar_count(2000);

        let err = pipeline.reconfigure(bad).await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::BarCount(2000))));
        assert_eq!(pipeline.config().bar_count, 256);
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_reconfigure_reopens_device() {
        let (mut pipeline, backend) = start().await;
        let opened = backend.open_count();

        pipeline
            .reconfigure(PipelineConfig::default().with_format(44100, 1024))
            .await
            .unwrap();
        assert_eq!(backend.open_count(), opened + 1);
        assert_eq!(pipeline.format().sample_rate, 44100);
        assert_eq!(pipeline.format().frame_length, 1024);

        pipeline
            .reconfigure(PipelineConfig::default().with_format(44100, 1024).with_bar_count(128))
            .await
            .unwrap();
        assert_eq!(backend.open_count(), opened + 1);
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_reconfigure_keeps_ring_capacity() {
        let (mut pipeline, _) = start().await;
        let config = PipelineConfig {
            ring_capacity: 32,
            ..PipelineConfig::default().with_bar_count(128)
        };

        pipeline.reconfigure(config).await.unwrap();
        assert_eq!(pipeline.config().bar_count, 128);
        assert_eq!(pipeline.config().ring_capacity, 8);
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_switch_to_unknown_device() {
        let (mut pipeline, _) = start().await;
        let err = pipeline.switch_device(&DeviceId::new("Gone")).await.unwrap_err();
        assert!(matches!(err, PipelineError::DeviceNotFound { .. }));
        assert_eq!(pipeline.device().name, "Mic");
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_unregister_unknown_sink() {
        let (pipeline, _) = start().await;
        assert!(!pipeline.unregister_sink(SinkId::from_raw(42)).await.unwrap());
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_closes_stream() {
        let (pipeline, backend) = start().await;
        assert!(pipeline.is_running());
        assert!(backend.is_open(&DeviceId::new("Mic")));

        pipeline.stop().await.unwrap();
        assert!(!backend.is_open(&DeviceId::new("Mic")));
    }
}
