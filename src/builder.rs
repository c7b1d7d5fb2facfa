//! Builder pattern for [`Pipeline`].

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::pipeline::{CaptureEngine, Distributor, DistributorStats};
use crate::session::Pipeline;
use crate::sink::{PluginSink, SinkId};
use crate::source::{AudioBackend, CpalBackend, DeviceCatalog, DeviceId};
use crate::{event_callback, EventCallback, PipelineConfig, PipelineError, PipelineEvent};

/// Specifies which input device to capture from.
#[derive(Debug, Clone, Default)]
enum DeviceSelection {
    /// A PipeWire/JACK input if present, else the system default input.
    #[default]
    Preferred,
    /// A specific device by id.
    ById(DeviceId),
}

/// Builder for configuring and starting a pipeline.
///
/// Use [`Pipeline::builder()`] to create a new builder.
///
/// # Example
///
/// ```no_run
/// use omega_audio::{ChannelSink, Pipeline, PipelineConfig, WeightingMode};
/// use tokio::sync::mpsc;
///
/// # async fn run() -> Result<(), omega_audio::PipelineError> {
/// let (tx, mut rx) = mpsc::channel(16);
///
/// let pipeline = Pipeline::builder()
///     .device("USB Audio CODEC")
///     .config(PipelineConfig::default().with_weighting(WeightingMode::A))
///     .add_sink(ChannelSink::new(tx))
///     .on_event(|e| tracing::warn!(?e, "pipeline event"))
///     .start()
///     .await?;
///
/// while let Some(frame) = rx.recv().await {
///     println!("{:.1} LUFS", frame.loudness.momentary_lufs);
/// }
///
/// pipeline.stop().await?;
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct PipelineBuilder {
    backend: Option<Arc<dyn AudioBackend>>,
    device: DeviceSelection,
    config: PipelineConfig,
    sinks: Vec<Box<dyn PluginSink>>,
    event_callback: Option<EventCallback>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            backend: None,
            device: DeviceSelection::Preferred,
            config: PipelineConfig::default(),
            sinks: Vec::new(),
            event_callback: None,
        }
    }

    /// Use a specific audio backend.
    ///
    /// Default: [`CpalBackend`], the system's audio host.
    pub fn backend<B: AudioBackend + 'static>(mut self, backend: B) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }

    /// Capture from the device with this id.
    ///
    /// Without this the builder picks a PipeWire/JACK input if one exists,
    /// else the system default input.
    pub fn device(mut self, id: impl Into<DeviceId>) -> Self {
        self.device = DeviceSelection::ById(id.into());
        self
    }

    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a sink that receives frames from the first cycle on.
    ///
    /// Sinks can also be added later with [`Pipeline::register_sink`].
    pub fn add_sink<S: PluginSink + 'static>(mut self, sink: S) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Set a callback to receive runtime events.
    ///
    /// Events include ring overruns, faulted sinks, device loss and device
    /// switches. The callback runs on the distributor task; keep it short.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(PipelineEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Opens the device and starts the distributor task.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - The device can't be found, or no default input exists
    /// - The device doesn't support the configured sample rate
    /// - The backend fails to open the stream
    pub async fn start(self) -> Result<Pipeline, PipelineError> {
        self.config.validate()?;

        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(CpalBackend::new()));
        let catalog = DeviceCatalog::new(backend);

        let device = match self.device {
            DeviceSelection::Preferred => catalog.preferred_input()?,
            DeviceSelection::ById(id) => catalog.find(&id)?,
        };

        let engine = CaptureEngine::open(catalog.backend(), &device, &self.config)?;
        let stats = Arc::new(DistributorStats::default());

        let mut distributor = Distributor::new(
            engine.tap(),
            self.config.clone(),
            engine.format(),
            device,
            Arc::clone(&stats),
        )
        .with_event_callback(self.event_callback);

        let mut next_sink = 0;
        for sink in self.sinks {
            distributor.add_sink(SinkId::from_raw(next_sink), sink);
            next_sink += 1;
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(distributor.run(command_rx));

        Ok(Pipeline::new(
            engine, catalog, self.config, command_tx, handle, stats, next_sink,
        ))
    }
}
