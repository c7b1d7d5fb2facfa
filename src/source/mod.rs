//! Device catalog and audio backend abstraction.
//!
//! An [`AudioBackend`] enumerates devices and opens input streams. The CPAL
//! backend talks to real hardware; the [`MockBackend`] lets tests and demos
//! drive the whole pipeline without it.

mod descriptor;
mod device;
mod device_id;
mod mock;

use std::any::Any;
use std::fmt::Write as _;
use std::sync::Arc;

pub use descriptor::{DeviceChanges, DeviceDescriptor};
pub use device::CpalBackend;
pub use device_id::DeviceId;
pub use mock::{MockBackend, MockSource};

use crate::pipeline::FrameWriter;
use crate::{PipelineConfig, PipelineError};

/// Format requested when opening an input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
    /// Samples per channel in each delivered frame.
    pub frame_length: usize,
}

/// A source of devices and input streams.
///
/// Implementations must never block or allocate unboundedly inside the
/// stream callback; all they do there is hand samples to the [`FrameWriter`].
pub trait AudioBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Enumerates every device the backend can see.
    ///
    /// Enumeration is synchronous and has no effect on running streams.
    fn devices(&self) -> Result<Vec<DeviceDescriptor>, PipelineError>;

    /// Opens and starts an input stream on `device`.
    ///
    /// Every sample the device produces must be passed to `writer`, and
    /// backend errors reported through [`FrameWriter::error_reporter`].
    /// Capture continues until the returned [`CaptureStream`] is dropped.
    fn open_input(
        &self,
        device: &DeviceDescriptor,
        format: StreamFormat,
        writer: FrameWriter,
    ) -> Result<CaptureStream, PipelineError>;
}

/// A running input stream.
///
/// Capture continues while this is held. Dropping it stops the stream and
/// releases the device.
pub struct CaptureStream {
    _inner: Box<dyn Any>,
}

impl CaptureStream {
    /// Wraps a backend-specific stream guard.
    pub fn new<T: 'static>(inner: T) -> Self {
        Self {
            _inner: Box::new(inner),
        }
    }
}

impl std::fmt::Debug for CaptureStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureStream").finish_non_exhaustive()
    }
}

/// Enumerates devices through an [`AudioBackend`].
///
/// Every call re-enumerates and returns a fresh snapshot. Diff snapshots with
/// [`DeviceChanges::between`] to detect hot-plug events.
#[derive(Clone)]
pub struct DeviceCatalog {
    backend: Arc<dyn AudioBackend>,
}

impl DeviceCatalog {
    /// Creates a catalog backed by `backend`.
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self { backend }
    }

    /// Creates a catalog for the system's default CPAL host.
    pub fn system() -> Self {
        Self::new(Arc::new(CpalBackend::new()))
    }

    /// Returns the backend this catalog enumerates.
    pub fn backend(&self) -> Arc<dyn AudioBackend> {
        Arc::clone(&self.backend)
    }

    /// Lists every device, inputs and outputs.
    ///
    /// An empty list is not an error; an unreachable backend is.
    pub fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, PipelineError> {
        let devices = self.backend.devices()?;
        tracing::debug!(backend = self.backend.name(), count = devices.len(), "Enumerated devices");
        Ok(devices)
    }

    /// Lists devices that can capture.
    pub fn input_devices(&self) -> Result<Vec<DeviceDescriptor>, PipelineError> {
        Ok(self
            .list_devices()?
            .into_iter()
            .filter(|d| d.is_input)
            .collect())
    }

    /// Lists devices that can play back.
    pub fn output_devices(&self) -> Result<Vec<DeviceDescriptor>, PipelineError> {
        Ok(self
            .list_devices()?
            .into_iter()
            .filter(|d| d.is_output)
            .collect())
    }

    /// Returns the system default input device, if any.
    ///
    /// Backend failures are logged and reported as `None`.
    pub fn default_device(&self) -> Option<DeviceDescriptor> {
        let devices = match self.list_devices() {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!(error = %e, "Device enumeration failed");
                return None;
            }
        };
        let mut defaults = devices.into_iter().filter(|d| d.is_default);
        let first = defaults.next()?;
        if first.is_input {
            return Some(first);
        }
        defaults.find(|d| d.is_input).or(Some(first))
    }

    /// Looks up a device by id.
    pub fn find(&self, id: &DeviceId) -> Result<DeviceDescriptor, PipelineError> {
        self.list_devices()?
            .into_iter()
            .find(|d| &d.id == id)
            .ok_or_else(|| PipelineError::DeviceNotFound { id: id.clone() })
    }

    /// Picks the input to use when none was named.
    ///
    /// A PipeWire or JACK input wins, else the system default input.
    pub fn preferred_input(&self) -> Result<DeviceDescriptor, PipelineError> {
        let inputs = self.input_devices()?;

        if let Some(graph) = inputs.iter().find(|d| d.is_graph_device()) {
            tracing::info!(device = %graph.name, "Auto-selected audio graph device");
            return Ok(graph.clone());
        }

        inputs
            .into_iter()
            .find(|d| d.is_default)
            .ok_or(PipelineError::NoDefaultDevice)
    }

    /// Re-enumerates and diffs against `previous`.
    pub fn changes_since(
        &self,
        previous: &[DeviceDescriptor],
    ) -> Result<(Vec<DeviceDescriptor>, DeviceChanges), PipelineError> {
        let current = self.list_devices()?;
        let changes = DeviceChanges::between(previous, &current);
        Ok((current, changes))
    }

    /// Formats the catalog and the capture settings as a human-readable report.
    pub fn report(&self, config: &PipelineConfig) -> Result<String, PipelineError> {
        let devices = self.list_devices()?;
        let mut out = String::new();

        let _ = writeln!(out, "=== {} devices ===", self.backend.name());
        let _ = writeln!(out, "Input devices:");
        for device in devices.iter().filter(|d| d.is_input) {
            let _ = writeln!(out, "  {device}");
        }
        let _ = writeln!(out, "Output devices:");
        for device in devices.iter().filter(|d| d.is_output) {
            let _ = writeln!(out, "  {device}");
        }
        let _ = writeln!(out, "Capture settings:");
        let _ = writeln!(out, "  Sample rate: {} Hz", config.sample_rate);
        let _ = writeln!(out, "  Frame length: {} samples", config.frame_length);
        let _ = writeln!(out, "  Channels: {}", config.channels);
        let _ = writeln!(out, "  Latency: {:.1} ms", config.latency_ms());

        Ok(out)
    }
}

impl std::fmt::Debug for DeviceCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCatalog")
            .field("backend", &self.backend.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, input: bool, output: bool, is_default: bool) -> DeviceDescriptor {
        DeviceDescriptor {
            id: DeviceId::new(name),
            name: name.to_string(),
            channels: 2,
            sample_rates: vec![44100, 48000],
            is_input: input,
            is_output: output,
            is_default,
        }
    }

    fn catalog(devices: Vec<DeviceDescriptor>) -> DeviceCatalog {
        DeviceCatalog::new(Arc::new(MockBackend::with_devices(devices)))
    }

    #[test]
    fn test_empty_catalog_is_not_an_error() {
        let catalog = catalog(vec![]);
        assert!(catalog.list_devices().unwrap().is_empty());
        assert!(catalog.default_device().is_none());
        assert!(matches!(
            catalog.preferred_input(),
            Err(PipelineError::NoDefaultDevice)
        ));
    }

    #[test]
    fn test_direction_views() {
        let catalog = catalog(vec![
            descriptor("mic", true, false, true),
            descriptor("speakers", false, true, true),
            descriptor("interface", true, true, false),
        ]);

        let inputs = catalog.input_devices().unwrap();
        let outputs = catalog.output_devices().unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(outputs.len(), 2);
    }

    #[test]
    fn test_default_prefers_input() {
        let catalog = catalog(vec![
            descriptor("speakers", false, true, true),
            descriptor("mic", true, false, true),
        ]);
        assert_eq!(catalog.default_device().unwrap().name, "mic");
    }

    #[test]
    fn test_preferred_input_picks_graph_device() {
        let catalog = catalog(vec![
            descriptor("HDA Intel", true, false, true),
            descriptor("pipewire", true, true, false),
        ]);
        assert_eq!(catalog.preferred_input().unwrap().name, "pipewire");
    }

    #[test]
    fn test_find_unknown_device() {
        let catalog = catalog(vec![descriptor("mic", true, false, true)]);
        let err = catalog.find(&DeviceId::new("ghost")).unwrap_err();
        assert!(matches!(err, PipelineError::DeviceNotFound { .. }));
    }

    #[test]
    fn test_enumeration_is_idempotent() {
        let catalog = catalog(vec![descriptor("mic", true, false, true)]);
        let first = catalog.list_devices().unwrap();
        let (second, changes) = catalog.changes_since(&first).unwrap();
        assert_eq!(first, second);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_report_includes_latency() {
        let catalog = catalog(vec![descriptor("mic", true, false, true)]);
        let report = catalog.report(&PipelineConfig::default()).unwrap();
        assert!(report.contains("mic (Input, 2ch, 44100-48000Hz) [DEFAULT]"));
        assert!(report.contains("Latency: 10.7 ms"));
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_system_catalog() {
        let catalog = DeviceCatalog::system();
        for device in catalog.list_devices().unwrap() {
            println!("{device}");
        }
    }
}
