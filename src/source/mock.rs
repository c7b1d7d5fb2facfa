//! Mock backend and signal generator for testing without hardware.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{AudioBackend, CaptureStream, DeviceDescriptor, DeviceId, StreamFormat};
use crate::pipeline::{ErrorReporter, FrameWriter};
use crate::PipelineError;

/// Generates synthetic interleaved `f32` audio.
///
/// # Example
///
/// ```
/// use omega_audio::MockSource;
///
/// let mut mock = MockSource::new(48000, 2);
///
/// // 100ms of silence followed by 100ms of a 1 kHz tone
/// mock.generate_silence(100);
/// mock.generate_sine(1000.0, 1.0, 100);
///
/// let samples = mock.take_samples();
/// assert_eq!(samples.len(), 2 * 9600);
/// ```
pub struct MockSource {
    sample_rate: u32,
    channels: u16,
    samples: Vec<f32>,
    phase: f64,
    seed: u32,
}

impl MockSource {
    /// Creates a new generator with the given format.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            samples: Vec::new(),
            phase: 0.0,
            seed: 12345,
        }
    }

    /// Returns the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the channel count.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Generates silence for the given duration in milliseconds.
    pub fn generate_silence(&mut self, duration_ms: u64) {
        let frames = self.frames_for_duration(duration_ms);
        self.samples
            .extend(std::iter::repeat(0.0).take(frames * self.channels as usize));
    }

    /// Generates a sine wave on every channel.
    ///
    /// Phase carries over between calls, so consecutive tones join without
    /// a discontinuity.
    pub fn generate_sine(&mut self, frequency: f64, amplitude: f64, duration_ms: u64) {
        let frames = self.frames_for_duration(duration_ms);
        self.push_sine(frequency, amplitude, frames);
    }

    /// Generates exactly `frames` sample frames of a sine wave.
    pub fn generate_sine_frames(&mut self, frequency: f64, amplitude: f64, frames: usize) {
        self.push_sine(frequency, amplitude, frames);
    }

    /// Generates white noise for the given duration.
    pub fn generate_noise(&mut self, duration_ms: u64, amplitude: f64) {
        let count = self.frames_for_duration(duration_ms) * self.channels as usize;

        // Simple LCG for deterministic "random" noise
        for _ in 0..count {
            self.seed = self.seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
            let random = f64::from((self.seed >> 16) & 0x7fff) / 16384.0 - 1.0;
            self.samples.push((random * amplitude) as f32);
        }
    }

    /// Adds raw interleaved samples directly.
    pub fn add_samples(&mut self, samples: &[f32]) {
        self.samples.extend_from_slice(samples);
    }

    /// Takes all accumulated samples, clearing the internal buffer.
    pub fn take_samples(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.samples)
    }

    /// Returns a reference to the accumulated samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Returns the duration of accumulated samples.
    pub fn duration(&self) -> Duration {
        let frames = self.samples.len() / self.channels as usize;
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate))
    }

    fn push_sine(&mut self, frequency: f64, amplitude: f64, frames: usize) {
        let step = std::f64::consts::TAU * frequency / f64::from(self.sample_rate);
        for _ in 0..frames {
            let value = (amplitude * self.phase.sin()) as f32;
            for _ in 0..self.channels {
                self.samples.push(value);
            }
            self.phase = (self.phase + step) % std::f64::consts::TAU;
        }
    }

    fn frames_for_duration(&self, duration_ms: u64) -> usize {
        (u64::from(self.sample_rate) * duration_ms / 1000) as usize
    }
}

struct OpenStream {
    token: u64,
    writer: FrameWriter,
    reporter: ErrorReporter,
}

type StreamTable = Arc<Mutex<HashMap<DeviceId, OpenStream>>>;

/// Removes the mock stream from the table when the capture stream drops.
struct StreamGuard {
    streams: StreamTable,
    device: DeviceId,
    token: u64,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let mut streams = self.streams.lock();
        if streams.get(&self.device).is_some_and(|s| s.token == self.token) {
            streams.remove(&self.device);
        }
    }
}

/// In-memory backend with scriptable devices.
///
/// Tests push samples into whichever stream is open on a device, fail
/// devices mid-stream and hot-plug devices in and out of the catalog.
///
/// # Example
///
/// ```
/// use omega_audio::{DeviceId, MockBackend};
///
/// let backend = MockBackend::new();
/// backend.add_input("Mock Mic", 2, &[44100, 48000]);
///
/// // Nothing is open yet, so samples go nowhere
/// assert!(!backend.push_samples(&DeviceId::new("Mock Mic"), &[0.0; 64]));
/// ```
#[derive(Clone, Default)]
pub struct MockBackend {
    devices: Arc<Mutex<Vec<DeviceDescriptor>>>,
    streams: StreamTable,
    refused: Arc<Mutex<Vec<DeviceId>>>,
    next_token: Arc<AtomicU64>,
    opened: Arc<AtomicU64>,
}

impl MockBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend listing `devices`.
    pub fn with_devices(devices: Vec<DeviceDescriptor>) -> Self {
        let backend = Self::new();
        *backend.devices.lock() = devices;
        backend
    }

    /// Adds an input device. The first input added becomes the default.
    pub fn add_input(&self, name: &str, channels: u16, sample_rates: &[u32]) -> DeviceDescriptor {
        let mut devices = self.devices.lock();
        let mut rates = sample_rates.to_vec();
        rates.sort_unstable();
        rates.dedup();

        let descriptor = DeviceDescriptor {
            id: DeviceId::new(name),
            name: name.to_string(),
            channels,
            sample_rates: rates,
            is_input: true,
            is_output: false,
            is_default: !devices.iter().any(|d| d.is_input),
        };
        devices.retain(|d| d.id != descriptor.id);
        devices.push(descriptor.clone());
        descriptor
    }

    /// Adds an arbitrary device descriptor.
    pub fn add_device(&self, descriptor: DeviceDescriptor) {
        let mut devices = self.devices.lock();
        devices.retain(|d| d.id != descriptor.id);
        devices.push(descriptor);
    }

    /// Removes a device from the catalog. An open stream keeps running until
    /// it is failed or dropped.
    pub fn remove_device(&self, id: &DeviceId) {
        self.devices.lock().retain(|d| &d.id != id);
    }

    /// Makes the next attempts to open `id` fail with `StreamOpenFailed`.
    pub fn refuse_open(&self, id: &DeviceId) {
        self.refused.lock().push(id.clone());
    }

    /// Pushes interleaved samples into the stream open on `id`.
    ///
    /// Returns `false` if no stream is open on that device.
    pub fn push_samples(&self, id: &DeviceId, samples: &[f32]) -> bool {
        let mut streams = self.streams.lock();
        match streams.get_mut(id) {
            Some(stream) => {
                stream.writer.write(samples);
                true
            }
            None => false,
        }
    }

    /// Simulates a backend error on the stream open on `id`.
    pub fn fail(&self, id: &DeviceId, reason: &str) -> bool {
        let streams = self.streams.lock();
        match streams.get(id) {
            Some(stream) => {
                stream.reporter.report(reason);
                true
            }
            None => false,
        }
    }

    /// Clears a simulated failure on the stream open on `id`.
    pub fn recover(&self, id: &DeviceId) -> bool {
        let streams = self.streams.lock();
        match streams.get(id) {
            Some(stream) => {
                stream.reporter.clear();
                true
            }
            None => false,
        }
    }

    /// Returns `true` if a stream is open on `id`.
    pub fn is_open(&self, id: &DeviceId) -> bool {
        self.streams.lock().contains_key(id)
    }

    /// Total number of streams opened so far.
    pub fn open_count(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }
}

impl AudioBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn devices(&self) -> Result<Vec<DeviceDescriptor>, PipelineError> {
        Ok(self.devices.lock().clone())
    }

    fn open_input(
        &self,
        device: &DeviceDescriptor,
        format: StreamFormat,
        writer: FrameWriter,
    ) -> Result<CaptureStream, PipelineError> {
        if self.refused.lock().contains(&device.id) {
            return Err(PipelineError::open_failed(format!(
                "{} refused to start",
                device.name
            )));
        }
        if !self.devices.lock().iter().any(|d| d.id == device.id) {
            return Err(PipelineError::unavailable(&device.id, "device was unplugged"));
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let reporter = writer.error_reporter();
        self.streams.lock().insert(
            device.id.clone(),
            OpenStream {
                token,
                writer,
                reporter,
            },
        );
        self.opened.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            device = %device.name,
            sample_rate = format.sample_rate,
            channels = format.channels,
            "Opened mock input stream"
        );

        Ok(CaptureStream::new(StreamGuard {
            streams: Arc::clone(&self.streams),
            device: device.id.clone(),
            token,
        }))
    }
}
