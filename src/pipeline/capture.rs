//! Capture engine: owns the input stream and turns callback buffers into
//! sequenced frames.
//!
//! The backend's audio thread only ever calls [`FrameWriter::write_with`],
//! which slices incoming samples into fixed-length frames and force-pushes
//! them into the [`FrameRing`]. Nothing on that path blocks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::FrameRing;
use crate::format::sanitize_f32;
use crate::source::{AudioBackend, CaptureStream, DeviceDescriptor, StreamFormat};
use crate::{AudioFrame, PipelineConfig, PipelineError};

/// Fault flag raised by the backend's error callback.
#[derive(Debug, Default)]
pub struct StreamHealth {
    faulted: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl StreamHealth {
    /// Returns `true` while the current stream is in a failed state.
    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }

    /// The most recent backend error, if the stream is faulted.
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    pub(crate) fn fault(&self, reason: String) {
        *self.reason.lock() = Some(reason);
        self.faulted.store(true, Ordering::Release);
    }

    pub(crate) fn clear(&self) {
        self.faulted.store(false, Ordering::Release);
        *self.reason.lock() = None;
    }
}

/// State shared between the writer on the audio thread, the engine and the
/// distributor. Survives device switches.
#[derive(Clone)]
pub(crate) struct CaptureTap {
    pub ring: Arc<FrameRing>,
    pub sequence: Arc<AtomicU64>,
    /// Stream time in nanoseconds, advanced by every published frame.
    pub clock: Arc<AtomicU64>,
    pub health: Arc<StreamHealth>,
    pub captured: Arc<AtomicU64>,
}

impl CaptureTap {
    pub fn new(ring_capacity: usize) -> Self {
        Self {
            ring: Arc::new(FrameRing::new(ring_capacity)),
            sequence: Arc::new(AtomicU64::new(0)),
            clock: Arc::new(AtomicU64::new(0)),
            health: Arc::new(StreamHealth::default()),
            captured: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Claims the next sequence number and timestamp for a frame of
    /// `frame_length` samples per channel.
    pub fn next_slot(&self, frame_length: usize, sample_rate: u32) -> (u64, Duration) {
        let nanos = frame_nanos(frame_length, sample_rate);
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel);
        let timestamp = Duration::from_nanos(self.clock.fetch_add(nanos, Ordering::AcqRel));
        (sequence, timestamp)
    }
}

fn frame_nanos(frame_length: usize, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    frame_length as u64 * 1_000_000_000 / u64::from(sample_rate)
}

/// Reports backend errors for one stream.
///
/// Reports from a stream that has been swapped out are ignored, so a dying
/// old device cannot fault the new one.
#[derive(Clone)]
pub struct ErrorReporter {
    active: Arc<AtomicBool>,
    health: Arc<StreamHealth>,
}

impl ErrorReporter {
    /// Marks the stream as faulted.
    pub fn report(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if !self.active.load(Ordering::Acquire) {
            tracing::debug!(error = %reason, "Ignoring error from inactive stream");
            return;
        }
        tracing::error!(error = %reason, "Audio stream error");
        self.health.fault(reason);
    }

    /// Clears a previously reported fault.
    pub fn clear(&self) {
        if self.active.load(Ordering::Acquire) {
            self.health.clear();
        }
    }
}

/// Assembles callback buffers into fixed-length frames.
///
/// Handed to [`AudioBackend::open_input`]; the backend calls
/// [`write_with`](Self::write_with) from its audio callback. Frames are only
/// published once the owning stream has been swapped in.
pub struct FrameWriter {
    tap: CaptureTap,
    active: Arc<AtomicBool>,
    format: StreamFormat,
    pending: Vec<f32>,
}

impl FrameWriter {
    fn new(tap: CaptureTap, format: StreamFormat, active: Arc<AtomicBool>) -> Self {
        let capacity = format.frame_length * format.channels as usize;
        Self {
            tap,
            active,
            format,
            pending: Vec::with_capacity(capacity),
        }
    }

    /// The format frames will be published in.
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Overrides the channel count when the device negotiated a different
    /// layout than requested. Call before the stream starts.
    pub fn set_channels(&mut self, channels: u16) {
        self.format.channels = channels.max(1);
        self.pending.clear();
        self.pending
            .reserve(self.format.frame_length * self.format.channels as usize);
    }

    /// Returns a reporter for the backend's error callback.
    pub fn error_reporter(&self) -> ErrorReporter {
        ErrorReporter {
            active: Arc::clone(&self.active),
            health: Arc::clone(&self.tap.health),
        }
    }

    /// Writes interleaved `f32` samples.
    pub fn write(&mut self, samples: &[f32]) {
        self.write_with(samples, sanitize_f32);
    }

    /// Writes interleaved samples of any format through `convert`.
    pub fn write_with<T: Copy>(&mut self, samples: &[T], convert: impl Fn(T) -> f32) {
        if !self.active.load(Ordering::Acquire) {
            self.pending.clear();
            return;
        }

        let frame_samples = self.format.frame_length * self.format.channels as usize;
        if frame_samples == 0 {
            return;
        }

        let mut rest = samples;
        while !rest.is_empty() {
            let take = (frame_samples - self.pending.len()).min(rest.len());
            let (head, tail) = rest.split_at(take);
            self.pending.extend(head.iter().map(|&s| convert(s)));
            rest = tail;

            if self.pending.len() == frame_samples {
                self.publish(frame_samples);
            }
        }
    }

    fn publish(&mut self, frame_samples: usize) {
        let samples = std::mem::replace(&mut self.pending, Vec::with_capacity(frame_samples));
        let (sequence, timestamp) = self
            .tap
            .next_slot(self.format.frame_length, self.format.sample_rate);

        let frame = AudioFrame::new(
            samples,
            sequence,
            self.format.sample_rate,
            self.format.channels,
            timestamp,
        );

        // Drop-oldest; the distributor reports drops from the ring counter.
        self.tap.ring.push(frame);
        self.tap.captured.fetch_add(1, Ordering::Relaxed);
    }
}

/// Owns the input stream and delivers sequenced frames into the ring.
///
/// # Device switching
///
/// [`switch_device`](Self::switch_device) opens the new stream first with
/// publishing disabled, then flips publishing from the old writer to the new
/// one and finally drops the old stream. Sequence numbers come from a shared
/// counter, so they continue across the switch. If the new device fails to
/// open, the old stream keeps running untouched.
pub struct CaptureEngine {
    backend: Arc<dyn AudioBackend>,
    device: DeviceDescriptor,
    format: StreamFormat,
    max_channels: u16,
    tap: CaptureTap,
    active: Arc<AtomicBool>,
    stream: Option<CaptureStream>,
}

impl CaptureEngine {
    /// Opens `device` at the configured sample rate and frame length.
    ///
    /// # Errors
    ///
    /// - `Config` if `config` is invalid
    /// - `DeviceUnavailable` if the device is not an input or the backend
    ///   cannot find it
    /// - `UnsupportedFormat` if the device does not list the sample rate
    /// - `StreamOpenFailed` if the backend refuses to start the stream
    pub fn open(
        backend: Arc<dyn AudioBackend>,
        device: &DeviceDescriptor,
        config: &PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let mut engine = Self {
            backend,
            device: device.clone(),
            format: StreamFormat {
                sample_rate: config.sample_rate,
                channels: config.channels,
                frame_length: config.frame_length,
            },
            max_channels: config.channels,
            tap: CaptureTap::new(config.ring_capacity),
            active: Arc::new(AtomicBool::new(false)),
            stream: None,
        };

        let format = engine.negotiate(device, config.sample_rate, config.frame_length)?;
        engine.start(device, format)?;

        tracing::info!(
            device = %device.name,
            sample_rate = format.sample_rate,
            frame_length = format.frame_length,
            channels = format.channels,
            "Capture started"
        );

        Ok(engine)
    }

    /// The device currently captured.
    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    /// The format currently captured.
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Time between consecutive frames.
    pub fn frame_period(&self) -> Duration {
        Duration::from_nanos(frame_nanos(self.format.frame_length, self.format.sample_rate))
    }

    /// Returns `true` while a stream is open.
    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    /// Returns `true` if the backend reported an error on the current stream.
    pub fn is_faulted(&self) -> bool {
        self.tap.health.is_faulted()
    }

    /// Pops the oldest unread frame.
    ///
    /// Only for standalone use; a running pipeline drains the ring itself.
    pub fn next_frame(&self) -> Option<AudioFrame> {
        self.tap.ring.pop()
    }

    /// Frames published into the ring so far.
    pub fn frames_captured(&self) -> u64 {
        self.tap.captured.load(Ordering::Relaxed)
    }

    /// Frames discarded because the ring was full.
    pub fn frames_dropped(&self) -> u64 {
        self.tap.ring.dropped()
    }

    /// Sequence number the next frame will carry.
    pub fn next_sequence(&self) -> u64 {
        self.tap.sequence.load(Ordering::Acquire)
    }

    pub(crate) fn tap(&self) -> CaptureTap {
        self.tap.clone()
    }

    /// Moves capture to `device` at the current sample rate and frame length.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open). On error the previous stream keeps
    /// running.
    pub fn switch_device(&mut self, device: &DeviceDescriptor) -> Result<(), PipelineError> {
        let format = self.negotiate(device, self.format.sample_rate, self.format.frame_length)?;
        let previous = self.device.name.clone();
        self.start(device, format)?;

        tracing::info!(from = %previous, to = %device.name, "Switched capture device");
        Ok(())
    }

    /// Reopens the current device with a new format.
    ///
    /// Frames still buffered in the old format are discarded.
    pub fn reconfigure(
        &mut self,
        sample_rate: u32,
        frame_length: usize,
        channels: u16,
    ) -> Result<(), PipelineError> {
        let previous_channels = self.max_channels;
        self.max_channels = channels;

        let device = self.device.clone();
        let result = self
            .negotiate(&device, sample_rate, frame_length)
            .and_then(|format| self.start(&device, format));

        match result {
            Ok(()) => {
                self.tap.ring.clear();
                tracing::info!(sample_rate, frame_length, channels, "Capture reconfigured");
                Ok(())
            }
            Err(e) => {
                self.max_channels = previous_channels;
                Err(e)
            }
        }
    }

    /// Stops capture. Further frames are never published.
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        if self.stream.take().is_some() {
            tracing::info!(device = %self.device.name, "Capture stopped");
        }
    }

    fn negotiate(
        &self,
        device: &DeviceDescriptor,
        sample_rate: u32,
        frame_length: usize,
    ) -> Result<StreamFormat, PipelineError> {
        if !device.is_input {
            return Err(PipelineError::unavailable(&device.id, "not an input device"));
        }
        if !device.supports_rate(sample_rate) {
            return Err(PipelineError::UnsupportedFormat {
                sample_rate,
                available: device.sample_rates.clone(),
            });
        }

        Ok(StreamFormat {
            sample_rate,
            channels: device.channels.min(self.max_channels).max(1),
            frame_length,
        })
    }

    /// Open-new, swap, close-old.
    fn start(&mut self, device: &DeviceDescriptor, format: StreamFormat) -> Result<(), PipelineError> {
        let active = Arc::new(AtomicBool::new(false));
        let writer = FrameWriter::new(self.tap.clone(), format, Arc::clone(&active));
        let stream = self.backend.open_input(device, format, writer)?;

        self.active.store(false, Ordering::Release);
        active.store(true, Ordering::Release);
        self.active = active;
        self.tap.health.clear();

        let previous = self.stream.replace(stream);
        self.device = device.clone();
        self.format = format;
        drop(previous);

        Ok(())
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CaptureEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureEngine")
            .field("backend", &self.backend.name())
            .field("device", &self.device.name)
            .field("format", &self.format)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
