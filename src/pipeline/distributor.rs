//! Distributor task that analyzes frames and fans them out to sinks.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

use super::worker::{SinkJob, SinkWorker};
use super::CaptureTap;
use crate::analysis::SpectralAnalyzer;
use crate::loudness::{LoudnessMeter, LoudnessSnapshot};
use crate::sink::{PluginSink, SinkId};
use crate::source::{DeviceDescriptor, StreamFormat};
use crate::{
    AnalysisFrame, AudioFrame, EventCallback, PipelineConfig, PipelineEvent, SinkFault,
    WeightingMode,
};

/// Fresh frames the stream must publish after a fault before it counts as
/// recovered.
const RECOVERY_FRAMES: u64 = 2;

/// Command sent to the distributor task. Commands are handled between
/// dispatch cycles.
pub(crate) enum DistributorCommand {
    Register {
        id: SinkId,
        sink: Box<dyn PluginSink>,
    },
    Unregister {
        id: SinkId,
        ack: oneshot::Sender<bool>,
    },
    DeviceChanged {
        device: DeviceDescriptor,
        format: StreamFormat,
        ack: oneshot::Sender<()>,
    },
    Reconfigure {
        config: PipelineConfig,
        format: StreamFormat,
        ack: oneshot::Sender<()>,
    },
    ResetLoudness,
    ResetPeaks,
    SetWeighting(WeightingMode),
    SetGated(bool),
    Stop,
}

/// Counters shared between the distributor task and the pipeline handle.
#[derive(Debug, Default)]
pub(crate) struct DistributorStats {
    pub dispatched: AtomicU64,
    pub silent: AtomicU64,
    pub faulted: AtomicU64,
    pub registered: AtomicUsize,
    pub latest: Mutex<Option<Arc<LoudnessSnapshot>>>,
}

/// Pulls frames from the capture ring, runs the analyzer and meter on each
/// and hands the resulting [`AnalysisFrame`] to every sink in registration
/// order.
pub(crate) struct Distributor {
    tap: CaptureTap,
    config: PipelineConfig,
    format: StreamFormat,
    device: DeviceDescriptor,
    analyzer: SpectralAnalyzer,
    meter: LoudnessMeter,
    sinks: Vec<SinkWorker>,
    event_callback: Option<EventCallback>,
    stats: Arc<DistributorStats>,
    expected: Option<u64>,
    reported_drops: u64,
    device_faulted: bool,
    /// Frames captured when the current fault was noticed.
    fault_mark: u64,
    next_silence: Option<Instant>,
}

impl Distributor {
    pub fn new(
        tap: CaptureTap,
        config: PipelineConfig,
        format: StreamFormat,
        device: DeviceDescriptor,
        stats: Arc<DistributorStats>,
    ) -> Self {
        let analyzer = SpectralAnalyzer::with_sample_rate(&config, format.sample_rate);
        let meter = LoudnessMeter::new(
            format.sample_rate,
            format.channels,
            config.weighting_mode,
            config.gated,
        );

        Self {
            tap,
            config,
            format,
            device,
            analyzer,
            meter,
            sinks: Vec::new(),
            event_callback: None,
            stats,
            expected: None,
            reported_drops: 0,
            device_faulted: false,
            fault_mark: 0,
            next_silence: None,
        }
    }

    /// Sets the event callback.
    pub fn with_event_callback(mut self, callback: Option<EventCallback>) -> Self {
        self.event_callback = callback;
        self
    }

    /// Adds a sink before the task starts.
    pub fn add_sink(&mut self, id: SinkId, sink: Box<dyn PluginSink>) {
        self.register(id, sink);
    }

    fn emit_event(&self, event: PipelineEvent) {
        if let Some(ref callback) = self.event_callback {
            callback(event);
        }
    }

    fn frame_period(&self) -> Duration {
        let rate = u64::from(self.format.sample_rate.max(1));
        Duration::from_nanos(self.format.frame_length as u64 * 1_000_000_000 / rate)
    }

    /// Poll at half the frame period so a frame never waits longer than
    /// half a period in the ring.
    fn poll_interval(&self) -> tokio::time::Interval {
        let period = (self.frame_period() / 2).max(Duration::from_micros(100));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }

    /// Runs until a `Stop` command arrives or the command channel closes.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<DistributorCommand>) {
        let mut interval = self.poll_interval();

        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(DistributorCommand::Stop) | None => break,
                    Some(DistributorCommand::Reconfigure { config, format, ack }) => {
                        self.reconfigure(config, format);
                        interval = self.poll_interval();
                        let _ = ack.send(());
                    }
                    Some(command) => self.handle(command).await,
                },
                _ = interval.tick() => self.cycle().await,
            }
        }

        tracing::info!(
            dispatched = self.stats.dispatched.load(Ordering::Relaxed),
            sinks = self.sinks.len(),
            "Distributor stopped"
        );
    }

    async fn handle(&mut self, command: DistributorCommand) {
        match command {
            DistributorCommand::Register { id, sink } => self.register(id, sink),
            DistributorCommand::Unregister { id, ack } => {
                let _ = ack.send(self.unregister(id));
            }
            DistributorCommand::DeviceChanged { device, format, ack } => {
                self.device_changed(device, format).await;
                let _ = ack.send(());
            }
            DistributorCommand::ResetLoudness => {
                self.meter.reset();
                tracing::info!("Loudness reset");
                self.emit_event(PipelineEvent::LoudnessReset);
            }
            DistributorCommand::ResetPeaks => self.analyzer.reset_peaks(),
            DistributorCommand::SetWeighting(mode) => {
                self.config.weighting_mode = mode;
                self.meter.set_weighting(mode);
            }
            DistributorCommand::SetGated(gated) => {
                self.config.gated = gated;
                self.meter.set_gated(gated);
            }
            // Handled in `run`
            DistributorCommand::Reconfigure { .. } | DistributorCommand::Stop => {}
        }
    }

    fn register(&mut self, id: SinkId, sink: Box<dyn PluginSink>) {
        let name = sink.name().to_string();
        let worker = match SinkWorker::spawn(id, sink) {
            Ok(worker) => worker,
            Err(fault) => {
                self.stats.faulted.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%id, sink = %name, %fault, "Sink could not be started");
                self.emit_event(PipelineEvent::SinkFaulted { id, name, fault });
                return;
            }
        };

        tracing::info!(%id, sink = %name, "Sink registered");
        self.emit_event(PipelineEvent::SinkRegistered { id, name });
        self.sinks.push(worker);
        self.stats.registered.store(self.sinks.len(), Ordering::Relaxed);
    }

    fn unregister(&mut self, id: SinkId) -> bool {
        let Some(index) = self.sinks.iter().position(|s| s.id() == id) else {
            return false;
        };
        let removed = self.sinks.remove(index);
        self.stats.registered.store(self.sinks.len(), Ordering::Relaxed);

        tracing::info!(%id, sink = %removed.name(), "Sink unregistered");
        self.emit_event(PipelineEvent::SinkUnregistered {
            id,
            name: removed.name().to_string(),
        });
        true
    }

    async fn device_changed(&mut self, device: DeviceDescriptor, format: StreamFormat) {
        let previous = std::mem::replace(&mut self.device, device.clone());
        self.set_format(format);
        self.device_faulted = false;
        self.next_silence = None;

        let budget = self.config.sink_timeout;
        let mut faults = Vec::new();
        for (index, worker) in self.sinks.iter().enumerate() {
            let job = SinkJob::DeviceChanged(device.clone());
            if let Err(fault) = worker.call(job, budget).await {
                faults.push((index, fault));
            }
        }
        self.remove_faulted(faults);

        self.emit_event(PipelineEvent::DeviceSwitched {
            previous: previous.id,
            current: device.id,
        });
    }

    fn reconfigure(&mut self, config: PipelineConfig, format: StreamFormat) {
        let restart = self.config.requires_restart(&config);
        self.config = config;

        if restart {
            self.format = format;
            self.rebuild();
        } else {
            self.set_format(format);
            self.analyzer.set_dynamics(
                self.config.peak_hold_decay_db,
                self.config.peak_hold_time,
                self.config.smoothing,
            );
            self.analyzer.set_peak_hold(self.config.peak_hold);
            self.meter.set_weighting(self.config.weighting_mode);
            self.meter.set_gated(self.config.gated);
        }
    }

    /// Keeps analysis state unless the sample rate changed.
    fn set_format(&mut self, format: StreamFormat) {
        let rate_changed = format.sample_rate != self.format.sample_rate;
        self.format = format;
        if rate_changed {
            self.rebuild();
        }
    }

    /// Rebuilds the analyzer and meter for the current format and config.
    fn rebuild(&mut self) {
        self.analyzer = SpectralAnalyzer::with_sample_rate(&self.config, self.format.sample_rate);
        self.meter = LoudnessMeter::new(
            self.format.sample_rate,
            self.format.channels,
            self.config.weighting_mode,
            self.config.gated,
        );

        tracing::info!(
            bar_count = self.config.bar_count,
            sample_rate = self.format.sample_rate,
            "Stream restarted"
        );
        self.emit_event(PipelineEvent::StreamRestarted {
            bar_count: self.config.bar_count,
            sample_rate: self.format.sample_rate,
        });
    }

    /// One dispatch cycle: report drops, track device health, drain the ring
    /// and fill in silence while the device is lost.
    async fn cycle(&mut self) {
        self.report_drops();
        self.check_health();

        while let Some(frame) = self.tap.ring.pop() {
            self.dispatch(frame, false).await;
            if self.device_faulted {
                // Silence only fills periods without real audio
                self.next_silence = Some(Instant::now() + self.frame_period());
            }
        }

        if self.device_faulted {
            self.synthesize_silence().await;
        }
    }

    fn report_drops(&mut self) {
        let total = self.tap.ring.dropped();
        if total > self.reported_drops {
            let dropped = total - self.reported_drops;
            self.reported_drops = total;
            tracing::warn!(dropped, total, "Frame ring overrun, oldest frames dropped");
            self.emit_event(PipelineEvent::FramesDropped { dropped, total });
        }
    }

    fn check_health(&mut self) {
        let captured = self.tap.captured.load(Ordering::Relaxed);
        let mut faulted = self.tap.health.is_faulted();

        // A stream that keeps publishing frames after an error has recovered
        if faulted && self.device_faulted && captured >= self.fault_mark + RECOVERY_FRAMES {
            self.tap.health.clear();
            faulted = false;
        }

        if faulted == self.device_faulted {
            return;
        }
        self.device_faulted = faulted;

        if faulted {
            self.fault_mark = captured;
            let reason = self
                .tap
                .health
                .reason()
                .unwrap_or_else(|| "unknown error".to_string());
            tracing::warn!(device = %self.device.name, %reason, "Device lost, sending silence");
            self.next_silence = Some(Instant::now() + self.frame_period());
            self.emit_event(PipelineEvent::DeviceError {
                device: self.device.id.clone(),
                reason,
            });
        } else {
            tracing::info!(device = %self.device.name, "Device recovered");
            self.next_silence = None;
            self.emit_event(PipelineEvent::DeviceRecovered {
                device: self.device.id.clone(),
            });
        }
    }

    async fn synthesize_silence(&mut self) {
        let period = self.frame_period();
        let now = Instant::now();
        let due = *self.next_silence.get_or_insert(now + period);
        if due > now {
            return;
        }

        let (sequence, timestamp) = self
            .tap
            .next_slot(self.format.frame_length, self.format.sample_rate);
        let frame = AudioFrame::silence(
            self.format.frame_length,
            sequence,
            self.format.sample_rate,
            self.format.channels,
            timestamp,
        );
        self.dispatch(frame, true).await;

        // Don't burst to catch up after a slow cycle
        let next = due + period;
        self.next_silence = Some(if next <= now { now + period } else { next });
    }

    async fn dispatch(&mut self, frame: AudioFrame, silent: bool) {
        if let Some(expected) = self.expected {
            if frame.sequence < expected {
                tracing::trace!(sequence = frame.sequence, expected, "Discarding stale frame");
                return;
            }
            if frame.sequence > expected {
                self.emit_event(PipelineEvent::SequenceGap {
                    expected,
                    received: frame.sequence,
                });
            }
        }
        self.expected = Some(frame.sequence + 1);

        if frame.sample_rate != self.analyzer.sample_rate() {
            self.format.sample_rate = frame.sample_rate;
            self.rebuild();
        }

        let spectrum = self.analyzer.analyze(&frame);
        let loudness = Arc::new(self.meter.measure(&frame));
        *self.stats.latest.lock() = Some(Arc::clone(&loudness));

        let analysis = AnalysisFrame::new(frame, Arc::new(spectrum), loudness, silent);
        self.deliver(&analysis).await;

        let dispatched = self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        if silent {
            self.stats.silent.fetch_add(1, Ordering::Relaxed);
        }
        if dispatched % 50 == 0 {
            tracing::debug!(
                sequence = analysis.sequence(),
                dispatched,
                silent,
                sinks = self.sinks.len(),
                timestamp = ?analysis.timestamp,
                "Dispatched frame"
            );
        }
    }

    async fn deliver(&mut self, frame: &AnalysisFrame) {
        let budget = self.config.sink_timeout;
        let mut faults = Vec::new();

        for (index, worker) in self.sinks.iter().enumerate() {
            if let Err(fault) = worker.call(SinkJob::Frame(frame.clone()), budget).await {
                faults.push((index, fault));
            }
        }

        self.remove_faulted(faults);
    }

    /// Removes faulted sinks. `faults` is in ascending index order.
    fn remove_faulted(&mut self, faults: Vec<(usize, SinkFault)>) {
        for (index, fault) in faults.into_iter().rev() {
            let worker = self.sinks.remove(index);
            self.stats.faulted.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(id = %worker.id(), sink = %worker.name(), %fault, "Sink faulted and removed");
            self.emit_event(PipelineEvent::SinkFaulted {
                id: worker.id(),
                name: worker.name().to_string(),
                fault,
            });
        }
        self.stats.registered.store(self.sinks.len(), Ordering::Relaxed);
    }
}
