//! Dedicated threads that run plugin sinks.
//!
//! Each sink lives on its own OS thread and polls its futures there through
//! a handle to the pipeline's runtime. The distributor hands it one job at a
//! time and waits for the reply against the wall clock, so a sink that
//! blocks its thread (CPU work, `std::thread::sleep`, a blocking lock) is
//! timed out just like one that never wakes up.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::mpsc::{sync_channel, RecvTimeoutError, SyncSender};
use std::time::Duration;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::sink::{PluginSink, SinkId};
use crate::source::DeviceDescriptor;
use crate::{AnalysisFrame, SinkError, SinkFault};

/// Work handed to a sink thread.
pub(crate) enum SinkJob {
    Frame(AnalysisFrame),
    DeviceChanged(DeviceDescriptor),
}

type Reply = SyncSender<Result<(), SinkFault>>;

/// Handle to one sink running on its own thread.
///
/// Dropping the handle closes the job queue; the thread then drops the sink
/// and exits once its current call returns.
pub(crate) struct SinkWorker {
    id: SinkId,
    name: String,
    jobs: mpsc::UnboundedSender<(SinkJob, Reply)>,
}

impl SinkWorker {
    /// Moves `sink` onto a new thread. Must be called from within a tokio
    /// runtime.
    pub fn spawn(id: SinkId, mut sink: Box<dyn PluginSink>) -> Result<Self, SinkFault> {
        let name = sink.name().to_string();
        let runtime = Handle::try_current().map_err(|e| SinkFault::Error(e.to_string()))?;
        let (jobs, mut queue) = mpsc::unbounded_channel::<(SinkJob, Reply)>();

        std::thread::Builder::new()
            .name(format!("omega-{id}"))
            .spawn(move || {
                runtime.block_on(async move {
                    while let Some((job, reply)) = queue.recv().await {
                        let result = match job {
                            SinkJob::Frame(frame) => contain(sink.on_frame(&frame)).await,
                            SinkJob::DeviceChanged(device) => {
                                contain(sink.on_device_changed(&device)).await
                            }
                        };
                        let panicked = matches!(result, Err(SinkFault::Panicked(_)));
                        let _ = reply.send(result);
                        if panicked {
                            break;
                        }
                    }
                });
            })
            .map_err(|e| SinkFault::Error(format!("failed to start sink thread: {e}")))?;

        Ok(Self { id, name, jobs })
    }

    pub fn id(&self) -> SinkId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs one job on the sink's thread and waits at most `budget` for it.
    ///
    /// The wait happens on the blocking pool, so the distributor task never
    /// blocks a runtime thread. A sink that overstays is left running; its
    /// result is discarded.
    pub async fn call(&self, job: SinkJob, budget: Duration) -> Result<(), SinkFault> {
        let (reply, response) = sync_channel(1);
        if self.jobs.send((job, reply)).is_err() {
            return Err(SinkFault::Error("sink thread exited".to_string()));
        }

        match tokio::task::spawn_blocking(move || response.recv_timeout(budget)).await {
            Ok(Ok(result)) => result,
            Ok(Err(RecvTimeoutError::Timeout)) => Err(SinkFault::Timeout { budget }),
            Ok(Err(RecvTimeoutError::Disconnected)) => {
                Err(SinkFault::Error("sink thread exited".to_string()))
            }
            Err(e) => Err(SinkFault::Error(e.to_string())),
        }
    }
}

/// Polls one sink call, turning errors and panics into a [`SinkFault`].
async fn contain<F>(call: F) -> Result<(), SinkFault>
where
    F: std::future::Future<Output = Result<(), SinkError>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SinkFault::Error(e.to_string())),
        Err(payload) => Err(SinkFault::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
