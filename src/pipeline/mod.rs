//! Audio pipeline components.
//!
//! The pipeline connects the capture device to plugin sinks via a frame ring:
//!
//! ```text
//! Backend Thread → Frame Ring → Distributor Task → Sinks
//!                                 ├ Spectral Analyzer
//!                                 └ Loudness Meter
//! ```
//!
//! - **Capture Engine**: owns the input stream, slices callback buffers into
//!   sequenced frames and switches devices without resetting the sequence
//! - **Frame Ring**: lock-free, drop-oldest queue between the two threads
//! - **Distributor**: analyzes each frame once and fans it out to sinks,
//!   removing any sink that times out, errors or panics
//! - **Sink Workers**: one thread per sink, so a sink that blocks is timed
//!   out instead of stalling the distributor
//!
//! The ring ensures the backend callback never blocks.

mod capture;
mod distributor;
mod ring_buffer;
mod worker;

pub use capture::{CaptureEngine, ErrorReporter, FrameWriter, StreamHealth};
pub(crate) use capture::CaptureTap;
pub(crate) use distributor::{Distributor, DistributorCommand, DistributorStats};
pub use ring_buffer::FrameRing;
