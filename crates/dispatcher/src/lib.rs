//! # Dispatcher
//!
//! Phase-barrier event dispatcher.
//!
//! Responsibilities:
//! - Fan bulk snapshot records out across a worker pool (round-robin)
//! - Force strict single-queue ordering for the mutation stream
//! - Separate the snapshot and mutation phases with a rendezvous barrier
//! - Inject a periodic checkpoint flush during the mutation phase
//! - Drain and terminate workers on stream close (bounded, best effort)

pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod rendezvous;
pub mod worker;

pub use contracts::{EventSink, StreamEvent};
pub use dispatcher::{DispatcherConfig, Phase, PhaseDispatcher};
pub use error::DispatchError;
pub use metrics::{WorkerMetrics, WorkerMetricsSnapshot};
pub use rendezvous::Rendezvous;
