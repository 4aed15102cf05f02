//! # Ingestion
//!
//! Stream sources producing `StreamEvent`s.
//!
//! The live replication client is an external collaborator; this crate
//! provides the file-based replay source used for offline migration and the
//! mock generator used for testing. Both follow a push contract: a source is
//! started once, delivers events in order through a bounded channel, and
//! always terminates the stream with a `StreamClose`, so a client-initiated
//! close reaches the dispatcher as an ordinary terminal event.

pub mod frame;
mod mock;
mod replay;

pub use mock::{MockStreamConfig, MockStreamSource};
pub use replay::ReplaySource;
