//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Stream Model
//! - A replication stream is a point-in-time snapshot (bulk records, unordered)
//!   followed by an ordered mutation stream
//! - Phase boundaries are explicit events; the dispatcher enforces them

mod config;
mod error;
mod event;
mod sink;
mod topology;

pub use config::*;
pub use error::*;
pub use event::*;
pub use sink::*;
pub use topology::SlotAssignment;
