//! # Shard Sink
//!
//! Per-destination checksum sinks and the shard output multiplexer.
//!
//! Responsibilities:
//! - `ChecksumSink`: append-only writer with a running CRC-64 and the
//!   end-marker + checksum trailer
//! - `ShardMultiplexer`: slot-routed fan-out over the deduplicated set of
//!   destination sinks, keyed or broadcast
//! - `ShardEventSink`: the `EventSink` adapter the dispatcher drives

mod checksum;
mod event_sink;
mod multiplexer;

pub use checksum::{crc64, ChecksumSink, EOF_MARKER};
pub use event_sink::{ShardEventSink, SNAPSHOT_HEADER};
pub use multiplexer::{FileMultiplexer, Route, ShardMultiplexer};
