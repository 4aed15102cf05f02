//! ShardEventSink - routes stream events into the multiplexer
//!
//! The handler the dispatcher drives on every worker. Snapshot records and
//! keyed mutations write to one shard; keyless mutations and the snapshot
//! header broadcast to all shards; flush ticks checkpoint every sink.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use contracts::{ContractError, EventSink, PhaseMark, StreamEvent};
use tracing::{debug, info, instrument};

use crate::multiplexer::{Route, ShardMultiplexer};

/// Snapshot-file magic written to every shard at snapshot start, so each
/// output file is independently readable by standard tooling.
pub const SNAPSHOT_HEADER: &[u8] = b"REDIS0009";

/// `EventSink` adapter over a [`ShardMultiplexer`].
pub struct ShardEventSink<W: Write> {
    name: String,
    mux: ShardMultiplexer<W>,
    header_written: AtomicBool,
    closed: AtomicBool,
}

impl<W: Write> ShardEventSink<W> {
    pub fn new(name: impl Into<String>, mux: ShardMultiplexer<W>) -> Self {
        Self {
            name: name.into(),
            mux,
            header_written: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// The wrapped multiplexer (for post-run inspection).
    pub fn multiplexer(&self) -> &ShardMultiplexer<W> {
        &self.mux
    }

    fn handle(&self, event: StreamEvent) -> Result<(), ContractError> {
        metrics::counter!("slotpipe_events_total", "kind" => event.kind()).increment(1);
        match event {
            StreamEvent::Phase(PhaseMark::BeginSnapshot) => {
                // The dispatcher broadcasts phase marks to every worker;
                // only the first delivery writes the file magic.
                if self.header_written.swap(true, Ordering::SeqCst) {
                    return Ok(());
                }
                self.mux.write(Route::Broadcast, SNAPSHOT_HEADER)
            }
            StreamEvent::Phase(PhaseMark::BeginMutations) => Ok(()),
            StreamEvent::Phase(PhaseMark::EndSnapshot)
            | StreamEvent::Phase(PhaseMark::EndMutations) => self.mux.flush_all(),
            StreamEvent::Bulk(record) => self.mux.write(Route::Key(&record.key), &record.payload),
            StreamEvent::Mutation(op) => match op.key {
                Some(ref key) => self.mux.write(Route::Key(key), &op.payload),
                None => self.mux.write(Route::Broadcast, &op.payload),
            },
            StreamEvent::SyntheticFlush => {
                debug!(sink = %self.name, "Checkpoint flush");
                self.mux.flush_all()
            }
            StreamEvent::StreamClose => self.close_once(),
        }
    }

    /// Finalize and close all destinations. The dispatcher delivers the
    /// close once, after its worker drain; the guard makes a duplicate
    /// close harmless rather than a double-trailer.
    fn close_once(&self) -> Result<(), ContractError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.mux.finalize()?;
        self.mux.close()?;
        info!(sink = %self.name, destinations = self.mux.destination_count(), "Shard sink closed");
        Ok(())
    }
}

impl<W: Write + Send> EventSink for ShardEventSink<W> {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "shard_sink_on_event", skip(self, event), fields(sink = %self.name, kind = event.kind()))]
    async fn on_event(&self, event: StreamEvent) -> Result<(), ContractError> {
        self.handle(event)
    }
}
