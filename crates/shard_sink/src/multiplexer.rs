//! Shard output multiplexer
//!
//! Owns one checksum sink per distinct destination node and routes each
//! write either to the sink owning the key's slot or to every distinct sink
//! (broadcast). The slot table is immutable after construction; per-sink
//! mutexes serialize the concurrent writers that slot aliasing allows.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

use contracts::{ContractError, SlotAssignment};
use routing::{slot, SlotMap, SlotMapBuilder};
use tracing::{debug, instrument};

use crate::checksum::ChecksumSink;

/// Write-target selection, passed explicitly with every call.
#[derive(Debug, Clone, Copy)]
pub enum Route<'a> {
    /// Route to the single sink owning `slot(key)`.
    Key(&'a [u8]),
    /// Route to every distinct sink, each exactly once.
    Broadcast,
}

struct Destination<W: Write> {
    label: String,
    sink: Mutex<ChecksumSink<W>>,
}

/// Slot-routed fan-out over the deduplicated destination sinks.
pub struct ShardMultiplexer<W: Write> {
    destinations: Vec<Destination<W>>,
    map: SlotMap<usize>,
}

/// The file-backed multiplexer used in production.
pub type FileMultiplexer = ShardMultiplexer<BufWriter<File>>;

impl<W: Write> ShardMultiplexer<W> {
    /// Build the slot table and the deduplicated sink set from topology
    /// assignments. The factory is called once per distinct `node_id`.
    ///
    /// # Errors
    /// `SlotCoverage` / `DuplicateSlot` unless the assignments cover exactly
    /// 16384 slots. Fatal; a topology-description error is never retried.
    #[instrument(name = "multiplexer_from_topology", skip_all)]
    pub fn from_topology<I, F>(assignments: I, mut factory: F) -> Result<Self, ContractError>
    where
        I: IntoIterator<Item = SlotAssignment>,
        F: FnMut(&SlotAssignment) -> std::io::Result<ChecksumSink<W>>,
    {
        let mut builder = SlotMapBuilder::new();
        let mut index_by_node: HashMap<String, usize> = HashMap::new();
        let mut destinations = Vec::new();

        for assignment in assignments {
            let index = match index_by_node.get(&assignment.node_id) {
                Some(&index) => index,
                None => {
                    let sink = factory(&assignment)?;
                    destinations.push(Destination {
                        label: assignment.label.clone(),
                        sink: Mutex::new(sink),
                    });
                    let index = destinations.len() - 1;
                    index_by_node.insert(assignment.node_id.clone(), index);
                    index
                }
            };
            builder.assign(assignment.slot, index)?;
        }

        let map = builder.finish()?;
        debug!(destinations = destinations.len(), "Multiplexer constructed");
        Ok(Self { destinations, map })
    }

    /// Number of distinct destination sinks.
    pub fn destination_count(&self) -> usize {
        self.destinations.len()
    }

    /// Destination labels, in construction order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.destinations.iter().map(|d| d.label.as_str())
    }

    /// Per-destination `(label, cumulative checksum)` pairs.
    pub fn checksums(&self) -> Vec<(String, u64)> {
        self.destinations
            .iter()
            .map(|d| (d.label.clone(), lock(&d.sink).crc()))
            .collect()
    }

    /// Write bytes to the destination(s) selected by `route`.
    pub fn write(&self, route: Route<'_>, bytes: &[u8]) -> Result<(), ContractError> {
        match route {
            Route::Key(key) => {
                let destination = self.destination_for(key);
                lock(&destination.sink)
                    .write_all(bytes)
                    .map_err(|e| ContractError::sink_write(&destination.label, e.to_string()))?;
                metrics::counter!("slotpipe_bytes_routed_total", "node" => destination.label.clone())
                    .increment(bytes.len() as u64);
            }
            Route::Broadcast => {
                for destination in &self.destinations {
                    lock(&destination.sink)
                        .write_all(bytes)
                        .map_err(|e| ContractError::sink_write(&destination.label, e.to_string()))?;
                    metrics::counter!("slotpipe_bytes_routed_total", "node" => destination.label.clone())
                        .increment(bytes.len() as u64);
                }
            }
        }
        Ok(())
    }

    /// Flush the destination(s) selected by `route`.
    pub fn flush(&self, route: Route<'_>) -> Result<(), ContractError> {
        match route {
            Route::Key(key) => {
                let destination = self.destination_for(key);
                lock(&destination.sink)
                    .flush()
                    .map_err(|e| ContractError::sink_write(&destination.label, e.to_string()))?;
            }
            Route::Broadcast => self.flush_all()?,
        }
        Ok(())
    }

    /// Flush every distinct destination sink.
    pub fn flush_all(&self) -> Result<(), ContractError> {
        for destination in &self.destinations {
            lock(&destination.sink)
                .flush()
                .map_err(|e| ContractError::sink_write(&destination.label, e.to_string()))?;
        }
        Ok(())
    }

    /// Append the end-marker + checksum trailer to every distinct sink.
    ///
    /// Must follow all data writes. Safe to call again; the per-sink guard
    /// makes a second trailer impossible.
    #[instrument(name = "multiplexer_finalize", skip(self))]
    pub fn finalize(&self) -> Result<(), ContractError> {
        for destination in &self.destinations {
            let mut sink = lock(&destination.sink);
            sink.finalize()
                .map_err(|e| ContractError::sink_write(&destination.label, e.to_string()))?;
            debug!(node = %destination.label, crc = format_args!("{:016x}", sink.crc()), "Destination finalized");
        }
        Ok(())
    }

    /// Flush and release every distinct sink, regardless of routing mode.
    pub fn close(&self) -> Result<(), ContractError> {
        self.flush_all()
    }

    fn destination_for(&self, key: &[u8]) -> &Destination<W> {
        // Full coverage is a construction invariant; the lookup cannot miss.
        &self.destinations[*self.map.get(slot(key))]
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
