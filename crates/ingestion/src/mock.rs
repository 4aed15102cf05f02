//! Deterministic mock source for tests and dry runs
//!
//! Synthesizes a well-formed replication stream: one snapshot of `records`
//! bulk records, then `mutations` ordered mutations, then `StreamClose`.
//! Output is fully deterministic so runs can be compared byte for byte.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use bytes::Bytes;
use contracts::{BulkRecord, ContractError, MutationOp, PhaseMark, StreamEvent};
use tokio::sync::mpsc;
use tracing::info;

use crate::frame;

#[derive(Debug, Clone)]
pub struct MockStreamConfig {
    /// Snapshot bulk records to synthesize.
    pub records: usize,
    /// Ordered mutations to synthesize after the snapshot.
    pub mutations: usize,
    /// Every n-th mutation is emitted without a key, exercising the
    /// broadcast path. Zero disables keyless mutations.
    pub keyless_every: usize,
}

impl Default for MockStreamConfig {
    fn default() -> Self {
        Self {
            records: 1000,
            mutations: 100,
            keyless_every: 0,
        }
    }
}

/// Source that produces a synthetic stream per [`MockStreamConfig`].
pub struct MockStreamSource {
    config: MockStreamConfig,
}

impl MockStreamSource {
    pub fn new(config: MockStreamConfig) -> Self {
        Self { config }
    }

    /// The full event sequence this source will deliver.
    pub fn events(&self) -> Vec<StreamEvent> {
        let mut events =
            Vec::with_capacity(self.config.records + self.config.mutations + 5);
        events.push(StreamEvent::Phase(PhaseMark::BeginSnapshot));
        for i in 0..self.config.records {
            events.push(StreamEvent::Bulk(BulkRecord {
                key: Bytes::from(format!("record:{i}")),
                payload: Bytes::from(format!("snapshot-value-{i}")),
            }));
        }
        events.push(StreamEvent::Phase(PhaseMark::EndSnapshot));
        events.push(StreamEvent::Phase(PhaseMark::BeginMutations));
        for i in 0..self.config.mutations {
            let keyless =
                self.config.keyless_every != 0 && i % self.config.keyless_every == 0;
            let key = if keyless {
                None
            } else {
                Some(Bytes::from(format!("record:{i}")))
            };
            events.push(StreamEvent::Mutation(MutationOp {
                key,
                payload: Bytes::from(format!("mutation-{i}")),
            }));
        }
        events.push(StreamEvent::Phase(PhaseMark::EndMutations));
        events.push(StreamEvent::StreamClose);
        events
    }

    /// Start delivering the synthetic stream through a bounded channel.
    pub fn start(self, queue_capacity: usize) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let events = self.events();
        tokio::spawn(async move {
            let total = events.len();
            for event in events {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            info!(events = total, "mock stream finished");
        });
        rx
    }

    /// Record the synthetic stream as a replay file.
    ///
    /// # Errors
    /// IO errors from creating or writing the file.
    pub fn write_replay(&self, path: impl AsRef<Path>) -> Result<(), ContractError> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        for event in self.events() {
            frame::write_event(&mut writer, &event)?;
        }
        writer.flush()?;
        Ok(())
    }
}
