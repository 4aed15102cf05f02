//! Replay file source
//!
//! Reads a framed event file from disk and pushes its events, in file order,
//! into a bounded channel. Decode runs on the blocking pool so the reader
//! never stalls the async runtime.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use contracts::{ContractError, StreamEvent};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::frame;

/// Source that replays a recorded event stream from a file.
pub struct ReplaySource {
    path: PathBuf,
}

impl ReplaySource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Start reading and return the event receiver.
    ///
    /// Events arrive in file order. The stream always ends with a
    /// `StreamClose`, appended if the file lacks one, so downstream
    /// consumers can rely on a terminal event. A decode error also
    /// terminates the stream with `StreamClose` after logging.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened.
    pub fn start(self, queue_capacity: usize) -> Result<mpsc::Receiver<StreamEvent>, ContractError> {
        let file = File::open(&self.path)?;
        let (tx, rx) = mpsc::channel(queue_capacity);
        let path = self.path;

        tokio::task::spawn_blocking(move || {
            let mut reader = BufReader::new(file);
            let mut delivered: u64 = 0;
            let mut closed = false;

            loop {
                match frame::read_event(&mut reader) {
                    Ok(Some(event)) => {
                        let terminal = matches!(event, StreamEvent::StreamClose);
                        if tx.blocking_send(event).is_err() {
                            debug!(path = %path.display(), "replay receiver dropped, stopping");
                            return;
                        }
                        delivered += 1;
                        metrics::counter!("slotpipe_replay_events_total").increment(1);
                        if terminal {
                            closed = true;
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "replay decode failed");
                        break;
                    }
                }
            }

            if !closed && tx.blocking_send(StreamEvent::StreamClose).is_ok() {
                delivered += 1;
            }
            info!(path = %path.display(), events = delivered, "replay finished");
        });

        Ok(rx)
    }
}
