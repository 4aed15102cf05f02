//! Worker - one strictly-ordered single-consumer task queue
//!
//! Each worker executes its queued jobs one at a time, in submission order,
//! on its own task. There is no work stealing and no cross-worker
//! reordering; ordering guarantees of the dispatcher reduce to the FIFO
//! property of these queues.

use std::sync::{Arc, Mutex, PoisonError};

use contracts::{EventSink, StreamEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::DispatchError;
use crate::metrics::WorkerMetrics;
use crate::rendezvous::Rendezvous;

/// One unit of work on a worker queue.
pub(crate) enum Job {
    /// Invoke the sink with an event.
    Deliver(StreamEvent),
    /// Block at the phase barrier until every worker arrives.
    Rendezvous(Arc<Rendezvous>),
    /// Exit after every earlier job has been delivered. Never reaches the
    /// sink; the dispatcher delivers the stream close itself once the pool
    /// is drained.
    Stop,
}

/// Handle to one running worker queue.
pub(crate) struct Worker {
    index: usize,
    tx: mpsc::Sender<Job>,
    metrics: Arc<WorkerMetrics>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Spawn the worker task consuming from a bounded FIFO queue.
    pub fn spawn<S>(index: usize, sink: Arc<S>, queue_capacity: usize) -> Self
    where
        S: EventSink + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let metrics = Arc::new(WorkerMetrics::new());
        let worker_metrics = Arc::clone(&metrics);
        let handle = tokio::spawn(async move {
            worker_loop(index, sink, rx, worker_metrics).await;
        });
        Self {
            index,
            tx,
            metrics,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn metrics(&self) -> &Arc<WorkerMetrics> {
        &self.metrics
    }

    /// Clone of the queue sender, for the periodic flush task.
    pub fn sender(&self) -> mpsc::Sender<Job> {
        self.tx.clone()
    }

    /// True when the queue holds no undelivered jobs.
    pub fn is_idle(&self) -> bool {
        self.tx.capacity() == self.tx.max_capacity()
    }

    /// Enqueue a job, applying backpressure when the queue is full.
    pub async fn submit(&self, job: Job) -> Result<(), DispatchError> {
        self.tx
            .send(job)
            .await
            .map_err(|_| DispatchError::WorkerUnavailable { index: self.index })?;
        self.metrics
            .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
        Ok(())
    }

    /// Take the join handle for the shutdown drain.
    pub fn take_handle(&self) -> Option<JoinHandle<()>> {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Worker task: deliver events in order until a stop marker arrives.
async fn worker_loop<S: EventSink + Sync>(
    index: usize,
    sink: Arc<S>,
    mut rx: mpsc::Receiver<Job>,
    metrics: Arc<WorkerMetrics>,
) {
    debug!(worker = index, "Worker started");

    while let Some(job) = rx.recv().await {
        metrics.set_queue_len(rx.len());
        match job {
            Job::Deliver(event) => {
                let kind = event.kind();
                match sink.on_event(event).await {
                    Ok(()) => metrics.inc_delivered_count(),
                    Err(e) => {
                        metrics.inc_failure_count();
                        error!(worker = index, kind, error = %e, "Sink delivery failed");
                        // Continue processing - don't crash on single failure
                    }
                }
            }
            Job::Rendezvous(rendezvous) => {
                rendezvous.wait().await;
                metrics.inc_rendezvous_count();
            }
            Job::Stop => break,
        }
    }

    debug!(worker = index, "Worker stopped");
}
