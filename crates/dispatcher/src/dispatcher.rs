//! PhaseDispatcher - main classification and fan-out logic
//!
//! The producer (upstream replication client) calls `dispatch` once per
//! event. Bulk snapshot records fan out round-robin across the pool;
//! mutations go exclusively to worker 0; phase boundaries broadcast to every
//! worker, with a rendezvous after `EndSnapshot` so no mutation is processed
//! before every in-flight bulk write has committed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::{DispatcherSettings, EventSink, PhaseMark, StreamEvent};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::error::DispatchError;
use crate::metrics::WorkerMetricsSnapshot;
use crate::rendezvous::Rendezvous;
use crate::worker::{Job, Worker};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Worker pool size; power of two, 0 selects synchronous mode
    pub workers: usize,
    /// Per-worker queue capacity
    pub queue_capacity: usize,
    /// Mutation-phase checkpoint interval
    pub flush_interval: Duration,
    /// Bounded wait per worker queue at shutdown
    pub drain_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            flush_interval: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&DispatcherSettings> for DispatcherConfig {
    fn from(settings: &DispatcherSettings) -> Self {
        Self {
            workers: settings.workers,
            queue_capacity: settings.queue_capacity,
            flush_interval: Duration::from_secs(settings.flush_interval_secs),
            drain_timeout: Duration::from_millis(settings.drain_timeout_ms),
        }
    }
}

/// Stream lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Snapshot,
    BarrierWait,
    Mutations,
    Closing,
    Closed,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Snapshot => "snapshot",
            Phase::BarrierWait => "barrier_wait",
            Phase::Mutations => "mutations",
            Phase::Closing => "closing",
            Phase::Closed => "closed",
        }
    }
}

struct Pool {
    workers: Vec<Worker>,
    rendezvous: Arc<Rendezvous>,
    counter: AtomicU64,
    mask: usize,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

/// Phase-barrier event dispatcher over a fixed worker pool.
pub struct PhaseDispatcher<S: EventSink + Sync + 'static> {
    sink: Arc<S>,
    config: DispatcherConfig,
    phase: Mutex<Phase>,
    pool: Option<Pool>,
}

impl<S: EventSink + Sync + 'static> PhaseDispatcher<S> {
    /// Create the dispatcher and spawn the worker pool.
    ///
    /// # Errors
    /// `PoolSize` when `config.workers` is neither zero nor a power of two.
    /// Fatal; abort startup.
    #[instrument(name = "dispatcher_new", skip(sink, config), fields(workers = config.workers))]
    pub fn new(sink: Arc<S>, config: DispatcherConfig) -> Result<Self, DispatchError> {
        let pool = if config.workers == 0 {
            info!("Dispatcher in synchronous mode");
            None
        } else {
            if !config.workers.is_power_of_two() {
                return Err(DispatchError::PoolSize {
                    workers: config.workers,
                });
            }
            let workers = (0..config.workers)
                .map(|index| Worker::spawn(index, Arc::clone(&sink), config.queue_capacity))
                .collect::<Vec<_>>();
            info!(workers = workers.len(), "Dispatcher worker pool started");
            Some(Pool {
                rendezvous: Arc::new(Rendezvous::new(workers.len())),
                mask: workers.len() - 1,
                counter: AtomicU64::new(0),
                flush_task: Mutex::new(None),
                workers,
            })
        };
        Ok(Self {
            sink,
            config,
            phase: Mutex::new(Phase::Idle),
            pool,
        })
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        *self.lock_phase()
    }

    /// Per-worker metrics snapshots, indexed by worker.
    pub fn worker_metrics(&self) -> Vec<WorkerMetricsSnapshot> {
        match &self.pool {
            Some(pool) => pool.workers.iter().map(|w| w.metrics().snapshot()).collect(),
            None => Vec::new(),
        }
    }

    /// Classify and route one stream event.
    ///
    /// Never blocks on worker completion; the only backpressure is a full
    /// worker queue.
    pub async fn dispatch(&self, event: StreamEvent) -> Result<(), DispatchError> {
        let Some(pool) = &self.pool else {
            return self.dispatch_sync(event).await;
        };

        match event {
            StreamEvent::Phase(mark) => self.dispatch_phase(pool, mark).await,
            event @ StreamEvent::Bulk(_) => {
                self.ensure_phase(Phase::Snapshot, event.kind())?;
                let index = pool.counter.fetch_add(1, Ordering::Relaxed) as usize & pool.mask;
                pool.workers[index].submit(Job::Deliver(event)).await
            }
            event @ StreamEvent::Mutation(_) => {
                self.ensure_phase(Phase::Mutations, event.kind())?;
                pool.workers[0].submit(Job::Deliver(event)).await
            }
            StreamEvent::SyntheticFlush => {
                pool.workers[0]
                    .submit(Job::Deliver(StreamEvent::SyntheticFlush))
                    .await
            }
            StreamEvent::StreamClose => self.shutdown(pool).await,
        }
    }

    async fn dispatch_phase(&self, pool: &Pool, mark: PhaseMark) -> Result<(), DispatchError> {
        match mark {
            PhaseMark::BeginSnapshot => {
                self.begin_snapshot_transition(Some(pool))?;
                // A retried snapshot must not inherit a stale rendezvous
                // count or a running checkpoint timer.
                self.stop_flush_task(pool);
                pool.rendezvous.reset();
                self.broadcast(pool, mark).await
            }
            PhaseMark::EndSnapshot => {
                self.advance(Phase::Snapshot, Phase::BarrierWait, "end_snapshot")?;
                self.broadcast(pool, mark).await?;
                // Every worker parks at the rendezvous behind its queued
                // bulk writes: all of them are committed before release.
                for worker in &pool.workers {
                    worker
                        .submit(Job::Rendezvous(Arc::clone(&pool.rendezvous)))
                        .await?;
                }
                Ok(())
            }
            PhaseMark::BeginMutations => {
                self.advance(Phase::BarrierWait, Phase::Mutations, "begin_mutations")?;
                self.broadcast(pool, mark).await?;
                self.start_flush_task(pool);
                Ok(())
            }
            PhaseMark::EndMutations => {
                self.ensure_phase(Phase::Mutations, "end_mutations")?;
                self.broadcast(pool, mark).await
            }
        }
    }

    /// Degenerate mode: invoke the sink synchronously on the caller.
    /// Observably a pool of size 1 with no barrier overhead.
    async fn dispatch_sync(&self, event: StreamEvent) -> Result<(), DispatchError> {
        match &event {
            StreamEvent::Phase(PhaseMark::BeginSnapshot) => {
                self.begin_snapshot_transition(None)?
            }
            StreamEvent::Phase(PhaseMark::EndSnapshot) => {
                self.advance(Phase::Snapshot, Phase::BarrierWait, "end_snapshot")?
            }
            StreamEvent::Phase(PhaseMark::BeginMutations) => {
                self.advance(Phase::BarrierWait, Phase::Mutations, "begin_mutations")?
            }
            StreamEvent::Phase(PhaseMark::EndMutations) => {
                self.ensure_phase(Phase::Mutations, "end_mutations")?
            }
            StreamEvent::Bulk(_) => self.ensure_phase(Phase::Snapshot, event.kind())?,
            StreamEvent::Mutation(_) => self.ensure_phase(Phase::Mutations, event.kind())?,
            StreamEvent::SyntheticFlush => {}
            StreamEvent::StreamClose => {
                let mut phase = self.lock_phase();
                if matches!(*phase, Phase::Closing | Phase::Closed) {
                    return Err(DispatchError::phase_violation(phase.name(), "stream_close"));
                }
                *phase = Phase::Closing;
            }
        }

        let closing = matches!(event, StreamEvent::StreamClose);
        if let Err(e) = self.sink.on_event(event).await {
            // Same policy as the worker loop: log and keep going.
            error!(error = %e, "Sink delivery failed");
        }
        if closing {
            *self.lock_phase() = Phase::Closed;
        }
        Ok(())
    }

    /// Stop every worker and drain each queue with a bounded wait, then
    /// deliver the stream close to the sink. The close must not run before
    /// the drain: it writes the output trailers, and a trailer ahead of a
    /// still-queued write would corrupt the file. An expired wait aborts
    /// the worker; the drain is best effort.
    #[instrument(name = "dispatcher_shutdown", skip(self, pool))]
    async fn shutdown(&self, pool: &Pool) -> Result<(), DispatchError> {
        {
            let mut phase = self.lock_phase();
            if matches!(*phase, Phase::Closing | Phase::Closed) {
                return Err(DispatchError::phase_violation(phase.name(), "stream_close"));
            }
            *phase = Phase::Closing;
        }
        self.stop_flush_task(pool);

        for worker in &pool.workers {
            // A worker that already stopped cannot corrupt the drain.
            let _ = worker.submit(Job::Stop).await;
        }
        for worker in &pool.workers {
            let Some(mut handle) = worker.take_handle() else {
                continue;
            };
            match tokio::time::timeout(self.config.drain_timeout, &mut handle).await {
                Ok(Ok(())) => debug!(worker = worker.index(), "Worker drained"),
                Ok(Err(e)) => error!(worker = worker.index(), error = ?e, "Worker task panicked"),
                Err(_) => {
                    warn!(worker = worker.index(), "Drain timeout expired, terminating");
                    handle.abort();
                }
            }
        }

        if let Err(e) = self.sink.on_event(StreamEvent::StreamClose).await {
            error!(error = %e, "Sink close failed");
        }
        *self.lock_phase() = Phase::Closed;
        info!("Dispatcher closed");
        Ok(())
    }

    async fn broadcast(&self, pool: &Pool, mark: PhaseMark) -> Result<(), DispatchError> {
        for worker in &pool.workers {
            worker
                .submit(Job::Deliver(StreamEvent::Phase(mark)))
                .await?;
        }
        Ok(())
    }

    /// `BeginSnapshot` transition: fresh cycles and snapshot retries are
    /// accepted; a retry while mutation-phase workers still hold undelivered
    /// work is rejected fail-fast rather than guessing its semantics.
    fn begin_snapshot_transition(&self, pool: Option<&Pool>) -> Result<(), DispatchError> {
        let mut phase = self.lock_phase();
        let accepted = match *phase {
            Phase::Idle | Phase::Snapshot | Phase::BarrierWait => true,
            Phase::Mutations => match pool {
                Some(pool) => pool.workers.iter().all(Worker::is_idle),
                None => true,
            },
            Phase::Closing | Phase::Closed => false,
        };
        if !accepted {
            return Err(DispatchError::phase_violation(
                phase.name(),
                "begin_snapshot",
            ));
        }
        *phase = Phase::Snapshot;
        Ok(())
    }

    fn ensure_phase(&self, expected: Phase, event: &'static str) -> Result<(), DispatchError> {
        let phase = self.lock_phase();
        if *phase != expected {
            return Err(DispatchError::phase_violation(phase.name(), event));
        }
        Ok(())
    }

    fn advance(&self, from: Phase, to: Phase, event: &'static str) -> Result<(), DispatchError> {
        let mut phase = self.lock_phase();
        if *phase != from {
            return Err(DispatchError::phase_violation(phase.name(), event));
        }
        *phase = to;
        Ok(())
    }

    /// Schedule the periodic checkpoint on worker 0 so it interleaves with
    /// real mutations in submission order.
    fn start_flush_task(&self, pool: &Pool) {
        let tx = pool.workers[0].sender();
        let interval = self.config.flush_interval;
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                ticker.tick().await;
                if tx
                    .send(Job::Deliver(StreamEvent::SyntheticFlush))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });
        if let Some(previous) = lock(&pool.flush_task).replace(handle) {
            previous.abort();
        }
    }

    fn stop_flush_task(&self, pool: &Pool) {
        if let Some(task) = lock(&pool.flush_task).take() {
            task.abort();
        }
    }

    fn lock_phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::{BulkRecord, ContractError, MutationOp};
    use std::sync::Mutex as StdMutex;
    use tokio::time::{sleep, Duration};

    /// Records the order in which events reach the sink.
    #[derive(Default)]
    struct RecordingSink {
        seen: StdMutex<Vec<String>>,
        mutation_delay: Option<Duration>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn on_event(&self, event: StreamEvent) -> Result<(), ContractError> {
            if let (StreamEvent::Mutation(_), Some(delay)) = (&event, self.mutation_delay) {
                sleep(delay).await;
            }
            let label = match &event {
                StreamEvent::Bulk(r) => {
                    format!("bulk:{}", String::from_utf8_lossy(&r.key))
                }
                StreamEvent::Mutation(m) => {
                    format!("mutation:{}", String::from_utf8_lossy(&m.payload))
                }
                other => other.kind().to_string(),
            };
            self.seen.lock().unwrap().push(label);
            Ok(())
        }
    }

    fn bulk(key: &str) -> StreamEvent {
        StreamEvent::Bulk(BulkRecord {
            key: Bytes::copy_from_slice(key.as_bytes()),
            payload: Bytes::from_static(b"v"),
        })
    }

    fn mutation(payload: &str) -> StreamEvent {
        StreamEvent::Mutation(MutationOp {
            key: None,
            payload: Bytes::copy_from_slice(payload.as_bytes()),
        })
    }

    fn config(workers: usize) -> DispatcherConfig {
        DispatcherConfig {
            workers,
            queue_capacity: 64,
            flush_interval: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_pool_size_must_be_power_of_two() {
        let sink = Arc::new(RecordingSink::default());
        assert!(matches!(
            PhaseDispatcher::new(Arc::clone(&sink), config(3)),
            Err(DispatchError::PoolSize { workers: 3 })
        ));
        assert!(PhaseDispatcher::new(Arc::clone(&sink), config(4)).is_ok());
        assert!(PhaseDispatcher::new(sink, config(0)).is_ok());
    }

    #[tokio::test]
    async fn test_phase_ordering_bulk_before_mutations() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = PhaseDispatcher::new(Arc::clone(&sink), config(4)).unwrap();

        dispatcher
            .dispatch(StreamEvent::Phase(PhaseMark::BeginSnapshot))
            .await
            .unwrap();
        for i in 0..32 {
            dispatcher.dispatch(bulk(&format!("k{i}"))).await.unwrap();
        }
        dispatcher
            .dispatch(StreamEvent::Phase(PhaseMark::EndSnapshot))
            .await
            .unwrap();
        dispatcher
            .dispatch(StreamEvent::Phase(PhaseMark::BeginMutations))
            .await
            .unwrap();
        for i in 0..8 {
            dispatcher.dispatch(mutation(&format!("m{i}"))).await.unwrap();
        }
        dispatcher.dispatch(StreamEvent::StreamClose).await.unwrap();
        assert_eq!(dispatcher.phase(), Phase::Closed);

        let events = sink.events();
        let first_mutation = events
            .iter()
            .position(|e| e.starts_with("mutation:"))
            .expect("mutations recorded");
        let last_bulk = events
            .iter()
            .rposition(|e| e.starts_with("bulk:"))
            .expect("bulk records recorded");
        // Barrier: every bulk write committed before the first mutation.
        assert!(last_bulk < first_mutation);
        assert_eq!(
            events.iter().filter(|e| e.starts_with("bulk:")).count(),
            32
        );
        // Mutations preserve arrival order exactly.
        let mutations: Vec<_> = events
            .iter()
            .filter(|e| e.starts_with("mutation:"))
            .cloned()
            .collect();
        let expected: Vec<_> = (0..8).map(|i| format!("mutation:m{i}")).collect();
        assert_eq!(mutations, expected);
    }

    #[tokio::test]
    async fn test_bulk_rejected_outside_snapshot_phase() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = PhaseDispatcher::new(sink, config(2)).unwrap();
        assert!(matches!(
            dispatcher.dispatch(bulk("k")).await.unwrap_err(),
            DispatchError::PhaseViolation { .. }
        ));
    }

    #[tokio::test]
    async fn test_snapshot_retry_rearms_barrier() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = PhaseDispatcher::new(Arc::clone(&sink), config(2)).unwrap();

        for _ in 0..2 {
            dispatcher
                .dispatch(StreamEvent::Phase(PhaseMark::BeginSnapshot))
                .await
                .unwrap();
            dispatcher.dispatch(bulk("k")).await.unwrap();
            dispatcher
                .dispatch(StreamEvent::Phase(PhaseMark::EndSnapshot))
                .await
                .unwrap();
            dispatcher
                .dispatch(StreamEvent::Phase(PhaseMark::BeginMutations))
                .await
                .unwrap();
            // Let the cycle quiesce before retrying the snapshot.
            sleep(Duration::from_millis(50)).await;
        }
        tokio::time::timeout(
            Duration::from_secs(2),
            dispatcher.dispatch(StreamEvent::StreamClose),
        )
        .await
        .expect("no deadlock from a stale rendezvous")
        .unwrap();

        for snapshot in dispatcher.worker_metrics() {
            assert_eq!(snapshot.rendezvous_count, 2);
        }
    }

    #[tokio::test]
    async fn test_snapshot_retry_rejected_with_pending_mutations() {
        let sink = Arc::new(RecordingSink {
            seen: StdMutex::new(Vec::new()),
            mutation_delay: Some(Duration::from_millis(300)),
        });
        let dispatcher = PhaseDispatcher::new(sink, config(2)).unwrap();

        dispatcher
            .dispatch(StreamEvent::Phase(PhaseMark::BeginSnapshot))
            .await
            .unwrap();
        dispatcher
            .dispatch(StreamEvent::Phase(PhaseMark::EndSnapshot))
            .await
            .unwrap();
        dispatcher
            .dispatch(StreamEvent::Phase(PhaseMark::BeginMutations))
            .await
            .unwrap();
        // Worker 0 is stalled on the first mutation; the rest stay queued.
        for i in 0..4 {
            dispatcher.dispatch(mutation(&format!("m{i}"))).await.unwrap();
        }
        assert!(matches!(
            dispatcher
                .dispatch(StreamEvent::Phase(PhaseMark::BeginSnapshot))
                .await
                .unwrap_err(),
            DispatchError::PhaseViolation { .. }
        ));
        dispatcher.dispatch(StreamEvent::StreamClose).await.unwrap();
    }

    #[tokio::test]
    async fn test_periodic_flush_during_quiet_mutation_phase() {
        let sink = Arc::new(RecordingSink::default());
        let mut cfg = config(2);
        cfg.flush_interval = Duration::from_millis(30);
        let dispatcher = PhaseDispatcher::new(Arc::clone(&sink), cfg).unwrap();

        dispatcher
            .dispatch(StreamEvent::Phase(PhaseMark::BeginSnapshot))
            .await
            .unwrap();
        dispatcher
            .dispatch(StreamEvent::Phase(PhaseMark::EndSnapshot))
            .await
            .unwrap();
        dispatcher
            .dispatch(StreamEvent::Phase(PhaseMark::BeginMutations))
            .await
            .unwrap();
        // No mutation traffic at all; checkpoints must still arrive.
        sleep(Duration::from_millis(160)).await;
        dispatcher.dispatch(StreamEvent::StreamClose).await.unwrap();

        let flushes = sink
            .events()
            .iter()
            .filter(|e| *e == "synthetic_flush")
            .count();
        assert!(flushes >= 2, "expected >= 2 flushes, saw {flushes}");
    }

    #[tokio::test]
    async fn test_degenerate_mode_is_synchronous() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = PhaseDispatcher::new(Arc::clone(&sink), config(0)).unwrap();

        dispatcher
            .dispatch(StreamEvent::Phase(PhaseMark::BeginSnapshot))
            .await
            .unwrap();
        dispatcher.dispatch(bulk("k1")).await.unwrap();
        // Synchronous: already observable, no drain needed.
        assert_eq!(sink.events(), vec!["begin_snapshot", "bulk:k1"]);

        dispatcher
            .dispatch(StreamEvent::Phase(PhaseMark::EndSnapshot))
            .await
            .unwrap();
        dispatcher
            .dispatch(StreamEvent::Phase(PhaseMark::BeginMutations))
            .await
            .unwrap();
        dispatcher.dispatch(mutation("m1")).await.unwrap();
        dispatcher.dispatch(StreamEvent::StreamClose).await.unwrap();
        assert_eq!(dispatcher.phase(), Phase::Closed);
    }

    #[tokio::test]
    async fn test_close_reaches_sink_after_queued_writes() {
        // Worker 0 is slow: mutations are still queued when the close
        // arrives, so the close must wait for the drain.
        let sink = Arc::new(RecordingSink {
            seen: StdMutex::new(Vec::new()),
            mutation_delay: Some(Duration::from_millis(50)),
        });
        let dispatcher = PhaseDispatcher::new(Arc::clone(&sink), config(4)).unwrap();

        dispatcher
            .dispatch(StreamEvent::Phase(PhaseMark::BeginSnapshot))
            .await
            .unwrap();
        for i in 0..8 {
            dispatcher.dispatch(bulk(&format!("k{i}"))).await.unwrap();
        }
        dispatcher
            .dispatch(StreamEvent::Phase(PhaseMark::EndSnapshot))
            .await
            .unwrap();
        dispatcher
            .dispatch(StreamEvent::Phase(PhaseMark::BeginMutations))
            .await
            .unwrap();
        for i in 0..3 {
            dispatcher.dispatch(mutation(&format!("m{i}"))).await.unwrap();
        }
        dispatcher.dispatch(StreamEvent::StreamClose).await.unwrap();

        let events = sink.events();
        assert_eq!(events.last().map(String::as_str), Some("stream_close"));
        assert_eq!(
            events.iter().filter(|e| *e == "stream_close").count(),
            1,
            "close delivered exactly once"
        );
        assert_eq!(
            events.iter().filter(|e| e.starts_with("mutation:")).count(),
            3,
            "no queued mutation lost to the close"
        );
    }

    #[tokio::test]
    async fn test_double_close_rejected() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = PhaseDispatcher::new(sink, config(2)).unwrap();
        dispatcher.dispatch(StreamEvent::StreamClose).await.unwrap();
        assert!(dispatcher
            .dispatch(StreamEvent::StreamClose)
            .await
            .is_err());
    }
}
