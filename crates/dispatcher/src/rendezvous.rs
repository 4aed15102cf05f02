//! Reusable rendezvous barrier
//!
//! Separates the snapshot and mutation phases: every worker must reach the
//! rendezvous before any worker proceeds past it. `reset()` re-arms the
//! barrier for a retried snapshot and releases any waiter left over from an
//! aborted cycle; a released waiter simply moves on to its next task, it
//! never surfaces a stream-level failure.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{watch, Barrier};
use tracing::trace;

/// Reusable synchronization point across the worker pool.
pub struct Rendezvous {
    parties: usize,
    barrier: Mutex<Arc<Barrier>>,
    generation: watch::Sender<u64>,
}

impl Rendezvous {
    pub fn new(parties: usize) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            parties,
            barrier: Mutex::new(Arc::new(Barrier::new(parties))),
            generation,
        }
    }

    /// Number of workers that must arrive before the barrier releases.
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Re-arm the barrier and release any stale waiter from a prior cycle.
    pub fn reset(&self) {
        let mut barrier = self
            .barrier
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *barrier = Arc::new(Barrier::new(self.parties));
        drop(barrier);
        self.generation.send_modify(|generation| *generation += 1);
        trace!(parties = self.parties, "Rendezvous reset");
    }

    /// Wait until all parties arrive, or until the barrier is reset.
    ///
    /// A reset while waiting is swallowed: the caller resumes with its next
    /// task rather than propagating an error.
    pub async fn wait(&self) {
        // Subscribe before reading the barrier: a reset landing between the
        // two would otherwise be marked seen while this waiter parks on the
        // swapped-out barrier, and nothing would ever release it.
        let mut generation = self.generation.subscribe();
        let barrier = self
            .barrier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        tokio::select! {
            _ = barrier.wait() => {}
            // Ok: reset while waiting. Err: dispatcher dropped. Both release.
            _ = generation.changed() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_releases_when_all_arrive() {
        let rendezvous = Arc::new(Rendezvous::new(3));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let r = Arc::clone(&rendezvous);
            handles.push(tokio::spawn(async move { r.wait().await }));
        }
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("barrier should release")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_reset_releases_stale_waiter() {
        let rendezvous = Arc::new(Rendezvous::new(2));
        let r = Arc::clone(&rendezvous);
        let stale = tokio::spawn(async move { r.wait().await });

        // Only one of two parties arrived; a reset must free it.
        tokio::time::sleep(Duration::from_millis(20)).await;
        rendezvous.reset();

        tokio::time::timeout(Duration::from_secs(1), stale)
            .await
            .expect("reset should release the stale waiter")
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reset_racing_wait_still_releases() {
        let rendezvous = Arc::new(Rendezvous::new(2));

        // Hold the barrier lock so the waiter stalls right after it
        // subscribed, then apply a full reset (swap + generation bump)
        // before it can read the barrier. The bump lands after the
        // subscription, so the waiter must still observe it.
        let mut guard = rendezvous
            .barrier
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let r = Arc::clone(&rendezvous);
        let waiter = tokio::spawn(async move { r.wait().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        *guard = Arc::new(Barrier::new(2));
        rendezvous
            .generation
            .send_modify(|generation| *generation += 1);
        drop(guard);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("reset issued mid-wait must release the waiter")
            .unwrap();
    }

    #[tokio::test]
    async fn test_rearms_after_reset() {
        let rendezvous = Arc::new(Rendezvous::new(2));
        rendezvous.reset();

        let r1 = Arc::clone(&rendezvous);
        let r2 = Arc::clone(&rendezvous);
        let a = tokio::spawn(async move { r1.wait().await });
        let b = tokio::spawn(async move { r2.wait().await });
        tokio::time::timeout(Duration::from_secs(1), async {
            a.await.unwrap();
            b.await.unwrap();
        })
        .await
        .expect("re-armed barrier should still release");
    }
}
