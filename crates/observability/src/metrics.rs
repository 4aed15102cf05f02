//! Run metrics
//!
//! Recorder helpers for the Prometheus backend plus an in-memory [`RunReport`]
//! aggregator for the end-of-run summary.

use std::collections::HashMap;

use metrics::{counter, gauge, histogram};

/// Record one event leaving the dispatcher toward a worker queue.
pub fn record_event_dispatched(kind: &'static str) {
    counter!("slotpipe_dispatched_total", "kind" => kind).increment(1);
}

/// Record the instantaneous depth of a worker queue.
pub fn record_queue_depth(worker: usize, depth: usize) {
    gauge!("slotpipe_queue_depth", "worker" => worker.to_string()).set(depth as f64);
    histogram!("slotpipe_queue_depth_hist", "worker" => worker.to_string()).record(depth as f64);
}

/// In-memory aggregate of one resharding run, printed when the run ends.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Events seen, keyed by event kind label.
    pub event_counts: HashMap<&'static str, u64>,

    /// Sink delivery failures observed across all workers.
    pub delivery_failures: u64,

    /// Worker queue depth samples.
    pub queue_stats: RunningStats,

    /// Final per-destination output: (label, bytes written, CRC-64).
    pub destinations: Vec<DestinationSummary>,
}

/// Final state of one shard output file.
#[derive(Debug, Clone)]
pub struct DestinationSummary {
    pub label: String,
    pub bytes: u64,
    pub checksum: u64,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one consumed event.
    pub fn record_event(&mut self, kind: &'static str) {
        *self.event_counts.entry(kind).or_insert(0) += 1;
    }

    pub fn record_queue_sample(&mut self, depth: usize) {
        self.queue_stats.push(depth as f64);
    }

    pub fn record_destination(&mut self, label: impl Into<String>, bytes: u64, checksum: u64) {
        self.destinations.push(DestinationSummary {
            label: label.into(),
            bytes,
            checksum,
        });
    }

    /// Total events of every kind.
    pub fn total_events(&self) -> u64 {
        self.event_counts.values().sum()
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Run Summary ===")?;
        writeln!(f, "Total events: {}", self.total_events())?;

        let mut kinds: Vec<_> = self.event_counts.iter().collect();
        kinds.sort_by_key(|(kind, _)| **kind);
        for (kind, count) in kinds {
            writeln!(f, "  {}: {}", kind, count)?;
        }

        writeln!(f, "Delivery failures: {}", self.delivery_failures)?;
        if self.queue_stats.count() > 0 {
            writeln!(f, "Queue depth: {}", StatsSummary::from(&self.queue_stats))?;
        }

        if !self.destinations.is_empty() {
            writeln!(f, "Destinations:")?;
            for dest in &self.destinations {
                writeln!(
                    f,
                    "  {}: {} bytes, crc64=0x{:016x}",
                    dest.label, dest.bytes, dest.checksum
                )?;
            }
        }

        Ok(())
    }
}

/// Summary of a [`RunningStats`] series.
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count(),
            min: stats.min(),
            max: stats.max(),
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm).
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();

        stats.push(1.0);
        stats.push(2.0);
        stats.push(3.0);
        stats.push(4.0);
        stats.push(5.0);

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_report_counts_events() {
        let mut report = RunReport::new();
        report.record_event("bulk");
        report.record_event("bulk");
        report.record_event("mutation");

        assert_eq!(report.total_events(), 3);
        assert_eq!(report.event_counts.get("bulk"), Some(&2));
    }

    #[test]
    fn test_report_display() {
        let mut report = RunReport::new();
        report.record_event("bulk");
        report.record_destination("n1", 42, 0xDEAD_BEEF);

        let output = format!("{}", report);
        assert!(output.contains("Total events: 1"));
        assert!(output.contains("n1: 42 bytes"));
        assert!(output.contains("crc64=0x00000000deadbeef"));
    }
}
