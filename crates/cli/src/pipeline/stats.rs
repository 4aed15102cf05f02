//! Pipeline statistics and metrics.

use std::time::Duration;

use dispatcher::WorkerMetricsSnapshot;
use observability::RunReport;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Per-kind event counts and per-destination output summary
    pub report: RunReport,

    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Worker pool size the run used (0 = synchronous mode)
    pub workers: usize,

    /// Final per-worker delivery counters
    pub worker_metrics: Vec<WorkerMetricsSnapshot>,
}

impl PipelineStats {
    /// Event throughput over the whole run
    pub fn events_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.report.total_events() as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n{}", self.report);
        println!("Duration: {:.2}s", self.duration.as_secs_f64());
        println!("Throughput: {:.0} events/s", self.events_per_sec());

        if self.workers == 0 {
            println!("Workers: synchronous mode");
        } else {
            println!("Workers: {}", self.workers);
            for (index, metrics) in self.worker_metrics.iter().enumerate() {
                println!(
                    "  worker {}: delivered={} failures={}",
                    index, metrics.delivered_count, metrics.failure_count
                );
            }
        }
        println!();
    }
}
