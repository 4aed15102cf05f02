//! Pipeline orchestrator - coordinates all components.
//!
//! Wires the configured stream source into the phase-barrier dispatcher,
//! behind a shard event sink with one checksummed output file per
//! destination node.

use std::time::Instant;

use anyhow::{Context, Result};
use contracts::{RunConfig, StreamEvent};
use dispatcher::{DispatchError, DispatcherConfig, PhaseDispatcher};
use ingestion::{MockStreamConfig, MockStreamSource, ReplaySource};
use observability::RunReport;
use shard_sink::{ChecksumSink, FileMultiplexer, ShardEventSink};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::PipelineStats;

/// Where the event stream comes from
#[derive(Debug, Clone)]
pub enum StreamInput {
    /// Replay a recorded event file
    Replay(PathBuf),
    /// Deterministic synthetic stream
    Mock(MockStreamConfig),
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The loaded run configuration
    pub config: RunConfig,

    /// Event stream source
    pub input: StreamInput,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline to completion
    pub async fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let config = &self.config.config;

        // Initialize Metrics (optional)
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        // Topology -> deduplicated destination sinks
        let assignments = config_loader::topology::parse_file(&config.topology.path)
            .with_context(|| {
                format!(
                    "Failed to parse topology from {}",
                    config.topology.path.display()
                )
            })?;

        std::fs::create_dir_all(&config.output.dir).with_context(|| {
            format!(
                "Failed to create output directory {}",
                config.output.dir.display()
            )
        })?;

        let output_dir = config.output.dir.clone();
        let buffer_size = config.output.buffer_size;
        let mux = FileMultiplexer::from_topology(assignments, |assignment| {
            let path = output_dir.join(format!("{}.rdb", assignment.label));
            ChecksumSink::create(path, buffer_size)
        })
        .context("Failed to construct shard multiplexer")?;

        info!(
            destinations = mux.destination_count(),
            dir = %config.output.dir.display(),
            "Shard outputs opened"
        );

        let sink = Arc::new(ShardEventSink::new("shard_output", mux));
        let dispatcher = PhaseDispatcher::new(
            Arc::clone(&sink),
            DispatcherConfig::from(&config.dispatcher),
        )
        .context("Failed to start dispatcher")?;

        // Start the stream source
        let rx = match &self.config.input {
            StreamInput::Replay(path) => {
                info!(path = %path.display(), "Replaying recorded stream");
                ReplaySource::new(path)
                    .start(config.dispatcher.queue_capacity)
                    .context("Failed to open replay file")?
            }
            StreamInput::Mock(mock_config) => {
                info!(
                    records = mock_config.records,
                    mutations = mock_config.mutations,
                    "Generating synthetic stream"
                );
                MockStreamSource::new(mock_config.clone())
                    .start(config.dispatcher.queue_capacity)
            }
        };

        let report = drive(&dispatcher, rx).await?;

        let worker_metrics = dispatcher.worker_metrics();
        let mut stats = PipelineStats {
            report,
            duration: start_time.elapsed(),
            workers: config.dispatcher.workers,
            worker_metrics,
        };
        stats.report.delivery_failures = stats
            .worker_metrics
            .iter()
            .map(|m| m.failure_count)
            .sum();

        // Collect the final output state after the trailers are written.
        for (label, checksum) in sink.multiplexer().checksums() {
            let path = config.output.dir.join(format!("{}.rdb", label));
            let bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            stats.report.record_destination(label, bytes, checksum);
        }

        Ok(stats)
    }
}

/// Feed the dispatcher until the source ends or a shutdown signal arrives.
///
/// On a signal, a `StreamClose` is dispatched early so every destination
/// still gets its end marker and checksum trailer.
async fn drive<S>(
    dispatcher: &PhaseDispatcher<S>,
    mut rx: mpsc::Receiver<StreamEvent>,
) -> Result<RunReport>
where
    S: contracts::EventSink + Sync + 'static,
{
    let mut report = RunReport::new();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    // Sources guarantee a terminal close; a bare channel
                    // drop means the source task died early.
                    warn!("Stream source ended without a close event");
                    break;
                };
                let kind = event.kind();
                let terminal = matches!(event, StreamEvent::StreamClose);
                dispatcher
                    .dispatch(event)
                    .await
                    .with_context(|| format!("Dispatch failed on {kind} event"))?;
                observability::metrics::record_event_dispatched(kind);
                report.record_event(kind);
                if report.total_events() % 256 == 0 {
                    sample_queues(dispatcher, &mut report);
                }
                if terminal {
                    break;
                }
            }
            _ = &mut shutdown => {
                warn!("Received shutdown signal, closing stream early");
                rx.close();
                match dispatcher.dispatch(StreamEvent::StreamClose).await {
                    Ok(()) => report.record_event("stream_close"),
                    // Already closing: nothing left to drain.
                    Err(DispatchError::PhaseViolation { .. }) => {}
                    Err(e) => return Err(e).context("Close after shutdown signal failed"),
                }
                break;
            }
        }
    }

    Ok(report)
}

fn sample_queues<S>(dispatcher: &PhaseDispatcher<S>, report: &mut RunReport)
where
    S: contracts::EventSink + Sync + 'static,
{
    for (index, metrics) in dispatcher.worker_metrics().iter().enumerate() {
        observability::metrics::record_queue_depth(index, metrics.queue_len);
        report.record_queue_sample(metrics.queue_len);
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
