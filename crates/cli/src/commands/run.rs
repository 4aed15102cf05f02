//! `run` command implementation.

use anyhow::{Context, Result};
use ingestion::MockStreamConfig;
use tracing::info;

use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig, StreamInput};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    // Validate config path
    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    // Load and parse configuration
    let mut config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Apply CLI overrides
    if let Some(workers) = args.workers {
        info!(workers, "Overriding worker pool size from CLI");
        config.dispatcher.workers = workers;
    }
    if let Some(ref dir) = args.output_dir {
        info!(dir = %dir.display(), "Overriding output directory from CLI");
        config.output.dir = dir.clone();
    }

    info!(
        workers = config.dispatcher.workers,
        output_dir = %config.output.dir.display(),
        topology = %config.topology.path.display(),
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    let input = match &args.input {
        Some(path) => StreamInput::Replay(path.clone()),
        None if args.mock => StreamInput::Mock(MockStreamConfig {
            records: args.mock_records,
            mutations: args.mock_mutations,
            ..Default::default()
        }),
        None => anyhow::bail!("No stream source: pass --input <file> or --mock"),
    };

    let pipeline_config = PipelineConfig {
        config,
        input,
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    };

    info!("Starting pipeline...");

    let stats = Pipeline::new(pipeline_config)
        .run()
        .await
        .context("Pipeline execution failed")?;

    info!(
        events = stats.report.total_events(),
        duration_secs = stats.duration.as_secs_f64(),
        throughput = format!("{:.0}", stats.events_per_sec()),
        "Pipeline completed successfully"
    );

    // Print detailed statistics
    stats.print_summary();

    info!("Slotpipe finished");
    Ok(())
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &contracts::RunConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Dispatcher:");
    if config.dispatcher.workers == 0 {
        println!("  Workers: synchronous mode");
    } else {
        println!("  Workers: {}", config.dispatcher.workers);
    }
    println!("  Queue capacity: {}", config.dispatcher.queue_capacity);
    println!(
        "  Flush interval: {}s",
        config.dispatcher.flush_interval_secs
    );
    println!("  Drain timeout: {}ms", config.dispatcher.drain_timeout_ms);
    println!("\nOutput:");
    println!("  Directory: {}", config.output.dir.display());
    println!("  Buffer size: {} bytes", config.output.buffer_size);
    println!("\nTopology:");
    println!("  Path: {}", config.topology.path.display());
    println!();
}
