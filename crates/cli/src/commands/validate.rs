//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use shard_sink::{ChecksumSink, ShardMultiplexer};
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    workers: usize,
    queue_capacity: usize,
    flush_interval_secs: u64,
    output_dir: String,
    topology_path: String,
    destination_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    // Config, then topology, then full slot coverage
    let config = match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => config,
        Err(e) => {
            return ValidationResult {
                valid: false,
                config_path,
                error: Some(e.to_string()),
                warnings: None,
                summary: None,
            }
        }
    };

    let destination_count = match check_topology(&config) {
        Ok(count) => count,
        Err(e) => {
            return ValidationResult {
                valid: false,
                config_path,
                error: Some(e.to_string()),
                warnings: None,
                summary: None,
            }
        }
    };

    let warnings = collect_warnings(&config, destination_count);

    ValidationResult {
        valid: true,
        config_path,
        error: None,
        warnings: if warnings.is_empty() {
            None
        } else {
            Some(warnings)
        },
        summary: Some(ConfigSummary {
            workers: config.dispatcher.workers,
            queue_capacity: config.dispatcher.queue_capacity,
            flush_interval_secs: config.dispatcher.flush_interval_secs,
            output_dir: config.output.dir.display().to_string(),
            topology_path: config.topology.path.display().to_string(),
            destination_count,
        }),
    }
}

/// Parse the topology file and prove full slot coverage without touching
/// the filesystem, by building the multiplexer over discarding sinks.
fn check_topology(config: &contracts::RunConfig) -> Result<usize> {
    let assignments = config_loader::topology::parse_file(&config.topology.path)?;
    let mux = ShardMultiplexer::from_topology(assignments, |_| {
        Ok(ChecksumSink::new(std::io::sink()))
    })?;
    Ok(mux.destination_count())
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &contracts::RunConfig, destination_count: usize) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.dispatcher.workers == 0 {
        warnings.push(
            "dispatcher.workers = 0 - pipeline runs synchronously on the caller".to_string(),
        );
    }

    if destination_count == 1 {
        warnings
            .push("Topology has a single destination - every record lands in one file".to_string());
    }

    if config.output.dir.exists() && !config.output.dir.is_dir() {
        warnings.push(format!(
            "Output path {} exists and is not a directory",
            config.output.dir.display()
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Workers: {}", summary.workers);
            println!("  Queue capacity: {}", summary.queue_capacity);
            println!("  Flush interval: {}s", summary.flush_interval_secs);
            println!("  Output dir: {}", summary.output_dir);
            println!("  Topology: {}", summary.topology_path);
            println!("  Destinations: {}", summary.destination_count);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
