//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    dispatcher: DispatcherInfo,
    output: OutputInfo,
    topology: TopologyInfo,
}

#[derive(Serialize)]
struct DispatcherInfo {
    workers: usize,
    queue_capacity: usize,
    flush_interval_secs: u64,
    drain_timeout_ms: u64,
}

#[derive(Serialize)]
struct OutputInfo {
    dir: String,
    buffer_size: usize,
}

#[derive(Serialize)]
struct TopologyInfo {
    path: String,
    slots_assigned: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    nodes: Vec<NodeInfo>,
}

#[derive(Serialize)]
struct NodeInfo {
    node_id: String,
    label: String,
    slot_count: usize,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&config, args)?;

    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info, args);
    }

    Ok(())
}

fn build_config_info(config: &contracts::RunConfig, args: &InfoArgs) -> Result<ConfigInfo> {
    let assignments = config_loader::topology::parse_file(&config.topology.path)
        .with_context(|| {
            format!(
                "Failed to parse topology from {}",
                config.topology.path.display()
            )
        })?;

    let nodes = if args.slots {
        // Slot counts per node, in first-appearance order via BTreeMap on id.
        let mut counts: BTreeMap<String, (String, usize)> = BTreeMap::new();
        for assignment in &assignments {
            let entry = counts
                .entry(assignment.node_id.clone())
                .or_insert_with(|| (assignment.label.clone(), 0));
            entry.1 += 1;
        }
        counts
            .into_iter()
            .map(|(node_id, (label, slot_count))| NodeInfo {
                node_id,
                label,
                slot_count,
            })
            .collect()
    } else {
        Vec::new()
    };

    Ok(ConfigInfo {
        dispatcher: DispatcherInfo {
            workers: config.dispatcher.workers,
            queue_capacity: config.dispatcher.queue_capacity,
            flush_interval_secs: config.dispatcher.flush_interval_secs,
            drain_timeout_ms: config.dispatcher.drain_timeout_ms,
        },
        output: OutputInfo {
            dir: config.output.dir.display().to_string(),
            buffer_size: config.output.buffer_size,
        },
        topology: TopologyInfo {
            path: config.topology.path.display().to_string(),
            slots_assigned: assignments.len(),
            nodes,
        },
    })
}

fn print_config_info(info: &ConfigInfo, args: &InfoArgs) {
    println!("=== Slotpipe Configuration ===\n");

    println!("Dispatcher");
    if info.dispatcher.workers == 0 {
        println!("  Workers: synchronous mode");
    } else {
        println!("  Workers: {}", info.dispatcher.workers);
    }
    println!("  Queue capacity: {}", info.dispatcher.queue_capacity);
    println!("  Flush interval: {}s", info.dispatcher.flush_interval_secs);
    println!("  Drain timeout: {}ms", info.dispatcher.drain_timeout_ms);

    println!("\nOutput");
    println!("  Directory: {}", info.output.dir);
    println!("  Buffer size: {} bytes", info.output.buffer_size);

    println!("\nTopology");
    println!("  Path: {}", info.topology.path);
    println!("  Slots assigned: {}", info.topology.slots_assigned);

    if args.slots && !info.topology.nodes.is_empty() {
        println!("  Nodes ({}):", info.topology.nodes.len());
        for node in &info.topology.nodes {
            println!(
                "    {} ({}): {} slots",
                node.node_id, node.label, node.slot_count
            );
        }
    }

    println!();
}
