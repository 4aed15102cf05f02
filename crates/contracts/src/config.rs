//! Run configuration contracts shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Dispatcher settings
    #[serde(default)]
    pub dispatcher: DispatcherSettings,

    /// Output settings
    pub output: OutputSettings,

    /// Cluster topology settings
    pub topology: TopologySettings,
}

/// Dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherSettings {
    /// Worker pool size; power of two, 0 disables concurrency
    pub workers: usize,

    /// Per-worker queue capacity
    pub queue_capacity: usize,

    /// Mutation-phase checkpoint interval in seconds
    pub flush_interval_secs: u64,

    /// Bounded wait per worker queue at shutdown, in milliseconds
    pub drain_timeout_ms: u64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            flush_interval_secs: 30,
            drain_timeout_ms: 10_000,
        }
    }
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Directory receiving one shard file per destination node
    pub dir: PathBuf,

    /// Buffer size per destination sink, in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_buffer_size() -> usize {
    64 * 1024
}

/// Cluster topology settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologySettings {
    /// Path to the topology description file
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatcher_defaults() {
        let settings = DispatcherSettings::default();
        assert_eq!(settings.workers, 4);
        assert_eq!(settings.flush_interval_secs, 30);
    }

    #[test]
    fn test_run_config_deserialize_minimal() {
        let json = r#"{
            "output": { "dir": "/tmp/out" },
            "topology": { "path": "/tmp/nodes.conf" }
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.dispatcher.workers, 4);
        assert_eq!(config.output.buffer_size, 64 * 1024);
    }
}
