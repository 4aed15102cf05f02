//! # Integration Tests
//!
//! End-to-end tests over the full pipeline:
//! - topology file -> multiplexer -> dispatcher -> shard output files
//! - degenerate synchronous mode vs. concurrent pool equivalence
//! - replay file ingestion

#[cfg(test)]
mod support {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::StreamEvent;
    use dispatcher::{DispatcherConfig, PhaseDispatcher};
    use shard_sink::{crc64, ChecksumSink, FileMultiplexer, ShardEventSink};

    /// Topology description: n1 owns the lower half of the slot range,
    /// n2 the upper half.
    pub fn write_two_node_topology(path: &Path) {
        std::fs::write(
            path,
            "# two destination nodes\n\
             n1 n1 0-8191\n\
             n2 n2 8192-16383\n",
        )
        .unwrap();
    }

    pub fn dispatcher_config(workers: usize) -> DispatcherConfig {
        DispatcherConfig {
            workers,
            queue_capacity: 64,
            flush_interval: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(5),
        }
    }

    /// Drive the whole pipeline over a two-node topology and return the
    /// final bytes of each output file, keyed by node label.
    pub async fn run_pipeline(
        out_dir: &Path,
        workers: usize,
        events: Vec<StreamEvent>,
    ) -> HashMap<String, Vec<u8>> {
        let topology_path = out_dir.join("nodes.conf");
        write_two_node_topology(&topology_path);
        let assignments = config_loader::topology::parse_file(&topology_path).unwrap();

        let mux = FileMultiplexer::from_topology(assignments, |assignment| {
            ChecksumSink::create(out_dir.join(format!("{}.rdb", assignment.label)), 4096)
        })
        .unwrap();
        let sink = Arc::new(ShardEventSink::new("e2e", mux));
        let dispatcher =
            PhaseDispatcher::new(Arc::clone(&sink), dispatcher_config(workers)).unwrap();

        for event in events {
            dispatcher.dispatch(event).await.unwrap();
        }

        let mut files = HashMap::new();
        for label in ["n1", "n2"] {
            let bytes = std::fs::read(out_dir.join(format!("{label}.rdb"))).unwrap();
            files.insert(label.to_string(), bytes);
        }
        files
    }

    /// Assert the file ends with the end marker + checksum trailer and the
    /// stored CRC-64 matches a recomputation over the preceding bytes.
    pub fn assert_valid_trailer(bytes: &[u8]) {
        assert!(bytes.len() >= 9, "file too short for a trailer");
        let data_end = bytes.len() - 8;
        assert_eq!(bytes[data_end - 1], shard_sink::EOF_MARKER);
        let stored = u64::from_le_bytes(bytes[data_end..].try_into().unwrap());
        assert_eq!(stored, crc64(&bytes[..data_end]), "trailer checksum mismatch");
    }
}

#[cfg(test)]
mod placement_tests {
    use routing::slot;

    /// Slot placement facts the end-to-end tests rely on: which half of
    /// the slot range each test key lands in.
    #[test]
    fn test_key_placement_in_two_node_split() {
        assert_eq!(slot(b"{a}user:1"), slot(b"a"));
        assert!(slot(b"a") >= 8192, "slot {}", slot(b"a"));
        assert!(slot(b"bar") < 8192, "slot {}", slot(b"bar"));
    }
}

#[cfg(test)]
mod e2e_tests {
    use bytes::Bytes;
    use contracts::{BulkRecord, MutationOp, PhaseMark, StreamEvent};
    use shard_sink::SNAPSHOT_HEADER;

    use crate::support::{assert_valid_trailer, run_pipeline};

    fn bulk(key: &str, payload: &str) -> StreamEvent {
        StreamEvent::Bulk(BulkRecord {
            key: Bytes::copy_from_slice(key.as_bytes()),
            payload: Bytes::copy_from_slice(payload.as_bytes()),
        })
    }

    fn mutation(key: Option<&str>, payload: &str) -> StreamEvent {
        StreamEvent::Mutation(MutationOp {
            key: key.map(|k| Bytes::copy_from_slice(k.as_bytes())),
            payload: Bytes::copy_from_slice(payload.as_bytes()),
        })
    }

    /// Hash-tagged snapshot records and a keyed mutation all land in one
    /// shard file, with the mutation strictly after every bulk write; the
    /// untouched shard still carries the header and a valid trailer.
    #[tokio::test]
    async fn test_full_stream_reshards_into_verified_files() {
        let dir = tempfile::tempdir().unwrap();
        // The "a" hash tag routes to slot 15495, owned by n2.
        let events = vec![
            StreamEvent::Phase(PhaseMark::BeginSnapshot),
            bulk("{a}user:1", "bulk-one"),
            bulk("{a}user:2", "bulk-two"),
            StreamEvent::Phase(PhaseMark::EndSnapshot),
            StreamEvent::Phase(PhaseMark::BeginMutations),
            mutation(Some("{a}user:1"), "mutation-three"),
            StreamEvent::Phase(PhaseMark::EndMutations),
            StreamEvent::StreamClose,
        ];
        let files = run_pipeline(dir.path(), 4, events).await;

        let n2 = &files["n2"];
        assert!(n2.starts_with(SNAPSHOT_HEADER));
        assert_valid_trailer(n2);

        let pos = |needle: &[u8]| {
            n2.windows(needle.len())
                .position(|w| w == needle)
                .unwrap_or_else(|| panic!("{:?} missing", String::from_utf8_lossy(needle)))
        };
        // Bulk order across workers is unspecified; the barrier guarantees
        // the mutation lands after both.
        let mutation_at = pos(b"mutation-three");
        assert!(pos(b"bulk-one") < mutation_at);
        assert!(pos(b"bulk-two") < mutation_at);

        // The other shard received nothing keyed: header + trailer only.
        let n1 = &files["n1"];
        assert!(n1.starts_with(SNAPSHOT_HEADER));
        assert_valid_trailer(n1);
        assert_eq!(n1.len(), SNAPSHOT_HEADER.len() + 1 + 8);
    }

    /// Keyless mutations broadcast to every shard file.
    #[tokio::test]
    async fn test_keyless_mutation_broadcasts() {
        let dir = tempfile::tempdir().unwrap();
        let events = vec![
            StreamEvent::Phase(PhaseMark::BeginSnapshot),
            StreamEvent::Phase(PhaseMark::EndSnapshot),
            StreamEvent::Phase(PhaseMark::BeginMutations),
            mutation(None, "flush-everything"),
            StreamEvent::Phase(PhaseMark::EndMutations),
            StreamEvent::StreamClose,
        ];
        let files = run_pipeline(dir.path(), 2, events).await;

        for label in ["n1", "n2"] {
            let bytes = &files[label];
            assert_valid_trailer(bytes);
            assert!(
                bytes
                    .windows(b"flush-everything".len())
                    .any(|w| w == b"flush-everything"),
                "{label} missing broadcast payload"
            );
        }
        // Identical input -> identical shard files.
        assert_eq!(files["n1"], files["n2"]);
    }

    /// Workers = 0 runs the sink synchronously on the caller but must
    /// produce the same files as a concurrent pool for a stream with one
    /// record per shard.
    #[tokio::test]
    async fn test_synchronous_mode_matches_pool_output() {
        // slot("bar") == 5061 -> n1, slot("a") == 15495 -> n2.
        let events = || {
            vec![
                StreamEvent::Phase(PhaseMark::BeginSnapshot),
                bulk("bar", "lower-half"),
                bulk("a", "upper-half"),
                StreamEvent::Phase(PhaseMark::EndSnapshot),
                StreamEvent::Phase(PhaseMark::BeginMutations),
                mutation(None, "sync-all"),
                StreamEvent::Phase(PhaseMark::EndMutations),
                StreamEvent::StreamClose,
            ]
        };

        let sync_dir = tempfile::tempdir().unwrap();
        let pool_dir = tempfile::tempdir().unwrap();
        let sync_files = run_pipeline(sync_dir.path(), 0, events()).await;
        let pool_files = run_pipeline(pool_dir.path(), 4, events()).await;

        assert_eq!(sync_files["n1"], pool_files["n1"]);
        assert_eq!(sync_files["n2"], pool_files["n2"]);
        assert_valid_trailer(&sync_files["n1"]);
        assert_valid_trailer(&sync_files["n2"]);
    }
}

#[cfg(test)]
mod replay_tests {
    use std::sync::Arc;

    use ingestion::{MockStreamConfig, MockStreamSource, ReplaySource};
    use shard_sink::{ChecksumSink, FileMultiplexer, ShardEventSink, SNAPSHOT_HEADER};

    use crate::support::{assert_valid_trailer, dispatcher_config, write_two_node_topology};
    use dispatcher::PhaseDispatcher;

    /// Record a synthetic stream to disk, replay it through the dispatcher,
    /// and verify every shard file ends finalized.
    #[tokio::test]
    async fn test_replay_file_drives_full_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let replay_path = dir.path().join("stream.bin");
        let source = MockStreamSource::new(MockStreamConfig {
            records: 32,
            mutations: 8,
            keyless_every: 4,
        });
        source.write_replay(&replay_path).unwrap();

        let topology_path = dir.path().join("nodes.conf");
        write_two_node_topology(&topology_path);
        let assignments = config_loader::topology::parse_file(&topology_path).unwrap();
        let out_dir = dir.path().to_path_buf();
        let mux = FileMultiplexer::from_topology(assignments, |assignment| {
            ChecksumSink::create(out_dir.join(format!("{}.rdb", assignment.label)), 4096)
        })
        .unwrap();
        let sink = Arc::new(ShardEventSink::new("replay_e2e", mux));
        let dispatcher = PhaseDispatcher::new(Arc::clone(&sink), dispatcher_config(2)).unwrap();

        let mut rx = ReplaySource::new(&replay_path).start(64).unwrap();
        let mut delivered = 0usize;
        while let Some(event) = rx.recv().await {
            dispatcher.dispatch(event).await.unwrap();
            delivered += 1;
        }

        // records + mutations + 4 phase marks + close
        assert_eq!(delivered, 32 + 8 + 5);
        for label in ["n1", "n2"] {
            let bytes = std::fs::read(dir.path().join(format!("{label}.rdb"))).unwrap();
            assert!(bytes.starts_with(SNAPSHOT_HEADER));
            assert_valid_trailer(&bytes);
        }
    }
}

#[cfg(test)]
mod config_tests {
    use shard_sink::{ChecksumSink, ShardMultiplexer};

    use crate::support::write_two_node_topology;

    /// Config file, topology file, and slot coverage check wired together
    /// the way the run command does it.
    #[test]
    fn test_config_and_topology_load_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let topology_path = dir.path().join("nodes.conf");
        write_two_node_topology(&topology_path);

        let config_path = dir.path().join("slotpipe.toml");
        std::fs::write(
            &config_path,
            format!(
                "[dispatcher]\n\
                 workers = 2\n\
                 queue_capacity = 128\n\
                 flush_interval_secs = 30\n\
                 drain_timeout_ms = 1000\n\n\
                 [output]\n\
                 dir = \"{}\"\n\n\
                 [topology]\n\
                 path = \"{}\"\n",
                dir.path().display(),
                topology_path.display()
            ),
        )
        .unwrap();

        let config = config_loader::ConfigLoader::load_from_path(&config_path).unwrap();
        assert_eq!(config.dispatcher.workers, 2);

        let assignments = config_loader::topology::parse_file(&config.topology.path).unwrap();
        let mux = ShardMultiplexer::from_topology(assignments, |_| {
            Ok(ChecksumSink::new(std::io::sink()))
        })
        .unwrap();
        assert_eq!(mux.destination_count(), 2);
    }

    /// A topology that leaves slots uncovered is rejected at multiplexer
    /// construction, before any file is written.
    #[test]
    fn test_partial_coverage_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let topology_path = dir.path().join("nodes.conf");
        std::fs::write(&topology_path, "n1 n1 0-8191\nn2 n2 8192-16382\n").unwrap();

        let assignments = config_loader::topology::parse_file(&topology_path).unwrap();
        let result = ShardMultiplexer::from_topology(assignments, |_| {
            Ok(ChecksumSink::new(std::io::sink()))
        });
        assert!(matches!(
            result,
            Err(contracts::ContractError::SlotCoverage { covered: 16383 })
        ));
    }
}
