//! Stream event model
//!
//! One exhaustive enum for everything the upstream replication source can
//! deliver. The dispatcher classifies on this enum, so adding a new event
//! kind will not compile until every consumer handles it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Phase boundary markers of the replication stream.
///
/// Exactly one `BeginSnapshot` precedes any bulk record; `EndSnapshot`
/// follows the last bulk record and precedes `BeginMutations`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseMark {
    BeginSnapshot,
    EndSnapshot,
    BeginMutations,
    EndMutations,
}

/// One key/value unit from the point-in-time snapshot.
///
/// Bulk records have no ordering relationship with each other and may be
/// processed in parallel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkRecord {
    /// Raw key bytes, used for slot routing.
    pub key: Bytes,
    /// Opaque serialized record payload.
    pub payload: Bytes,
}

/// One ordered change from the live mutation stream.
///
/// Ordering relative to other mutations is semantically significant. A
/// mutation without a key (e.g. a full-flush command) applies to every
/// destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOp {
    /// Routing key, if the command targets a single key.
    pub key: Option<Bytes>,
    /// Opaque serialized command payload.
    pub payload: Bytes,
}

/// Everything the dispatcher can receive, from the upstream source or
/// injected internally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Stream lifecycle boundary.
    Phase(PhaseMark),
    /// Snapshot bulk record; parallelizable.
    Bulk(BulkRecord),
    /// Ordered mutation; single-queue only.
    Mutation(MutationOp),
    /// Dispatcher-injected periodic checkpoint tick; carries no payload.
    SyntheticFlush,
    /// Terminal event; delivered at most once.
    StreamClose,
}

impl StreamEvent {
    /// Short static label for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Phase(PhaseMark::BeginSnapshot) => "begin_snapshot",
            StreamEvent::Phase(PhaseMark::EndSnapshot) => "end_snapshot",
            StreamEvent::Phase(PhaseMark::BeginMutations) => "begin_mutations",
            StreamEvent::Phase(PhaseMark::EndMutations) => "end_mutations",
            StreamEvent::Bulk(_) => "bulk",
            StreamEvent::Mutation(_) => "mutation",
            StreamEvent::SyntheticFlush => "synthetic_flush",
            StreamEvent::StreamClose => "stream_close",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_labels() {
        let bulk = StreamEvent::Bulk(BulkRecord {
            key: Bytes::from_static(b"k"),
            payload: Bytes::from_static(b"v"),
        });
        assert_eq!(bulk.kind(), "bulk");
        assert_eq!(StreamEvent::SyntheticFlush.kind(), "synthetic_flush");
        assert_eq!(
            StreamEvent::Phase(PhaseMark::BeginSnapshot).kind(),
            "begin_snapshot"
        );
    }

    #[test]
    fn test_event_serde_round_trip() {
        let ev = StreamEvent::Mutation(MutationOp {
            key: Some(Bytes::from_static(b"{tag}k")),
            payload: Bytes::from_static(b"SET k v"),
        });
        let json = serde_json::to_string(&ev).unwrap();
        let back: StreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(ev, back);
    }
}
