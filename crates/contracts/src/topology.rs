//! Topology assignment triple
//!
//! One `(node id, slot index, node label)` triple as produced by the
//! topology parser. The multiplexer consumes these against a sink factory;
//! destination sinks are deduplicated by `node_id`, not by slot.

use serde::{Deserialize, Serialize};

/// Assignment of one hash slot to a destination node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAssignment {
    /// Stable destination identity; multiple slots alias to one node.
    pub node_id: String,
    /// Hash slot index in `[0, 16384)`.
    pub slot: u16,
    /// Human-readable label, used to name the destination file.
    pub label: String,
}

impl SlotAssignment {
    pub fn new(node_id: impl Into<String>, slot: u16, label: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            slot,
            label: label.into(),
        }
    }
}
