//! Layered error definitions
//!
//! Categorized by source: config / topology / dispatch / sink / source

use thiserror::Error;

/// Number of hash slots in the cluster key space.
pub const SLOT_COUNT: usize = 16384;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Topology Errors =====
    /// Slot coverage invariant violated; fatal at construction, never retried
    #[error("slot coverage is {covered}, expected {SLOT_COUNT}")]
    SlotCoverage { covered: usize },

    /// A slot was assigned to more than one destination
    #[error("slot {slot} assigned more than once")]
    DuplicateSlot { slot: u16 },

    // ===== Dispatch Errors =====
    /// Worker pool size must be a power of two (or zero for synchronous mode)
    #[error("worker pool size {workers} must be a power of 2")]
    PoolSize { workers: usize },

    /// Event arrived in a stream phase that cannot accept it
    #[error("event '{event}' rejected in phase {phase}")]
    PhaseViolation {
        phase: &'static str,
        event: &'static str,
    },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== Source Errors =====
    /// Malformed frame in a replay stream
    #[error("stream decode error: {message}")]
    SourceDecode { message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create stream decode error
    pub fn source_decode(message: impl Into<String>) -> Self {
        Self::SourceDecode {
            message: message.into(),
        }
    }
}
