//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Worker pool size is not a power of two; fatal at construction
    #[error("worker pool size {workers} must be a power of 2")]
    PoolSize { workers: usize },

    /// Event arrived in a phase that cannot accept it
    #[error("event '{event}' rejected in phase {phase}")]
    PhaseViolation {
        phase: &'static str,
        event: &'static str,
    },

    /// A worker queue is gone; only possible after shutdown began
    #[error("worker {index} queue closed")]
    WorkerUnavailable { index: usize },
}

impl DispatchError {
    /// Create a phase violation error
    pub fn phase_violation(phase: &'static str, event: &'static str) -> Self {
        Self::PhaseViolation { phase, event }
    }
}
