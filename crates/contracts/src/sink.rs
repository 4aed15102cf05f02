//! EventSink trait - dispatcher output interface
//!
//! Defines the abstract interface the dispatcher drives once per event.
//! One sink instance is shared across all workers, so receivers take `&self`
//! and implementations must serialize any internal mutable state themselves.

use crate::{ContractError, StreamEvent};

/// Downstream event handler
///
/// The dispatcher is agnostic to what the sink does with an event; in this
/// system the implementation ultimately routes bytes into per-shard files.
#[trait_variant::make(EventSink: Send)]
pub trait LocalEventSink: Sync {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Handle one stream event
    ///
    /// Called concurrently from multiple workers during the snapshot phase;
    /// called from a single worker during the mutation phase.
    ///
    /// # Errors
    /// Returns write/routing errors (should include context)
    async fn on_event(&self, event: StreamEvent) -> Result<(), ContractError>;
}
