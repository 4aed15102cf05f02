//! # Routing
//!
//! Key-to-slot hashing and the immutable slot table.
//!
//! Responsibilities:
//! - `slot()`: hash-tag-aware CRC-16 key hashing into the 16384-slot space
//! - `SlotMap`: full-coverage slot -> destination table, validated at build
//!
//! Everything here is read-only after construction and safe to share across
//! workers without locking.

mod slot;
mod slot_map;

pub use contracts::SLOT_COUNT;
pub use slot::slot;
pub use slot_map::{SlotMap, SlotMapBuilder};
