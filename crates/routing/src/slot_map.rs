//! Immutable slot -> destination table
//!
//! Built once before any routing occurs. Construction fails unless every one
//! of the 16384 slots is assigned exactly once; after that, lookups are
//! infallible and lock-free.

use contracts::{ContractError, SLOT_COUNT};

/// Builder collecting per-slot assignments.
///
/// Duplicate assignments fail immediately; missing slots fail at `finish()`.
pub struct SlotMapBuilder<T> {
    slots: Vec<Option<T>>,
    covered: usize,
}

impl<T> SlotMapBuilder<T> {
    pub fn new() -> Self {
        Self {
            slots: (0..SLOT_COUNT).map(|_| None).collect(),
            covered: 0,
        }
    }

    /// Assign one slot to a destination value.
    ///
    /// # Errors
    /// `DuplicateSlot` if the slot is already assigned; `SlotCoverage` if the
    /// slot index is out of range.
    pub fn assign(&mut self, slot: u16, value: T) -> Result<(), ContractError> {
        let index = usize::from(slot);
        if index >= SLOT_COUNT {
            return Err(ContractError::config_validation(
                format!("slot[{slot}]"),
                format!("slot index out of range, expected < {SLOT_COUNT}"),
            ));
        }
        if self.slots[index].is_some() {
            return Err(ContractError::DuplicateSlot { slot });
        }
        self.slots[index] = Some(value);
        self.covered += 1;
        Ok(())
    }

    /// Number of slots assigned so far.
    pub fn covered(&self) -> usize {
        self.covered
    }

    /// Validate full coverage and freeze the table.
    ///
    /// # Errors
    /// `SlotCoverage` unless exactly 16384 slots are assigned. This is a
    /// topology-description error: fatal, never retried.
    pub fn finish(self) -> Result<SlotMap<T>, ContractError> {
        if self.covered != SLOT_COUNT {
            return Err(ContractError::SlotCoverage {
                covered: self.covered,
            });
        }
        let slots = self.slots.into_iter().flatten().collect();
        Ok(SlotMap { slots })
    }
}

impl<T> Default for SlotMapBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable full-coverage slot table.
pub struct SlotMap<T> {
    slots: Vec<T>,
}

impl<T> SlotMap<T> {
    /// Look up the destination for a slot.
    ///
    /// # Panics
    /// If `slot >= 16384`. Callers obtain slots from `slot()`, which masks
    /// to 14 bits, so this is unreachable in routing paths.
    pub fn get(&self, slot: u16) -> &T {
        &self.slots[usize::from(slot)]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
