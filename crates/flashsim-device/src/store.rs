//! In-memory page-payload store.
//!
//! Replaces the sparse-file backing of a real deployment with a plain slot
//! array; the reinforcing properties of NAND still hold: a slot can only be
//! read after being written, cannot be overwritten without an erase in
//! between, and an erase returns a whole span of slots to the clean state.

use std::ops::Range;

use crate::error::{DeviceResult, FlashFault};

/// Payload carried by one physical page.
///
/// The simulator is generic in the payload: test drivers use small integers,
/// adapters can use fixed-size byte arrays. The type must be trivially
/// copyable by value.
pub trait PagePayload: Copy + PartialEq + std::fmt::Debug {}

impl<T: Copy + PartialEq + std::fmt::Debug> PagePayload for T {}

/// Backing store for page payloads. A `None` slot is CLEAN.
#[derive(Debug, Clone)]
pub struct PageStore<P> {
    slots: Vec<Option<P>>,
}

impl<P: PagePayload> PageStore<P> {
    /// Creates a store with `num_pages` clean slots.
    pub fn new(num_pages: u64) -> Self {
        Self {
            slots: vec![None; num_pages as usize],
        }
    }

    /// Number of slots in the store.
    pub fn len(&self) -> u64 {
        self.slots.len() as u64
    }

    /// Returns true when the store has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns true when the slot has been written since its last erase.
    pub fn is_written(&self, index: u64) -> bool {
        self.slots
            .get(index as usize)
            .is_some_and(|slot| slot.is_some())
    }

    /// Reads the payload of a written slot.
    pub fn read(&self, index: u64) -> DeviceResult<P> {
        let slot = self
            .slots
            .get(index as usize)
            .ok_or(FlashFault::PageOutOfBounds { index })?;
        (*slot).ok_or(FlashFault::ReadOfCleanPage { index })
    }

    /// Writes a payload into a clean slot.
    pub fn write(&mut self, index: u64, payload: P) -> DeviceResult<()> {
        let slot = self
            .slots
            .get_mut(index as usize)
            .ok_or(FlashFault::PageOutOfBounds { index })?;
        if slot.is_some() {
            return Err(FlashFault::WriteToDirtyPage { index });
        }
        *slot = Some(payload);
        Ok(())
    }

    /// Returns every slot in the span to the clean state.
    pub fn erase_span(&mut self, span: Range<u64>) -> DeviceResult<()> {
        if span.end > self.len() {
            return Err(FlashFault::PageOutOfBounds { index: span.end - 1 });
        }
        for index in span {
            self.slots[index as usize] = None;
        }
        Ok(())
    }
}
