//! Fault taxonomy for the device model.

use thiserror::Error;

use crate::addr::Address;

/// Result type alias for device operations.
pub type DeviceResult<T> = Result<T, FlashFault>;

/// A violation of the controller's operating rules.
///
/// Faults indicate a bug in the translation layer or its caller, never bad
/// host input: recoverable refusals (out-of-range LBA, unmapped read, no
/// space after cleaning) are ordinary return values instead. A fault aborts
/// the host operation; device state up to the violation persists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlashFault {
    /// READ targeted a page that has not been written since its last erase.
    #[error("read of clean physical page {index}")]
    ReadOfCleanPage {
        /// Flat index of the offending page.
        index: u64,
    },

    /// WRITE targeted a page that already holds data.
    #[error("write to dirty physical page {index}")]
    WriteToDirtyPage {
        /// Flat index of the offending page.
        index: u64,
    },

    /// WRITE was issued while the controller's page buffer was empty.
    #[error("write issued with an empty page buffer")]
    WriteWithEmptyBuffer,

    /// ERASE was issued while pages were still buffered.
    #[error("erase issued with {pending} page(s) still buffered")]
    EraseWithBufferedPages {
        /// Number of pages in the buffer at the time of the erase.
        pending: usize,
    },

    /// The page buffer was not drained when a translate call returned.
    #[error("page buffer not drained at host boundary ({pending} page(s) pending)")]
    BufferNotDrained {
        /// Number of pages left in the buffer.
        pending: usize,
    },

    /// ERASE targeted a block whose erase budget is exhausted.
    #[error("block {block} (linear block index) has worn out")]
    BlockWornOut {
        /// Linear index of the worn-out block.
        block: u64,
    },

    /// A delivered payload carried a different LBA than the host requested.
    #[error("page {index} holds LBA {stamped} but the host requested LBA {requested}")]
    PayloadLbaMismatch {
        /// Flat index of the page that was read.
        index: u64,
        /// LBA recorded in the physical-to-logical binding.
        stamped: u64,
        /// LBA the host asked for.
        requested: u64,
    },

    /// A physical page index fell outside the backing store.
    #[error("physical page {index} is out of bounds")]
    PageOutOfBounds {
        /// The offending flat page index.
        index: u64,
    },

    /// An address component exceeded its configured bound.
    #[error("address {addr} is outside the configured geometry")]
    AddressOutOfRange {
        /// The offending address.
        addr: Address,
    },
}
