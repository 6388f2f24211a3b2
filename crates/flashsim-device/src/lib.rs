#![warn(missing_docs)]

//! Simulated NAND flash device model.
//!
//! This crate provides the physical half of the flash simulator: the
//! hierarchical address codec, the in-memory page store, and the controller
//! that polices every operation against the invariants of real NAND
//! (erase-before-overwrite, FIFO page buffering, bounded per-block erase
//! budgets, physical-to-logical consistency). The translation layer plugs in
//! through the [`FlashTranslation`] trait and talks back to the device
//! through the [`ExecCallback`] capability.

pub mod addr;
pub mod controller;
pub mod error;
pub mod store;

pub use addr::{Address, Geometry};
pub use controller::{Controller, ExecCallback, FlashDevice, FlashTranslation, OpCode};
pub use error::{DeviceResult, FlashFault};
pub use store::{PagePayload, PageStore};
