//! The device model proper: page buffer, consistency policing, and the
//! host-facing controller.
//!
//! The controller is the central control unit of the simulated SSD. Every
//! host command and every auxiliary command issued by the translation layer
//! passes through it, and it enforces the rules of real NAND by raising a
//! [`FlashFault`](crate::error::FlashFault) on any violation: a page must be
//! written before it is read, a page must not be written twice without an
//! intervening block erase, a block may only be erased while the one-page
//! FIFO buffer is empty, and each block has a bounded erase budget.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::addr::{Address, Geometry};
use crate::error::{DeviceResult, FlashFault};
use crate::store::{PagePayload, PageStore};

/// Commands the translation layer may issue against the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpCode {
    /// Read a page into the tail of the controller buffer.
    Read,
    /// Write the head of the controller buffer to a page.
    Write,
    /// Erase a block (the page component of the address is ignored).
    Erase,
}

/// The simulated NAND device: page payloads, the controller's FIFO page
/// buffer, the physical-to-logical check map, and the per-block erase
/// ledger.
///
/// The buffer holds `(payload, LBA)` pairs produced by READ and consumed in
/// FIFO order by WRITE, so bursts of commands issued inside a single
/// translate call execute in issue order. The check map lets the device
/// detect stale or misdirected operations without trusting the translation
/// layer.
#[derive(Debug)]
pub struct FlashDevice<P> {
    geometry: Geometry,
    erase_budget: u32,
    store: PageStore<P>,
    buffer: VecDeque<(P, u64)>,
    bindings: HashMap<u64, u64>,
    erases_left: HashMap<u64, u32>,
    reads: u64,
    writes: u64,
    erases: u64,
}

impl<P: PagePayload> FlashDevice<P> {
    /// Creates a device with every page clean and every block holding its
    /// full erase budget.
    pub fn new(geometry: Geometry, erase_budget: u32) -> Self {
        Self {
            geometry,
            erase_budget,
            store: PageStore::new(geometry.num_pages()),
            buffer: VecDeque::new(),
            bindings: HashMap::new(),
            erases_left: HashMap::new(),
            reads: 0,
            writes: 0,
            erases: 0,
        }
    }

    /// The configured geometry.
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Executes one command at the given address.
    pub fn execute(&mut self, op: OpCode, addr: Address) -> DeviceResult<()> {
        if !self.geometry.contains(addr.block_start()) {
            return Err(FlashFault::AddressOutOfRange { addr });
        }
        match op {
            OpCode::Read => self.read_page(addr),
            OpCode::Write => self.write_page(addr),
            OpCode::Erase => self.erase_block(addr),
        }
    }

    fn read_page(&mut self, addr: Address) -> DeviceResult<()> {
        if !self.geometry.contains(addr) {
            return Err(FlashFault::AddressOutOfRange { addr });
        }
        let index = self.geometry.page_index(addr);
        let lba = *self
            .bindings
            .get(&index)
            .ok_or(FlashFault::ReadOfCleanPage { index })?;
        let payload = self.store.read(index)?;
        self.buffer.push_back((payload, lba));
        self.reads += 1;
        Ok(())
    }

    fn write_page(&mut self, addr: Address) -> DeviceResult<()> {
        if !self.geometry.contains(addr) {
            return Err(FlashFault::AddressOutOfRange { addr });
        }
        let index = self.geometry.page_index(addr);
        let &(payload, lba) = self
            .buffer
            .front()
            .ok_or(FlashFault::WriteWithEmptyBuffer)?;
        if self.bindings.contains_key(&index) {
            return Err(FlashFault::WriteToDirtyPage { index });
        }
        self.store.write(index, payload)?;
        self.bindings.insert(index, lba);
        self.buffer.pop_front();
        self.writes += 1;
        Ok(())
    }

    fn erase_block(&mut self, addr: Address) -> DeviceResult<()> {
        if !self.buffer.is_empty() {
            return Err(FlashFault::EraseWithBufferedPages {
                pending: self.buffer.len(),
            });
        }
        let block = self.geometry.block_index(addr.block_start());
        let left = self.erases_left.entry(block).or_insert(self.erase_budget);
        if *left == 0 {
            warn!("erase refused: block {} has worn out", block);
            return Err(FlashFault::BlockWornOut { block });
        }
        *left -= 1;
        let remaining = *left;
        let span = self.geometry.block_page_range(block);
        for index in span.clone() {
            self.bindings.remove(&index);
        }
        self.store.erase_span(span)?;
        self.erases += 1;
        debug!("erased block {} ({} erases left)", block, remaining);
        Ok(())
    }

    /// Number of pages currently held in the controller buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Checks the host-boundary invariant: the buffer must be empty at every
    /// return from the translation layer back to the host.
    pub fn ensure_drained(&self) -> DeviceResult<()> {
        if self.buffer.is_empty() {
            Ok(())
        } else {
            Err(FlashFault::BufferNotDrained {
                pending: self.buffer.len(),
            })
        }
    }

    /// Total number of operations of one kind executed so far.
    pub fn total_ops(&self, op: OpCode) -> u64 {
        match op {
            OpCode::Read => self.reads,
            OpCode::Write => self.writes,
            OpCode::Erase => self.erases,
        }
    }

    /// Erases remaining for a block. Blocks never erased report the full
    /// budget.
    pub fn remaining_erases(&self, block: u64) -> u32 {
        self.erases_left.get(&block).copied().unwrap_or(self.erase_budget)
    }

    /// Returns true if at least one block has no erases remaining.
    pub fn any_block_worn_out(&self) -> bool {
        self.erases_left.values().any(|&left| left == 0)
    }

    /// The LBA currently bound to a physical page, if any.
    pub fn binding(&self, index: u64) -> Option<u64> {
        self.bindings.get(&index).copied()
    }

    fn push_buffered(&mut self, payload: P, lba: u64) {
        self.buffer.push_back((payload, lba));
    }

    fn pop_buffered(&mut self) -> Option<(P, u64)> {
        self.buffer.pop_front()
    }
}

/// Capability handed to the translation layer for the duration of one
/// translate call.
///
/// Wraps the device mutably so the FTL can issue auxiliary READ, WRITE, and
/// ERASE commands without ever seeing the controller itself; the borrow is
/// bounded by the call.
pub struct ExecCallback<'a, P> {
    device: &'a mut FlashDevice<P>,
}

impl<P: PagePayload> ExecCallback<'_, P> {
    /// Executes one command on behalf of the translation layer.
    pub fn execute(&mut self, op: OpCode, addr: Address) -> DeviceResult<()> {
        self.device.execute(op, addr)
    }
}

/// Address-translation layer contract, as seen by the controller.
///
/// Each method receives the callback by value and must respect the buffer's
/// FIFO discipline: READs and WRITEs issued inside one call pair up in
/// order, and the buffer must be empty when the call returns.
pub trait FlashTranslation<P: PagePayload> {
    /// Resolves the physical target of a host read. `Ok(None)` refuses the
    /// operation (out-of-range or unmapped LBA) without fault.
    fn read_translate(
        &mut self,
        lba: u64,
        exec: ExecCallback<'_, P>,
    ) -> DeviceResult<Option<Address>>;

    /// Resolves the physical target of a host write, issuing any
    /// prerequisite commands (cleaning, relocation, erase) through `exec`.
    /// `Ok(None)` refuses the operation.
    fn write_translate(
        &mut self,
        lba: u64,
        exec: ExecCallback<'_, P>,
    ) -> DeviceResult<Option<Address>>;

    /// Marks an LBA as holding no useful data. `Ok(true)` when accepted.
    fn trim(&mut self, lba: u64, exec: ExecCallback<'_, P>) -> DeviceResult<bool>;
}

/// Host-facing wrapper pairing a device with its translation layer.
///
/// Host operations are serialized; each runs to completion before the next
/// begins. Recoverable refusals surface as `Ok(None)` / `Ok(false)`; rule
/// violations surface as [`FlashFault`](crate::error::FlashFault) errors.
#[derive(Debug)]
pub struct Controller<P, F> {
    device: FlashDevice<P>,
    ftl: F,
}

impl<P: PagePayload, F: FlashTranslation<P>> Controller<P, F> {
    /// Creates a controller over a fresh device.
    pub fn new(geometry: Geometry, erase_budget: u32, ftl: F) -> Self {
        debug!(
            "controller created: {} blocks of {} pages, erase budget {}",
            geometry.num_blocks(),
            geometry.pages_per_block,
            erase_budget
        );
        Self {
            device: FlashDevice::new(geometry, erase_budget),
            ftl,
        }
    }

    /// Reads the page backing an LBA. `Ok(None)` when the FTL refuses the
    /// read (out-of-range or never-written LBA).
    pub fn read(&mut self, lba: u64) -> DeviceResult<Option<P>> {
        let target = self.ftl.read_translate(
            lba,
            ExecCallback {
                device: &mut self.device,
            },
        )?;
        self.device.ensure_drained()?;
        let Some(addr) = target else {
            debug!("read of LBA {} refused", lba);
            return Ok(None);
        };
        self.device.execute(OpCode::Read, addr)?;
        let (payload, stamped) = self
            .device
            .pop_buffered()
            .expect("READ buffers the page it just read");
        if stamped != lba {
            return Err(FlashFault::PayloadLbaMismatch {
                index: self.device.geometry.page_index(addr),
                stamped,
                requested: lba,
            });
        }
        Ok(Some(payload))
    }

    /// Writes a page to an LBA. `Ok(false)` when the FTL refuses the write
    /// (out-of-range LBA or no space even after cleaning).
    pub fn write(&mut self, lba: u64, payload: P) -> DeviceResult<bool> {
        let target = self.ftl.write_translate(
            lba,
            ExecCallback {
                device: &mut self.device,
            },
        )?;
        self.device.ensure_drained()?;
        let Some(addr) = target else {
            debug!("write of LBA {} refused", lba);
            return Ok(false);
        };
        self.device.push_buffered(payload, lba);
        self.device.execute(OpCode::Write, addr)?;
        Ok(true)
    }

    /// Suggests that an LBA no longer holds useful data.
    pub fn trim(&mut self, lba: u64) -> DeviceResult<bool> {
        let accepted = self.ftl.trim(
            lba,
            ExecCallback {
                device: &mut self.device,
            },
        )?;
        self.device.ensure_drained()?;
        Ok(accepted)
    }

    /// Total physical reads executed.
    pub fn total_reads(&self) -> u64 {
        self.device.total_ops(OpCode::Read)
    }

    /// Total physical writes executed (host writes plus write
    /// amplification).
    pub fn total_writes(&self) -> u64 {
        self.device.total_ops(OpCode::Write)
    }

    /// Total block erases executed.
    pub fn total_erases(&self) -> u64 {
        self.device.total_ops(OpCode::Erase)
    }

    /// Returns true if at least one block has no erases remaining. Used by
    /// stress drivers to check that the FTL did not give up early.
    pub fn any_block_worn_out(&self) -> bool {
        self.device.any_block_worn_out()
    }

    /// Erases remaining for a block.
    pub fn remaining_erases(&self, block: u64) -> u32 {
        self.device.remaining_erases(block)
    }

    /// The configured geometry.
    pub fn geometry(&self) -> Geometry {
        self.device.geometry()
    }

    /// Shared access to the translation layer.
    pub fn ftl(&self) -> &F {
        &self.ftl
    }

    /// Exclusive access to the translation layer.
    pub fn ftl_mut(&mut self) -> &mut F {
        &mut self.ftl
    }

    /// Shared access to the underlying device.
    pub fn device(&self) -> &FlashDevice<P> {
        &self.device
    }
}
