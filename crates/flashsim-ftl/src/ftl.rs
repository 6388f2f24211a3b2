//! The log-structured translation engine and its cleaner.
//!
//! Every host write appends at the current log tip; rewriting an LBA never
//! touches the old physical page, it only marks the old copy DEAD. When a
//! fresh tip is needed and the free pool has run dry, the cleaner selects a
//! retired victim, migrates its LIVE pages into the reserved cleaning block
//! (matched READ/WRITE pairs through the controller), erases the victim,
//! and swaps roles: the primed cleaning block becomes the new tip and the
//! erased victim becomes the new reserve. All blocks rotate through log
//! duty; over-provisioning only bounds the addressable LBA range.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use flashsim_device::{
    Address, DeviceResult, ExecCallback, FlashTranslation, Geometry, OpCode, PagePayload,
};

use crate::block::BlockTable;
use crate::config::{ConfigError, FlashConfig};
use crate::gc::GcPolicyKind;
use crate::map::MappingTable;

/// Counters describing the work the translation layer has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtlStats {
    /// Host reads translated successfully.
    pub host_reads: u64,
    /// Host writes translated successfully.
    pub host_writes: u64,
    /// Trims accepted.
    pub trims: u64,
    /// Host reads refused (out of range or unmapped).
    pub refused_reads: u64,
    /// Host writes refused (out of range or no space after cleaning).
    pub refused_writes: u64,
    /// Pages relocated by the cleaner.
    pub migrated_pages: u64,
    /// Cleaning passes that reclaimed a block.
    pub gc_passes: u64,
    /// Cleaning passes abandoned (no victim yet, or victim out of erases).
    pub gc_aborts: u64,
    /// Block erases issued by the cleaner.
    pub erases: u64,
}

/// The active append target.
#[derive(Debug, Clone, Copy)]
struct LogTip {
    block: u64,
    offset: u32,
}

/// Log-structured flash translation layer.
///
/// Owns the logical and physical mapping tables, the per-block counters,
/// and the log-block allocator. Implements [`FlashTranslation`] for any
/// page payload; the payloads themselves only ever move through the
/// controller's buffer.
#[derive(Debug)]
pub struct LogStructuredFtl {
    geometry: Geometry,
    largest_lba: u64,
    map: MappingTable,
    blocks: BlockTable,
    free: VecDeque<u64>,
    used: Vec<u64>,
    tip: Option<LogTip>,
    /// The cleaning block: always fully clean, never holds mapped pages.
    /// Guarantees the cleaner a destination that can absorb any victim.
    reserve: u64,
    policy: GcPolicyKind,
    clock: u64,
    stats: FtlStats,
}

impl LogStructuredFtl {
    /// Builds the FTL from a validated configuration: all mappings start
    /// unmapped, every block enters the free pool in ascending order, the
    /// first block becomes the initial log tip, and the second is set
    /// aside as the cleaning block.
    pub fn new(config: &FlashConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let geometry = config.geometry();
        let mut free: VecDeque<u64> = (0..geometry.num_blocks()).collect();
        let tip = free
            .pop_front()
            .expect("validated geometry has at least two blocks");
        let reserve = free
            .pop_front()
            .expect("validated geometry has at least two blocks");
        info!(
            "ftl created: {} blocks ({} data / {} spare), largest LBA {}, policy {:?}",
            geometry.num_blocks(),
            config.num_data_blocks(),
            config.num_op_blocks(),
            config.largest_lba(),
            config.gc_policy
        );
        Ok(Self {
            geometry,
            largest_lba: config.largest_lba(),
            map: MappingTable::new(config.largest_lba() + 1, geometry.num_pages()),
            blocks: BlockTable::new(
                geometry.num_blocks(),
                geometry.pages_per_block,
                config.block_erases,
                config.num_data_blocks(),
            ),
            free,
            used: Vec::new(),
            tip: Some(LogTip {
                block: tip,
                offset: 0,
            }),
            reserve,
            policy: config.gc_policy,
            clock: 0,
            stats: FtlStats::default(),
        })
    }

    /// Highest addressable LBA.
    pub fn largest_lba(&self) -> u64 {
        self.largest_lba
    }

    /// The physical address currently backing an LBA, if mapped.
    pub fn mapped_address(&self, lba: u64) -> Option<Address> {
        if lba > self.largest_lba {
            return None;
        }
        self.map
            .lookup(lba)
            .map(|page| self.geometry.page_address(page))
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> FtlStats {
        self.stats
    }

    /// The configured cleaning policy.
    pub fn policy(&self) -> GcPolicyKind {
        self.policy
    }

    /// Blocks currently in the free pool.
    pub fn free_block_count(&self) -> usize {
        self.free.len()
    }

    /// Blocks retired from log duty and awaiting cleaning.
    pub fn used_block_count(&self) -> usize {
        self.used.len()
    }

    /// The current log tip block, if one is active.
    pub fn tip_block(&self) -> Option<u64> {
        self.tip.map(|tip| tip.block)
    }

    /// The current cleaning block.
    pub fn reserve_block(&self) -> u64 {
        self.reserve
    }

    /// LIVE pages currently accounted to a block.
    pub fn live_pages(&self, block: u64) -> u32 {
        self.blocks.live_pages(block)
    }

    /// The FTL's mirror of a block's remaining erases.
    pub fn erases_left(&self, block: u64) -> u32 {
        self.blocks.erases_left(block)
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn translate_read(&mut self, lba: u64) -> Option<Address> {
        if lba > self.largest_lba {
            self.stats.refused_reads += 1;
            debug!("read of LBA {} beyond largest LBA {}", lba, self.largest_lba);
            return None;
        }
        match self.map.lookup(lba) {
            Some(page) => {
                self.stats.host_reads += 1;
                Some(self.geometry.page_address(page))
            }
            None => {
                self.stats.refused_reads += 1;
                None
            }
        }
    }

    fn translate_write<P: PagePayload>(
        &mut self,
        lba: u64,
        exec: &mut ExecCallback<'_, P>,
    ) -> DeviceResult<Option<Address>> {
        if lba > self.largest_lba {
            self.stats.refused_writes += 1;
            debug!("write of LBA {} beyond largest LBA {}", lba, self.largest_lba);
            return Ok(None);
        }
        // Mark the previous copy dead before hunting for space: on a fully
        // mapped device the page this write supersedes is the only
        // reclaimable slack, and cleaning must be allowed to see it.
        let prev = self.map.unbind_lba(lba);
        if let Some(prev) = prev {
            self.blocks.note_page_dead(self.geometry.block_of_page(prev));
        }
        if !self.ensure_tip_capacity(exec)? {
            // The refused write must not lose the old copy. Cleaning never
            // erased its block: a block with a dead page always yields a
            // tip with room, so the pass rotation would have succeeded.
            if let Some(prev) = prev {
                let tick = self.tick();
                self.map.bind(lba, prev);
                self.blocks.note_write(self.geometry.block_of_page(prev), tick);
            }
            self.stats.refused_writes += 1;
            warn!("write of LBA {} refused: no clean pages after cleaning", lba);
            return Ok(None);
        }
        let page = self
            .claim_tip_page()
            .expect("tip was just ensured to have room");
        let displaced = self.map.bind(lba, page);
        debug_assert_eq!(displaced, None);
        let tick = self.tick();
        self.blocks.note_write(self.geometry.block_of_page(page), tick);
        self.stats.host_writes += 1;
        Ok(Some(self.geometry.page_address(page)))
    }

    fn apply_trim(&mut self, lba: u64) -> bool {
        if lba > self.largest_lba {
            return false;
        }
        if let Some(page) = self.map.unbind_lba(lba) {
            self.blocks.note_page_dead(self.geometry.block_of_page(page));
            debug!("trimmed LBA {} (was page {})", lba, page);
        }
        self.stats.trims += 1;
        true
    }

    /// Makes sure the tip has at least one clean page: a filled tip is
    /// retired to the used list and a fresh one is taken from the free
    /// pool, or produced by cleaning once the pool has run dry. Returns
    /// false when space is exhausted.
    fn ensure_tip_capacity<P: PagePayload>(
        &mut self,
        exec: &mut ExecCallback<'_, P>,
    ) -> DeviceResult<bool> {
        if let Some(tip) = self.tip {
            if (tip.offset as u64) < self.geometry.pages_per_block as u64 {
                return Ok(true);
            }
            self.retire_tip();
        }
        if let Some(block) = self.free.pop_front() {
            self.tip = Some(LogTip { block, offset: 0 });
            debug!("log tip allocated from the free pool: block {}", block);
            return Ok(true);
        }
        // The pool is dry: cleaning passes produce the next tip. A pass on
        // a fully live victim yields a tip with no room and only rotates
        // the victim through the reserve, so bound the attempts by the
        // number of candidates.
        let mut attempts = self.used.len();
        loop {
            let tip = match self.clean_once(exec)? {
                Some(tip) => tip,
                None => return Ok(false),
            };
            let has_room = (tip.offset as u64) < self.geometry.pages_per_block as u64;
            self.tip = Some(tip);
            if has_room {
                return Ok(true);
            }
            self.retire_tip();
            if attempts == 0 {
                warn!("cleaning produced no room: every candidate is fully live");
                return Ok(false);
            }
            attempts -= 1;
        }
    }

    /// Moves the filled tip onto the used list.
    fn retire_tip(&mut self) {
        if let Some(tip) = self.tip.take() {
            debug_assert_eq!(tip.offset as u64, self.geometry.pages_per_block as u64);
            debug!("log tip retired: block {}", tip.block);
            self.used.push(tip.block);
        }
    }

    /// Hands out the next clean page at the tip.
    fn claim_tip_page(&mut self) -> Option<u64> {
        let tip = self.tip.as_mut()?;
        if (tip.offset as u64) >= self.geometry.pages_per_block as u64 {
            return None;
        }
        let page = tip.block * self.geometry.pages_per_block as u64 + tip.offset as u64;
        tip.offset += 1;
        Some(page)
    }

    /// One cleaning pass: select a victim, migrate its LIVE pages into the
    /// cleaning block, erase it, and swap roles. On success returns the
    /// append target produced by the pass: the erased victim itself when it
    /// held no live data, or the primed former cleaning block otherwise.
    fn clean_once<P: PagePayload>(
        &mut self,
        exec: &mut ExecCallback<'_, P>,
    ) -> DeviceResult<Option<LogTip>> {
        let victim = match self.policy.select_victim(&self.used, &self.blocks, self.clock) {
            Some(victim) => victim,
            None => {
                self.stats.gc_aborts += 1;
                return Ok(None);
            }
        };
        if self.blocks.erases_left(victim) == 0 {
            self.stats.gc_aborts += 1;
            warn!("cleaning aborted: victim block {} is out of erases", victim);
            return Ok(None);
        }

        let live = self.blocks.live_pages(victim);
        let tip = if live == 0 {
            // nothing to carry over; the erased victim serves directly
            self.erase_victim(victim, exec)?;
            LogTip {
                block: victim,
                offset: 0,
            }
        } else {
            let migrated = self.migrate_live_pages(victim, exec)?;
            debug_assert_eq!(migrated, live as u64);
            self.erase_victim(victim, exec)?;
            let primed = LogTip {
                block: self.reserve,
                offset: live,
            };
            self.reserve = victim;
            primed
        };
        self.stats.gc_passes += 1;
        debug!(
            "cleaned block {}: {} pages migrated, {} erases left",
            victim,
            live,
            self.blocks.erases_left(victim)
        );
        Ok(Some(tip))
    }

    /// Erases a fully dead victim and drops it from the used list.
    fn erase_victim<P: PagePayload>(
        &mut self,
        victim: u64,
        exec: &mut ExecCallback<'_, P>,
    ) -> DeviceResult<()> {
        exec.execute(OpCode::Erase, self.geometry.block_address(victim))?;
        self.blocks.note_erase(victim);
        self.stats.erases += 1;
        self.used.retain(|&block| block != victim);
        Ok(())
    }

    /// Relocates every LIVE page of the victim into the cleaning block, as
    /// matched READ/WRITE pairs in issue order.
    fn migrate_live_pages<P: PagePayload>(
        &mut self,
        victim: u64,
        exec: &mut ExecCallback<'_, P>,
    ) -> DeviceResult<u64> {
        debug_assert_ne!(victim, self.reserve);
        let mut migrated = 0u64;
        for page in self.geometry.block_page_range(victim) {
            let lba = match self.map.lba_at(page) {
                Some(lba) => lba,
                None => continue,
            };
            exec.execute(OpCode::Read, self.geometry.page_address(page))?;
            let dest = self.reserve * self.geometry.pages_per_block as u64 + migrated;
            exec.execute(OpCode::Write, self.geometry.page_address(dest))?;
            let displaced = self.map.bind(lba, dest);
            debug_assert_eq!(displaced, Some(page));
            self.blocks.note_page_dead(victim);
            let tick = self.tick();
            self.blocks.note_write(self.geometry.block_of_page(dest), tick);
            self.stats.migrated_pages += 1;
            migrated += 1;
        }
        Ok(migrated)
    }

    /// Exhaustively cross-checks the mapping tables, the per-block
    /// counters, and the allocator lists. Returns a description of the
    /// first violation found.
    pub fn verify_invariants(&self) -> Result<(), String> {
        if !self.map.is_consistent() {
            return Err("logical and physical maps disagree".to_string());
        }
        let mut seen = vec![0u32; self.geometry.num_blocks() as usize];
        for &block in self.free.iter() {
            seen[block as usize] += 1;
        }
        for &block in &self.used {
            seen[block as usize] += 1;
        }
        seen[self.reserve as usize] += 1;
        if let Some(tip) = self.tip {
            seen[tip.block as usize] += 1;
            if tip.offset as u64 > self.geometry.pages_per_block as u64 {
                return Err(format!("tip offset {} beyond block size", tip.offset));
            }
            for page in self.geometry.block_page_range(tip.block) {
                let offset = page % self.geometry.pages_per_block as u64;
                if offset >= tip.offset as u64 && self.map.lba_at(page).is_some() {
                    return Err(format!("page {page} mapped beyond the tip offset"));
                }
            }
        }
        for (block, &count) in seen.iter().enumerate() {
            if count != 1 {
                return Err(format!(
                    "block {block} appears {count} times across free/used/tip/reserve"
                ));
            }
        }
        for page in self.geometry.block_page_range(self.reserve) {
            if self.map.lba_at(page).is_some() {
                return Err(format!("cleaning block holds mapped page {page}"));
            }
        }
        for block in 0..self.geometry.num_blocks() {
            let mapped = self
                .geometry
                .block_page_range(block)
                .filter(|&page| self.map.lba_at(page).is_some())
                .count() as u32;
            if mapped != self.blocks.live_pages(block) {
                return Err(format!(
                    "block {} live-page counter {} disagrees with {} mapped pages",
                    block,
                    self.blocks.live_pages(block),
                    mapped
                ));
            }
            if self.blocks.erases_left(block) > self.blocks.erase_budget() {
                return Err(format!("block {block} erase counter above budget"));
            }
        }
        for &block in self.free.iter() {
            if self.blocks.live_pages(block) != 0 {
                return Err(format!("free block {block} has live pages"));
            }
        }
        Ok(())
    }
}

impl<P: PagePayload> FlashTranslation<P> for LogStructuredFtl {
    fn read_translate(
        &mut self,
        lba: u64,
        _exec: ExecCallback<'_, P>,
    ) -> DeviceResult<Option<Address>> {
        Ok(self.translate_read(lba))
    }

    fn write_translate(
        &mut self,
        lba: u64,
        mut exec: ExecCallback<'_, P>,
    ) -> DeviceResult<Option<Address>> {
        self.translate_write(lba, &mut exec)
    }

    fn trim(&mut self, lba: u64, _exec: ExecCallback<'_, P>) -> DeviceResult<bool> {
        Ok(self.apply_trim(lba))
    }
}
