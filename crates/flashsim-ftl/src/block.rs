//! Per-block runtime accounting.

use serde::{Deserialize, Serialize};

/// Region a block was assigned to at construction time.
///
/// The role is advisory: any block may serve as a data or log block at
/// runtime. It only records which side of the over-provisioning boundary
/// the block fell on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockRole {
    /// Backs the addressable LBA range.
    Data,
    /// Reserved beyond the addressable range.
    Spare,
}

/// Accounting for one erase block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockState {
    live_pages: u32,
    erases_left: u32,
    last_write_tick: u64,
    role: BlockRole,
}

/// Table of per-block counters, indexed by linear block index.
///
/// The table mirrors the controller's erase ledger on the FTL side and adds
/// the live-page counts and write-recency data the cleaner's policies need.
#[derive(Debug, Clone)]
pub struct BlockTable {
    blocks: Vec<BlockState>,
    pages_per_block: u32,
    erase_budget: u32,
}

impl BlockTable {
    /// Creates the table with every block clean, carrying its full erase
    /// budget. Blocks below `num_data_blocks` get the data role, the rest
    /// the spare role.
    pub fn new(
        num_blocks: u64,
        pages_per_block: u32,
        erase_budget: u32,
        num_data_blocks: u64,
    ) -> Self {
        let blocks = (0..num_blocks)
            .map(|block| BlockState {
                live_pages: 0,
                erases_left: erase_budget,
                last_write_tick: 0,
                role: if block < num_data_blocks {
                    BlockRole::Data
                } else {
                    BlockRole::Spare
                },
            })
            .collect();
        Self {
            blocks,
            pages_per_block,
            erase_budget,
        }
    }

    /// Number of blocks tracked.
    pub fn len(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// Returns true when the table tracks no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Per-block erase budget the table was built with.
    pub fn erase_budget(&self) -> u32 {
        self.erase_budget
    }

    /// Pages per block the table was built with.
    pub fn pages_per_block(&self) -> u32 {
        self.pages_per_block
    }

    /// LIVE pages currently in a block.
    pub fn live_pages(&self, block: u64) -> u32 {
        self.blocks[block as usize].live_pages
    }

    /// Erases remaining for a block.
    pub fn erases_left(&self, block: u64) -> u32 {
        self.blocks[block as usize].erases_left
    }

    /// Logical time of the last write into a block.
    pub fn last_write_tick(&self, block: u64) -> u64 {
        self.blocks[block as usize].last_write_tick
    }

    /// Assignment-time role of a block.
    pub fn role(&self, block: u64) -> BlockRole {
        self.blocks[block as usize].role
    }

    /// Records a page write into a block.
    pub fn note_write(&mut self, block: u64, tick: u64) {
        let state = &mut self.blocks[block as usize];
        assert!(
            state.live_pages < self.pages_per_block,
            "live-page counter overflow for block {block}"
        );
        state.live_pages += 1;
        state.last_write_tick = tick;
    }

    /// Records a LIVE-to-DEAD page transition in a block.
    pub fn note_page_dead(&mut self, block: u64) {
        let state = &mut self.blocks[block as usize];
        assert!(
            state.live_pages > 0,
            "live-page counter underflow for block {block}"
        );
        state.live_pages -= 1;
    }

    /// Records an erase of a fully dead block.
    pub fn note_erase(&mut self, block: u64) {
        let state = &mut self.blocks[block as usize];
        assert_eq!(
            state.live_pages, 0,
            "erase of block {block} with live pages"
        );
        assert!(
            state.erases_left > 0,
            "erase of worn-out block {block}"
        );
        state.erases_left -= 1;
    }

    /// Returns true if at least one block has no erases remaining.
    pub fn any_worn_out(&self) -> bool {
        self.blocks.iter().any(|state| state.erases_left == 0)
    }
}
