//! Physical addressing: the hierarchical 5-tuple address and the flat-index codec.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Physical page address as (package, die, plane, block, page).
///
/// Pages are the atomic unit of read and write. Block-level operations
/// (erase) ignore the page component. The field widths keep the whole
/// address packable into a single 64-bit word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// Package index within the SSD.
    pub package: u8,
    /// Die index within the package.
    pub die: u8,
    /// Plane index within the die.
    pub plane: u16,
    /// Block index within the plane.
    pub block: u16,
    /// Page index within the block.
    pub page: u16,
}

impl Address {
    /// Creates a fully specified page address.
    pub fn new(package: u8, die: u8, plane: u16, block: u16, page: u16) -> Self {
        Self {
            package,
            die,
            plane,
            block,
            page,
        }
    }

    /// Returns the same address with the page component zeroed, i.e. the
    /// block-level form used by erase operations.
    pub fn block_start(self) -> Self {
        Self { page: 0, ..self }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(pkg {}, die {}, plane {}, block {}, page {})",
            self.package, self.die, self.plane, self.block, self.page
        )
    }
}

/// Flash geometry: the five configured dimensions of the device.
///
/// The geometry defines a bijection between hierarchical addresses and the
/// flat page-index space `[0, num_pages)` via lexicographic base conversion.
/// Both directions of the codec are total on their domain; out-of-range
/// inputs are programming errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    /// Number of packages in the SSD.
    pub packages: u32,
    /// Number of dies per package.
    pub dies_per_package: u32,
    /// Number of planes per die.
    pub planes_per_die: u32,
    /// Number of blocks per plane.
    pub blocks_per_plane: u32,
    /// Number of pages per block (the erase-unit size).
    pub pages_per_block: u32,
}

impl Geometry {
    /// Pages in one plane.
    pub fn pages_per_plane(&self) -> u64 {
        self.pages_per_block as u64 * self.blocks_per_plane as u64
    }

    /// Pages in one die.
    pub fn pages_per_die(&self) -> u64 {
        self.pages_per_plane() * self.planes_per_die as u64
    }

    /// Pages in one package.
    pub fn pages_per_package(&self) -> u64 {
        self.pages_per_die() * self.dies_per_package as u64
    }

    /// Total number of blocks in the device.
    pub fn num_blocks(&self) -> u64 {
        self.packages as u64
            * self.dies_per_package as u64
            * self.planes_per_die as u64
            * self.blocks_per_plane as u64
    }

    /// Total number of pages in the device.
    pub fn num_pages(&self) -> u64 {
        self.num_blocks() * self.pages_per_block as u64
    }

    /// Returns true when every component of `addr` lies within its bound.
    pub fn contains(&self, addr: Address) -> bool {
        (addr.package as u32) < self.packages
            && (addr.die as u32) < self.dies_per_package
            && (addr.plane as u32) < self.planes_per_die
            && (addr.block as u32) < self.blocks_per_plane
            && (addr.page as u32) < self.pages_per_block
    }

    /// Encodes a hierarchical address into its flat page index.
    pub fn page_index(&self, addr: Address) -> u64 {
        debug_assert!(self.contains(addr), "address {addr} out of geometry");
        addr.page as u64
            + addr.block as u64 * self.pages_per_block as u64
            + addr.plane as u64 * self.pages_per_plane()
            + addr.die as u64 * self.pages_per_die()
            + addr.package as u64 * self.pages_per_package()
    }

    /// Decodes a flat page index back into its hierarchical address.
    pub fn page_address(&self, index: u64) -> Address {
        debug_assert!(index < self.num_pages(), "page index {index} out of geometry");
        let (package, rest) = (index / self.pages_per_package(), index % self.pages_per_package());
        let (die, rest) = (rest / self.pages_per_die(), rest % self.pages_per_die());
        let (plane, rest) = (rest / self.pages_per_plane(), rest % self.pages_per_plane());
        let (block, page) = (
            rest / self.pages_per_block as u64,
            rest % self.pages_per_block as u64,
        );
        Address {
            package: package as u8,
            die: die as u8,
            plane: plane as u16,
            block: block as u16,
            page: page as u16,
        }
    }

    /// Encodes the linear block index of an address.
    pub fn block_index(&self, addr: Address) -> u64 {
        self.page_index(addr.block_start()) / self.pages_per_block as u64
    }

    /// Decodes a linear block index into the address of its first page.
    pub fn block_address(&self, block: u64) -> Address {
        debug_assert!(block < self.num_blocks(), "block index {block} out of geometry");
        self.page_address(block * self.pages_per_block as u64)
    }

    /// Linear block index of the block containing a flat page index.
    pub fn block_of_page(&self, index: u64) -> u64 {
        index / self.pages_per_block as u64
    }

    /// The flat page-index span covered by a block.
    pub fn block_page_range(&self, block: u64) -> Range<u64> {
        let start = block * self.pages_per_block as u64;
        start..start + self.pages_per_block as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_geometry() -> Geometry {
        Geometry {
            packages: 2,
            dies_per_package: 3,
            planes_per_die: 2,
            blocks_per_plane: 4,
            pages_per_block: 8,
        }
    }

    #[test]
    fn test_derived_counts() {
        let g = test_geometry();
        assert_eq!(g.num_blocks(), 2 * 3 * 2 * 4);
        assert_eq!(g.num_pages(), 2 * 3 * 2 * 4 * 8);
        assert_eq!(g.pages_per_plane(), 32);
        assert_eq!(g.pages_per_die(), 64);
        assert_eq!(g.pages_per_package(), 192);
    }

    #[test]
    fn test_page_codec_round_trip() {
        let g = test_geometry();
        for index in 0..g.num_pages() {
            let addr = g.page_address(index);
            assert!(g.contains(addr));
            assert_eq!(g.page_index(addr), index);
        }
    }

    #[test]
    fn test_page_codec_is_lexicographic() {
        let g = test_geometry();
        assert_eq!(g.page_index(Address::new(0, 0, 0, 0, 0)), 0);
        assert_eq!(g.page_index(Address::new(0, 0, 0, 0, 1)), 1);
        assert_eq!(g.page_index(Address::new(0, 0, 0, 1, 0)), 8);
        assert_eq!(g.page_index(Address::new(0, 0, 1, 0, 0)), 32);
        assert_eq!(g.page_index(Address::new(0, 1, 0, 0, 0)), 64);
        assert_eq!(g.page_index(Address::new(1, 0, 0, 0, 0)), 192);
    }

    #[test]
    fn test_block_codec_round_trip() {
        let g = test_geometry();
        for block in 0..g.num_blocks() {
            let addr = g.block_address(block);
            assert_eq!(addr.page, 0);
            assert_eq!(g.block_index(addr), block);
        }
    }

    #[test]
    fn test_block_page_range() {
        let g = test_geometry();
        let span = g.block_page_range(3);
        assert_eq!(span, 24..32);
        for index in span {
            assert_eq!(g.block_of_page(index), 3);
        }
    }

    #[test]
    fn test_block_start_zeroes_page() {
        let addr = Address::new(1, 2, 3, 4, 5);
        let start = addr.block_start();
        assert_eq!(start.page, 0);
        assert_eq!(start.block, 4);
    }

    #[test]
    fn test_display_names_all_components() {
        let addr = Address::new(1, 2, 3, 4, 5);
        let text = format!("{addr}");
        assert!(text.contains("pkg 1"));
        assert!(text.contains("page 5"));
    }
}
