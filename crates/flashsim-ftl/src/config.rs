//! Simulator configuration surface and derived geometry constants.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use flashsim_device::Geometry;

use crate::gc::GcPolicyKind;

/// Error variants for configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A geometry dimension or the erase budget was zero.
    #[error("{field} must be a positive integer")]
    ZeroField {
        /// Name of the offending option.
        field: &'static str,
    },

    /// A geometry dimension exceeded the width of its address component.
    #[error("{field} = {value} exceeds the addressable maximum {max}")]
    FieldTooLarge {
        /// Name of the offending option.
        field: &'static str,
        /// Configured value.
        value: u64,
        /// Largest representable value for the component.
        max: u64,
    },

    /// The over-provisioning percentage was not in `[0, 100)`.
    #[error("overprovisioning must be below 100 percent, got {0}")]
    OverprovisioningOutOfRange(u32),

    /// Over-provisioning rounded up to the whole device, leaving no
    /// addressable data blocks.
    #[error("overprovisioning of {op} percent leaves no addressable blocks")]
    NoAddressableBlocks {
        /// The configured percentage.
        op: u32,
    },

    /// The geometry cannot host both a log tip and a cleaning block.
    #[error("geometry must provide at least two blocks, got {blocks}")]
    TooFewBlocks {
        /// Total number of blocks in the configured geometry.
        blocks: u64,
    },

    /// The integer GC-policy selector did not name a known policy.
    #[error("unknown GC policy selector {0}")]
    UnknownGcPolicy(u32),
}

/// Full simulator configuration: geometry, endurance, over-provisioning,
/// and the cleaning policy.
///
/// Field names mirror the recognized configuration options (`SSD_SIZE`,
/// `PACKAGE_SIZE`, `DIE_SIZE`, `PLANE_SIZE`, `BLOCK_SIZE`, `BLOCK_ERASES`,
/// `OVERPROVISIONING`, `SELECTED_GC_POLICY`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashConfig {
    /// Number of packages in the SSD.
    pub ssd_size: u32,
    /// Number of dies per package.
    pub package_size: u32,
    /// Number of planes per die.
    pub die_size: u32,
    /// Number of blocks per plane.
    pub plane_size: u32,
    /// Number of pages per block.
    pub block_size: u32,
    /// Erase budget per block.
    pub block_erases: u32,
    /// Blocks reserved beyond the addressable range, as a percentage of the
    /// total block count, in `[0, 100)`.
    pub overprovisioning: u32,
    /// Victim-selection policy for the cleaner.
    pub gc_policy: GcPolicyKind,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            ssd_size: 4,
            package_size: 8,
            die_size: 2,
            plane_size: 10,
            block_size: 16,
            block_erases: 100,
            overprovisioning: 5,
            gc_policy: GcPolicyKind::RoundRobin,
        }
    }
}

impl FlashConfig {
    /// The configured geometry.
    pub fn geometry(&self) -> Geometry {
        Geometry {
            packages: self.ssd_size,
            dies_per_package: self.package_size,
            planes_per_die: self.die_size,
            blocks_per_plane: self.plane_size,
            pages_per_block: self.block_size,
        }
    }

    /// Total number of blocks in the device.
    pub fn num_blocks(&self) -> u64 {
        self.geometry().num_blocks()
    }

    /// Blocks reserved for over-provisioning, rounded half-up.
    pub fn num_op_blocks(&self) -> u64 {
        (self.num_blocks() * self.overprovisioning as u64 + 50) / 100
    }

    /// Blocks backing the addressable LBA range.
    pub fn num_data_blocks(&self) -> u64 {
        self.num_blocks() - self.num_op_blocks()
    }

    /// Total number of pages in the device.
    pub fn num_pages(&self) -> u64 {
        self.geometry().num_pages()
    }

    /// Highest addressable LBA.
    pub fn largest_lba(&self) -> u64 {
        self.num_data_blocks() * self.block_size as u64 - 1
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive: [(&'static str, u64); 6] = [
            ("SSD_SIZE", self.ssd_size as u64),
            ("PACKAGE_SIZE", self.package_size as u64),
            ("DIE_SIZE", self.die_size as u64),
            ("PLANE_SIZE", self.plane_size as u64),
            ("BLOCK_SIZE", self.block_size as u64),
            ("BLOCK_ERASES", self.block_erases as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::ZeroField { field });
            }
        }
        let widths: [(&'static str, u64, u64); 5] = [
            ("SSD_SIZE", self.ssd_size as u64, u8::MAX as u64 + 1),
            ("PACKAGE_SIZE", self.package_size as u64, u8::MAX as u64 + 1),
            ("DIE_SIZE", self.die_size as u64, u16::MAX as u64 + 1),
            ("PLANE_SIZE", self.plane_size as u64, u16::MAX as u64 + 1),
            ("BLOCK_SIZE", self.block_size as u64, u16::MAX as u64 + 1),
        ];
        for (field, value, max) in widths {
            if value > max {
                return Err(ConfigError::FieldTooLarge { field, value, max });
            }
        }
        if self.overprovisioning >= 100 {
            return Err(ConfigError::OverprovisioningOutOfRange(
                self.overprovisioning,
            ));
        }
        if self.num_data_blocks() == 0 {
            return Err(ConfigError::NoAddressableBlocks {
                op: self.overprovisioning,
            });
        }
        if self.num_blocks() < 2 {
            return Err(ConfigError::TooFewBlocks {
                blocks: self.num_blocks(),
            });
        }
        Ok(())
    }
}
