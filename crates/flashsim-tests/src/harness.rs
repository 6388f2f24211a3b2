//! Test rig wiring a configuration into an FTL and a controller.

use std::collections::HashMap;

use tracing::debug;

use flashsim_device::{Controller, DeviceResult};
use flashsim_ftl::{FlashConfig, FtlStats, LogStructuredFtl};

/// Installs a human-readable subscriber for tests that want log output.
/// Safe to call from several tests; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_test_writer()
        .try_init();
}

/// A complete simulator instance plus a shadow model of what every LBA is
/// expected to hold.
///
/// Every host operation is followed by a full invariant check of the FTL's
/// tables, so a workload that silently corrupts state fails at the first
/// corrupting operation rather than at the final read-back.
pub struct SimRig {
    config: FlashConfig,
    controller: Controller<u32, LogStructuredFtl>,
    expected: HashMap<u64, u32>,
}

impl SimRig {
    /// Builds the rig from a configuration.
    pub fn new(config: FlashConfig) -> Self {
        let ftl = LogStructuredFtl::new(&config).expect("test configuration must validate");
        let controller = Controller::new(config.geometry(), config.block_erases, ftl);
        Self {
            config,
            controller,
            expected: HashMap::new(),
        }
    }

    /// The configuration the rig was built from.
    pub fn config(&self) -> &FlashConfig {
        &self.config
    }

    /// Direct access to the controller.
    pub fn controller(&mut self) -> &mut Controller<u32, LogStructuredFtl> {
        &mut self.controller
    }

    /// Current FTL statistics.
    pub fn stats(&self) -> FtlStats {
        self.controller.ftl().stats()
    }

    /// Writes an LBA, updating the shadow model on success.
    pub fn write(&mut self, lba: u64, value: u32) -> DeviceResult<bool> {
        let accepted = self.controller.write(lba, value)?;
        if accepted {
            self.expected.insert(lba, value);
        }
        self.check_invariants();
        Ok(accepted)
    }

    /// Reads an LBA and checks the result against the shadow model.
    pub fn read_verified(&mut self, lba: u64) -> DeviceResult<Option<u32>> {
        let observed = self.controller.read(lba)?;
        assert_eq!(
            observed,
            self.expected.get(&lba).copied(),
            "LBA {lba} disagrees with the shadow model"
        );
        self.check_invariants();
        Ok(observed)
    }

    /// Trims an LBA, updating the shadow model on success.
    pub fn trim(&mut self, lba: u64) -> DeviceResult<bool> {
        let accepted = self.controller.trim(lba)?;
        if accepted {
            self.expected.remove(&lba);
        }
        self.check_invariants();
        Ok(accepted)
    }

    /// Reads back every LBA the shadow model knows about.
    pub fn scan_all(&mut self) -> DeviceResult<()> {
        let lbas: Vec<u64> = self.expected.keys().copied().collect();
        debug!("scanning {} mapped LBAs", lbas.len());
        for lba in lbas {
            self.read_verified(lba)?;
        }
        Ok(())
    }

    fn check_invariants(&self) {
        if let Err(violation) = self.controller.ftl().verify_invariants() {
            panic!("FTL invariant violated: {violation}");
        }
    }
}
