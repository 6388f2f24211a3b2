//! Long-running endurance workloads: sustained random rewrites and
//! wear-out behavior.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use flashsim_device::Controller;
use flashsim_ftl::{FlashConfig, GcPolicyKind, LogStructuredFtl};

use crate::harness::init_tracing;

fn stress_config() -> FlashConfig {
    FlashConfig {
        ssd_size: 1,
        package_size: 1,
        die_size: 1,
        plane_size: 4,
        block_size: 128,
        block_erases: 500,
        overprovisioning: 25,
        gc_policy: GcPolicyKind::Greedy,
    }
}

fn build_controller(config: &FlashConfig) -> Controller<u32, LogStructuredFtl> {
    let ftl = LogStructuredFtl::new(config).expect("stress configuration must validate");
    Controller::new(config.geometry(), config.block_erases, ftl)
}

#[test]
fn test_random_rewrite_stress_then_full_scan() {
    // 500 x 128 random writes over the LBAs of one block's worth of
    // address space, each verified by an immediate read, then a full scan.
    init_tracing();
    let config = stress_config();
    let mut ctrl = build_controller(&config);
    let mut rng = StdRng::seed_from_u64(15746);
    let mut expected = [None::<u32>; 128];

    let rounds = 500 * 128u64;
    for round in 0..rounds {
        let lba = rng.random_range(0..128u64);
        let value = rng.random::<u32>();
        assert!(
            ctrl.write(lba, value).unwrap(),
            "write {round} to LBA {lba} was refused"
        );
        expected[lba as usize] = Some(value);
        assert_eq!(ctrl.read(lba).unwrap(), Some(value));
        if round % 4096 == 0 {
            ctrl.ftl().verify_invariants().unwrap();
        }
    }

    for lba in 0..128u64 {
        assert_eq!(
            ctrl.read(lba).unwrap(),
            expected[lba as usize],
            "scan disagrees at LBA {lba}"
        );
    }
    assert!(ctrl.total_erases() > 0);
    ctrl.ftl().verify_invariants().unwrap();
}

#[test]
fn test_writes_fail_only_after_a_block_wears_out() {
    // Drive sequential rewrites over the whole address space until a write
    // is refused; at that point at least one block must actually be worn
    // to zero. Refusing earlier would be giving up while cleaning is still
    // possible.
    init_tracing();
    let config = FlashConfig {
        ssd_size: 1,
        package_size: 1,
        die_size: 1,
        plane_size: 4,
        block_size: 16,
        block_erases: 3,
        overprovisioning: 25,
        gc_policy: GcPolicyKind::RoundRobin,
    };
    let lba_span = config.largest_lba() + 1;
    let mut ctrl = build_controller(&config);

    let mut writes = 0u64;
    loop {
        let lba = writes % lba_span;
        if !ctrl.write(lba, writes as u32).unwrap() {
            break;
        }
        writes += 1;
        assert!(writes < 100_000, "writes never started failing");
    }

    assert!(
        ctrl.any_block_worn_out(),
        "write refused after {writes} writes while every block still had erases"
    );
    ctrl.ftl().verify_invariants().unwrap();
    // surviving data is still readable after the device gave out
    let mut readable = 0u64;
    for lba in 0..lba_span {
        if ctrl.read(lba).unwrap().is_some() {
            readable += 1;
        }
    }
    assert!(readable > 0);
}

#[test]
fn test_wear_spreads_across_blocks() {
    // Uniform rewrites under round-robin cleaning must rotate every block
    // through log duty rather than hammering a single one.
    let config = FlashConfig {
        ssd_size: 1,
        package_size: 1,
        die_size: 1,
        plane_size: 8,
        block_size: 16,
        block_erases: 200,
        overprovisioning: 25,
        gc_policy: GcPolicyKind::RoundRobin,
    };
    let lba_span = config.largest_lba() + 1;
    let mut ctrl = build_controller(&config);

    for round in 0..4_000u64 {
        assert!(ctrl.write(round % lba_span, round as u32).unwrap());
    }

    let budget = config.block_erases;
    let erased_blocks = (0..config.num_blocks())
        .filter(|&block| ctrl.remaining_erases(block) < budget)
        .count() as u64;
    assert!(
        erased_blocks >= config.num_blocks() - 2,
        "only {erased_blocks} of {} blocks were ever cleaned",
        config.num_blocks()
    );
}
