//! Property-based exploration of the simulator.

use proptest::prelude::*;

use flashsim_device::Geometry;
use flashsim_ftl::{FlashConfig, GcPolicyKind};

use crate::harness::SimRig;

/// A host-visible operation, possibly slightly out of range.
#[derive(Debug, Clone)]
enum HostOp {
    Write(u64, u32),
    Read(u64),
    Trim(u64),
}

fn any_policy() -> impl Strategy<Value = GcPolicyKind> {
    prop_oneof![
        Just(GcPolicyKind::RoundRobin),
        Just(GcPolicyKind::Lru),
        Just(GcPolicyKind::Greedy),
        Just(GcPolicyKind::CostBenefit),
    ]
}

fn any_op(largest_lba: u64) -> impl Strategy<Value = HostOp> {
    let lba = 0..=largest_lba + 4;
    prop_oneof![
        (lba.clone(), any::<u32>()).prop_map(|(lba, value)| HostOp::Write(lba, value)),
        lba.clone().prop_map(HostOp::Read),
        lba.prop_map(HostOp::Trim),
    ]
}

fn small_config(policy: GcPolicyKind) -> FlashConfig {
    FlashConfig {
        ssd_size: 1,
        package_size: 1,
        die_size: 1,
        plane_size: 4,
        block_size: 8,
        block_erases: 100,
        overprovisioning: 25,
        gc_policy: policy,
    }
}

proptest! {
    /// Any operation sequence keeps the FTL consistent with a shadow model
    /// and with its own invariants (the rig checks them after every op).
    #[test]
    fn test_random_ops_match_shadow_model(
        policy in any_policy(),
        ops in proptest::collection::vec(any_op(23), 1..200),
    ) {
        let config = small_config(policy);
        let largest = config.largest_lba();
        let mut rig = SimRig::new(config);
        for op in ops {
            match op {
                HostOp::Write(lba, value) => {
                    let accepted = rig.write(lba, value).unwrap();
                    // with a generous erase budget only out-of-range
                    // writes may be refused
                    prop_assert_eq!(accepted, lba <= largest);
                }
                HostOp::Read(lba) => {
                    rig.read_verified(lba).unwrap();
                }
                HostOp::Trim(lba) => {
                    let accepted = rig.trim(lba).unwrap();
                    prop_assert_eq!(accepted, lba <= largest);
                }
            }
        }
        rig.scan_all().unwrap();
    }

    /// Trim breaks the mapping: a trimmed LBA reads back as refused until
    /// rewritten.
    #[test]
    fn test_trim_makes_reads_fail(
        lba in 0u64..=23,
        value in any::<u32>(),
    ) {
        let mut rig = SimRig::new(small_config(GcPolicyKind::RoundRobin));
        prop_assert!(rig.write(lba, value).unwrap());
        prop_assert!(rig.trim(lba).unwrap());
        prop_assert_eq!(rig.read_verified(lba).unwrap(), None);
        // trim is idempotent
        prop_assert!(rig.trim(lba).unwrap());
        prop_assert_eq!(rig.read_verified(lba).unwrap(), None);
        // and the LBA is usable again afterwards
        prop_assert!(rig.write(lba, value.wrapping_add(1)).unwrap());
        prop_assert_eq!(rig.read_verified(lba).unwrap(), Some(value.wrapping_add(1)));
    }

    /// The address codec round-trips over arbitrary geometries.
    #[test]
    fn test_codec_round_trip(
        (geometry, index) in (1u32..4, 1u32..4, 1u32..4, 1u32..6, 1u32..9)
            .prop_flat_map(|(packages, dies, planes, blocks, pages)| {
                let geometry = Geometry {
                    packages,
                    dies_per_package: dies,
                    planes_per_die: planes,
                    blocks_per_plane: blocks,
                    pages_per_block: pages,
                };
                (Just(geometry), 0..geometry.num_pages())
            }),
    ) {
        let addr = geometry.page_address(index);
        prop_assert!(geometry.contains(addr));
        prop_assert_eq!(geometry.page_index(addr), index);
        let block = geometry.block_of_page(index);
        prop_assert!(geometry.block_page_range(block).contains(&index));
        prop_assert_eq!(geometry.block_index(geometry.block_address(block)), block);
    }
}
