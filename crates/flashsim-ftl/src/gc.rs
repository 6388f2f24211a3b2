//! Victim-selection policies for the cleaner.
//!
//! Selection is a pure function over the retired-block list and the
//! per-block counters, dispatched through a tagged variant; the policies
//! themselves keep no state of their own.

use serde::{Deserialize, Serialize};

use crate::block::BlockTable;
use crate::config::ConfigError;

/// Victim-selection policy for the cleaner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GcPolicyKind {
    /// FIFO over the order in which blocks were retired to the used list.
    RoundRobin,
    /// Least-recently-written block.
    Lru,
    /// Block with the fewest LIVE pages, tie-broken by lowest block index.
    Greedy,
    /// Maximize `((1 - u) / (1 + u)) * age` where `u` is the live-page
    /// utilization against twice the block size and `age` is the logical
    /// time since the block's last write.
    CostBenefit,
}

impl TryFrom<u32> for GcPolicyKind {
    type Error = ConfigError;

    /// Maps the integer `SELECTED_GC_POLICY` selector onto a policy.
    fn try_from(selector: u32) -> Result<Self, ConfigError> {
        match selector {
            0 => Ok(Self::RoundRobin),
            1 => Ok(Self::Lru),
            2 => Ok(Self::Greedy),
            3 => Ok(Self::CostBenefit),
            other => Err(ConfigError::UnknownGcPolicy(other)),
        }
    }
}

impl GcPolicyKind {
    /// Picks a victim among the retired log blocks. `used` is in retirement
    /// order; `now` is the cleaner's logical clock. Returns `None` when no
    /// block has been retired yet.
    pub fn select_victim(&self, used: &[u64], blocks: &BlockTable, now: u64) -> Option<u64> {
        match self {
            Self::RoundRobin => used.first().copied(),
            Self::Lru => used
                .iter()
                .copied()
                .min_by_key(|&block| (blocks.last_write_tick(block), block)),
            Self::Greedy => used
                .iter()
                .copied()
                .min_by_key(|&block| (blocks.live_pages(block), block)),
            Self::CostBenefit => {
                let score = |block: u64| {
                    let age = now.saturating_sub(blocks.last_write_tick(block));
                    cost_benefit_score(blocks.live_pages(block), blocks.pages_per_block(), age)
                };
                used.iter().copied().max_by(|&a, &b| {
                    score(a)
                        .partial_cmp(&score(b))
                        .expect("cost-benefit scores are finite")
                        // prefer the lower block index on equal scores
                        .then(b.cmp(&a))
                })
            }
        }
    }
}

/// The cost-benefit figure of merit: reclaimable space per unit of copying
/// cost, weighted by how long the block has been cold.
fn cost_benefit_score(live_pages: u32, pages_per_block: u32, age: u64) -> f64 {
    let u = live_pages as f64 / (2.0 * pages_per_block as f64);
    ((1.0 - u) / (1.0 + u)) * age as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_writes(writes: &[(u64, u64, u32)]) -> BlockTable {
        // (block, tick, live pages) triples
        let mut table = BlockTable::new(8, 16, 10, 8);
        for &(block, tick, live) in writes {
            for i in 0..live {
                table.note_write(block, tick + i as u64);
            }
        }
        table
    }

    #[test]
    fn test_selector_mapping() {
        assert_eq!(GcPolicyKind::try_from(0), Ok(GcPolicyKind::RoundRobin));
        assert_eq!(GcPolicyKind::try_from(1), Ok(GcPolicyKind::Lru));
        assert_eq!(GcPolicyKind::try_from(2), Ok(GcPolicyKind::Greedy));
        assert_eq!(GcPolicyKind::try_from(3), Ok(GcPolicyKind::CostBenefit));
        assert_eq!(
            GcPolicyKind::try_from(4),
            Err(ConfigError::UnknownGcPolicy(4))
        );
    }

    #[test]
    fn test_no_victim_without_used_blocks() {
        let table = table_with_writes(&[]);
        for policy in [
            GcPolicyKind::RoundRobin,
            GcPolicyKind::Lru,
            GcPolicyKind::Greedy,
            GcPolicyKind::CostBenefit,
        ] {
            assert_eq!(policy.select_victim(&[], &table, 100), None);
        }
    }

    #[test]
    fn test_round_robin_takes_retirement_order() {
        let table = table_with_writes(&[(2, 1, 4), (5, 2, 1)]);
        let used = vec![5, 2];
        assert_eq!(
            GcPolicyKind::RoundRobin.select_victim(&used, &table, 100),
            Some(5)
        );
    }

    #[test]
    fn test_lru_takes_oldest_write() {
        let table = table_with_writes(&[(1, 50, 1), (2, 10, 1), (3, 30, 1)]);
        let used = vec![1, 2, 3];
        assert_eq!(
            GcPolicyKind::Lru.select_victim(&used, &table, 100),
            Some(2)
        );
    }

    #[test]
    fn test_greedy_takes_fewest_live_pages() {
        let table = table_with_writes(&[(1, 1, 8), (2, 1, 3), (3, 1, 5)]);
        let used = vec![1, 2, 3];
        assert_eq!(
            GcPolicyKind::Greedy.select_victim(&used, &table, 100),
            Some(2)
        );
    }

    #[test]
    fn test_greedy_tie_breaks_by_lowest_index() {
        let table = table_with_writes(&[(4, 1, 2), (1, 1, 2), (6, 1, 2)]);
        let used = vec![4, 1, 6];
        assert_eq!(
            GcPolicyKind::Greedy.select_victim(&used, &table, 100),
            Some(1)
        );
    }

    #[test]
    fn test_cost_benefit_prefers_cold_sparse_blocks() {
        // block 1: nearly full and recently written; block 2: sparse and cold
        let table = table_with_writes(&[(1, 90, 14), (2, 5, 2)]);
        let used = vec![1, 2];
        assert_eq!(
            GcPolicyKind::CostBenefit.select_victim(&used, &table, 110),
            Some(2)
        );
    }

    #[test]
    fn test_cost_benefit_score_shape() {
        // emptier blocks score higher at equal age
        assert!(cost_benefit_score(0, 16, 10) > cost_benefit_score(8, 16, 10));
        // older blocks score higher at equal utilization
        assert!(cost_benefit_score(4, 16, 20) > cost_benefit_score(4, 16, 10));
    }
}
