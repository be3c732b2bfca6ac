use std::collections::BTreeMap;

use crate::batch::ports::{BulkTierUpdate, ChunkWrite};
use crate::domain::customer::CustomerId;
use crate::domain::run::{BatchRunId, TierAssignment};
use crate::domain::tier::TierId;

/// Groups a chunk's assignments into one bulk update per distinct tier.
///
/// Updates are ordered by tier id and ids within an update keep chunk order, so the same
/// chunk always produces the same statements.
pub fn group_by_tier(assignments: &[TierAssignment]) -> Vec<BulkTierUpdate> {
    let mut grouped: BTreeMap<TierId, Vec<CustomerId>> = BTreeMap::new();
    for assignment in assignments {
        grouped.entry(assignment.tier_id).or_default().push(assignment.customer_id);
    }

    grouped
        .into_iter()
        .map(|(tier_id, customer_ids)| BulkTierUpdate { tier_id, customer_ids })
        .collect()
}

pub fn build_chunk_write(
    run_id: &BatchRunId,
    chunk_index: u32,
    assignments: &[TierAssignment],
    checkpoint: CustomerId,
    skipped: u64,
) -> ChunkWrite {
    ChunkWrite {
        run_id: run_id.clone(),
        chunk_index,
        tier_updates: group_by_tier(assignments),
        reset_ids: assignments.iter().map(|assignment| assignment.customer_id).collect(),
        checkpoint,
        processed: assignments.len() as u64,
        skipped,
    }
}
