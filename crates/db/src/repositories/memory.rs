use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use tierbatch_core::batch::{
    ChunkWrite, ChunkWriteSummary, CustomerPage, CustomerStore, RunStore, StoreError, TierStore,
};
use tierbatch_core::domain::customer::{Customer, CustomerId, RejectedCustomerRow};
use tierbatch_core::domain::run::{BatchRun, BatchRunId, RunKey, RunStatus};
use tierbatch_core::domain::tier::MembershipTier;

#[derive(Clone, Debug)]
struct StoredCustomer {
    customer: Customer,
    /// Set when the stored amount cannot be decoded.
    malformed_amount: Option<String>,
    deleted: bool,
}

#[derive(Default)]
struct MemoryState {
    tiers: Vec<MembershipTier>,
    customers: BTreeMap<CustomerId, StoredCustomer>,
    runs: Vec<BatchRun>,
    committed_chunks: Vec<ChunkWrite>,
    pages_served: usize,
    deletions_after_page: Vec<(usize, CustomerId)>,
    fail_write_at_chunk: Option<u32>,
}

/// In-memory customer, tier and run storage sharing one lock.
#[derive(Default)]
pub struct InMemoryMembershipStore {
    state: RwLock<MemoryState>,
}

impl InMemoryMembershipStore {
    pub async fn insert_tier(&self, tier: MembershipTier) {
        let mut state = self.state.write().await;
        state.tiers.retain(|existing| existing.id != tier.id);
        state.tiers.push(tier);
    }

    pub async fn insert_customer(&self, customer: Customer) {
        let mut state = self.state.write().await;
        state.customers.insert(
            customer.id,
            StoredCustomer { customer, malformed_amount: None, deleted: false },
        );
    }

    /// Stores a customer whose amount column holds text that is not a decimal.
    pub async fn insert_malformed_customer(&self, customer: Customer, raw_amount: &str) {
        let mut state = self.state.write().await;
        state.customers.insert(
            customer.id,
            StoredCustomer {
                customer,
                malformed_amount: Some(raw_amount.to_string()),
                deleted: false,
            },
        );
    }

    pub async fn insert_run(&self, run: BatchRun) {
        self.state.write().await.runs.push(run);
    }

    pub async fn soft_delete(&self, id: CustomerId) -> bool {
        let mut state = self.state.write().await;
        match state.customers.get_mut(&id) {
            Some(stored) if !stored.deleted => {
                stored.deleted = true;
                true
            }
            _ => false,
        }
    }

    /// Soft-deletes `id` as soon as `pages` pages have been served.
    pub async fn delete_after_pages(&self, pages: usize, id: CustomerId) {
        self.state.write().await.deletions_after_page.push((pages, id));
    }

    /// Makes the write of chunk `chunk_index` fail without applying anything.
    pub async fn fail_write_at_chunk(&self, chunk_index: Option<u32>) {
        self.state.write().await.fail_write_at_chunk = chunk_index;
    }

    pub async fn customer(&self, id: CustomerId) -> Option<Customer> {
        let state = self.state.read().await;
        state.customers.get(&id).map(|stored| stored.customer.clone())
    }

    pub async fn committed_chunks(&self) -> Vec<ChunkWrite> {
        self.state.read().await.committed_chunks.clone()
    }

    pub async fn runs(&self) -> Vec<BatchRun> {
        self.state.read().await.runs.clone()
    }
}

#[async_trait]
impl CustomerStore for InMemoryMembershipStore {
    async fn read_page(
        &self,
        after: Option<CustomerId>,
        limit: u32,
    ) -> Result<CustomerPage, StoreError> {
        let mut state = self.state.write().await;
        let mut page = CustomerPage::default();

        let live = state
            .customers
            .values()
            .filter(|stored| !stored.deleted)
            .filter(|stored| after.map_or(true, |after| stored.customer.id > after))
            .take(limit as usize);
        for stored in live {
            match &stored.malformed_amount {
                Some(raw) => page.rejected.push(RejectedCustomerRow {
                    customer_id: stored.customer.id,
                    reason: format!("invalid decimal for `monthly_purchase_amount`: `{raw}`"),
                }),
                None => page.customers.push(stored.customer.clone()),
            }
        }

        state.pages_served += 1;
        let served = state.pages_served;
        let due: Vec<CustomerId> = state
            .deletions_after_page
            .iter()
            .filter(|(pages, _)| *pages == served)
            .map(|(_, id)| *id)
            .collect();
        for id in due {
            if let Some(stored) = state.customers.get_mut(&id) {
                stored.deleted = true;
            }
        }

        Ok(page)
    }

    async fn write_chunk(&self, chunk: &ChunkWrite) -> Result<ChunkWriteSummary, StoreError> {
        let mut state = self.state.write().await;

        if state.fail_write_at_chunk == Some(chunk.chunk_index) {
            return Err(StoreError::Unavailable(format!(
                "write rejected for chunk {}",
                chunk.chunk_index
            )));
        }

        let run_index = state
            .runs
            .iter()
            .position(|run| run.id == chunk.run_id && run.status == RunStatus::Running)
            .ok_or_else(|| StoreError::NotFound(format!("no running batch run `{}`", chunk.run_id)))?;

        let mut summary = ChunkWriteSummary::default();
        for update in chunk.tier_updates.iter().filter(|update| !update.customer_ids.is_empty()) {
            summary.tier_statements += 1;
            for id in &update.customer_ids {
                if let Some(stored) = state.customers.get_mut(id).filter(|stored| !stored.deleted) {
                    stored.customer.tier_id = update.tier_id;
                    summary.tier_rows_updated += 1;
                }
            }
        }
        for id in &chunk.reset_ids {
            if let Some(stored) = state.customers.get_mut(id).filter(|stored| !stored.deleted) {
                stored.customer.monthly_purchase_amount = Decimal::ZERO;
                summary.reset_rows_updated += 1;
            }
        }

        let run = &mut state.runs[run_index];
        run.last_customer_id = Some(chunk.checkpoint);
        run.chunks_committed += 1;
        run.customers_processed += chunk.processed;
        run.customers_skipped += chunk.skipped;
        run.statements_issued += summary.tier_statements;
        run.updated_at = Utc::now();

        state.committed_chunks.push(chunk.clone());
        Ok(summary)
    }
}

#[async_trait]
impl TierStore for InMemoryMembershipStore {
    async fn load_tiers(&self) -> Result<Vec<MembershipTier>, StoreError> {
        let mut tiers = self.state.read().await.tiers.clone();
        tiers.sort_by(|left, right| right.baseline.cmp(&left.baseline));
        Ok(tiers)
    }
}

#[async_trait]
impl RunStore for InMemoryMembershipStore {
    async fn latest_for_key(&self, run_key: &RunKey) -> Result<Option<BatchRun>, StoreError> {
        let state = self.state.read().await;
        Ok(state.runs.iter().rev().find(|run| &run.run_key == run_key).cloned())
    }

    async fn find_active(&self) -> Result<Option<BatchRun>, StoreError> {
        let state = self.state.read().await;
        Ok(state.runs.iter().rev().find(|run| run.status == RunStatus::Running).cloned())
    }

    async fn start_run(&self, run: &BatchRun) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(active) = state.runs.iter().find(|run| run.status == RunStatus::Running) {
            return Err(StoreError::Conflict(format!("run {} is already running", active.id)));
        }
        state.runs.push(run.clone());
        Ok(())
    }

    async fn finish_run(
        &self,
        id: &BatchRunId,
        status: RunStatus,
        error: Option<String>,
        finished_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let run = state
            .runs
            .iter_mut()
            .find(|run| &run.id == id && run.status == RunStatus::Running)
            .ok_or_else(|| StoreError::NotFound(format!("no running batch run `{id}`")))?;

        run.status = status;
        run.error = error;
        run.finished_at = Some(finished_at);
        run.updated_at = finished_at;
        Ok(())
    }

    async fn recent_runs(&self, limit: u32) -> Result<Vec<BatchRun>, StoreError> {
        let state = self.state.read().await;
        Ok(state.runs.iter().rev().take(limit as usize).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use tierbatch_core::batch::{BulkTierUpdate, ChunkWrite, CustomerStore, RunStore, StoreError};
    use tierbatch_core::domain::customer::{Customer, CustomerId};
    use tierbatch_core::domain::run::{BatchRun, BatchRunId, RunKey, RunStatus};
    use tierbatch_core::domain::tier::TierId;

    use super::InMemoryMembershipStore;

    fn customer(id: i64, amount: i64) -> Customer {
        Customer {
            id: CustomerId(id),
            name: format!("customer-{id}"),
            monthly_purchase_amount: Decimal::from(amount),
            tier_id: TierId(4),
        }
    }

    fn running(id: &str, key: &str) -> BatchRun {
        BatchRun::start(
            BatchRunId(id.to_string()),
            RunKey(key.to_string()),
            None,
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn pages_skip_deleted_and_respect_cursor() {
        let store = InMemoryMembershipStore::default();
        for id in 1..=5 {
            store.insert_customer(customer(id, 100)).await;
        }
        store.soft_delete(CustomerId(2)).await;

        let first = store.read_page(None, 2).await.expect("first page");
        let second = store.read_page(first.last_id(), 2).await.expect("second page");

        let ids = |page: &tierbatch_core::batch::CustomerPage| {
            page.customers.iter().map(|customer| customer.id.0).collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), vec![1, 3]);
        assert_eq!(ids(&second), vec![4, 5]);
    }

    #[tokio::test]
    async fn second_active_run_is_a_conflict() {
        let store = InMemoryMembershipStore::default();
        store.start_run(&running("run-a", "2026-11-01")).await.expect("first run");

        let second = store.start_run(&running("run-b", "2026-12-01")).await;

        assert!(matches!(second, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn chunk_write_skips_deleted_rows_and_advances_checkpoint() {
        let store = InMemoryMembershipStore::default();
        store.insert_customer(customer(1, 500)).await;
        store.insert_customer(customer(2, 700)).await;
        store.soft_delete(CustomerId(2)).await;
        store.start_run(&running("run-a", "2026-11-01")).await.expect("start");

        let summary = store
            .write_chunk(&ChunkWrite {
                run_id: BatchRunId("run-a".to_string()),
                chunk_index: 0,
                tier_updates: vec![BulkTierUpdate {
                    tier_id: TierId(2),
                    customer_ids: vec![CustomerId(1), CustomerId(2)],
                }],
                reset_ids: vec![CustomerId(1), CustomerId(2)],
                checkpoint: CustomerId(2),
                processed: 2,
                skipped: 0,
            })
            .await
            .expect("write chunk");

        assert_eq!(summary.tier_statements, 1);
        assert_eq!(summary.tier_rows_updated, 1);
        assert_eq!(summary.reset_rows_updated, 1);

        let updated = store.customer(CustomerId(1)).await.expect("customer 1");
        assert_eq!(updated.tier_id, TierId(2));
        assert_eq!(updated.monthly_purchase_amount, Decimal::ZERO);

        let run = store.runs().await.remove(0);
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.last_customer_id, Some(CustomerId(2)));
        assert_eq!(run.chunks_committed, 1);
    }
}
