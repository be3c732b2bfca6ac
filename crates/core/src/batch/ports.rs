use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::customer::{Customer, CustomerId, RejectedCustomerRow};
use crate::domain::run::{BatchRun, BatchRunId, RunKey, RunStatus};
use crate::domain::tier::{MembershipTier, TierId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
}

/// One page of the customer cursor, ordered by customer id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomerPage {
    pub customers: Vec<Customer>,
    pub rejected: Vec<RejectedCustomerRow>,
}

impl CustomerPage {
    /// Rows on the page, decoded or not. A short page ends the cursor.
    pub(crate) fn len(&self) -> usize {
        self.customers.len() + self.rejected.len()
    }

    /// Highest id seen on the page, decoded or not. The next page starts after it.
    pub fn last_id(&self) -> Option<CustomerId> {
        let decoded = self.customers.iter().map(|customer| customer.id);
        let rejected = self.rejected.iter().map(|row| row.customer_id);
        decoded.chain(rejected).max()
    }
}

/// A single "set tier = X for ids in (...)" statement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkTierUpdate {
    pub tier_id: TierId,
    pub customer_ids: Vec<CustomerId>,
}

/// Everything committed atomically for one chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkWrite {
    pub run_id: BatchRunId,
    pub chunk_index: u32,
    pub tier_updates: Vec<BulkTierUpdate>,
    /// Customers whose monthly amount is reset to zero.
    pub reset_ids: Vec<CustomerId>,
    /// Checkpoint recorded on the run row with the chunk.
    pub checkpoint: CustomerId,
    pub processed: u64,
    pub skipped: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkWriteSummary {
    pub tier_statements: u64,
    pub tier_rows_updated: u64,
    pub reset_rows_updated: u64,
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// Returns up to `limit` live customers with an id greater than `after`, ordered by id.
    async fn read_page(
        &self,
        after: Option<CustomerId>,
        limit: u32,
    ) -> Result<CustomerPage, StoreError>;

    /// Applies the chunk's tier updates, monthly reset and run checkpoint in one transaction.
    async fn write_chunk(&self, chunk: &ChunkWrite) -> Result<ChunkWriteSummary, StoreError>;
}

#[async_trait]
pub trait TierStore: Send + Sync {
    /// All tiers, sorted descending by baseline.
    async fn load_tiers(&self) -> Result<Vec<MembershipTier>, StoreError>;
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn latest_for_key(&self, run_key: &RunKey) -> Result<Option<BatchRun>, StoreError>;

    /// Any run currently marked running, regardless of key.
    async fn find_active(&self) -> Result<Option<BatchRun>, StoreError>;

    /// Inserts a running run. Fails with [`StoreError::Conflict`] if another run is active.
    async fn start_run(&self, run: &BatchRun) -> Result<(), StoreError>;

    async fn finish_run(
        &self,
        id: &BatchRunId,
        status: RunStatus,
        error: Option<String>,
        finished_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn recent_runs(&self, limit: u32) -> Result<Vec<BatchRun>, StoreError>;
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::CustomerPage;
    use crate::domain::customer::{Customer, CustomerId, RejectedCustomerRow};
    use crate::domain::tier::TierId;

    #[test]
    fn last_id_covers_rejected_rows() {
        let page = CustomerPage {
            customers: vec![Customer {
                id: CustomerId(3),
                name: "kim".to_string(),
                monthly_purchase_amount: Decimal::ZERO,
                tier_id: TierId(1),
            }],
            rejected: vec![RejectedCustomerRow {
                customer_id: CustomerId(7),
                reason: "bad amount".to_string(),
            }],
        };

        assert_eq!(page.len(), 2);
        assert_eq!(page.last_id(), Some(CustomerId(7)));
        assert_eq!(CustomerPage::default().last_id(), None);
    }
}
