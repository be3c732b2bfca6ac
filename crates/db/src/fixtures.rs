use rust_decimal::Decimal;
use serde::Serialize;

use tierbatch_core::domain::customer::{Customer, CustomerId};
use tierbatch_core::domain::tier::{MembershipTier, TierId};

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlCustomerRepository, SqlTierRepository};

struct SeedTier {
    id: i64,
    name: &'static str,
    baseline: i64,
    /// Discount in basis points.
    discount_bps: i64,
}

struct SeedCustomer {
    id: i64,
    name: &'static str,
    amount: i64,
    tier_id: i64,
}

const SEED_TIERS: &[SeedTier] = &[
    SeedTier { id: 1, name: "DIAMOND", baseline: 10_000_000, discount_bps: 1_000 },
    SeedTier { id: 2, name: "GOLD", baseline: 1_000_000, discount_bps: 500 },
    SeedTier { id: 3, name: "SILVER", baseline: 100_000, discount_bps: 300 },
    SeedTier { id: 4, name: "BRONZE", baseline: 0, discount_bps: 100 },
];

/// Amounts cover every tier plus exact baseline boundaries.
const SEED_CUSTOMERS: &[SeedCustomer] = &[
    SeedCustomer { id: 1, name: "Ada Park", amount: 12_500_000, tier_id: 4 },
    SeedCustomer { id: 2, name: "Ben Ortiz", amount: 10_000_000, tier_id: 2 },
    SeedCustomer { id: 3, name: "Chae Yoon", amount: 1_000_000, tier_id: 3 },
    SeedCustomer { id: 4, name: "Dara Kim", amount: 999_999, tier_id: 2 },
    SeedCustomer { id: 5, name: "Eli Moreau", amount: 100_000, tier_id: 4 },
    SeedCustomer { id: 6, name: "Fay Novak", amount: 50_000, tier_id: 3 },
    SeedCustomer { id: 7, name: "Gus Lind", amount: 0, tier_id: 1 },
    SeedCustomer { id: 8, name: "Hana Sato", amount: 2_750_000, tier_id: 4 },
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeedResult {
    pub tiers: usize,
    pub customers: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub tiers_present: usize,
    pub customers_present: usize,
    pub missing: Vec<String>,
}

impl VerificationResult {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Deterministic demo dataset. Loading twice restores the same rows.
pub struct MembershipSeedDataset;

impl MembershipSeedDataset {
    pub fn tiers() -> Vec<MembershipTier> {
        SEED_TIERS
            .iter()
            .map(|tier| MembershipTier {
                id: TierId(tier.id),
                name: tier.name.to_string(),
                baseline: Decimal::from(tier.baseline),
                discount_rate: Decimal::new(tier.discount_bps, 4),
            })
            .collect()
    }

    pub fn customers() -> Vec<Customer> {
        SEED_CUSTOMERS
            .iter()
            .map(|customer| Customer {
                id: CustomerId(customer.id),
                name: customer.name.to_string(),
                monthly_purchase_amount: Decimal::from(customer.amount),
                tier_id: TierId(customer.tier_id),
            })
            .collect()
    }

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let tier_repo = SqlTierRepository::new(pool.clone());
        let customer_repo = SqlCustomerRepository::new(pool.clone());

        let tiers = Self::tiers();
        for tier in &tiers {
            tier_repo.save(tier).await?;
        }

        let customers = Self::customers();
        for customer in &customers {
            customer_repo.save(customer).await?;
        }

        Ok(SeedResult { tiers: tiers.len(), customers: customers.len() })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let tier_repo = SqlTierRepository::new(pool.clone());
        let customer_repo = SqlCustomerRepository::new(pool.clone());
        let mut missing = Vec::new();

        let stored_tiers = tier_repo.list_descending().await?;
        let mut tiers_present = 0;
        for tier in Self::tiers() {
            if stored_tiers.iter().any(|stored| stored.id == tier.id && stored.name == tier.name) {
                tiers_present += 1;
            } else {
                missing.push(format!("tier {}", tier.name));
            }
        }

        let mut customers_present = 0;
        for customer in Self::customers() {
            if customer_repo.find_by_id(customer.id).await?.is_some() {
                customers_present += 1;
            } else {
                missing.push(format!("customer {}", customer.id));
            }
        }

        Ok(VerificationResult { tiers_present, customers_present, missing })
    }
}

#[cfg(test)]
mod tests {
    use tierbatch_core::tiers::{resolve_tier, TierTable};

    use super::MembershipSeedDataset;
    use crate::{connect_with_settings, migrations};

    #[test]
    fn seed_tiers_form_a_valid_table() {
        let table = TierTable::new(MembershipSeedDataset::tiers()).expect("valid seed tiers");

        assert!(table.has_zero_floor());
        assert_eq!(table.tiers().len(), 4);
    }

    #[test]
    fn seed_customers_span_every_tier() {
        let table = TierTable::new(MembershipSeedDataset::tiers()).expect("valid seed tiers");
        let mut resolved: Vec<i64> = MembershipSeedDataset::customers()
            .iter()
            .map(|customer| resolve_tier(customer.monthly_purchase_amount, &table).0)
            .collect();
        resolved.sort_unstable();
        resolved.dedup();

        assert_eq!(resolved, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn load_is_idempotent_and_verifies() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");

        let first = MembershipSeedDataset::load(&pool).await.expect("first load");
        let second = MembershipSeedDataset::load(&pool).await.expect("second load");
        let verification = MembershipSeedDataset::verify(&pool).await.expect("verify");

        assert_eq!(first, second);
        assert!(verification.is_complete(), "missing: {:?}", verification.missing);
        assert_eq!(verification.customers_present, 8);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customer")
            .fetch_one(&pool)
            .await
            .expect("count customers");
        assert_eq!(count, 8);
    }
}
