use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use tierbatch_core::batch::{StoreError, TierStore};
use tierbatch_core::domain::tier::{MembershipTier, TierId};

use super::{format_timestamp, parse_decimal, RepositoryError};
use crate::DbPool;

pub struct SqlTierRepository {
    pool: DbPool,
}

impl SqlTierRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, tier: &MembershipTier) -> Result<(), RepositoryError> {
        let now = format_timestamp(Utc::now());
        sqlx::query(
            "INSERT INTO membership_tier (id, name, baseline, discount_rate, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                baseline = excluded.baseline,
                discount_rate = excluded.discount_rate,
                updated_at = excluded.updated_at",
        )
        .bind(tier.id.0)
        .bind(&tier.name)
        .bind(tier.baseline.to_string())
        .bind(tier.discount_rate.to_string())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Baselines are stored as text, so ordering happens after decoding.
    pub async fn list_descending(&self) -> Result<Vec<MembershipTier>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, CAST(baseline AS TEXT) AS baseline,
                    CAST(discount_rate AS TEXT) AS discount_rate
             FROM membership_tier
             ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tiers = rows.iter().map(tier_from_row).collect::<Result<Vec<_>, _>>()?;
        tiers.sort_by(|left, right| right.baseline.cmp(&left.baseline));
        Ok(tiers)
    }
}

#[async_trait]
impl TierStore for SqlTierRepository {
    async fn load_tiers(&self) -> Result<Vec<MembershipTier>, StoreError> {
        self.list_descending().await.map_err(StoreError::from)
    }
}

fn tier_from_row(row: &SqliteRow) -> Result<MembershipTier, RepositoryError> {
    let baseline: String = row.try_get("baseline")?;
    let discount_rate: String = row.try_get("discount_rate")?;

    Ok(MembershipTier {
        id: TierId(row.try_get("id")?),
        name: row.try_get("name")?,
        baseline: parse_decimal("baseline", &baseline)?,
        discount_rate: parse_decimal("discount_rate", &discount_rate)?,
    })
}
