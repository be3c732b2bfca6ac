use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqliteConnection};

use tierbatch_core::batch::{ChunkWrite, ChunkWriteSummary, CustomerPage, CustomerStore, StoreError};
use tierbatch_core::domain::customer::{Customer, CustomerId, RejectedCustomerRow};
use tierbatch_core::domain::tier::TierId;

use super::{format_timestamp, parse_decimal, to_i64, RepositoryError};
use crate::DbPool;

pub struct SqlCustomerRepository {
    pool: DbPool,
}

impl SqlCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, CAST(monthly_purchase_amount AS TEXT) AS monthly_purchase_amount, tier_id
             FROM customer
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| customer_from_row(&row)).transpose()
    }

    pub async fn save(&self, customer: &Customer) -> Result<(), RepositoryError> {
        let now = format_timestamp(Utc::now());
        sqlx::query(
            "INSERT INTO customer (id, name, monthly_purchase_amount, tier_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                monthly_purchase_amount = excluded.monthly_purchase_amount,
                tier_id = excluded.tier_id,
                updated_at = excluded.updated_at",
        )
        .bind(customer.id.0)
        .bind(&customer.name)
        .bind(customer.monthly_purchase_amount.to_string())
        .bind(customer.tier_id.0)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn soft_delete(
        &self,
        id: CustomerId,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE customer SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(format_timestamp(deleted_at))
        .bind(format_timestamp(deleted_at))
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn read_live_page(
        &self,
        after: Option<CustomerId>,
        limit: u32,
    ) -> Result<CustomerPage, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, CAST(monthly_purchase_amount AS TEXT) AS monthly_purchase_amount, tier_id
             FROM customer
             WHERE deleted_at IS NULL AND id > ?
             ORDER BY id ASC
             LIMIT ?",
        )
        .bind(after.map(|id| id.0).unwrap_or(i64::MIN))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut page = CustomerPage::default();
        for row in rows {
            match customer_from_row(&row) {
                Ok(customer) => page.customers.push(customer),
                Err(RepositoryError::Decode(reason)) => {
                    let id: i64 = row.try_get("id")?;
                    page.rejected.push(RejectedCustomerRow { customer_id: CustomerId(id), reason });
                }
                Err(other) => return Err(other),
            }
        }

        Ok(page)
    }

    async fn commit_chunk(&self, chunk: &ChunkWrite) -> Result<ChunkWriteSummary, RepositoryError> {
        let now = format_timestamp(Utc::now());
        let mut summary = ChunkWriteSummary::default();
        let mut tx = self.pool.begin().await?;

        for update in &chunk.tier_updates {
            if update.customer_ids.is_empty() {
                continue;
            }
            let mut builder = QueryBuilder::<Sqlite>::new("UPDATE customer SET tier_id = ");
            builder.push_bind(update.tier_id.0);
            builder.push(", updated_at = ");
            builder.push_bind(now.clone());
            builder.push(" WHERE deleted_at IS NULL AND id IN ");
            push_id_list(&mut builder, &update.customer_ids);

            let result = builder.build().execute(&mut *tx).await?;
            summary.tier_statements += 1;
            summary.tier_rows_updated += result.rows_affected();
        }

        if !chunk.reset_ids.is_empty() {
            let mut builder = QueryBuilder::<Sqlite>::new(
                "UPDATE customer SET monthly_purchase_amount = '0', updated_at = ",
            );
            builder.push_bind(now.clone());
            builder.push(" WHERE deleted_at IS NULL AND id IN ");
            push_id_list(&mut builder, &chunk.reset_ids);

            let result = builder.build().execute(&mut *tx).await?;
            summary.reset_rows_updated = result.rows_affected();
        }

        record_checkpoint(&mut tx, chunk, summary.tier_statements, &now).await?;
        tx.commit().await?;

        Ok(summary)
    }
}

#[async_trait]
impl CustomerStore for SqlCustomerRepository {
    async fn read_page(
        &self,
        after: Option<CustomerId>,
        limit: u32,
    ) -> Result<CustomerPage, StoreError> {
        self.read_live_page(after, limit).await.map_err(StoreError::from)
    }

    async fn write_chunk(&self, chunk: &ChunkWrite) -> Result<ChunkWriteSummary, StoreError> {
        self.commit_chunk(chunk).await.map_err(StoreError::from)
    }
}

fn push_id_list(builder: &mut QueryBuilder<'_, Sqlite>, ids: &[CustomerId]) {
    builder.push("(");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id.0);
    }
    separated.push_unseparated(")");
}

/// Advances the run row inside the chunk transaction. The run must still be running.
async fn record_checkpoint(
    conn: &mut SqliteConnection,
    chunk: &ChunkWrite,
    statements: u64,
    now: &str,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        "UPDATE batch_run SET
            last_customer_id = ?,
            chunks_committed = chunks_committed + 1,
            customers_processed = customers_processed + ?,
            customers_skipped = customers_skipped + ?,
            statements_issued = statements_issued + ?,
            updated_at = ?
         WHERE id = ? AND status = 'running'",
    )
    .bind(chunk.checkpoint.0)
    .bind(to_i64("customers_processed", chunk.processed)?)
    .bind(to_i64("customers_skipped", chunk.skipped)?)
    .bind(to_i64("statements_issued", statements)?)
    .bind(now)
    .bind(&chunk.run_id.0)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound(format!("no running batch run `{}`", chunk.run_id)));
    }

    Ok(())
}

fn customer_from_row(row: &SqliteRow) -> Result<Customer, RepositoryError> {
    // Any unreadable amount (non-UTF-8 text, blobs) rejects the row, not the page.
    let raw_amount: String = row.try_get("monthly_purchase_amount").map_err(|error| {
        RepositoryError::Decode(format!("unreadable `monthly_purchase_amount`: {error}"))
    })?;

    Ok(Customer {
        id: CustomerId(row.try_get("id")?),
        name: row.try_get("name")?,
        monthly_purchase_amount: parse_decimal("monthly_purchase_amount", &raw_amount)?,
        tier_id: TierId(row.try_get("tier_id")?),
    })
}
