use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use tierbatch_core::batch::{RunStore, StoreError};
use tierbatch_core::domain::customer::CustomerId;
use tierbatch_core::domain::run::{BatchRun, BatchRunId, RunKey, RunStatus};

use super::{
    format_timestamp, parse_optional_timestamp, parse_timestamp, parse_u32, parse_u64, to_i64,
    RepositoryError,
};
use crate::DbPool;

const RUN_COLUMNS: &str = "id, run_key, status, resumed_from, last_customer_id, chunks_committed,
    customers_processed, customers_skipped, statements_issued, error, started_at, updated_at,
    finished_at";

pub struct SqlBatchRunRepository {
    pool: DbPool,
}

impl SqlBatchRunRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: &BatchRunId) -> Result<Option<BatchRun>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {RUN_COLUMNS} FROM batch_run WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| run_from_row(&row)).transpose()
    }

    async fn insert(&self, run: &BatchRun) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO batch_run (
                id,
                run_key,
                status,
                resumed_from,
                last_customer_id,
                chunks_committed,
                customers_processed,
                customers_skipped,
                statements_issued,
                error,
                started_at,
                updated_at,
                finished_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&run.id.0)
        .bind(&run.run_key.0)
        .bind(run.status.as_str())
        .bind(run.resumed_from.as_ref().map(|id| id.0.as_str()))
        .bind(run.last_customer_id.map(|id| id.0))
        .bind(i64::from(run.chunks_committed))
        .bind(to_i64("customers_processed", run.customers_processed)?)
        .bind(to_i64("customers_skipped", run.customers_skipped)?)
        .bind(to_i64("statements_issued", run.statements_issued)?)
        .bind(run.error.as_deref())
        .bind(format_timestamp(run.started_at))
        .bind(format_timestamp(run.updated_at))
        .bind(run.finished_at.map(format_timestamp))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_finished(
        &self,
        id: &BatchRunId,
        status: RunStatus,
        error: Option<String>,
        finished_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let finished_at = format_timestamp(finished_at);
        let result = sqlx::query(
            "UPDATE batch_run SET status = ?, error = ?, finished_at = ?, updated_at = ?
             WHERE id = ? AND status = 'running'",
        )
        .bind(status.as_str())
        .bind(error.as_deref())
        .bind(&finished_at)
        .bind(&finished_at)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("no running batch run `{id}`")));
        }

        Ok(())
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        bind: Option<&str>,
    ) -> Result<Option<BatchRun>, RepositoryError> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM batch_run WHERE {clause}
             ORDER BY started_at DESC, rowid DESC LIMIT 1"
        );
        let mut query = sqlx::query(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }

        let row = query.fetch_optional(&self.pool).await?;
        row.map(|row| run_from_row(&row)).transpose()
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<BatchRun>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM batch_run ORDER BY started_at DESC, rowid DESC LIMIT ?"
        ))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(run_from_row).collect()
    }
}

#[async_trait]
impl RunStore for SqlBatchRunRepository {
    async fn latest_for_key(&self, run_key: &RunKey) -> Result<Option<BatchRun>, StoreError> {
        self.fetch_one_where("run_key = ?", Some(run_key.as_str())).await.map_err(StoreError::from)
    }

    async fn find_active(&self) -> Result<Option<BatchRun>, StoreError> {
        self.fetch_one_where("status = 'running'", None).await.map_err(StoreError::from)
    }

    async fn start_run(&self, run: &BatchRun) -> Result<(), StoreError> {
        self.insert(run).await.map_err(StoreError::from)
    }

    async fn finish_run(
        &self,
        id: &BatchRunId,
        status: RunStatus,
        error: Option<String>,
        finished_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.mark_finished(id, status, error, finished_at).await.map_err(StoreError::from)
    }

    async fn recent_runs(&self, limit: u32) -> Result<Vec<BatchRun>, StoreError> {
        self.list_recent(limit).await.map_err(StoreError::from)
    }
}

fn run_from_row(row: &SqliteRow) -> Result<BatchRun, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = RunStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown batch run status `{status_raw}`")))?;

    Ok(BatchRun {
        id: BatchRunId(row.try_get("id")?),
        run_key: RunKey(row.try_get("run_key")?),
        status,
        resumed_from: row.try_get::<Option<String>, _>("resumed_from")?.map(BatchRunId),
        last_customer_id: row.try_get::<Option<i64>, _>("last_customer_id")?.map(CustomerId),
        chunks_committed: parse_u32("chunks_committed", row.try_get("chunks_committed")?)?,
        customers_processed: parse_u64(
            "customers_processed",
            row.try_get("customers_processed")?,
        )?,
        customers_skipped: parse_u64("customers_skipped", row.try_get("customers_skipped")?)?,
        statements_issued: parse_u64("statements_issued", row.try_get("statements_issued")?)?,
        error: row.try_get("error")?,
        started_at: parse_timestamp("started_at", row.try_get("started_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
        finished_at: parse_optional_timestamp("finished_at", row.try_get("finished_at")?)?,
    })
}
