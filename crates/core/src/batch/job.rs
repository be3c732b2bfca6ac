//! Monthly membership tier recalculation.
//!
//! The job walks every live customer in id order, one chunk at a time:
//! read a page through the [`CustomerStore`] cursor, resolve each customer's tier, then commit
//! grouped tier updates, the monthly reset and the run checkpoint together. Chunks that were
//! committed before a failure stay committed; the run row records where to resume.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::batch::ports::{CustomerPage, CustomerStore, RunStore, StoreError, TierStore};
use crate::batch::processor::TierAssignmentProcessor;
use crate::batch::state::{RunPhase, RunStateError, RunStateMachine};
use crate::batch::writer::{build_chunk_write, group_by_tier};
use crate::config::{BatchConfig, RestartPolicy};
use crate::domain::customer::CustomerId;
use crate::domain::run::{BatchRun, BatchRunId, RunKey, RunStatus, TierAssignment};
use crate::tiers::{TierTable, TierTableError};

const DRY_RUN_LABEL: &str = "dry-run";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobOptions {
    pub chunk_size: u32,
    pub restart_policy: RestartPolicy,
    /// A running run whose heartbeat is older than this is treated as abandoned.
    pub stale_run_after: Duration,
    pub dry_run: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            restart_policy: RestartPolicy::Resume,
            stale_run_after: Duration::hours(1),
            dry_run: false,
        }
    }
}

impl JobOptions {
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            restart_policy: config.restart_policy,
            stale_run_after: Duration::seconds(
                i64::try_from(config.stale_run_secs).unwrap_or(i64::MAX / 1_000),
            ),
            dry_run: false,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    #[error("tier configuration is invalid: {0}")]
    Configuration(#[from] TierTableError),
    #[error("loading membership tiers failed: {0}")]
    TierLoad(#[source] StoreError),
    #[error("reading customers after {after:?} failed: {source}")]
    Read {
        after: Option<CustomerId>,
        #[source]
        source: StoreError,
    },
    #[error("chunk {chunk_index} write failed: {source}")]
    Write {
        chunk_index: u32,
        #[source]
        source: StoreError,
    },
    #[error("run `{run_key}` already completed as {run_id}")]
    AlreadyCompleted { run_key: RunKey, run_id: BatchRunId },
    #[error("another run is in progress: {detail}")]
    RunInProgress { detail: String },
    #[error("run bookkeeping failed: {0}")]
    RunStore(#[source] StoreError),
    #[error(transparent)]
    State(#[from] RunStateError),
}

impl BatchError {
    /// Stable class name for operator-facing output.
    pub fn class(&self) -> &'static str {
        match self {
            Self::InvalidChunkSize | Self::Configuration(_) => "configuration",
            Self::TierLoad(_) | Self::Read { .. } => "read",
            Self::Write { .. } => "write",
            Self::AlreadyCompleted { .. } => "already_completed",
            Self::RunInProgress { .. } => "run_in_progress",
            Self::RunStore(_) => "run_store",
            Self::State(_) => "state",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: Option<BatchRunId>,
    pub run_key: RunKey,
    pub status: RunStatus,
    pub dry_run: bool,
    pub resumed_from: Option<BatchRunId>,
    pub started_after: Option<CustomerId>,
    pub last_customer_id: Option<CustomerId>,
    pub chunks: u32,
    pub customers_processed: u64,
    pub customers_skipped: u64,
    pub statements_issued: u64,
    /// Customers assigned per tier name.
    pub tier_distribution: BTreeMap<String, u64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    fn new(
        run_id: Option<BatchRunId>,
        run_key: RunKey,
        resumed_from: Option<BatchRunId>,
        started_after: Option<CustomerId>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            dry_run: run_id.is_none(),
            run_id,
            run_key,
            status: RunStatus::Running,
            resumed_from,
            started_after,
            last_customer_id: started_after,
            chunks: 0,
            customers_processed: 0,
            customers_skipped: 0,
            statements_issued: 0,
            tier_distribution: BTreeMap::new(),
            started_at,
            finished_at: None,
        }
    }

    fn record_chunk(
        &mut self,
        table: &TierTable,
        assignments: &[TierAssignment],
        skipped: u64,
        statements: u64,
        last_id: CustomerId,
    ) {
        self.chunks += 1;
        self.customers_processed += assignments.len() as u64;
        self.customers_skipped += skipped;
        self.statements_issued += statements;
        self.last_customer_id = Some(last_id);

        for assignment in assignments {
            let name = table
                .get(assignment.tier_id)
                .map(|tier| tier.name.clone())
                .unwrap_or_else(|| assignment.tier_id.to_string());
            *self.tier_distribution.entry(name).or_insert(0) += 1;
        }
    }
}

#[derive(Clone)]
pub struct TierRecalculationJob {
    customers: Arc<dyn CustomerStore>,
    tiers: Arc<dyn TierStore>,
    runs: Arc<dyn RunStore>,
    options: JobOptions,
}

impl TierRecalculationJob {
    pub fn new(
        customers: Arc<dyn CustomerStore>,
        tiers: Arc<dyn TierStore>,
        runs: Arc<dyn RunStore>,
        options: JobOptions,
    ) -> Self {
        Self { customers, tiers, runs, options }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.options.dry_run = dry_run;
        self
    }

    pub async fn execute(&self, run_key: RunKey) -> Result<RunReport, BatchError> {
        if self.options.chunk_size == 0 {
            return Err(BatchError::InvalidChunkSize);
        }

        if self.options.dry_run {
            return self.execute_dry_run(run_key).await;
        }

        let now = Utc::now();
        let (resumed_from, checkpoint) = self.prepare(&run_key, now).await?;
        let run = BatchRun::start(
            BatchRunId(Uuid::new_v4().to_string()),
            run_key,
            resumed_from,
            checkpoint,
            now,
        );

        self.runs.start_run(&run).await.map_err(|error| match error {
            StoreError::Conflict(detail) => BatchError::RunInProgress { detail },
            other => BatchError::RunStore(other),
        })?;

        info!(
            event_name = "batch.run.started",
            run_id = %run.id,
            run_key = %run.run_key,
            resumed_from = ?run.resumed_from.as_ref().map(|id| id.0.as_str()),
            start_after = ?run.last_customer_id.map(|id| id.0),
            chunk_size = self.options.chunk_size,
            "tier recalculation run started"
        );

        let mut machine = RunStateMachine::default();
        let mut report = RunReport::new(
            Some(run.id.clone()),
            run.run_key.clone(),
            run.resumed_from.clone(),
            run.last_customer_id,
            run.started_at,
        );

        match self.drive(Some(&run.id), &mut machine, &mut report).await {
            Ok(()) => {
                let finished_at = Utc::now();
                self.runs
                    .finish_run(&run.id, RunStatus::Completed, None, finished_at)
                    .await
                    .map_err(BatchError::RunStore)?;
                report.status = RunStatus::Completed;
                report.finished_at = Some(finished_at);

                info!(
                    event_name = "batch.run.completed",
                    run_id = %run.id,
                    run_key = %run.run_key,
                    chunks = report.chunks,
                    customers_processed = report.customers_processed,
                    customers_skipped = report.customers_skipped,
                    statements_issued = report.statements_issued,
                    "tier recalculation run completed"
                );
                Ok(report)
            }
            Err(failure) => {
                if !machine.phase().is_terminal() {
                    machine.fail()?;
                }

                if let Err(store_error) = self
                    .runs
                    .finish_run(&run.id, RunStatus::Failed, Some(failure.to_string()), Utc::now())
                    .await
                {
                    warn!(
                        event_name = "batch.run.finish_failed",
                        run_id = %run.id,
                        run_key = %run.run_key,
                        error = %store_error,
                        "could not record failed run status"
                    );
                }

                error!(
                    event_name = "batch.run.failed",
                    run_id = %run.id,
                    run_key = %run.run_key,
                    error_class = failure.class(),
                    error = %failure,
                    chunks_committed = report.chunks,
                    last_customer_id = ?report.last_customer_id.map(|id| id.0),
                    "tier recalculation run failed"
                );
                Err(failure)
            }
        }
    }

    async fn execute_dry_run(&self, run_key: RunKey) -> Result<RunReport, BatchError> {
        let mut machine = RunStateMachine::default();
        let mut report = RunReport::new(None, run_key, None, None, Utc::now());

        if let Err(failure) = self.drive(None, &mut machine, &mut report).await {
            if !machine.phase().is_terminal() {
                machine.fail()?;
            }
            return Err(failure);
        }

        report.status = RunStatus::Completed;
        report.finished_at = Some(Utc::now());
        info!(
            event_name = "batch.dry_run.completed",
            run_key = %report.run_key,
            chunks = report.chunks,
            customers_processed = report.customers_processed,
            statements_issued = report.statements_issued,
            "tier recalculation dry run completed"
        );
        Ok(report)
    }

    /// Decides where the run starts, clearing abandoned runs on the way.
    async fn prepare(
        &self,
        run_key: &RunKey,
        now: DateTime<Utc>,
    ) -> Result<(Option<BatchRunId>, Option<CustomerId>), BatchError> {
        if let Some(active) = self.runs.find_active().await.map_err(BatchError::RunStore)? {
            if now - active.updated_at < self.options.stale_run_after {
                return Err(BatchError::RunInProgress {
                    detail: format!("run {} (`{}`) is still running", active.id, active.run_key),
                });
            }

            warn!(
                event_name = "batch.run.abandoned",
                run_id = %active.id,
                run_key = %active.run_key,
                last_heartbeat = %active.updated_at.to_rfc3339(),
                "marking stale running run as failed"
            );
            self.runs
                .finish_run(
                    &active.id,
                    RunStatus::Failed,
                    Some(format!(
                        "abandoned: no heartbeat since {}",
                        active.updated_at.to_rfc3339()
                    )),
                    now,
                )
                .await
                .map_err(BatchError::RunStore)?;
        }

        let Some(previous) =
            self.runs.latest_for_key(run_key).await.map_err(BatchError::RunStore)?
        else {
            return Ok((None, None));
        };

        match previous.status {
            RunStatus::Completed => Err(BatchError::AlreadyCompleted {
                run_key: run_key.clone(),
                run_id: previous.id,
            }),
            RunStatus::Running => Err(BatchError::RunInProgress {
                detail: format!("run {} (`{}`) is still running", previous.id, previous.run_key),
            }),
            RunStatus::Failed => match self.options.restart_policy {
                RestartPolicy::Resume => Ok((Some(previous.id), previous.last_customer_id)),
                RestartPolicy::Rerun => Ok((None, None)),
            },
        }
    }

    async fn load_table(&self) -> Result<TierTable, BatchError> {
        let tiers = self.tiers.load_tiers().await.map_err(|error| match error {
            StoreError::Decode(detail) => {
                BatchError::Configuration(TierTableError::Malformed(detail))
            }
            other => BatchError::TierLoad(other),
        })?;
        let table = TierTable::new(tiers)?;

        if !table.has_zero_floor() {
            let floor = table.floor();
            warn!(
                event_name = "batch.tiers.nonzero_floor",
                tier = %floor.name,
                baseline = %floor.baseline,
                "lowest tier has a non-zero baseline; customers below it still fall back to it"
            );
        }

        Ok(table)
    }

    /// Runs the chunk loop. Without a run id nothing is written.
    async fn drive(
        &self,
        run_id: Option<&BatchRunId>,
        machine: &mut RunStateMachine,
        report: &mut RunReport,
    ) -> Result<(), BatchError> {
        let table = self.load_table().await?;
        let processor = TierAssignmentProcessor::new(&table);
        let run_label = run_id.map(|id| id.0.as_str()).unwrap_or(DRY_RUN_LABEL);
        let limit = self.options.chunk_size;

        let mut cursor = report.started_after;
        let mut chunk_index = 0u32;

        loop {
            machine.advance(RunPhase::Reading)?;
            let page = self
                .customers
                .read_page(cursor, limit)
                .await
                .map_err(|source| BatchError::Read { after: cursor, source })?;

            let Some(last_id) = page.last_id() else {
                machine.advance(RunPhase::Completed)?;
                return Ok(());
            };

            machine.advance(RunPhase::Processing)?;
            let (assignments, skipped) = process_page(&processor, &page, run_label);

            machine.advance(RunPhase::Writing)?;
            let statements = match run_id {
                Some(run_id) => {
                    let chunk =
                        build_chunk_write(run_id, chunk_index, &assignments, last_id, skipped);
                    let summary = self
                        .customers
                        .write_chunk(&chunk)
                        .await
                        .map_err(|source| BatchError::Write { chunk_index, source })?;

                    let vanished =
                        (assignments.len() as u64).saturating_sub(summary.tier_rows_updated);
                    info!(
                        event_name = "batch.chunk.committed",
                        run_id = run_label,
                        chunk_index,
                        assignments = assignments.len(),
                        skipped,
                        tier_statements = summary.tier_statements,
                        vanished,
                        checkpoint = last_id.0,
                        "chunk committed"
                    );
                    summary.tier_statements
                }
                None => group_by_tier(&assignments).len() as u64,
            };

            report.record_chunk(&table, &assignments, skipped, statements, last_id);
            cursor = Some(last_id);
            chunk_index += 1;

            if page.len() < limit as usize {
                machine.advance(RunPhase::Completed)?;
                return Ok(());
            }
        }
    }
}

fn process_page(
    processor: &TierAssignmentProcessor<'_>,
    page: &CustomerPage,
    run_label: &str,
) -> (Vec<TierAssignment>, u64) {
    let mut skipped = 0u64;

    for row in &page.rejected {
        skipped += 1;
        warn!(
            event_name = "batch.record.skipped",
            run_id = run_label,
            customer_id = row.customer_id.0,
            reason = %row.reason,
            "customer row could not be decoded"
        );
    }

    let mut assignments = Vec::with_capacity(page.customers.len());
    for customer in &page.customers {
        match processor.process(customer) {
            Ok(assignment) => assignments.push(assignment),
            Err(record_error) => {
                skipped += 1;
                warn!(
                    event_name = "batch.record.skipped",
                    run_id = run_label,
                    customer_id = customer.id.0,
                    reason = %record_error,
                    "customer skipped by tier processor"
                );
            }
        }
    }

    (assignments, skipped)
}
