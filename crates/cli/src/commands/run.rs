use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use tierbatch_core::batch::{BatchError, JobOptions, RunReport, TierRecalculationJob};
use tierbatch_core::config::AppConfig;
use tierbatch_core::domain::run::RunKey;
use tierbatch_core::errors::ApplicationError;
use tierbatch_db::{SqlBatchRunRepository, SqlCustomerRepository, SqlTierRepository};

use crate::commands::{
    build_runtime, load_config, open_database, to_details, CommandFailure, CommandResult,
};
use crate::logging;

pub fn run(date: Option<NaiveDate>, dry_run: bool) -> CommandResult {
    let config = match load_config("run") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    logging::init(&config.logging);

    let run_key = match resolve_run_key(&config, date, Utc::now()) {
        Ok(run_key) => run_key,
        Err(message) => return CommandResult::failure("run", "config_validation", message, 2),
    };
    let runtime = match build_runtime("run") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let correlation_id = run_key.to_string();
    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let job = TierRecalculationJob::new(
            Arc::new(SqlCustomerRepository::new(pool.clone())),
            Arc::new(SqlTierRepository::new(pool.clone())),
            Arc::new(SqlBatchRunRepository::new(pool.clone())),
            JobOptions::from_config(&config.batch),
        )
        .with_dry_run(dry_run);

        let outcome = job.execute(run_key).await;
        pool.close().await;
        Ok::<_, CommandFailure>(outcome)
    });

    match result {
        Ok(Ok(report)) => CommandResult::success_with(
            "run",
            report_message(&report),
            to_details("report", &report),
        ),
        Ok(Err(error)) => job_failure(error, &correlation_id),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("run", error_class, message, exit_code)
        }
    }
}

/// Job failures keep their batch class and gain the operator-facing message, keyed by run key.
fn job_failure(error: BatchError, correlation_id: &str) -> CommandResult {
    let error_class = error.class();
    let message = error.to_string();
    let interface = ApplicationError::from(error).into_interface(correlation_id);

    let mut details = Map::new();
    details.insert("user_message".to_string(), Value::from(interface.user_message()));
    details.insert("correlation_id".to_string(), Value::from(interface.correlation_id()));
    CommandResult::failure_with("run", error_class, message, 6, details)
}

/// An explicit date wins; otherwise the key is today's date in the schedule's offset.
pub(crate) fn resolve_run_key(
    config: &AppConfig,
    date: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> Result<RunKey, String> {
    if let Some(date) = date {
        return Ok(RunKey::for_date(date));
    }
    let schedule = config.monthly_schedule().map_err(|error| error.to_string())?;
    Ok(RunKey::for_date(schedule.local_date(now)))
}

fn report_message(report: &RunReport) -> String {
    let verb = if report.dry_run { "would assign" } else { "assigned" };
    let mut message = format!(
        "run {}: {verb} {} customers in {} chunks with {} tier statements",
        report.run_key, report.customers_processed, report.chunks, report.statements_issued
    );
    if report.customers_skipped > 0 {
        message.push_str(&format!(", {} skipped", report.customers_skipped));
    }
    if let Some(resumed_from) = &report.resumed_from {
        message.push_str(&format!(" (resumed from {resumed_from})"));
    }
    message
}
