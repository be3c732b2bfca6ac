use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tierbatch_core::batch::RunStore;
use tierbatch_core::config::AppConfig;
use tierbatch_core::domain::run::{BatchRun, RunKey};
use tierbatch_db::SqlBatchRunRepository;

use crate::commands::{
    build_runtime, load_config, open_database, to_details, CommandFailure, CommandResult,
};

#[derive(Debug, Serialize)]
struct NextTrigger {
    at: String,
    run_key: RunKey,
}

pub fn run(limit: u32) -> CommandResult {
    let config = match load_config("status") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("status") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let runs = SqlBatchRunRepository::new(pool.clone())
            .recent_runs(limit.max(1))
            .await
            .map_err(query_failure)?;
        pool.close().await;
        Ok::<Vec<BatchRun>, CommandFailure>(runs)
    });

    match result {
        Ok(runs) => {
            let mut details = to_details("runs", &runs);
            let next = next_trigger(&config);
            details.insert(
                "next_trigger".to_string(),
                serde_json::to_value(&next).unwrap_or(Value::Null),
            );
            CommandResult::success_with("status", status_message(&runs, next.as_ref()), details)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("status", error_class, message, exit_code)
        }
    }
}

/// A failed query on a reachable database is a runtime failure, not a connectivity one.
fn query_failure(error: impl std::fmt::Display) -> CommandFailure {
    ("db_query", error.to_string(), 3)
}

fn next_trigger(config: &AppConfig) -> Option<NextTrigger> {
    if !config.schedule.enabled {
        return None;
    }
    let schedule = config.monthly_schedule().ok()?;
    let at = schedule.next_after(Utc::now())?;
    Some(NextTrigger { at: at.to_rfc3339(), run_key: RunKey::for_date(schedule.local_date(at)) })
}

fn status_message(runs: &[BatchRun], next: Option<&NextTrigger>) -> String {
    let latest = match runs.first() {
        Some(run) => format!(
            "latest run {} ({}) is {} after {} chunks",
            run.id,
            run.run_key,
            run.status.as_str(),
            run.chunks_committed
        ),
        None => "no runs recorded".to_string(),
    };
    match next {
        Some(next) => format!("{latest}; next trigger {} for {}", next.at, next.run_key),
        None => format!("{latest}; scheduler disabled"),
    }
}
