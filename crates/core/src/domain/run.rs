use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;
use crate::domain::tier::TierId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchRunId(pub String);

impl fmt::Display for BatchRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Run-identifying parameter. One billing cycle maps to one key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunKey(pub String);

impl RunKey {
    pub fn for_date(date: NaiveDate) -> Self {
        Self(date.format("%Y-%m-%d").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRun {
    pub id: BatchRunId,
    pub run_key: RunKey,
    pub status: RunStatus,
    pub resumed_from: Option<BatchRunId>,
    /// Highest customer id committed so far. Resume starts after it.
    pub last_customer_id: Option<CustomerId>,
    pub chunks_committed: u32,
    pub customers_processed: u64,
    pub customers_skipped: u64,
    pub statements_issued: u64,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchRun {
    pub fn start(
        id: BatchRunId,
        run_key: RunKey,
        resumed_from: Option<BatchRunId>,
        checkpoint: Option<CustomerId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            run_key,
            status: RunStatus::Running,
            resumed_from,
            last_customer_id: checkpoint,
            chunks_committed: 0,
            customers_processed: 0,
            customers_skipped: 0,
            statements_issued: 0,
            error: None,
            started_at: now,
            updated_at: now,
            finished_at: None,
        }
    }
}

/// The tier a customer qualifies for in the current cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierAssignment {
    pub customer_id: CustomerId,
    pub tier_id: TierId,
}
