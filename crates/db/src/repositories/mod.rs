use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use tierbatch_core::batch::StoreError;

pub mod customer;
pub mod memory;
pub mod run;
pub mod tier;

pub use customer::SqlCustomerRepository;
pub use memory::InMemoryMembershipStore;
pub use run::SqlBatchRunRepository;
pub use tier::SqlTierRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(sqlx::Error::Database(error))
                if error.is_unique_violation() =>
            {
                StoreError::Conflict(error.to_string())
            }
            RepositoryError::Database(error) => StoreError::Unavailable(error.to_string()),
            RepositoryError::Decode(message) => StoreError::Decode(message),
            RepositoryError::NotFound(message) => StoreError::NotFound(message),
        }
    }
}

/// Fixed-width UTC encoding so stored timestamps sort lexically.
pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| {
            RepositoryError::Decode(format!("invalid timestamp for `{column}`: {value} ({error})"))
        })
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|value| parse_timestamp(column, value)).transpose()
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_u64(column: &str, value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative integer): {value}"
        ))
    })
}

pub(crate) fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value.trim()).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal for `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn to_i64(column: &str, value: u64) -> Result<i64, RepositoryError> {
    i64::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("value for `{column}` exceeds storage range: {value}"))
    })
}
