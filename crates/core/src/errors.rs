use thiserror::Error;

use crate::batch::{BatchError, RunStateError};
use crate::tiers::TierTableError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    TierTable(#[from] TierTableError),
    #[error(transparent)]
    RunTransition(#[from] RunStateError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "The run could not start. Check tier data and try again.",
            Self::Conflict { .. } => {
                "The run was refused because another run is active or this cycle already completed."
            }
            Self::ServiceUnavailable { .. } => {
                "The database is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<BatchError> for ApplicationError {
    fn from(value: BatchError) -> Self {
        match value {
            BatchError::InvalidChunkSize => Self::Configuration(value.to_string()),
            BatchError::Configuration(error) => Self::Domain(DomainError::TierTable(error)),
            BatchError::State(error) => Self::Domain(DomainError::RunTransition(error)),
            BatchError::AlreadyCompleted { .. } | BatchError::RunInProgress { .. } => {
                Self::Conflict(value.to_string())
            }
            BatchError::TierLoad(_)
            | BatchError::Read { .. }
            | BatchError::Write { .. }
            | BatchError::RunStore(_) => Self::Persistence(value.to_string()),
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(error) => Self::BadRequest {
                message: error.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Conflict(message) => {
                Self::Conflict { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::batch::{BatchError, StoreError};
    use crate::domain::run::{BatchRunId, RunKey};
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::tiers::TierTableError;

    #[test]
    fn empty_tier_table_maps_to_bad_request() {
        let interface =
            ApplicationError::from(BatchError::Configuration(TierTableError::Empty))
                .into_interface("2026-11-01");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "2026-11-01"
        ));
        assert_eq!(
            interface.user_message(),
            "The run could not start. Check tier data and try again."
        );
    }

    #[test]
    fn malformed_tier_data_is_not_reported_as_retryable() {
        let error = BatchError::Configuration(TierTableError::Malformed(
            "invalid decimal for `baseline`".to_owned(),
        ));
        assert_eq!(error.class(), "configuration");

        let interface = ApplicationError::from(error).into_interface("2026-11-01");
        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
    }

    #[test]
    fn write_failure_maps_to_service_unavailable() {
        let interface = ApplicationError::from(BatchError::Write {
            chunk_index: 3,
            source: StoreError::Unavailable("database is locked".to_owned()),
        })
        .into_interface("run-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { ref message, .. }
            if message.contains("chunk 3")));
        assert_eq!(interface.correlation_id(), "run-3");
    }

    #[test]
    fn completed_cycle_maps_to_conflict() {
        let application = ApplicationError::from(BatchError::AlreadyCompleted {
            run_key: RunKey("2026-11-01".to_owned()),
            run_id: BatchRunId("run-1".to_owned()),
        });

        assert!(matches!(application, ApplicationError::Conflict(_)));
        assert!(matches!(application.into_interface("req-1"), InterfaceError::Conflict { .. }));
    }

    #[test]
    fn invariant_violation_stays_a_domain_error() {
        let interface =
            ApplicationError::from(DomainError::InvariantViolation("floor tier missing".to_owned()))
                .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::BadRequest { .. }));
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface = ApplicationError::from(BatchError::InvalidChunkSize).into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }
}
