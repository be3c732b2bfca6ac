pub mod batch;
pub mod config;
pub mod domain;
pub mod errors;
pub mod schedule;
pub mod tiers;

pub use batch::{BatchError, JobOptions, RunReport, TierRecalculationJob};
pub use domain::customer::{Customer, CustomerId};
pub use domain::run::{BatchRun, BatchRunId, RunKey, RunStatus, TierAssignment};
pub use domain::tier::{MembershipTier, TierId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use schedule::MonthlySchedule;
pub use tiers::{resolve_tier, TierTable};
