pub mod job;
pub mod ports;
pub mod processor;
pub mod state;
pub mod writer;

pub use job::{BatchError, JobOptions, RunReport, TierRecalculationJob};
pub use ports::{
    BulkTierUpdate, ChunkWrite, ChunkWriteSummary, CustomerPage, CustomerStore, RunStore,
    StoreError, TierStore,
};
pub use processor::{RecordError, TierAssignmentProcessor};
pub use state::{RunPhase, RunStateError, RunStateMachine};
