//! Infrastructure layer: configuration, persistence and the scheduling engine.

pub mod config;
pub mod engine;
pub mod store;
pub mod sweep;

pub use config::EngineConfig;
pub use engine::{
    BillingOutcome, Engine, EngineError, Halt, MaterializeReport, MaterializedPeriod,
    ReversalOutcome, ScheduleEnvelope, TaskStatusReport,
};
pub use store::{
    InMemoryScheduleStore, PostgresScheduleStore, ScheduleStore, ScheduleTx, StoreError,
    WorkOrderProgress,
};
pub use sweep::{DailySweep, SweepFailure, SweepSummary};

#[cfg(test)]
mod integration_tests;
