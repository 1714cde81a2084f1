//! Persistence boundary for the scheduling engine.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryScheduleStore;
pub use postgres::PostgresScheduleStore;
pub use r#trait::{ScheduleStore, ScheduleTx, StoreError, WorkOrderProgress};
