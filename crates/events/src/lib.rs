//! Events emitted by the scheduling engine and the bus that distributes them.
//!
//! The engine publishes only after a step has committed, so subscribers see
//! facts, never intentions. Delivery is best-effort and at-least-once.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod schedule;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use schedule::{ScheduleEvent, SkipReason};
