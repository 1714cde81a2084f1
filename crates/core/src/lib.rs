//! `cadence-core`: shared building blocks for the recurring obligation engine.
//!
//! Pure domain primitives only: identifiers, errors, money and ledger account
//! references. Nothing in here touches storage or the clock.

pub mod account;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use account::{AccountKind, LedgerAccount};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    CustomerId, InvoiceId, PeriodId, ServiceId, TaskInstanceId, TaskTemplateId, TenantId, UserId,
    WorkOrderId,
};
pub use money::Money;
pub use value_object::ValueObject;
