//! Invoicing domain module.
//!
//! Deterministic billing rules for recurring work: document numbering, tax,
//! ledger account and price resolution, and the draft invoice lifecycle.
//! No IO, no storage, no clock.

pub mod accounts;
pub mod invoice;
pub mod numbering;
pub mod pricing;
pub mod tax;

pub use accounts::{
    AccountResolutionError, Customer, TenantBillingSettings, resolve_income_account,
    resolve_receivable_account,
};
pub use invoice::{Invoice, InvoiceDraft, InvoiceLine, InvoiceStatus};
pub use numbering::{DocumentKind, NumberingConfig, format_number};
pub use pricing::resolve_price;
pub use tax::compute_tax;
