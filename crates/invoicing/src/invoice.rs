//! Invoices raised for completed periods.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use cadence_core::{
    CustomerId, DomainError, DomainResult, Entity, InvoiceId, LedgerAccount, Money, PeriodId,
    ServiceId, TenantId, WorkOrderId,
};

use crate::tax::compute_tax;

/// Invoice status lifecycle: `draft -> sent -> paid`, `draft | sent -> cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(InvoiceStatus::Draft),
            "sent" => Some(InvoiceStatus::Sent),
            "paid" => Some(InvoiceStatus::Paid),
            "cancelled" => Some(InvoiceStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Money,
    /// `quantity * unit_price`, before tax.
    pub amount: Money,
    pub tax_rate_bp: u32,
    pub tax_amount: Money,
    pub service_id: ServiceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub work_order_id: Option<WorkOrderId>,
    /// `None` for invoices not raised by a recurring period.
    pub period_id: Option<PeriodId>,
    pub number: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub subtotal: Money,
    pub tax_amount: Money,
    pub total: Money,
    pub status: InvoiceStatus,
    pub income_account: LedgerAccount,
    pub receivable_account: LedgerAccount,
    pub lines: Vec<InvoiceLine>,
}

impl Invoice {
    /// Only drafts may be deleted when the completion that raised them is undone.
    pub fn is_reversible(&self) -> bool {
        self.status == InvoiceStatus::Draft
    }

    pub fn mark_sent(&mut self) -> DomainResult<()> {
        self.transition(InvoiceStatus::Draft, InvoiceStatus::Sent)
    }

    pub fn mark_paid(&mut self) -> DomainResult<()> {
        self.transition(InvoiceStatus::Sent, InvoiceStatus::Paid)
    }

    pub fn cancel(&mut self) -> DomainResult<()> {
        match self.status {
            InvoiceStatus::Draft | InvoiceStatus::Sent => {
                self.status = InvoiceStatus::Cancelled;
                Ok(())
            }
            other => Err(DomainError::invariant(format!(
                "cannot cancel a {} invoice",
                other.as_str()
            ))),
        }
    }

    fn transition(&mut self, from: InvoiceStatus, to: InvoiceStatus) -> DomainResult<()> {
        if self.status != from {
            return Err(DomainError::invariant(format!(
                "invoice {} is {}, expected {}",
                self.number,
                self.status.as_str(),
                from.as_str()
            )));
        }
        self.status = to;
        Ok(())
    }
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Everything needed to raise a single-line draft invoice, minus its number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceDraft {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub work_order_id: WorkOrderId,
    pub period_id: PeriodId,
    pub service_id: ServiceId,
    pub description: String,
    pub unit_price: Money,
    pub tax_rate_bp: u32,
    pub issue_date: NaiveDate,
    pub payment_terms_days: u32,
    pub income_account: LedgerAccount,
    pub receivable_account: LedgerAccount,
}

impl InvoiceDraft {
    /// Build the draft invoice. Tax is always carried on the line, even at a
    /// zero rate.
    pub fn into_invoice(self, number: String) -> DomainResult<Invoice> {
        if !self.unit_price.is_positive() {
            return Err(DomainError::validation("invoice price must be positive"));
        }

        let tax_amount = compute_tax(self.unit_price, self.tax_rate_bp);
        let total = self
            .unit_price
            .checked_add(tax_amount)
            .ok_or_else(|| DomainError::invariant("invoice total overflow"))?;
        let due_date = self
            .issue_date
            .checked_add_days(Days::new(u64::from(self.payment_terms_days)))
            .ok_or_else(|| DomainError::validation("invoice due date out of range"))?;

        let line = InvoiceLine {
            description: self.description,
            quantity: 1,
            unit_price: self.unit_price,
            amount: self.unit_price,
            tax_rate_bp: self.tax_rate_bp,
            tax_amount,
            service_id: self.service_id,
        };

        Ok(Invoice {
            id: InvoiceId::new(),
            tenant_id: self.tenant_id,
            customer_id: self.customer_id,
            work_order_id: Some(self.work_order_id),
            period_id: Some(self.period_id),
            number,
            issue_date: self.issue_date,
            due_date,
            subtotal: self.unit_price,
            tax_amount,
            total,
            status: InvoiceStatus::Draft,
            income_account: self.income_account,
            receivable_account: self.receivable_account,
            lines: vec![line],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_draft(price: i64, tax_rate_bp: u32) -> InvoiceDraft {
        InvoiceDraft {
            tenant_id: TenantId::new(),
            customer_id: CustomerId::new(),
            work_order_id: WorkOrderId::new(),
            period_id: PeriodId::new(),
            service_id: ServiceId::new(),
            description: "GST filing - Q1 2025".into(),
            unit_price: Money::from_minor(price),
            tax_rate_bp,
            issue_date: NaiveDate::from_ymd_opt(2025, 4, 21).unwrap(),
            payment_terms_days: 15,
            income_account: LedgerAccount::revenue("4000"),
            receivable_account: LedgerAccount::asset("1200"),
        }
    }

    #[test]
    fn draft_computes_totals_and_dates() {
        let invoice = test_draft(150_000, 1800).into_invoice("INV-0001".into()).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Draft);
        assert_eq!(invoice.subtotal, Money::from_minor(150_000));
        assert_eq!(invoice.tax_amount, Money::from_minor(27_000));
        assert_eq!(invoice.total, Money::from_minor(177_000));
        assert_eq!(invoice.due_date, NaiveDate::from_ymd_opt(2025, 5, 6).unwrap());
        assert_eq!(invoice.lines.len(), 1);
        assert_eq!(invoice.lines[0].quantity, 1);
        assert_eq!(invoice.lines[0].description, "GST filing - Q1 2025");
    }

    #[test]
    fn zero_tax_is_still_shown_on_the_line() {
        let invoice = test_draft(10_000, 0).into_invoice("INV-0002".into()).unwrap();
        assert_eq!(invoice.lines[0].tax_rate_bp, 0);
        assert_eq!(invoice.lines[0].tax_amount, Money::ZERO);
        assert_eq!(invoice.total, invoice.subtotal);
    }

    #[test]
    fn non_positive_price_is_rejected() {
        assert!(test_draft(0, 1800).into_invoice("INV-0003".into()).is_err());
    }

    #[test]
    fn lifecycle_transitions() {
        let mut invoice = test_draft(100, 0).into_invoice("INV-0004".into()).unwrap();
        assert!(invoice.is_reversible());
        assert!(invoice.mark_paid().is_err());

        invoice.mark_sent().unwrap();
        assert!(!invoice.is_reversible());
        invoice.mark_paid().unwrap();
        assert!(invoice.cancel().is_err());

        let mut other = test_draft(100, 0).into_invoice("INV-0005".into()).unwrap();
        other.cancel().unwrap();
        assert_eq!(other.status, InvoiceStatus::Cancelled);
        assert!(other.mark_sent().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: total = subtotal + tax, and the line mirrors the header.
        #[test]
        fn totals_are_consistent(
            price in 1i64..10_000_000_000,
            bp in 0u32..=5_000,
        ) {
            let invoice = test_draft(price, bp).into_invoice("INV-X".into()).unwrap();
            prop_assert_eq!(
                invoice.total.minor(),
                invoice.subtotal.minor() + invoice.tax_amount.minor()
            );
            prop_assert_eq!(invoice.lines[0].amount, invoice.subtotal);
            prop_assert_eq!(invoice.lines[0].tax_amount, invoice.tax_amount);
        }
    }
}
