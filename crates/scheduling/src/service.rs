use serde::{Deserialize, Serialize};

use cadence_core::{DomainError, DomainResult, Entity, LedgerAccount, Money, ServiceId};

/// A billable service offering; owns the task templates of its work orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTemplate {
    pub id: ServiceId,
    pub name: String,
    pub default_price: Option<Money>,
    /// Tax rate in basis points (`1800` = 18%).
    pub tax_rate_bp: u32,
    /// Service-level income account override.
    pub income_account: Option<LedgerAccount>,
    pub payment_terms_days: Option<u32>,
    pub is_active: bool,
}

impl ServiceTemplate {
    pub fn new(name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("service name cannot be empty"));
        }
        Ok(Self {
            id: ServiceId::new(),
            name,
            default_price: None,
            tax_rate_bp: 0,
            income_account: None,
            payment_terms_days: None,
            is_active: true,
        })
    }

    pub fn with_default_price(mut self, price: Money) -> Self {
        self.default_price = Some(price);
        self
    }

    pub fn with_tax_rate_bp(mut self, bp: u32) -> Self {
        self.tax_rate_bp = bp;
        self
    }

    pub fn with_income_account(mut self, account: LedgerAccount) -> Self {
        self.income_account = Some(account);
        self
    }
}

impl Entity for ServiceTemplate {
    type Id = ServiceId;

    fn id(&self) -> Self::Id {
        self.id
    }
}
