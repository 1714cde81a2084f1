//! Ledger account resolution and the billing collaborators it reads.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use cadence_core::{AccountKind, CustomerId, Entity, LedgerAccount, TenantId};

use crate::numbering::NumberingConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    /// Customer-specific receivable account.
    pub account: Option<LedgerAccount>,
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Tenant-wide billing defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantBillingSettings {
    pub tenant_id: TenantId,
    pub default_income_account: Option<LedgerAccount>,
    pub default_receivable_account: Option<LedgerAccount>,
    pub invoice_numbering: Option<NumberingConfig>,
}

impl TenantBillingSettings {
    pub fn empty(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            default_income_account: None,
            default_receivable_account: None,
            invoice_numbering: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountResolutionError {
    #[error("no account configured")]
    Missing,

    #[error("account {code} is {found:?}, expected {expected:?}")]
    WrongKind {
        code: String,
        expected: AccountKind,
        found: AccountKind,
    },
}

fn resolve(
    preferred: Option<&LedgerAccount>,
    fallback: Option<&LedgerAccount>,
    expected: AccountKind,
) -> Result<LedgerAccount, AccountResolutionError> {
    let account = preferred
        .or(fallback)
        .ok_or(AccountResolutionError::Missing)?;
    if account.kind != expected {
        return Err(AccountResolutionError::WrongKind {
            code: account.code.clone(),
            expected,
            found: account.kind,
        });
    }
    Ok(account.clone())
}

/// Service-level override, else the tenant default. Must be a revenue account.
pub fn resolve_income_account(
    service_override: Option<&LedgerAccount>,
    tenant_default: Option<&LedgerAccount>,
) -> Result<LedgerAccount, AccountResolutionError> {
    resolve(service_override, tenant_default, AccountKind::Revenue)
}

/// Customer account, else the tenant default receivable. Must be an asset account.
pub fn resolve_receivable_account(
    customer_account: Option<&LedgerAccount>,
    tenant_default: Option<&LedgerAccount>,
) -> Result<LedgerAccount, AccountResolutionError> {
    resolve(customer_account, tenant_default, AccountKind::Asset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_override_wins_over_tenant_default() {
        let service = LedgerAccount::revenue("4100");
        let tenant = LedgerAccount::revenue("4000");
        assert_eq!(
            resolve_income_account(Some(&service), Some(&tenant)).unwrap(),
            service
        );
        assert_eq!(resolve_income_account(None, Some(&tenant)).unwrap(), tenant);
    }

    #[test]
    fn missing_accounts_are_reported() {
        assert_eq!(
            resolve_income_account(None, None),
            Err(AccountResolutionError::Missing)
        );
        assert_eq!(
            resolve_receivable_account(None, None),
            Err(AccountResolutionError::Missing)
        );
    }

    #[test]
    fn account_kind_is_checked() {
        let asset = LedgerAccount::asset("1200");
        let err = resolve_income_account(Some(&asset), None).unwrap_err();
        assert_eq!(
            err,
            AccountResolutionError::WrongKind {
                code: "1200".into(),
                expected: AccountKind::Revenue,
                found: AccountKind::Asset,
            }
        );
        assert_eq!(
            resolve_receivable_account(None, Some(&asset)).unwrap(),
            asset
        );
    }
}
