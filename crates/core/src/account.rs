//! Ledger account references.
//!
//! The engine never posts to a ledger; it only records which income and
//! receivable accounts an invoice should hit so the posting subsystem can.

use serde::{Deserialize, Serialize};

use crate::value_object::ValueObject;

/// High-level account kind (determines normal balance side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Asset => "asset",
            AccountKind::Liability => "liability",
            AccountKind::Equity => "equity",
            AccountKind::Revenue => "revenue",
            AccountKind::Expense => "expense",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asset" => Some(AccountKind::Asset),
            "liability" => Some(AccountKind::Liability),
            "equity" => Some(AccountKind::Equity),
            "revenue" => Some(AccountKind::Revenue),
            "expense" => Some(AccountKind::Expense),
            _ => None,
        }
    }
}

/// Reference to an account in the tenant's chart of accounts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerAccount {
    pub code: String, // e.g. "4000"
    pub kind: AccountKind,
}

impl LedgerAccount {
    pub fn new(code: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            code: code.into(),
            kind,
        }
    }

    pub fn revenue(code: impl Into<String>) -> Self {
        Self::new(code, AccountKind::Revenue)
    }

    pub fn asset(code: impl Into<String>) -> Self {
        Self::new(code, AccountKind::Asset)
    }
}

impl ValueObject for LedgerAccount {}
