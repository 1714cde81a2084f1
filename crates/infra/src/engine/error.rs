use thiserror::Error;

use cadence_core::DomainError;

use crate::store::StoreError;

/// Engine failure taxonomy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A concurrent step already wrote the same record. Treated as success.
    #[error("idempotency conflict: {0}")]
    IdempotencyConflict(String),

    #[error(transparent)]
    Domain(DomainError),

    #[error(transparent)]
    Store(StoreError),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "not_found",
            EngineError::IdempotencyConflict(_) => "idempotency_conflict",
            EngineError::Domain(_) => "domain",
            EngineError::Store(_) => "store",
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(err: DomainError) -> Self {
        EngineError::Domain(err)
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(msg) => EngineError::IdempotencyConflict(msg),
            other => EngineError::Store(other),
        }
    }
}
