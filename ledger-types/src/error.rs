//! Error types for the ledger.

use crate::domain::{AccountId, Currency, TransactionId};

/// Domain-level errors (business rule violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Amount overflows the supported range")]
    AmountOverflow,

    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: Currency, got: Currency },

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: i64, requested: i64 },

    #[error("Account {0} is inactive")]
    InactiveAccount(AccountId),

    #[error("Transaction {0} is deleted")]
    TransactionDeleted(TransactionId),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    /// Begin/rollback failures, or use of a finished unit of work.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// The storage engine refused to commit; nothing was written.
    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Cache store failures. Never fatal to a request.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

/// Application-level errors returned by the use cases.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: i64, requested: i64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The unit of work could not be committed and was rolled back.
    /// Safe to retry the whole operation.
    #[error("Commit failed: {0}")]
    CommitFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Validation failures, including insufficient balance, are surfaced to
    /// the caller and never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_) | AppError::InsufficientBalance { .. }
        )
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InsufficientBalance {
                available,
                requested,
            } => AppError::InsufficientBalance {
                available,
                requested,
            },
            DomainError::ValidationError(msg) => AppError::Validation(msg),
            DomainError::TransactionDeleted(id) => {
                AppError::NotFound(format!("Transaction {}", id))
            }
            e => AppError::Validation(e.to_string()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
            RepoError::Commit(e) => AppError::CommitFailed(e),
            RepoError::Conflict(e) => AppError::Conflict(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_balance_is_validation() {
        let err: AppError = RepoError::Domain(DomainError::InsufficientBalance {
            available: 10,
            requested: 20,
        })
        .into();
        assert!(err.is_validation());
        assert!(matches!(err, AppError::InsufficientBalance { .. }));
    }

    #[test]
    fn test_commit_failure_mapping() {
        let err: AppError = RepoError::Commit("disk full".into()).into();
        assert!(matches!(err, AppError::CommitFailed(_)));
        assert!(!err.is_validation());
    }

    #[test]
    fn test_inactive_account_is_validation() {
        let err: AppError = DomainError::InactiveAccount(AccountId::new()).into();
        assert!(err.is_validation());
    }
}
