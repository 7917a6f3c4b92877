//! Unit of Work port.
//!
//! One unit of work wraps exactly one storage transaction. Every read and
//! write a use case performs goes through the repositories it hands out, and
//! `commit` makes all of them durable at once. Dropping an unfinished unit of
//! work rolls the storage transaction back.

use crate::domain::AccountKey;
use crate::error::RepoError;
use crate::ports::{AccountRepository, TransactionRepository};

/// Opens units of work.
#[async_trait::async_trait]
pub trait UnitOfWorkFactory: Send + Sync + 'static {
    type Work: UnitOfWork;

    /// Begins one storage transaction and returns the scope over it.
    async fn begin(&self) -> Result<Self::Work, RepoError>;
}

/// A request-scoped storage transaction with its scoped repositories.
#[async_trait::async_trait]
pub trait UnitOfWork: Send + Sync {
    type Accounts: AccountRepository;
    type Transactions: TransactionRepository;

    /// Account repository bound to this transaction.
    fn accounts(&self) -> &Self::Accounts;

    /// Transaction repository bound to this transaction.
    fn transactions(&self) -> &Self::Transactions;

    /// Commits every write atomically.
    ///
    /// Fails with `RepoError::Commit` when the storage engine refuses, in
    /// which case nothing is visible.
    async fn commit(self) -> Result<Committed, RepoError>;

    /// Discards every write.
    async fn rollback(self) -> Result<(), RepoError>;
}

/// Receipt for a successful commit.
///
/// Lists every account written inside the unit of work. Read caches still
/// hold the pre-commit state of those accounts until the receipt is handed to
/// a [`CacheInvalidator`](crate::ports::CacheInvalidator).
#[must_use = "committed account writes must be invalidated in the read cache"]
#[derive(Debug, Clone, Default)]
pub struct Committed {
    accounts: Vec<AccountKey>,
}

impl Committed {
    pub fn new(mut accounts: Vec<AccountKey>) -> Self {
        let mut seen = std::collections::HashSet::new();
        accounts.retain(|key| seen.insert(*key));
        Self { accounts }
    }

    /// Accounts written inside the unit of work, in first-write order.
    pub fn accounts(&self) -> &[AccountKey] {
        &self.accounts
    }
}
