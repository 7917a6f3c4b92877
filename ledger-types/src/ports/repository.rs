//! Repository port traits.
//!
//! Adapters (Postgres, SQLite, the cache-aside decorator) implement these.
//! The same traits are implemented by the pool-backed repositories and by the
//! repositories scoped to a unit of work, so use cases are agnostic to both
//! caching and transaction scope.

use crate::domain::{
    Account, AccountContext, AccountId, Transaction, TransactionId, UserId,
};
use crate::error::RepoError;

/// Persistence for the Account aggregate.
#[async_trait::async_trait]
pub trait AccountRepository: Send + Sync {
    /// Gets an account by ID.
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, RepoError>;

    /// Lists a user's accounts, oldest first.
    async fn find_by_user_id(&self, user_id: UserId) -> Result<Vec<Account>, RepoError>;

    /// Lists a user's accounts in one context, oldest first.
    async fn find_by_user_id_and_context(
        &self,
        user_id: UserId,
        context: AccountContext,
    ) -> Result<Vec<Account>, RepoError>;

    /// Inserts or updates an account. Owner, type, context and currency are
    /// fixed at insert.
    async fn save(&self, account: &Account) -> Result<(), RepoError>;

    /// Hard-deletes an account. Administrative only.
    ///
    /// Returns `RepoError::NotFound` if absent and `RepoError::Conflict` while
    /// transactions still reference it.
    async fn delete(&self, id: AccountId) -> Result<(), RepoError>;

    async fn exists(&self, id: AccountId) -> Result<bool, RepoError>;

    /// Number of accounts owned by a user.
    async fn count(&self, user_id: UserId) -> Result<i64, RepoError>;
}

/// Persistence for the Transaction aggregate.
#[async_trait::async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Gets a live (not soft-deleted) transaction by ID.
    async fn find_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError>;

    /// Lists live transactions for an account, most recent first.
    async fn find_by_account_id(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, RepoError>;

    /// Inserts or updates a transaction, including its soft-delete marker.
    async fn save(&self, transaction: &Transaction) -> Result<(), RepoError>;
}
