//! Cache ports.

use std::time::Duration;

use crate::domain::AccountKey;
use crate::error::CacheError;

/// An external key-value store with per-entry TTL.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Deletes every key matching a glob pattern (`*` matches any run of
    /// characters). Returns the number of keys removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError>;
}

/// Post-commit invalidation of cached account reads.
///
/// Every code path that changes an account outside the cache decorator's own
/// `save`/`delete` must call this after its commit succeeds and before it
/// returns. Implementations never fail the caller: a cache outage is logged
/// and the write still stands.
#[async_trait::async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, accounts: &[AccountKey]);
}
