//! Cache-aside decorator for the Account repository.
//!
//! Reads try the cache first and populate it on miss. Writes go to the inner
//! repository first and only then drop the account's single-entity key plus
//! every list key under its owner. [`AccountCache`] is also the post-commit
//! [`CacheInvalidator`] for writes that bypass this decorator (unit of work).

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use ledger_types::{
    Account, AccountContext, AccountId, AccountKey, AccountRepository, CacheError,
    CacheInvalidator, CacheStore, RepoError, UserId,
};

/// Default number of consecutive invalidation failures before alerting.
pub const DEFAULT_ALERT_THRESHOLD: u64 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Keys
// ─────────────────────────────────────────────────────────────────────────────

pub mod keys {
    use ledger_types::{AccountContext, AccountId, UserId};

    pub fn by_id(id: AccountId) -> String {
        format!("account:find_by_id:{}", id)
    }

    pub fn by_user(user_id: UserId) -> String {
        format!("account:find_by_user_id:{}", user_id)
    }

    pub fn by_user_and_context(user_id: UserId, context: AccountContext) -> String {
        format!("account:find_by_user_id_and_context:{}:{}", user_id, context)
    }

    /// Every list key owned by `user_id`.
    pub fn user_namespace(user_id: UserId) -> String {
        format!("account:*:{}*", user_id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Account cache
// ─────────────────────────────────────────────────────────────────────────────

/// Account projections in a [`CacheStore`], with failure tracking.
#[derive(Clone)]
pub struct AccountCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    failures: Arc<AtomicU64>,
    alert_threshold: u64,
}

impl AccountCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            failures: Arc::new(AtomicU64::new(0)),
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
        }
    }

    /// Consecutive failed invalidations that escalate logging to ERROR.
    pub fn with_alert_threshold(mut self, threshold: u64) -> Self {
        self.alert_threshold = threshold.max(1);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Invalidations that failed since the last successful one.
    pub fn consecutive_failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Reads and decodes a cached value. Any failure is a miss.
    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    tracing::trace!(key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache read failed, reading through");
                None
            }
        }
    }

    async fn populate<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                let e = CacheError::Serialization(e.to_string());
                tracing::warn!(key, error = %e, "Skipping cache population");
                return;
            }
        };
        if let Err(e) = self.store.set(key, raw, self.ttl).await {
            tracing::warn!(key, error = %e, "Cache write failed");
        }
    }

    /// Both deletes are always attempted; the first failure is reported.
    async fn evict(&self, key: AccountKey) -> Result<u64, CacheError> {
        let by_id = self.store.delete(&keys::by_id(key.account_id)).await;
        let namespace = self
            .store
            .delete_pattern(&keys::user_namespace(key.user_id))
            .await;
        by_id?;
        namespace
    }
}

#[async_trait]
impl CacheInvalidator for AccountCache {
    async fn invalidate(&self, accounts: &[AccountKey]) {
        for key in accounts {
            match self.evict(*key).await {
                Ok(swept) => {
                    self.failures.store(0, Ordering::Relaxed);
                    tracing::debug!(
                        account_id = %key.account_id,
                        user_id = %key.user_id,
                        swept,
                        "Invalidated account cache"
                    );
                }
                Err(e) => {
                    let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                    if failures >= self.alert_threshold {
                        tracing::error!(
                            account_id = %key.account_id,
                            user_id = %key.user_id,
                            failures,
                            error = %e,
                            "Account cache invalidation keeps failing, reads may serve stale balances"
                        );
                    } else {
                        tracing::warn!(
                            account_id = %key.account_id,
                            user_id = %key.user_id,
                            failures,
                            error = %e,
                            "Account cache invalidation failed"
                        );
                    }
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decorator
// ─────────────────────────────────────────────────────────────────────────────

/// Account repository serving reads through [`AccountCache`].
#[derive(Clone)]
pub struct CachedAccountRepository<R> {
    inner: R,
    cache: AccountCache,
}

impl<R: AccountRepository> CachedAccountRepository<R> {
    pub fn new(inner: R, cache: AccountCache) -> Self {
        Self { inner, cache }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn cache(&self) -> &AccountCache {
        &self.cache
    }
}

#[async_trait]
impl<R: AccountRepository> AccountRepository for CachedAccountRepository<R> {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, RepoError> {
        let key = keys::by_id(id);
        if let Some(account) = self.cache.lookup::<Account>(&key).await {
            return Ok(Some(account));
        }

        let account = self.inner.find_by_id(id).await?;
        if let Some(account) = &account {
            self.cache.populate(&key, account).await;
        }
        Ok(account)
    }

    async fn find_by_user_id(&self, user_id: UserId) -> Result<Vec<Account>, RepoError> {
        let key = keys::by_user(user_id);
        if let Some(accounts) = self.cache.lookup::<Vec<Account>>(&key).await {
            return Ok(accounts);
        }

        let accounts = self.inner.find_by_user_id(user_id).await?;
        self.cache.populate(&key, &accounts).await;
        Ok(accounts)
    }

    async fn find_by_user_id_and_context(
        &self,
        user_id: UserId,
        context: AccountContext,
    ) -> Result<Vec<Account>, RepoError> {
        let key = keys::by_user_and_context(user_id, context);
        if let Some(accounts) = self.cache.lookup::<Vec<Account>>(&key).await {
            return Ok(accounts);
        }

        let accounts = self
            .inner
            .find_by_user_id_and_context(user_id, context)
            .await?;
        self.cache.populate(&key, &accounts).await;
        Ok(accounts)
    }

    async fn save(&self, account: &Account) -> Result<(), RepoError> {
        self.inner.save(account).await?;
        self.cache.invalidate(&[account.key()]).await;
        Ok(())
    }

    async fn delete(&self, id: AccountId) -> Result<(), RepoError> {
        let account = self
            .inner
            .find_by_id(id)
            .await?
            .ok_or(RepoError::NotFound)?;
        self.inner.delete(id).await?;
        self.cache.invalidate(&[account.key()]).await;
        Ok(())
    }

    async fn exists(&self, id: AccountId) -> Result<bool, RepoError> {
        self.inner.exists(id).await
    }

    async fn count(&self, user_id: UserId) -> Result<i64, RepoError> {
        self.inner.count(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use ledger_types::{AccountType, Currency, Money};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    const TTL: Duration = Duration::from_secs(300);

    /// Inner repository counting how often it is read.
    #[derive(Clone, Default)]
    struct CountingRepo {
        accounts: Arc<Mutex<HashMap<AccountId, Account>>>,
        reads: Arc<AtomicUsize>,
    }

    impl CountingRepo {
        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }

        fn put(&self, account: Account) {
            self.accounts.lock().unwrap().insert(account.id(), account);
        }
    }

    #[async_trait]
    impl AccountRepository for CountingRepo {
        async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, RepoError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.accounts.lock().unwrap().get(&id).cloned())
        }

        async fn find_by_user_id(&self, user_id: UserId) -> Result<Vec<Account>, RepoError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .accounts
                .lock()
                .unwrap()
                .values()
                .filter(|a| a.user_id() == user_id)
                .cloned()
                .collect())
        }

        async fn find_by_user_id_and_context(
            &self,
            user_id: UserId,
            context: AccountContext,
        ) -> Result<Vec<Account>, RepoError> {
            let accounts = self.find_by_user_id(user_id).await?;
            Ok(accounts
                .into_iter()
                .filter(|a| a.context() == context)
                .collect())
        }

        async fn save(&self, account: &Account) -> Result<(), RepoError> {
            self.put(account.clone());
            Ok(())
        }

        async fn delete(&self, id: AccountId) -> Result<(), RepoError> {
            self.accounts
                .lock()
                .unwrap()
                .remove(&id)
                .map(|_| ())
                .ok_or(RepoError::NotFound)
        }

        async fn exists(&self, id: AccountId) -> Result<bool, RepoError> {
            Ok(self.accounts.lock().unwrap().contains_key(&id))
        }

        async fn count(&self, user_id: UserId) -> Result<i64, RepoError> {
            Ok(self.find_by_user_id(user_id).await?.len() as i64)
        }
    }

    /// Cache store that is always down.
    struct DownCache;

    #[async_trait]
    impl CacheStore for DownCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn delete_pattern(&self, _pattern: &str) -> Result<u64, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }

    /// Cache store whose single-key delete fails while everything else works.
    #[derive(Clone, Default)]
    struct KeyDeleteDown {
        inner: InMemoryCache,
    }

    #[async_trait]
    impl CacheStore for KeyDeleteDown {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
            self.inner.set(key, value, ttl).await
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection reset".into()))
        }

        async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
            self.inner.delete_pattern(pattern).await
        }
    }

    fn account(user_id: UserId, balance: i64) -> Account {
        Account::open(
            user_id,
            "Main".into(),
            AccountType::Bank,
            AccountContext::Personal,
            Money::new(balance, Currency::BRL).unwrap(),
        )
        .unwrap()
    }

    fn setup() -> (CountingRepo, InMemoryCache, CachedAccountRepository<CountingRepo>) {
        let inner = CountingRepo::default();
        let store = InMemoryCache::new();
        let repo = CachedAccountRepository::new(
            inner.clone(),
            AccountCache::new(Arc::new(store.clone()), TTL),
        );
        (inner, store, repo)
    }

    #[tokio::test]
    async fn test_second_read_is_served_from_cache() {
        let (inner, store, repo) = setup();
        let acc = account(UserId::new(), 500);
        inner.put(acc.clone());

        let first = repo.find_by_id(acc.id()).await.unwrap().unwrap();
        let second = repo.find_by_id(acc.id()).await.unwrap().unwrap();

        assert_eq!(first.balance(), second.balance());
        assert_eq!(inner.reads(), 1);
        assert!(store.contains(&keys::by_id(acc.id())));
    }

    #[tokio::test]
    async fn test_missing_account_is_not_cached() {
        let (inner, store, repo) = setup();
        let id = AccountId::new();

        assert!(repo.find_by_id(id).await.unwrap().is_none());
        assert!(repo.find_by_id(id).await.unwrap().is_none());

        assert_eq!(inner.reads(), 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_entry_falls_through() {
        let (inner, store, repo) = setup();
        let acc = account(UserId::new(), 500);
        inner.put(acc.clone());
        store
            .set(&keys::by_id(acc.id()), "not json".into(), TTL)
            .await
            .unwrap();

        let found = repo.find_by_id(acc.id()).await.unwrap().unwrap();

        assert_eq!(found.id(), acc.id());
        assert_eq!(inner.reads(), 1);
    }

    #[tokio::test]
    async fn test_save_invalidates_entity_and_user_lists() {
        let (inner, store, repo) = setup();
        let user = UserId::new();
        let mut acc = account(user, 500);
        inner.put(acc.clone());

        repo.find_by_id(acc.id()).await.unwrap();
        repo.find_by_user_id(user).await.unwrap();
        repo.find_by_user_id_and_context(user, AccountContext::Personal)
            .await
            .unwrap();
        assert_eq!(store.len(), 3);

        acc.credit(Money::new(100, Currency::BRL).unwrap()).unwrap();
        repo.save(&acc).await.unwrap();

        assert!(store.is_empty());
        let fresh = repo.find_by_id(acc.id()).await.unwrap().unwrap();
        assert_eq!(fresh.balance().amount(), 600);
    }

    #[tokio::test]
    async fn test_invalidation_leaves_other_users_alone() {
        let (inner, store, repo) = setup();
        let (alice, bob) = (UserId::new(), UserId::new());
        let acc = account(alice, 0);
        inner.put(acc.clone());
        inner.put(account(bob, 0));

        repo.find_by_user_id(alice).await.unwrap();
        repo.find_by_user_id(bob).await.unwrap();

        repo.cache().invalidate(&[acc.key()]).await;

        assert!(!store.contains(&keys::by_user(alice)));
        assert!(store.contains(&keys::by_user(bob)));
    }

    #[tokio::test]
    async fn test_delete_invalidates_after_inner_delete() {
        let (inner, store, repo) = setup();
        let acc = account(UserId::new(), 0);
        inner.put(acc.clone());
        repo.find_by_id(acc.id()).await.unwrap();

        repo.delete(acc.id()).await.unwrap();

        assert!(store.is_empty());
        assert!(!repo.exists(acc.id()).await.unwrap());
        assert!(matches!(
            repo.delete(acc.id()).await,
            Err(RepoError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_cache_outage_degrades_to_read_through() {
        let inner = CountingRepo::default();
        let repo = CachedAccountRepository::new(
            inner.clone(),
            AccountCache::new(Arc::new(DownCache), TTL),
        );
        let acc = account(UserId::new(), 700);
        inner.put(acc.clone());

        let found = repo.find_by_id(acc.id()).await.unwrap().unwrap();
        repo.save(&found).await.unwrap();

        assert_eq!(found.balance().amount(), 700);
        assert_eq!(repo.cache().consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_failure_counter_resets_on_success() {
        let down = AccountCache::new(Arc::new(DownCache), TTL).with_alert_threshold(2);
        let key = account(UserId::new(), 0).key();

        for _ in 0..3 {
            down.invalidate(&[key]).await;
        }
        assert_eq!(down.consecutive_failures(), 3);

        let up = AccountCache {
            store: Arc::new(InMemoryCache::new()),
            ..down.clone()
        };
        up.invalidate(&[key]).await;
        assert_eq!(down.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_failed_key_delete_still_sweeps_user_lists() {
        let store = KeyDeleteDown::default();
        let inner = CountingRepo::default();
        let repo = CachedAccountRepository::new(
            inner.clone(),
            AccountCache::new(Arc::new(store.clone()), TTL),
        );
        let user = UserId::new();
        let acc = account(user, 0);
        inner.put(acc.clone());

        repo.find_by_user_id(user).await.unwrap();
        assert!(store.inner.contains(&keys::by_user(user)));

        repo.cache().invalidate(&[acc.key()]).await;

        assert!(!store.inner.contains(&keys::by_user(user)));
        assert_eq!(repo.cache().consecutive_failures(), 1);
    }
}
