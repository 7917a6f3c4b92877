//! In-process key-value cache with per-entry TTL.
//!
//! Implements the [`CacheStore`] port for single-process deployments and
//! tests. Expired entries are dropped lazily on read and on pattern sweeps.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use ledger_types::{CacheError, CacheStore};

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Cache store shared across clones.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<DashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now()))
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let hit = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        // Read guard is released before removal.
        if hit {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|key, entry| {
            if glob_match(pattern, key) {
                if !entry.is_expired(now) {
                    removed += 1;
                }
                return false;
            }
            !entry.is_expired(now)
        });
        Ok(removed)
    }
}

/// Matches `text` against a pattern where `*` stands for any run of
/// characters, including none.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.as_bytes();
    let text = text.as_bytes();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_glob_match() {
        assert!(glob_match("account:*:u1*", "account:find_by_user_id:u1"));
        assert!(glob_match(
            "account:*:u1*",
            "account:find_by_user_id_and_context:u1:PERSONAL"
        ));
        assert!(!glob_match("account:*:u1*", "account:find_by_id:a1"));
        assert!(glob_match("*", ""));
        assert!(glob_match("a*b*c", "aXXbYYc"));
        assert!(!glob_match("a*b*c", "aXXbYY"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = InMemoryCache::new();
        cache.set("k", "v".into(), TTL).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = InMemoryCache::new();
        cache.set("k", "v".into(), Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.contains("k"));
    }

    #[tokio::test]
    async fn test_delete_pattern_counts_removed_keys() {
        let cache = InMemoryCache::new();
        cache.set("account:find_by_user_id:u1", "[]".into(), TTL).await.unwrap();
        cache
            .set("account:find_by_user_id_and_context:u1:BUSINESS", "[]".into(), TTL)
            .await
            .unwrap();
        cache.set("account:find_by_user_id:u2", "[]".into(), TTL).await.unwrap();

        let removed = cache.delete_pattern("account:*:u1*").await.unwrap();

        assert_eq!(removed, 2);
        assert!(cache.contains("account:find_by_user_id:u2"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let cache = InMemoryCache::new();
        let other = cache.clone();
        cache.set("k", "v".into(), TTL).await.unwrap();
        assert!(other.contains("k"));
    }
}
