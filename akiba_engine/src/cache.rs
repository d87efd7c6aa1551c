//! Short-TTL cache for read views
//!
//! One process-wide [`ReadCache`] instance caches the balance, goal and transaction-list views that the HTTP layer
//! serves. Entries are advisory only: the reconciliation engine invalidates the affected keys after every durable
//! commit, read paths repopulate lazily on miss, and a cache outage degrades to direct reads. The cache is never a
//! source of truth.
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use log::trace;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

/// Keys for the cached read views. Everything is scoped to a user, so a settlement can drop all views for the
/// affected user in one call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Balance(i64),
    Goal(i64, i64),
    GoalList(i64),
    TransactionList(i64, u32, u32),
}

impl CacheKey {
    fn user_id(&self) -> i64 {
        match self {
            CacheKey::Balance(uid) => *uid,
            CacheKey::Goal(uid, _) => *uid,
            CacheKey::GoalList(uid) => *uid,
            CacheKey::TransactionList(uid, _, _) => *uid,
        }
    }
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

pub struct ReadCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl ReadCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: RwLock::new(HashMap::new()) }
    }

    /// Returns the cached value for the key if it exists and has not passed its TTL. Values that fail to
    /// deserialize are treated as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        serde_json::from_value(entry.value.clone()).ok()
    }

    /// Stores a value under the key with the cache's TTL. Values that fail to serialize are silently not cached;
    /// the next read falls through to the database.
    pub async fn set<T: Serialize>(&self, key: CacheKey, value: &T) {
        let Ok(value) = serde_json::to_value(value) else {
            return;
        };
        let entry = CacheEntry { value, expires_at: Instant::now() + self.ttl };
        let mut entries = self.entries.write().await;
        entries.insert(key, entry);
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
    }

    /// Drops every view belonging to the user. Called by the reconciliation engine after each durable commit, and
    /// only after the commit, so a reader racing a refill can never capture pre-mutation data.
    pub async fn invalidate_user(&self, user_id: i64) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| key.user_id() != user_id);
        trace!("🧹️ Invalidated {} cached views for user #{user_id}", before - entries.len());
    }

    /// Drops expired entries. Called opportunistically; correctness never depends on it.
    pub async fn purge_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn hit_then_expire() {
        let cache = ReadCache::new(Duration::from_millis(50));
        cache.set(CacheKey::Balance(1), &42i64).await;
        assert_eq!(cache.get::<i64>(&CacheKey::Balance(1)).await, Some(42));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get::<i64>(&CacheKey::Balance(1)).await, None);
    }

    #[tokio::test]
    async fn invalidate_user_drops_all_views() {
        let cache = ReadCache::new(Duration::from_secs(60));
        cache.set(CacheKey::Balance(1), &100i64).await;
        cache.set(CacheKey::GoalList(1), &vec![1i64, 2]).await;
        cache.set(CacheKey::TransactionList(1, 0, 50), &vec!["a"]).await;
        cache.set(CacheKey::Balance(2), &7i64).await;

        cache.invalidate_user(1).await;

        assert_eq!(cache.get::<i64>(&CacheKey::Balance(1)).await, None);
        assert_eq!(cache.get::<Vec<i64>>(&CacheKey::GoalList(1)).await, None);
        assert_eq!(cache.get::<Vec<String>>(&CacheKey::TransactionList(1, 0, 50)).await, None);
        // other users' views survive
        assert_eq!(cache.get::<i64>(&CacheKey::Balance(2)).await, Some(7));
    }

    #[tokio::test]
    async fn read_after_invalidate_returns_fresh_value() {
        let cache = ReadCache::new(Duration::from_secs(60));
        cache.set(CacheKey::Balance(9), &100i64).await;
        // commit happens here, then invalidate, then the next read repopulates
        cache.invalidate(&CacheKey::Balance(9)).await;
        assert_eq!(cache.get::<i64>(&CacheKey::Balance(9)).await, None);
        cache.set(CacheKey::Balance(9), &250i64).await;
        assert_eq!(cache.get::<i64>(&CacheKey::Balance(9)).await, Some(250));
    }
}
