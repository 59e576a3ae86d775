//! Bidirectional resolution cache
//!
//! One logical record is stored under every identifier that can reach it
//! (lookup key, resolved address, resolved name). Keys are lower-cased.
//! Writes merge into existing entries of the same address/name pair with the
//! non-empty-wins rule; an entry for a different pair is replaced. The cache
//! never expires entries on read, staleness is left to the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use moka::future::Cache;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ResolverConfig;
use crate::types::ResolutionRecord;

/// Statistics about the cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Merge,
    Refresh,
}

impl WriteMode {
    fn combine(self, existing: &ResolutionRecord, incoming: &ResolutionRecord) -> ResolutionRecord {
        let mut next = existing.clone();
        match self {
            Self::Merge => next.merge(incoming),
            Self::Refresh => next.refresh(incoming),
        }
        next
    }
}

pub struct ResolutionCache {
    entries: Cache<String, Arc<ResolutionRecord>>,
    max_capacity: u64,
    ttl: Duration,
    freshness_window: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResolutionCache {
    pub fn new(max_capacity: u64, ttl: Duration, freshness_window: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self {
            entries,
            max_capacity,
            ttl,
            freshness_window,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(
            config.cache_max_capacity,
            config.cache_ttl,
            config.freshness_window,
        )
    }

    /// Start a fresh lifecycle: drop all entries and counters
    pub fn init(&self) {
        self.entries.invalidate_all();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        info!(
            max_capacity = self.max_capacity,
            ttl_secs = self.ttl.as_secs(),
            freshness_secs = self.freshness_window.as_secs(),
            "Resolution cache initialized"
        );
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
        debug!("Resolution cache cleared");
    }

    pub fn normalize_key(key: &str) -> String {
        key.trim().to_lowercase()
    }

    /// Look up a record. A present key is a hit even if the record carries no
    /// enrichment.
    pub async fn get(&self, key: &str) -> Option<Arc<ResolutionRecord>> {
        let key = Self::normalize_key(key);
        match self.entries.get(&key).await {
            Some(record) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache hit");
                Some(record)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Cache miss");
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&Self::normalize_key(key))
    }

    /// Merge `record` into the entry at `key`, non-empty wins. An entry that
    /// belongs to a different address/name pair is replaced instead.
    pub async fn put(&self, key: &str, record: &ResolutionRecord) -> Arc<ResolutionRecord> {
        self.upsert(key, record, WriteMode::Merge).await
    }

    /// Store a record under the lookup key and under its resolved address and
    /// name, so a later lookup from either direction is a hit.
    ///
    /// Existing entries for the same pair are folded in first, which leaves
    /// all of them holding the same content.
    pub async fn write_through(
        &self,
        lookup_key: &str,
        record: &ResolutionRecord,
    ) -> Arc<ResolutionRecord> {
        self.write_all(lookup_key, record, WriteMode::Merge).await
    }

    /// Like [`Self::write_through`], but newer non-empty enrichment replaces
    /// what is cached. Used when re-fetching stale entries.
    pub async fn refresh(
        &self,
        lookup_key: &str,
        record: &ResolutionRecord,
    ) -> Arc<ResolutionRecord> {
        self.write_all(lookup_key, record, WriteMode::Refresh).await
    }

    async fn write_all(
        &self,
        lookup_key: &str,
        record: &ResolutionRecord,
        mode: WriteMode,
    ) -> Arc<ResolutionRecord> {
        let keys = Self::keys_for(lookup_key, record);

        let mut combined: Option<ResolutionRecord> = None;
        for key in &keys {
            let Some(existing) = self.entries.get(key).await else {
                continue;
            };
            if !existing.same_identity(record) {
                debug!(key = %key, "Cached entry belongs to another pair, replacing");
                continue;
            }
            match combined.as_mut() {
                Some(acc) => acc.merge(&existing),
                None => combined = Some(existing.as_ref().clone()),
            }
        }
        let combined = match combined {
            Some(acc) => mode.combine(&acc, record),
            None => record.clone(),
        };

        let mut stored = Arc::new(combined.clone());
        for key in &keys {
            stored = self.upsert(key, &combined, mode).await;
        }
        debug!(keys = ?keys, ?mode, "Cached resolution");
        stored
    }

    async fn upsert(
        &self,
        key: &str,
        record: &ResolutionRecord,
        mode: WriteMode,
    ) -> Arc<ResolutionRecord> {
        let key = Self::normalize_key(key);
        let incoming = record.clone();

        self.entries
            .entry(key)
            .and_upsert_with(|existing| {
                let next = match existing {
                    Some(entry) if entry.value().same_identity(&incoming) => {
                        mode.combine(entry.value(), &incoming)
                    }
                    _ => incoming,
                };
                std::future::ready(Arc::new(next))
            })
            .await
            .into_value()
    }

    pub fn is_stale(&self, record: &ResolutionRecord) -> bool {
        let age = Utc::now().signed_duration_since(record.fetched_at);
        age.to_std()
            .map(|age| age > self.freshness_window)
            .unwrap_or(false)
    }

    pub async fn stats(&self) -> CacheStats {
        self.entries.run_pending_tasks().await;
        CacheStats {
            entries: self.entries.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn keys_for(lookup_key: &str, record: &ResolutionRecord) -> Vec<String> {
        let mut keys = vec![Self::normalize_key(lookup_key)];
        for identifier in [&record.address, &record.name].into_iter().flatten() {
            let key = Self::normalize_key(identifier);
            if !key.is_empty() && !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ALICE_ADDRESS, CAROL_ADDRESS};

    fn cache() -> ResolutionCache {
        ResolutionCache::new(1_000, Duration::from_secs(3600), Duration::from_secs(300))
    }

    fn alice_record() -> ResolutionRecord {
        let mut record = ResolutionRecord::new();
        record.name = Some("alice.eth".to_string());
        record.address = Some(ALICE_ADDRESS.to_string());
        record.avatar_url = Some("https://img.example/alice.png".to_string());
        record
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = cache();
        assert!(cache.get("alice.eth").await.is_none());
        cache.put("alice.eth", &alice_record()).await;
        assert!(cache.get("alice.eth").await.is_some());

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_keys_are_case_normalized() {
        let cache = cache();
        cache.put("Alice.ETH", &alice_record()).await;
        assert!(cache.contains("alice.eth"));
        assert!(cache.get(" ALICE.eth ").await.is_some());
    }

    #[tokio::test]
    async fn test_empty_record_still_counts_as_hit() {
        let cache = cache();
        cache.put("ghost.eth", &ResolutionRecord::new()).await;
        let hit = cache.get("ghost.eth").await.unwrap();
        assert!(hit.avatar_url.is_none());
    }

    #[tokio::test]
    async fn test_write_through_indexes_both_directions() {
        let cache = cache();
        cache.write_through("alice.eth", &alice_record()).await;

        let by_name = cache.get("alice.eth").await.unwrap();
        let by_address = cache.get(&ALICE_ADDRESS.to_lowercase()).await.unwrap();
        assert_eq!(*by_name, *by_address);
        assert_eq!(cache.stats().await.entries, 2);
    }

    #[tokio::test]
    async fn test_write_through_from_address_lookup() {
        let cache = cache();
        cache.write_through(ALICE_ADDRESS, &alice_record()).await;
        assert!(cache.contains("alice.eth"));
        assert!(cache.contains(ALICE_ADDRESS));
    }

    #[tokio::test]
    async fn test_put_never_regresses_populated_fields() {
        let cache = cache();
        cache.put("alice.eth", &alice_record()).await;

        let mut sparse = ResolutionRecord::new();
        sparse.name = Some("alice.eth".to_string());
        sparse.biography = Some("gm".to_string());
        let merged = cache.put("alice.eth", &sparse).await;

        assert_eq!(
            merged.avatar_url.as_deref(),
            Some("https://img.example/alice.png")
        );
        assert_eq!(merged.biography.as_deref(), Some("gm"));
    }

    #[tokio::test]
    async fn test_write_through_aligns_existing_entries() {
        let cache = cache();
        let mut by_address = ResolutionRecord::new();
        by_address.address = Some(ALICE_ADDRESS.to_string());
        by_address.biography = Some("from reverse lookup".to_string());
        cache.put(ALICE_ADDRESS, &by_address).await;

        cache.write_through("alice.eth", &alice_record()).await;

        let a = cache.get("alice.eth").await.unwrap();
        let b = cache.get(ALICE_ADDRESS).await.unwrap();
        assert_eq!(a.biography.as_deref(), Some("from reverse lookup"));
        assert_eq!(a.avatar_url, b.avatar_url);
        assert_eq!(a.biography, b.biography);
    }

    #[tokio::test]
    async fn test_write_through_replaces_entry_of_another_pair() {
        let cache = cache();
        cache.write_through("alice.eth", &alice_record()).await;

        let mut carol = ResolutionRecord::new();
        carol.name = Some("alice.eth".to_string());
        carol.address = Some(CAROL_ADDRESS.to_string());
        let stored = cache.write_through(CAROL_ADDRESS, &carol).await;

        assert_eq!(stored.address.as_deref(), Some(CAROL_ADDRESS));
        assert!(stored.avatar_url.is_none());
        let by_name = cache.get("alice.eth").await.unwrap();
        assert_eq!(by_name.address.as_deref(), Some(CAROL_ADDRESS));
        let by_old_address = cache.get(ALICE_ADDRESS).await.unwrap();
        assert_eq!(by_old_address.address.as_deref(), Some(ALICE_ADDRESS));
    }

    #[tokio::test]
    async fn test_refresh_takes_newer_values() {
        let cache = cache();
        let mut stale = alice_record();
        stale.biography = Some("old bio".to_string());
        stale.fetched_at = Utc::now() - chrono::Duration::seconds(3600);
        cache.write_through("alice.eth", &stale).await;

        let mut fresh = alice_record();
        fresh.avatar_url = Some("https://img.example/new.png".to_string());
        cache.refresh("alice.eth", &fresh).await;

        for key in ["alice.eth", ALICE_ADDRESS] {
            let cached = cache.get(key).await.unwrap();
            assert_eq!(cached.avatar_url.as_deref(), Some("https://img.example/new.png"));
            assert_eq!(cached.biography.as_deref(), Some("old bio"));
            assert!(!cache.is_stale(&cached));
        }
    }

    #[tokio::test]
    async fn test_clear_drops_entries() {
        let cache = cache();
        cache.write_through("alice.eth", &alice_record()).await;
        cache.clear();
        assert!(cache.get("alice.eth").await.is_none());
    }

    #[test]
    fn test_staleness_uses_freshness_window() {
        let cache = cache();
        let fresh = ResolutionRecord::new();
        assert!(!cache.is_stale(&fresh));

        let mut old = ResolutionRecord::new();
        old.fetched_at = Utc::now() - chrono::Duration::seconds(301);
        assert!(cache.is_stale(&old));
    }
}
