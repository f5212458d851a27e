//! Provider index and local content store.
//!
//! The index maps content ids to the peers known to provide them and is
//! shared across lookup fan-out, so provider sets are individually locked.
//! The store holds locally hosted bytes under a configurable byte budget
//! with LRU eviction keyed by last access.

use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::identity::{fmt_id, Cid, PeerId};

/// Upper bound on cache entries; the byte budget usually bites first.
const STORE_MAX_ENTRIES: usize = 100_000;

/// What this node knows about one piece of content.
#[derive(Clone, Debug, Default)]
pub struct ContentRecord {
    /// Peers known to provide the content.
    pub providers: BTreeSet<PeerId>,
    /// Size in bytes when known (set once the content has been seen).
    pub size: Option<usize>,
}

/// Shared map of content ids to provider sets, locked per cid.
#[derive(Default)]
pub struct ContentIndex {
    records: RwLock<HashMap<Cid, Arc<RwLock<ContentRecord>>>>,
}

impl ContentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a peer as a provider for a cid, creating the record if needed.
    pub async fn add_provider(&self, cid: Cid, provider: PeerId) {
        let handle = self.handle_or_insert(&cid).await;
        let mut record = handle.write().await;
        record.providers.insert(provider);
    }

    /// Forget a provider for a cid, e.g. after the peer was evicted.
    pub async fn remove_provider(&self, cid: &Cid, provider: &PeerId) {
        let handle = {
            let records = self.records.read().await;
            records.get(cid).cloned()
        };
        if let Some(handle) = handle {
            let mut record = handle.write().await;
            record.providers.remove(provider);
        }
    }

    /// Record the observed byte size of a cid's content.
    pub async fn set_size(&self, cid: Cid, size: usize) {
        let handle = self.handle_or_insert(&cid).await;
        let mut record = handle.write().await;
        record.size = Some(size);
    }

    /// The known providers for a cid, if any.
    pub async fn providers(&self, cid: &Cid) -> Vec<PeerId> {
        let handle = {
            let records = self.records.read().await;
            records.get(cid).cloned()
        };
        match handle {
            Some(record) => record.read().await.providers.iter().copied().collect(),
            None => Vec::new(),
        }
    }

    /// Number of content ids with at least one known provider.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// True when no provider records exist.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn handle_or_insert(&self, cid: &Cid) -> Arc<RwLock<ContentRecord>> {
        {
            let records = self.records.read().await;
            if let Some(handle) = records.get(cid) {
                return handle.clone();
            }
        }
        let mut records = self.records.write().await;
        records
            .entry(*cid)
            .or_insert_with(|| Arc::new(RwLock::new(ContentRecord::default())))
            .clone()
    }
}

/// Local content bytes under a byte budget, LRU-evicted on last access.
pub struct ContentStore {
    inner: Mutex<StoreInner>,
}

struct StoreInner {
    cache: LruCache<Cid, Vec<u8>>,
    budget_bytes: usize,
    used_bytes: usize,
}

impl ContentStore {
    /// Create a store with the given byte budget.
    pub fn new(budget_bytes: usize) -> Self {
        let cap = NonZeroUsize::new(STORE_MAX_ENTRIES).expect("capacity must be non-zero");
        Self {
            inner: Mutex::new(StoreInner {
                cache: LruCache::new(cap),
                budget_bytes,
                used_bytes: 0,
            }),
        }
    }

    /// Store content bytes, evicting least-recently-used entries until the
    /// byte budget is respected. Returns the cids evicted to make room.
    pub async fn put(&self, cid: Cid, data: Vec<u8>) -> Vec<Cid> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.cache.pop(&cid) {
            inner.used_bytes = inner.used_bytes.saturating_sub(existing.len());
        }
        inner.used_bytes = inner.used_bytes.saturating_add(data.len());
        inner.cache.put(cid, data);

        let mut evicted = Vec::new();
        while inner.used_bytes > inner.budget_bytes && inner.cache.len() > 1 {
            if let Some((old_cid, old_data)) = inner.cache.pop_lru() {
                inner.used_bytes = inner.used_bytes.saturating_sub(old_data.len());
                debug!(cid = %fmt_id(&old_cid), bytes = old_data.len(), "evicted content over byte budget");
                evicted.push(old_cid);
            } else {
                break;
            }
        }
        evicted
    }

    /// Fetch content bytes, promoting the entry to most-recently-used.
    pub async fn get(&self, cid: &Cid) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock().await;
        inner.cache.get(cid).cloned()
    }

    /// Whether the store currently holds a cid.
    pub async fn contains(&self, cid: &Cid) -> bool {
        let inner = self.inner.lock().await;
        inner.cache.contains(cid)
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.cache.len()
    }

    /// True when the store holds nothing.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.cache.is_empty()
    }

    /// Bytes currently held.
    pub async fn used_bytes(&self) -> usize {
        self.inner.lock().await.used_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::hash_content;

    fn peer(byte: u8) -> PeerId {
        let mut id = [0u8; 32];
        id[0] = byte;
        id
    }

    #[tokio::test]
    async fn providers_accumulate_without_duplicates() {
        let index = ContentIndex::new();
        let cid = hash_content(b"content");

        index.add_provider(cid, peer(1)).await;
        index.add_provider(cid, peer(2)).await;
        index.add_provider(cid, peer(1)).await;

        let providers = index.providers(&cid).await;
        assert_eq!(providers.len(), 2);
    }

    #[tokio::test]
    async fn unknown_cid_has_no_providers() {
        let index = ContentIndex::new();
        assert!(index.providers(&hash_content(b"missing")).await.is_empty());
    }

    #[tokio::test]
    async fn store_evicts_lru_when_over_budget() {
        let store = ContentStore::new(10);
        let a = hash_content(b"aaaa");
        let b = hash_content(b"bbbb");
        let c = hash_content(b"cccc");

        store.put(a, vec![0u8; 4]).await;
        store.put(b, vec![0u8; 4]).await;
        // Touch `a` so `b` becomes least recently used.
        assert!(store.get(&a).await.is_some());

        let evicted = store.put(c, vec![0u8; 4]).await;
        assert_eq!(evicted, vec![b]);
        assert!(store.contains(&a).await);
        assert!(!store.contains(&b).await);
        assert!(store.contains(&c).await);
        assert!(store.used_bytes().await <= 10);
    }

    #[tokio::test]
    async fn put_replaces_existing_entry_without_double_counting() {
        let store = ContentStore::new(100);
        let cid = hash_content(b"replace me");

        store.put(cid, vec![0u8; 40]).await;
        store.put(cid, vec![0u8; 10]).await;

        assert_eq!(store.used_bytes().await, 10);
        assert_eq!(store.len().await, 1);
    }
}
