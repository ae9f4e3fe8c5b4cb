//! Entity-keyed snapshot cache using moka
//!
//! One live entry per owning node id. Entries are immutable: [`SnapshotCache::put`]
//! always builds a fresh [`CacheEntry`] and swaps it in, so a concurrent
//! [`SnapshotCache::get`] observes either the old or the new entry.
//!
//! There is no capacity bound and no expiry. Removal is explicit through
//! [`SnapshotCache::invalidate`].

use chrono::{DateTime, Utc};
use lde_document::{CacheRef, Composite, ContentHash, DocumentKind, NodeId};
use lde_store::{DocumentStore, StoreError};
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use ulid::Ulid;

/// Errors from cache writes
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Repointing the owner's cache reference failed
    #[error("cache reference update failed for {owner}: {source}")]
    Store {
        owner: NodeId,
        #[source]
        source: StoreError,
    },

    /// Composite could not be serialized for sizing
    #[error("cannot serialize composite of {owner}: {reason}")]
    Serialize { owner: NodeId, reason: String },
}

impl CacheError {
    /// Node whose entry was being written
    #[must_use]
    pub fn owner(&self) -> &NodeId {
        match self {
            Self::Store { owner, .. } | Self::Serialize { owner, .. } => owner,
        }
    }
}

/// One precomputed expanded composite
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Fresh id per write, stored on the owner as its cache reference
    pub entry_id: Ulid,
    /// Owning node
    pub owner_id: NodeId,
    /// Kind of the owning node
    pub kind: DocumentKind,
    /// Self-contained composite
    pub expanded: Arc<Composite>,
    /// Write time
    pub updated_at: DateTime<Utc>,
    /// Serialized size of `expanded` (advisory)
    pub size_bytes: u64,
    /// Digest of the serialized composite
    pub digest: ContentHash,
}

impl CacheEntry {
    /// Cache reference naming this entry
    #[inline]
    #[must_use]
    pub fn cache_ref(&self) -> CacheRef {
        CacheRef(self.entry_id)
    }
}

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of live entries
    pub entry_count: u64,
    /// Sum of entry sizes
    pub total_bytes: u64,
    /// Lookups that found an entry
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
}

/// Entity-keyed cache of expanded composites
///
/// Cloning shares the underlying storage and counters.
#[derive(Clone)]
pub struct SnapshotCache {
    inner: Cache<NodeId, Arc<CacheEntry>>,
    store: Arc<dyn DocumentStore>,
    bytes: Arc<AtomicU64>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl std::fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCache")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl SnapshotCache {
    /// Create an empty cache that records cache references in `store`
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner: Cache::builder().build(),
            store,
            bytes: Arc::new(AtomicU64::new(0)),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Live entry of an owner
    pub async fn get(&self, owner: &NodeId) -> Option<Arc<CacheEntry>> {
        let entry = self.inner.get(owner).await;
        if entry.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("lde_cache_hits_total").increment(1);
            debug!(node = %owner, "cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("lde_cache_misses_total").increment(1);
            debug!(node = %owner, "cache miss");
        }
        entry
    }

    /// Replace the owner's entry with a fresh one
    ///
    /// The owner's cache reference is repointed before the entry becomes
    /// visible. The previous entry is never modified.
    ///
    /// # Errors
    /// Returns [`CacheError`] if the composite cannot be serialized or the
    /// store rejects the cache reference
    pub async fn put(
        &self,
        owner: &NodeId,
        kind: DocumentKind,
        expanded: Composite,
    ) -> Result<Arc<CacheEntry>, CacheError> {
        let bytes = expanded.to_bytes().map_err(|e| CacheError::Serialize {
            owner: owner.clone(),
            reason: e.to_string(),
        })?;
        let entry = Arc::new(CacheEntry {
            entry_id: Ulid::new(),
            owner_id: owner.clone(),
            kind,
            expanded: Arc::new(expanded),
            updated_at: Utc::now(),
            size_bytes: bytes.len() as u64,
            digest: ContentHash::compute(&bytes),
        });

        self.store
            .set_cache_ref(owner, Some(entry.cache_ref()))
            .await
            .map_err(|source| CacheError::Store {
                owner: owner.clone(),
                source,
            })?;

        let previous = self.inner.get(owner).await;
        self.inner.insert(owner.clone(), Arc::clone(&entry)).await;
        self.account(entry.size_bytes, previous.map_or(0, |p| p.size_bytes));

        debug!(
            node = %owner,
            kind = %kind,
            entry = %entry.entry_id,
            bytes = entry.size_bytes,
            "cache entry written"
        );
        Ok(entry)
    }

    /// Drop the owner's entry and clear its cache reference
    ///
    /// A missing owner node is not an error: the entry is removed either way.
    ///
    /// # Errors
    /// Returns [`CacheError::Store`] on a store backend failure
    pub async fn invalidate(&self, owner: &NodeId) -> Result<(), CacheError> {
        match self.store.set_cache_ref(owner, None).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(source) => {
                return Err(CacheError::Store {
                    owner: owner.clone(),
                    source,
                })
            }
        }
        if let Some(previous) = self.inner.remove(owner).await {
            self.account(0, previous.size_bytes);
            debug!(node = %owner, entry = %previous.entry_id, "cache entry invalidated");
        }
        Ok(())
    }

    /// Whether the owner currently has an entry
    #[must_use]
    pub fn contains(&self, owner: &NodeId) -> bool {
        self.inner.contains_key(owner)
    }

    /// Apply pending maintenance so counts are exact
    pub async fn sync(&self) {
        self.inner.run_pending_tasks().await;
    }

    /// Current statistics (entry count is approximate until [`Self::sync`])
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
            total_bytes: self.bytes.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn account(&self, added: u64, removed: u64) {
        let total = if added >= removed {
            self.bytes.fetch_add(added - removed, Ordering::Relaxed) + (added - removed)
        } else {
            let delta = removed - added;
            let prev = self
                .bytes
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |b| {
                    Some(b.saturating_sub(delta))
                })
                .unwrap_or(0);
            prev.saturating_sub(delta)
        };
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("lde_cache_bytes").set(total as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lde_document::LinkedDocument;
    use lde_store::InMemoryDocumentStore;
    use serde_json::{json, Map};

    async fn setup() -> (Arc<InMemoryDocumentStore>, SnapshotCache, NodeId) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let doc = LinkedDocument::local(DocumentKind::Protocol, Map::new());
        store.save(doc.clone()).await.unwrap();
        let cache = SnapshotCache::new(store.clone());
        (store, cache, doc.id)
    }

    fn composite(id: &NodeId, label: &str) -> Composite {
        let document = json!({"skos:prefLabel": label}).as_object().cloned().unwrap();
        Composite::new(DocumentKind::Protocol, id.clone(), document)
    }

    #[tokio::test]
    async fn put_then_get_returns_value() {
        let (store, cache, id) = setup().await;
        let written = cache
            .put(&id, DocumentKind::Protocol, composite(&id, "a"))
            .await
            .unwrap();

        let read = cache.get(&id).await.unwrap();
        assert_eq!(read, written);
        assert_eq!(*read.expanded, composite(&id, "a"));
        assert_eq!(
            store.load(&id).await.unwrap().unwrap().cache_ref,
            Some(written.cache_ref())
        );
    }

    #[tokio::test]
    async fn put_never_mutates_previous_entry() {
        let (_store, cache, id) = setup().await;
        let first = cache
            .put(&id, DocumentKind::Protocol, composite(&id, "a"))
            .await
            .unwrap();
        let second = cache
            .put(&id, DocumentKind::Protocol, composite(&id, "b"))
            .await
            .unwrap();

        assert_ne!(first.entry_id, second.entry_id);
        assert_eq!(*first.expanded, composite(&id, "a"));
        assert_eq!(cache.get(&id).await.unwrap().entry_id, second.entry_id);
    }

    #[tokio::test]
    async fn invalidate_clears_entry_and_reference() {
        let (store, cache, id) = setup().await;
        cache
            .put(&id, DocumentKind::Protocol, composite(&id, "a"))
            .await
            .unwrap();
        cache.invalidate(&id).await.unwrap();

        assert!(cache.get(&id).await.is_none());
        assert!(store.load(&id).await.unwrap().unwrap().cache_ref.is_none());

        cache.sync().await;
        let stats = cache.stats();
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.total_bytes, 0);
        assert_eq!((stats.hits, stats.misses), (0, 1));
    }

    #[tokio::test]
    async fn invalidate_tolerates_missing_owner() {
        let (_store, cache, _id) = setup().await;
        cache.invalidate(&NodeId::new("gone")).await.unwrap();
    }

    #[tokio::test]
    async fn put_for_unknown_owner_fails_without_entry() {
        let (_store, cache, _id) = setup().await;
        let ghost = NodeId::new("ghost");
        let err = cache
            .put(&ghost, DocumentKind::Screen, composite(&ghost, "x"))
            .await
            .unwrap_err();

        assert_eq!(err.owner(), &ghost);
        assert!(!cache.contains(&ghost));
    }

    #[tokio::test]
    async fn identical_composites_share_digest() {
        let (_store, cache, id) = setup().await;
        let a = cache
            .put(&id, DocumentKind::Protocol, composite(&id, "same"))
            .await
            .unwrap();
        let b = cache
            .put(&id, DocumentKind::Protocol, composite(&id, "same"))
            .await
            .unwrap();

        assert_eq!(a.digest, b.digest);
        assert_eq!(cache.stats().total_bytes, b.size_bytes);
    }
}
