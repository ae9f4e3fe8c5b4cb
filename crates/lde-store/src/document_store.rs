//! Document store interface
//!
//! The engine does not own persistence. It reads and writes nodes through
//! [`DocumentStore`], which must support lookup by id, by locator equality
//! and by parent plus kind. [`InMemoryDocumentStore`] is a concurrent
//! reference implementation.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use dashmap::DashMap;
use lde_document::{CacheRef, DocumentKind, LinkedDocument, Locator, NodeId};

/// Persistent store of linked documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load a node by id
    async fn load(&self, id: &NodeId) -> StoreResult<Option<LinkedDocument>>;

    /// Find the node of `kind` imported from `locator`
    async fn find_by_locator(&self, locator: &Locator, kind: DocumentKind) -> StoreResult<Option<LinkedDocument>>;

    /// All nodes of `kind` owned by `parent`, in insertion order
    async fn find_children(&self, parent: &NodeId, kind: DocumentKind) -> StoreResult<Vec<LinkedDocument>>;

    /// Insert or replace a node
    async fn save(&self, document: LinkedDocument) -> StoreResult<LinkedDocument>;

    /// Delete a node
    async fn remove(&self, id: &NodeId) -> StoreResult<()>;

    /// Repoint a node's cache reference
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the node does not exist
    async fn set_cache_ref(&self, id: &NodeId, cache_ref: Option<CacheRef>) -> StoreResult<()> {
        let mut document = self
            .load(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        document.cache_ref = cache_ref;
        self.save(document).await?;
        Ok(())
    }
}

/// Concurrent in-memory [`DocumentStore`]
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    /// Primary storage
    nodes: DashMap<NodeId, LinkedDocument>,

    /// Locator index: (locator, kind) -> id
    by_locator: DashMap<(Locator, DocumentKind), NodeId>,

    /// Reverse index: (parent, kind) -> children in insertion order
    by_parent: DashMap<(NodeId, DocumentKind), Vec<NodeId>>,
}

impl InMemoryDocumentStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the store is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn unindex(&self, old: &LinkedDocument) {
        if let Some(locator) = &old.locator {
            self.by_locator
                .remove_if(&(locator.clone(), old.kind), |_, id| *id == old.id);
        }
        if let Some(parent) = &old.parent_id {
            if let Some(mut children) = self.by_parent.get_mut(&(parent.clone(), old.kind)) {
                children.retain(|id| *id != old.id);
            }
        }
    }

    fn index(&self, document: &LinkedDocument) {
        if let Some(locator) = &document.locator {
            self.by_locator
                .insert((locator.clone(), document.kind), document.id.clone());
        }
        if let Some(parent) = &document.parent_id {
            let mut children = self
                .by_parent
                .entry((parent.clone(), document.kind))
                .or_default();
            if !children.contains(&document.id) {
                children.push(document.id.clone());
            }
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn load(&self, id: &NodeId) -> StoreResult<Option<LinkedDocument>> {
        Ok(self.nodes.get(id).map(|entry| entry.value().clone()))
    }

    async fn find_by_locator(&self, locator: &Locator, kind: DocumentKind) -> StoreResult<Option<LinkedDocument>> {
        let id = self
            .by_locator
            .get(&(locator.clone(), kind))
            .map(|entry| entry.value().clone());
        match id {
            Some(id) => self.load(&id).await,
            None => Ok(None),
        }
    }

    async fn find_children(&self, parent: &NodeId, kind: DocumentKind) -> StoreResult<Vec<LinkedDocument>> {
        let ids = self
            .by_parent
            .get(&(parent.clone(), kind))
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| self.nodes.get(id).map(|entry| entry.value().clone()))
            .collect())
    }

    async fn save(&self, document: LinkedDocument) -> StoreResult<LinkedDocument> {
        if let Some(old) = self.nodes.get(&document.id).map(|entry| entry.value().clone()) {
            if old.locator != document.locator || old.parent_id != document.parent_id {
                self.unindex(&old);
            }
        }
        self.index(&document);
        self.nodes.insert(document.id.clone(), document.clone());
        Ok(document)
    }

    async fn remove(&self, id: &NodeId) -> StoreResult<()> {
        match self.nodes.remove(id) {
            Some((_, old)) => {
                self.unindex(&old);
                self.by_parent.retain(|(parent, _), _| parent != id);
                Ok(())
            }
            None => Err(StoreError::NotFound(id.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn activity_under(parent: &NodeId) -> LinkedDocument {
        LinkedDocument::local(DocumentKind::Activity, Map::new())
            .with_parent(parent.clone(), DocumentKind::Protocol)
            .unwrap()
    }

    #[tokio::test]
    async fn save_load_remove() {
        let store = InMemoryDocumentStore::new();
        let doc = LinkedDocument::local(DocumentKind::Protocol, Map::new());
        store.save(doc.clone()).await.unwrap();

        assert_eq!(store.load(&doc.id).await.unwrap(), Some(doc.clone()));
        store.remove(&doc.id).await.unwrap();
        assert!(store.load(&doc.id).await.unwrap().is_none());
        assert!(matches!(
            store.remove(&doc.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn locator_lookup_is_per_kind() {
        let store = InMemoryDocumentStore::new();
        let locator = Locator::parse("https://example.org/a1").unwrap();
        let doc = LinkedDocument::imported(DocumentKind::Activity, locator.clone(), Map::new());
        store.save(doc.clone()).await.unwrap();

        let found = store
            .find_by_locator(&locator, DocumentKind::Activity)
            .await
            .unwrap();
        assert_eq!(found.map(|d| d.id), Some(doc.id));
        assert!(store
            .find_by_locator(&locator, DocumentKind::Screen)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn children_keep_insertion_order() {
        let store = InMemoryDocumentStore::new();
        let parent = NodeId::generate();
        let a = activity_under(&parent);
        let b = activity_under(&parent);
        store.save(a.clone()).await.unwrap();
        store.save(b.clone()).await.unwrap();
        store.save(a.clone()).await.unwrap();

        let children = store
            .find_children(&parent, DocumentKind::Activity)
            .await
            .unwrap();
        let ids: Vec<_> = children.into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![a.id.clone(), b.id]);

        store.remove(&a.id).await.unwrap();
        assert_eq!(
            store
                .find_children(&parent, DocumentKind::Activity)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn cache_ref_repoint() {
        let store = InMemoryDocumentStore::new();
        let doc = LinkedDocument::local(DocumentKind::Screen, Map::new());
        store.save(doc.clone()).await.unwrap();

        let cache_ref = CacheRef(ulid::Ulid::new());
        store.set_cache_ref(&doc.id, Some(cache_ref)).await.unwrap();
        assert_eq!(
            store.load(&doc.id).await.unwrap().unwrap().cache_ref,
            Some(cache_ref)
        );
        assert!(store
            .set_cache_ref(&NodeId::new("missing"), None)
            .await
            .is_err());
    }
}
