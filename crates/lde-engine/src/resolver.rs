//! Reference resolution
//!
//! Turns a local id or external locator into the node's composite: cache
//! first, then the local store, then the external source. Child references
//! are resolved recursively in declaration order and spliced into the
//! kind-specific child maps of the composite.
//!
//! # Architecture
//!
//! ```text
//! Reference ──► cache hit? ──yes──► Resolution { from_cache }
//!                  │ no
//!                  ▼
//!       store (by id / by locator) ──missing──► fetch + persist compacted
//!                  │
//!                  ▼
//!       Expander ──► embeds spliced ──► children (recursive, ordered)
//!                  │
//!                  ▼
//!       every built composite written to the cache, leaves first
//! ```
//!
//! Cache writes happen only after the whole resolution succeeded. A failed
//! dereference falls back to the stale entry of the root when one exists.

use crate::error::{EngineError, EngineResult};
use futures::future::{BoxFuture, FutureExt};
use lde_cache::SnapshotCache;
use lde_document::vocab;
use lde_document::{
    extract_references, Cacheable, Composite, DocumentKind, Expandable, LinkedDocument, Locator, NodeId,
    Reference,
};
use lde_expand::{compact_for_storage, ContextRegistry, Embed, Expander};
use lde_store::{DocumentStore, FetchError, LocatorFetcher};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Options of one resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOptions {
    /// Ignore cache entries and rebuild from source
    pub force_refresh: bool,
    /// Omit children that fail to resolve instead of failing the whole
    pub drop_errors: bool,
}

impl ResolveOptions {
    /// Options that bypass the cache
    #[inline]
    #[must_use]
    pub fn refresh() -> Self {
        Self {
            force_refresh: true,
            drop_errors: false,
        }
    }

    /// With drop errors
    #[inline]
    #[must_use]
    pub fn with_drop_errors(mut self, drop_errors: bool) -> Self {
        self.drop_errors = drop_errors;
        self
    }
}

/// Outcome of a resolution
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Resolved composite
    pub composite: Arc<Composite>,
    /// Served from a cache entry that could not be refreshed
    pub stale: bool,
    /// Served from the cache without rebuilding
    pub from_cache: bool,
    /// Keys of children omitted under `drop_errors`
    pub dropped: Vec<String>,
}

impl Resolution {
    fn cached(composite: Arc<Composite>, stale: bool) -> Self {
        Self {
            composite,
            stale,
            from_cache: true,
            dropped: Vec::new(),
        }
    }
}

/// State of one top-level resolution
struct Pass {
    options: ResolveOptions,
    refetch: bool,
    built: Vec<Composite>,
    dropped: Vec<String>,
}

/// Recursive reference resolver
pub struct Resolver {
    store: Arc<dyn DocumentStore>,
    fetcher: Arc<dyn LocatorFetcher>,
    cache: SnapshotCache,
    expander: Expander,
    registry: ContextRegistry,
    fetch_timeout: Duration,
    max_depth: usize,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("expander", &self.expander)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Create resolver
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        fetcher: Arc<dyn LocatorFetcher>,
        cache: SnapshotCache,
        expander: Expander,
        fetch_timeout: Duration,
        max_depth: usize,
    ) -> Self {
        Self {
            store,
            fetcher,
            cache,
            expander,
            registry: ContextRegistry::new(),
            fetch_timeout,
            max_depth,
        }
    }

    /// Known contexts
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ContextRegistry {
        &self.registry
    }

    /// Term expander in use
    #[inline]
    #[must_use]
    pub fn expander(&self) -> &Expander {
        &self.expander
    }

    /// Snapshot cache in use
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Resolve `reference` as a node of `kind`
    ///
    /// # Errors
    /// - `NotFound` if the node does not exist and cannot be fetched
    /// - `MalformedDocument` if it (or, without `drop_errors`, a child) cannot be expanded
    pub async fn resolve(
        &self,
        reference: &Reference,
        kind: DocumentKind,
        options: ResolveOptions,
    ) -> EngineResult<Resolution> {
        let existing = self.locate(reference, kind).await?;
        if let (Some(node), false) = (&existing, options.force_refresh) {
            if let Some(entry) = self.cache.get(&node.id).await {
                return Ok(Resolution::cached(Arc::clone(&entry.expanded), false));
            }
        }

        let mut pass = Pass {
            options,
            refetch: options.force_refresh && reference.is_external(),
            built: Vec::new(),
            dropped: Vec::new(),
        };

        match self.build_root(reference, kind, existing.clone(), &mut pass).await {
            Ok(root) => {
                let mut root_entry = None;
                for composite in pass.built {
                    let (owner, owner_kind) = (composite.cache_key().clone(), composite.model_kind());
                    let entry = self.cache.put(&owner, owner_kind, composite).await?;
                    if owner == root {
                        root_entry = Some(entry);
                    }
                }
                let entry = root_entry
                    .ok_or_else(|| EngineError::malformed(root.as_str(), "root composite was not assembled"))?;
                info!(
                    node = %root,
                    kind = %kind,
                    nodes = entry.expanded.node_count(),
                    dropped = pass.dropped.len(),
                    "resolved"
                );
                Ok(Resolution {
                    composite: Arc::clone(&entry.expanded),
                    stale: false,
                    from_cache: false,
                    dropped: pass.dropped,
                })
            }
            Err(error) if error.is_fetch_failure() => {
                if let Some(node) = existing {
                    if let Some(entry) = self.cache.get(&node.id).await {
                        warn!(node = %node.id, %error, "serving stale cache entry");
                        return Ok(Resolution::cached(Arc::clone(&entry.expanded), true));
                    }
                }
                Err(error.into_unresolved())
            }
            Err(error) => Err(error),
        }
    }

    /// Find an existing node without fetching
    async fn locate(&self, reference: &Reference, kind: DocumentKind) -> EngineResult<Option<LinkedDocument>> {
        match reference {
            Reference::Local(id) => {
                let node = self
                    .store
                    .load(id)
                    .await?
                    .ok_or_else(|| EngineError::not_found(id.as_str()))?;
                check_kind(&node, kind)?;
                Ok(Some(node))
            }
            Reference::Locator(locator) => Ok(self.store.find_by_locator(locator, kind).await?),
        }
    }

    async fn build_root(
        &self,
        reference: &Reference,
        kind: DocumentKind,
        existing: Option<LinkedDocument>,
        pass: &mut Pass,
    ) -> EngineResult<NodeId> {
        let node = match (existing, reference) {
            (Some(node), Reference::Locator(locator)) if pass.refetch => self.refetch(node, locator).await?,
            (Some(node), _) => node,
            (None, Reference::Locator(locator)) => self.import(locator, kind, None).await?,
            (None, Reference::Local(id)) => return Err(EngineError::not_found(id.as_str())),
        };
        let id = node.id.clone();
        self.build(node, pass, Vec::new()).await?;
        Ok(id)
    }

    fn build<'a>(
        &'a self,
        node: LinkedDocument,
        pass: &'a mut Pass,
        ancestors: Vec<String>,
    ) -> BoxFuture<'a, EngineResult<Composite>> {
        async move {
            let key = node.composite_key();
            if ancestors.len() > self.max_depth {
                return Err(EngineError::malformed(
                    key,
                    format!("nesting exceeds maximum depth {}", self.max_depth),
                ));
            }

            let document = self.expand(&node, pass).await?;
            let mut composite = Composite::new(node.kind, node.id.clone(), document);

            let mut path = ancestors;
            path.push(key.clone());
            for list in node.kind.child_lists() {
                let order_key = vocab::expand_iri(list.order_key).unwrap_or_else(|| list.order_key.to_string());
                let references = match composite.document.get(&order_key) {
                    Some(value) => extract_references(value, node.locator.as_ref())
                        .map_err(|e| EngineError::from_reference(key.as_str(), &e))?,
                    None => Vec::new(),
                };

                for reference in references {
                    match self.resolve_child(&node, &reference, list.kind, pass, &path).await {
                        Ok((child_key, child)) => {
                            if let Some(children) = composite.children_mut(list.kind) {
                                children.insert(child_key, child);
                            }
                        }
                        Err(error) if pass.options.drop_errors => {
                            warn!(parent = %key, child = %reference, %error, "dropping unresolvable child");
                            pass.dropped.push(reference.key().to_string());
                        }
                        Err(error) => return Err(error),
                    }
                }
            }

            pass.built.push(composite.clone());
            Ok(composite)
        }
        .boxed()
    }

    async fn resolve_child(
        &self,
        parent: &LinkedDocument,
        reference: &Reference,
        kind: DocumentKind,
        pass: &mut Pass,
        path: &[String],
    ) -> EngineResult<(String, Composite)> {
        if path.iter().any(|k| k == reference.key()) {
            return Err(EngineError::malformed(reference.key(), "reference cycle"));
        }

        let child = self.obtain_child(parent, reference, kind, pass).await?;
        let child_key = child.composite_key();
        if path.contains(&child_key) {
            return Err(EngineError::malformed(child_key, "reference cycle"));
        }

        if !pass.options.force_refresh {
            if let Some(entry) = self.cache.get(&child.id).await {
                return Ok((child_key, (*entry.expanded).clone()));
            }
        }
        let composite = self.build(child, pass, path.to_vec()).await?;
        Ok((child_key, composite))
    }

    async fn obtain_child(
        &self,
        parent: &LinkedDocument,
        reference: &Reference,
        kind: DocumentKind,
        pass: &Pass,
    ) -> EngineResult<LinkedDocument> {
        match reference {
            Reference::Local(id) => {
                let node = self
                    .store
                    .load(id)
                    .await?
                    .ok_or_else(|| EngineError::not_found(id.as_str()))?;
                check_kind(&node, kind)?;
                Ok(node)
            }
            Reference::Locator(locator) => {
                let owned = self
                    .store
                    .find_children(&parent.id, kind)
                    .await?
                    .into_iter()
                    .find(|child| child.locator.as_ref() == Some(locator));
                match owned {
                    Some(node) if pass.refetch => self.refetch(node, locator).await,
                    Some(node) => Ok(node),
                    None => self.import(locator, kind, Some(parent)).await,
                }
            }
        }
    }

    /// Fetch, compact and persist a node that is not stored yet
    async fn import(
        &self,
        locator: &Locator,
        kind: DocumentKind,
        parent: Option<&LinkedDocument>,
    ) -> EngineResult<LinkedDocument> {
        let content = self.fetch_compacted(locator, kind).await?;
        let mut node = LinkedDocument::imported(kind, locator.clone(), content);
        if let Some(parent) = parent {
            node = node.with_parent(parent.id.clone(), parent.kind)?;
        }
        info!(locator = %locator, kind = %kind, node = %node.id, "imported");
        Ok(self.store.save(node).await?)
    }

    /// Re-read a stored node from its source, persisting changed content
    async fn refetch(&self, mut node: LinkedDocument, locator: &Locator) -> EngineResult<LinkedDocument> {
        let content = self.fetch_compacted(locator, node.kind).await?;
        if content == node.content {
            return Ok(node);
        }
        debug!(node = %node.id, locator = %locator, "source changed");
        node.content = content;
        Ok(self.store.save(node).await?)
    }

    async fn fetch_compacted(&self, locator: &Locator, kind: DocumentKind) -> EngineResult<Map<String, Value>> {
        let raw = self.fetch(locator).await?;
        let content = match compact_for_storage(&raw) {
            Value::Object(content) => content,
            other => {
                return Err(EngineError::malformed(
                    locator.as_str(),
                    format!("expected an object, got {other}"),
                ))
            }
        };
        if let Some(declared) = content.get("@type").and_then(DocumentKind::from_type_value) {
            if declared != kind {
                return Err(EngineError::malformed(
                    locator.as_str(),
                    format!("expected a {kind}, document declares a {declared}"),
                ));
            }
        }
        Ok(content)
    }

    /// Time-bounded dereference
    async fn fetch(&self, locator: &Locator) -> EngineResult<Value> {
        match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(locator)).await {
            Ok(result) => result.map_err(EngineError::from_fetch),
            Err(_) => Err(EngineError::from_fetch(FetchError::Timeout {
                locator: locator.clone(),
                after_ms: u64::try_from(self.fetch_timeout.as_millis()).unwrap_or(u64::MAX),
            })),
        }
    }

    /// Expand a node and splice its embeds
    async fn expand(&self, node: &LinkedDocument, pass: &mut Pass) -> EngineResult<Map<String, Value>> {
        let key = node.composite_key();
        self.ensure_contexts(&key, node.compacted(), node.base_locator()).await?;
        let expanded = self
            .expander
            .expand(node.compacted(), &self.registry)
            .map_err(|e| EngineError::from_expand(key.as_str(), &e))?;

        let mut document = expanded.document;
        for embed in &expanded.embeds {
            match self.embed(node, embed).await {
                Ok(target) => self.expander.splice(&mut document, &embed.key, target),
                Err(error) if pass.options.drop_errors => {
                    warn!(node = %key, target = %embed.target, %error, "dropping unresolvable embed");
                    document.remove(&embed.key);
                    pass.dropped.push(embed.target.clone());
                }
                Err(error) => return Err(error),
            }
        }
        Ok(document)
    }

    async fn embed(&self, node: &LinkedDocument, embed: &Embed) -> EngineResult<Map<String, Value>> {
        let reference = Reference::parse(&embed.target, node.base_locator())
            .map_err(|e| EngineError::from_reference(embed.target.as_str(), &e))?;
        let (content, base) = match &reference {
            Reference::Local(id) => {
                let target = self
                    .store
                    .load(id)
                    .await?
                    .ok_or_else(|| EngineError::not_found(id.as_str()))?;
                (target.content, target.locator)
            }
            Reference::Locator(locator) => match compact_for_storage(&self.fetch(locator).await?) {
                Value::Object(content) => (content, Some(locator.clone())),
                other => {
                    return Err(EngineError::malformed(
                        locator.as_str(),
                        format!("expected an object, got {other}"),
                    ))
                }
            },
        };
        self.ensure_contexts(reference.key(), &content, base.as_ref()).await?;
        let expanded = self
            .expander
            .expand(&content, &self.registry)
            .map_err(|e| EngineError::from_expand(reference.key(), &e))?;
        debug!(node = %node.id, target = %reference, "embedded");
        Ok(expanded.document)
    }

    /// Fetch and register every remote context the content needs
    async fn ensure_contexts(&self, key: &str, content: &Map<String, Value>, base: Option<&Locator>) -> EngineResult<()> {
        let Some(context) = content.get("@context") else {
            return Ok(());
        };
        for _ in 0..=self.max_depth {
            let missing = self.registry.missing(context);
            if missing.is_empty() {
                return Ok(());
            }
            for iri in missing {
                let reference = Reference::parse(&iri, base).map_err(|e| EngineError::from_reference(key, &e))?;
                let Reference::Locator(locator) = reference else {
                    return Err(EngineError::malformed(key, format!("context '{iri}' is not a locator")));
                };
                let document = self.fetch(&locator).await?;
                debug!(context = %locator, "registered remote context");
                self.registry.register(&iri, document);
            }
        }
        Err(EngineError::malformed(key, "context imports nest too deeply"))
    }
}

fn check_kind(node: &LinkedDocument, kind: DocumentKind) -> EngineResult<()> {
    if node.kind == kind {
        Ok(())
    } else {
        Err(EngineError::malformed(
            node.id.as_str(),
            format!("expected a {kind}, found a {}", node.kind),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lde_store::InMemoryDocumentStore;
    use lde_test_utils::{fixtures, ScriptedFetcher};
    use pretty_assertions::assert_eq;

    struct Harness {
        store: Arc<InMemoryDocumentStore>,
        fetcher: Arc<ScriptedFetcher>,
        resolver: Resolver,
    }

    fn harness(fetcher: ScriptedFetcher) -> Harness {
        let store = Arc::new(InMemoryDocumentStore::new());
        let fetcher = Arc::new(fetcher);
        let resolver = Resolver::new(
            store.clone(),
            fetcher.clone(),
            SnapshotCache::new(store.clone()),
            Expander::default(),
            Duration::from_millis(200),
            16,
        );
        Harness { store, fetcher, resolver }
    }

    fn protocol_ref() -> Reference {
        Reference::Locator(Locator::parse(fixtures::PROTOCOL_URL).unwrap())
    }

    #[tokio::test]
    async fn resolves_nested_composite() {
        let h = harness(fixtures::remote_protocol());
        let resolution = h
            .resolver
            .resolve(&protocol_ref(), DocumentKind::Protocol, ResolveOptions::default())
            .await
            .unwrap();

        let composite = resolution.composite;
        let activities = composite.children(DocumentKind::Activity).unwrap();
        assert_eq!(activities.keys().collect::<Vec<_>>(), vec![fixtures::ACTIVITY_URL]);
        let items = activities[fixtures::ACTIVITY_URL]
            .children(DocumentKind::Screen)
            .unwrap();
        assert_eq!(items.keys().collect::<Vec<_>>(), vec![fixtures::SCREEN_URL]);
        assert!(!resolution.from_cache);
        assert_eq!(h.store.len(), 3);
    }

    #[tokio::test]
    async fn second_resolution_is_cached_and_identical() {
        let h = harness(fixtures::remote_protocol());
        let first = h
            .resolver
            .resolve(&protocol_ref(), DocumentKind::Protocol, ResolveOptions::default())
            .await
            .unwrap();
        let fetches = h.fetcher.fetch_count();
        let second = h
            .resolver
            .resolve(&protocol_ref(), DocumentKind::Protocol, ResolveOptions::default())
            .await
            .unwrap();

        assert!(second.from_cache);
        assert_eq!(h.fetcher.fetch_count(), fetches);
        assert_eq!(first.composite.to_bytes().unwrap(), second.composite.to_bytes().unwrap());
    }

    #[tokio::test]
    async fn forced_rebuild_from_store_is_identical() {
        let h = harness(fixtures::remote_protocol());
        let first = h
            .resolver
            .resolve(&protocol_ref(), DocumentKind::Protocol, ResolveOptions::default())
            .await
            .unwrap();
        let id = Reference::Local(first.composite.id.clone());
        let rebuilt = h
            .resolver
            .resolve(&id, DocumentKind::Protocol, ResolveOptions::refresh())
            .await
            .unwrap();

        assert!(!rebuilt.from_cache);
        assert_eq!(*first.composite, *rebuilt.composite);
    }

    #[tokio::test]
    async fn missing_child_fails_or_is_dropped() {
        let fetcher = fixtures::remote_protocol();
        fetcher.remove(fixtures::SCREEN_URL);
        let h = harness(fetcher);

        let err = h
            .resolver
            .resolve(&protocol_ref(), DocumentKind::Protocol, ResolveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { ref key, .. } if key == fixtures::SCREEN_URL));
        assert_eq!(h.resolver.cache().stats().entry_count, 0);

        let partial = h
            .resolver
            .resolve(
                &protocol_ref(),
                DocumentKind::Protocol,
                ResolveOptions::default().with_drop_errors(true),
            )
            .await
            .unwrap();
        assert_eq!(partial.dropped, vec![fixtures::SCREEN_URL.to_string()]);
        let activity = &partial.composite.children(DocumentKind::Activity).unwrap()[fixtures::ACTIVITY_URL];
        assert!(activity.children(DocumentKind::Screen).unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_child_aborts_or_is_dropped() {
        let fetcher = fixtures::remote_protocol();
        let mut screen = fixtures::screen_document();
        screen["@context"] = serde_json::json!([fixtures::generic_context(), {"a": "b:x", "b": "a:y"}]);
        screen["a"] = serde_json::json!("loops");
        fetcher.insert(fixtures::SCREEN_URL, screen);
        let h = harness(fetcher);

        let err = h
            .resolver
            .resolve(&protocol_ref(), DocumentKind::Protocol, ResolveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedDocument { .. }), "{err:?}");
        h.resolver.cache().sync().await;
        assert_eq!(h.resolver.cache().stats().entry_count, 0);

        let partial = h
            .resolver
            .resolve(
                &protocol_ref(),
                DocumentKind::Protocol,
                ResolveOptions::default().with_drop_errors(true),
            )
            .await
            .unwrap();
        assert_eq!(partial.dropped, vec![fixtures::SCREEN_URL.to_string()]);
        let activity = &partial.composite.children(DocumentKind::Activity).unwrap()[fixtures::ACTIVITY_URL];
        assert!(activity.children(DocumentKind::Screen).unwrap().is_empty());
        assert_eq!(partial.composite.node_count(), 2);
    }

    #[tokio::test]
    async fn fetch_failure_serves_stale_entry() {
        let h = harness(fixtures::remote_protocol());
        let first = h
            .resolver
            .resolve(&protocol_ref(), DocumentKind::Protocol, ResolveOptions::default())
            .await
            .unwrap();

        h.fetcher.fail_all(true);
        let stale = h
            .resolver
            .resolve(&protocol_ref(), DocumentKind::Protocol, ResolveOptions::refresh())
            .await
            .unwrap();
        assert!(stale.stale);
        assert_eq!(*stale.composite, *first.composite);
    }

    #[tokio::test]
    async fn fetch_failure_without_entry_is_not_found() {
        let h = harness(fixtures::remote_protocol());
        h.fetcher.fail_all(true);
        let err = h
            .resolver
            .resolve(&protocol_ref(), DocumentKind::Protocol, ResolveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { ref key, cause: Some(_) } if key == fixtures::PROTOCOL_URL));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn slow_source_times_out() {
        let h = harness(fixtures::remote_protocol().with_delay(Duration::from_secs(5)));
        let err = h
            .resolver
            .resolve(&protocol_ref(), DocumentKind::Protocol, ResolveOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn kind_mismatch_is_malformed() {
        let h = harness(fixtures::remote_protocol());
        let err = h
            .resolver
            .resolve(
                &Reference::Locator(Locator::parse(fixtures::ACTIVITY_URL).unwrap()),
                DocumentKind::Protocol,
                ResolveOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedDocument { .. }));
    }

    #[tokio::test]
    async fn response_options_are_embedded() {
        let h = harness(fixtures::remote_protocol());
        let resolution = h
            .resolver
            .resolve(&protocol_ref(), DocumentKind::Protocol, ResolveOptions::default())
            .await
            .unwrap();
        let screen = &resolution.composite.children(DocumentKind::Activity).unwrap()[fixtures::ACTIVITY_URL]
            .children(DocumentKind::Screen)
            .unwrap()[fixtures::SCREEN_URL];

        let key = vocab::expand_iri(vocab::keys::RESPONSE_OPTIONS).unwrap();
        let options = screen.document[&key][0].as_object().unwrap();
        assert!(options.keys().any(|k| k.ends_with("terms/choices")));
    }

    #[tokio::test]
    async fn local_graph_resolves_without_fetching() {
        let h = harness(ScriptedFetcher::new());
        let protocol = fixtures::seed_local_protocol(h.store.as_ref()).await;
        let resolution = h
            .resolver
            .resolve(&Reference::Local(protocol.clone()), DocumentKind::Protocol, ResolveOptions::default())
            .await
            .unwrap();

        assert_eq!(h.fetcher.fetch_count(), 0);
        assert_eq!(resolution.composite.id, protocol);
        assert_eq!(resolution.composite.node_count(), 5);
    }
}
