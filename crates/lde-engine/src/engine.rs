//! Engine facade
//!
//! [`Engine`] wires the resolver, cache, history manager, duplicator and
//! warm-up pool together and exposes the operations the outer layers use.
//!
//! # Edits
//!
//! ```text
//! apply_delta(P, delta)
//!   ├─ check target version > current
//!   ├─ load edit tree from the store, apply operations in memory
//!   ├─ rewrite order lists (Add keys → ids, prune removed, append added)
//!   ├─ history: begin → snapshot_if_changed → end      (before any write)
//!   ├─ commit node writes and removals
//!   ├─ invalidate touched nodes, forced rebuild of P
//!   └─ record content version, queue warm-up of touched activities
//! ```

use crate::config::EngineConfig;
use crate::diff::{classify, diff, patch_from_changes, ChangeSet};
use crate::duplicate::Duplicator;
use crate::error::{EngineError, EngineResult};
use crate::history::{EditNode, EditSummary, HistoricalContent, HistoryManager};
use crate::resolver::{Resolution, ResolveOptions, Resolver};
use crate::warmer::{WarmupJob, WarmupPool, WarmupStats};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use lde_cache::{CacheStats, SnapshotCache};
use lde_document::vocab::{self, keys};
use lde_document::{
    extract_references, Composite, DeltaOperation, DocumentDelta, DocumentKind, Identifier, IdentifierMapping,
    LinkedDocument, Locator, NodeId, Reference, Version,
};
use lde_expand::Expander;
use lde_store::{DocumentStore, HistoryStore, LocatorFetcher};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a committed edit
#[derive(Debug, Clone)]
pub struct EditOutcome {
    /// Edited protocol
    pub protocol_id: NodeId,
    /// Version the protocol now carries
    pub version: Version,
    /// Rebuilt composite
    pub composite: Arc<Composite>,
    /// History written by the edit
    pub history: EditSummary,
    /// Ids assigned to `Add` keys
    pub created: IndexMap<String, NodeId>,
    /// Nodes deleted by the edit, subtrees included
    pub removed: Vec<NodeId>,
}

/// Linked-document resolution, caching and versioning engine
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn DocumentStore>,
    resolver: Arc<Resolver>,
    history: HistoryManager,
    duplicator: Duplicator,
    warmer: WarmupPool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .field("warmer", &self.warmer)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Build an engine from configuration and collaborators
    ///
    /// Must be called inside a Tokio runtime (the warm-up workers start here).
    #[must_use]
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn DocumentStore>,
        history: Arc<dyn HistoryStore>,
        fetcher: Arc<dyn LocatorFetcher>,
    ) -> Self {
        let resolver = Arc::new(Resolver::new(
            Arc::clone(&store),
            fetcher,
            SnapshotCache::new(Arc::clone(&store)),
            Expander::new(config.expand.clone()),
            config.fetch_timeout(),
            config.max_depth,
        ));
        let warmer = WarmupPool::new(Arc::clone(&resolver), config.warmup_workers, config.warmup_queue);
        let duplicator = Duplicator::new(
            Arc::clone(&store),
            Arc::clone(&resolver),
            config.default_language.clone(),
        );
        info!(
            workers = config.warmup_workers,
            fetch_timeout_ms = config.fetch_timeout_ms,
            max_depth = config.max_depth,
            "engine started"
        );
        Self {
            history: HistoryManager::new(history, Arc::clone(&store)),
            config,
            store,
            resolver,
            duplicator,
            warmer,
        }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolve `reference` as a node of `kind`
    ///
    /// # Errors
    /// See [`Resolver::resolve`]
    pub async fn resolve(
        &self,
        reference: &Reference,
        kind: DocumentKind,
        options: ResolveOptions,
    ) -> EngineResult<Resolution> {
        self.resolver.resolve(reference, kind, options).await
    }

    /// Drop the cache entries of `id` and of every ancestor embedding it
    ///
    /// # Errors
    /// `NotFound` if the node does not exist
    pub async fn invalidate(&self, id: &NodeId) -> EngineResult<()> {
        let mut next = Some(self.load(id).await?);
        while let Some(node) = next {
            self.resolver.cache().invalidate(&node.id).await?;
            debug!(node = %node.id, kind = %node.kind, "cache entry invalidated");
            next = match &node.parent_id {
                Some(parent) => self.store.load(parent).await?,
                None => None,
            };
        }
        Ok(())
    }

    /// Queue a forced rebuild of a protocol; returns whether it was queued
    pub fn refresh(&self, protocol_id: &NodeId) -> bool {
        self.warmer
            .submit(WarmupJob::refresh(protocol_id.clone(), DocumentKind::Protocol))
    }

    /// Duplicate a protocol graph under fresh ids
    ///
    /// # Errors
    /// See [`Duplicator::duplicate`]
    pub async fn duplicate(&self, protocol_id: &NodeId, label: Option<&str>) -> EngineResult<NodeId> {
        self.duplicator.duplicate(protocol_id, label).await
    }

    /// What changed in a protocol since a client's version (or timestamp)
    ///
    /// # Errors
    /// Resolution or store failures
    pub async fn changes_since(
        &self,
        protocol_id: &NodeId,
        since_version: &Version,
        since: Option<DateTime<Utc>>,
    ) -> EngineResult<ChangeSet> {
        let protocol = self.load_protocol(protocol_id).await?;
        let current = self
            .resolver
            .resolve(
                &Reference::Local(protocol_id.clone()),
                DocumentKind::Protocol,
                ResolveOptions::default(),
            )
            .await?
            .composite;

        let entries = self.history.references(protocol_id).await?;
        let changes = classify(&entries, since_version, since);

        let patch = if self.history.has_content_version(protocol_id, since_version).await? {
            let base = self.history.protocol_at_version(protocol_id, since_version).await?;
            diff(&base, &current)
        } else {
            patch_from_changes(&current, &changes)
        };

        debug!(
            protocol = %protocol_id,
            since = %since_version,
            kinds = changes.len(),
            patched = patch.touched(),
            "changes computed"
        );
        Ok(ChangeSet {
            protocol_id: protocol_id.clone(),
            since_version: since_version.clone(),
            current_version: protocol.version()?,
            changes,
            patch,
        })
    }

    /// Published versions of a protocol, newest first
    ///
    /// # Errors
    /// Store failures
    pub async fn protocol_versions(&self, protocol_id: &NodeId) -> EngineResult<Vec<(Version, DateTime<Utc>)>> {
        self.history.protocol_versions(protocol_id).await
    }

    /// Composite published at `version`
    ///
    /// # Errors
    /// `VersionConflict` if nothing was recorded for that version
    pub async fn protocol_at_version(&self, protocol_id: &NodeId, version: &Version) -> EngineResult<Composite> {
        self.history.protocol_at_version(protocol_id, version).await
    }

    /// Content of `identifier` within a protocol as of `version`
    ///
    /// # Errors
    /// Store failures
    pub async fn content_at_version(
        &self,
        protocol_id: &NodeId,
        identifier: &Identifier,
        version: &Version,
    ) -> EngineResult<HistoricalContent> {
        self.history.content_at_version(protocol_id, identifier, version).await
    }

    /// Apply an edit to a protocol graph
    ///
    /// # Errors
    /// - `VersionConflict` unless the target version is above the current one
    /// - `NotFound` for operations naming unknown nodes
    /// - `IdentifierCollision` for reused `Add` keys
    /// - `MalformedDocument` for operations the graph cannot hold
    pub async fn apply_delta(&self, protocol_id: &NodeId, delta: &DocumentDelta) -> EngineResult<EditOutcome> {
        let protocol = self.load_protocol(protocol_id).await?;
        let target = delta.target_version().clone();
        let base = protocol.version()?;
        if let Some(base) = &base {
            if target <= *base {
                return Err(EngineError::version_conflict(
                    protocol_id.as_str(),
                    format!("target version {target} is not above {base}"),
                ));
            }
        }
        info!(
            protocol = %protocol_id,
            from = ?base.as_ref().map(ToString::to_string),
            to = %target,
            operations = delta.operations().len(),
            "applying delta"
        );

        if let Some(base) = &base {
            if !self.history.has_content_version(protocol_id, base).await? {
                let current = self
                    .resolver
                    .resolve(
                        &Reference::Local(protocol_id.clone()),
                        DocumentKind::Protocol,
                        ResolveOptions::default().with_drop_errors(true),
                    )
                    .await?;
                self.history
                    .record_content_version(protocol_id, base, &current.composite)
                    .await?;
            }
        }

        let mut docs = HashMap::new();
        let mut tree = self.load_tree(protocol, &mut docs).await?;
        let created = plan(&mut tree, &mut docs, delta, &target)?;

        let history = match self.history.begin_edit(protocol_id).await? {
            Some(mut ctx) => {
                self.history.snapshot_if_changed(&mut ctx, &tree).await?;
                self.history.end_edit(ctx).await?
            }
            None => EditSummary::default(),
        };

        let removed = self.commit(&tree, &docs).await?;

        let mut touched = Vec::new();
        collect_touched(&tree, &mut touched);
        for (id, _) in &touched {
            self.resolver.cache().invalidate(id).await?;
        }

        let resolution = self
            .resolver
            .resolve(
                &Reference::Local(protocol_id.clone()),
                DocumentKind::Protocol,
                ResolveOptions::refresh(),
            )
            .await?;
        self.history
            .record_content_version(protocol_id, &target, &resolution.composite)
            .await?;

        for (id, kind) in touched.into_iter().filter(|(_, kind)| *kind == DocumentKind::Activity) {
            self.warmer.submit(WarmupJob::refresh(id, kind));
        }

        info!(
            protocol = %protocol_id,
            version = %target,
            created = created.len(),
            removed = removed.len(),
            snapshots = history.snapshots,
            "delta applied"
        );
        Ok(EditOutcome {
            protocol_id: protocol_id.clone(),
            version: target,
            composite: resolution.composite,
            history,
            created,
            removed,
        })
    }

    /// Snapshot cache statistics
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.resolver.cache().stats()
    }

    /// Warm-up pool statistics
    #[must_use]
    pub fn warmup_stats(&self) -> WarmupStats {
        self.warmer.stats()
    }

    /// Wait for queued warm-up jobs
    pub async fn idle(&self) {
        self.warmer.idle().await;
    }

    /// Stop the warm-up workers after the queue drains
    pub async fn shutdown(&self) {
        self.warmer.shutdown().await;
        info!("engine stopped");
    }

    async fn load(&self, id: &NodeId) -> EngineResult<LinkedDocument> {
        self.store
            .load(id)
            .await?
            .ok_or_else(|| EngineError::not_found(id.as_str()))
    }

    async fn load_protocol(&self, id: &NodeId) -> EngineResult<LinkedDocument> {
        let protocol = self.load(id).await?;
        if protocol.kind != DocumentKind::Protocol {
            return Err(EngineError::malformed(
                id.as_str(),
                format!("expected a protocol, found a {}", protocol.kind),
            ));
        }
        Ok(protocol)
    }

    /// Owned subtree of `node` as currently stored
    fn load_tree<'a>(
        &'a self,
        node: LinkedDocument,
        docs: &'a mut HashMap<NodeId, LinkedDocument>,
    ) -> BoxFuture<'a, EngineResult<EditNode>> {
        async move {
            let mut edit = EditNode::unchanged(&node);
            for list in node.kind.child_lists() {
                for child in self.store.find_children(&node.id, list.kind).await? {
                    edit.children.push(self.load_tree(child, docs).await?);
                }
            }
            docs.insert(node.id.clone(), node);
            Ok(edit)
        }
        .boxed()
    }

    /// Write the edited tree; returns the removed ids
    async fn commit(&self, tree: &EditNode, docs: &HashMap<NodeId, LinkedDocument>) -> EngineResult<Vec<NodeId>> {
        let mut removed = Vec::new();
        for node in tree.flatten() {
            let Some(doc) = docs.get(&node.live_id) else {
                warn!(node = %node.live_id, "edited node missing from working set");
                continue;
            };
            match (&node.before, &node.after) {
                (Some(_), None) => {
                    self.resolver.cache().invalidate(&node.live_id).await?;
                    self.store.remove(&node.live_id).await?;
                    removed.push(node.live_id.clone());
                }
                (before, Some(after)) if before.as_ref() != Some(after) => {
                    let mut doc = doc.clone();
                    doc.content = after.clone();
                    self.store.save(doc).await?;
                }
                _ => {}
            }
        }
        Ok(removed)
    }
}

/// Apply `delta` to the in-memory tree; returns ids assigned to `Add` keys
fn plan(
    tree: &mut EditNode,
    docs: &mut HashMap<NodeId, LinkedDocument>,
    delta: &DocumentDelta,
    target: &Version,
) -> EngineResult<IndexMap<String, NodeId>> {
    let protocol_id = tree.live_id.clone();
    let mut mapping = IdentifierMapping::new();
    let mut created = IndexMap::new();

    if let Some(content) = delta.protocol_content() {
        replace_content(tree, content.clone());
    }

    for operation in delta.operations() {
        debug!(op = operation.name(), target = ?operation.target_id(), "planning operation");
        match operation {
            DeltaOperation::Add {
                key,
                kind,
                parent,
                content,
            } => {
                let parent_id = mapping.get(parent).cloned().unwrap_or_else(|| NodeId::new(parent.as_str()));
                let parent_node = live_node(tree, &parent_id)?;
                let doc = LinkedDocument::local(*kind, content.clone()).with_parent(parent_id, parent_node.kind)?;
                mapping.insert(key.clone(), doc.id.clone())?;
                created.insert(key.clone(), doc.id.clone());
                parent_node.children.push(EditNode::created(&doc));
                docs.insert(doc.id.clone(), doc);
            }
            DeltaOperation::Replace { id, content } => {
                replace_content(live_node(tree, id)?, content.clone());
            }
            DeltaOperation::Remove { id } => {
                if *id == protocol_id {
                    return Err(EngineError::malformed(id.as_str(), "a delta cannot remove its protocol"));
                }
                live_node(tree, id)?.remove();
            }
        }
    }

    let mut removed_keys = HashSet::new();
    for node in tree.flatten() {
        if node.before.is_some() && node.after.is_none() {
            if let Some(doc) = docs.get(&node.live_id) {
                removed_keys.insert(doc.composite_key());
            }
        }
    }
    finalize_lists(tree, docs, &mapping, &removed_keys)?;

    if let Some(after) = tree.after.as_mut() {
        let key = vocab::find_key(after, keys::VERSION).unwrap_or(keys::VERSION).to_string();
        after.insert(key, Value::String(target.to_string()));
    }
    Ok(created)
}

/// Node of the tree that still exists after the operations so far
fn live_node<'t>(tree: &'t mut EditNode, id: &NodeId) -> EngineResult<&'t mut EditNode> {
    let node = tree.find_mut(id).ok_or_else(|| EngineError::not_found(id.as_str()))?;
    if node.after.is_none() {
        return Err(EngineError::malformed(id.as_str(), "node is removed by the same delta"));
    }
    Ok(node)
}

/// Replace a node's content, keeping order lists the new content omits
fn replace_content(node: &mut EditNode, mut content: Map<String, Value>) {
    if let Some(previous) = &node.after {
        for list in node.kind.referenced_kinds() {
            if vocab::find_key(&content, list.order_key).is_none() {
                if let Some(key) = vocab::find_key(previous, list.order_key) {
                    content.insert(key.to_string(), previous[key].clone());
                }
            }
        }
    }
    node.after = Some(content);
}

/// Rewrite order lists: `Add` keys to ids, drop removed nodes, append added ones
fn finalize_lists(
    node: &mut EditNode,
    docs: &HashMap<NodeId, LinkedDocument>,
    mapping: &IdentifierMapping,
    removed: &HashSet<String>,
) -> EngineResult<()> {
    for child in &mut node.children {
        finalize_lists(child, docs, mapping, removed)?;
    }

    let base = docs.get(&node.live_id).and_then(|d| d.locator.clone());
    let kind = node.kind;
    let added: HashMap<DocumentKind, Vec<NodeId>> =
        node.children
            .iter()
            .filter(|c| c.before.is_none() && c.after.is_some())
            .fold(HashMap::new(), |mut acc, c| {
                acc.entry(c.kind).or_insert_with(Vec::new).push(c.live_id.clone());
                acc
            });
    let Some(after) = node.after.as_mut() else {
        return Ok(());
    };

    for list in kind.referenced_kinds() {
        let fresh = added.get(&list.kind).map_or(&[][..], Vec::as_slice);
        update_list(after, list.order_key, base.as_ref(), mapping, removed, fresh)
            .map_err(|e| with_node(e, &node.live_id))?;
    }
    Ok(())
}

fn with_node(error: EngineError, id: &NodeId) -> EngineError {
    match error {
        EngineError::MalformedDocument { reason, .. } => EngineError::malformed(id.as_str(), reason),
        other => other,
    }
}

fn update_list(
    content: &mut Map<String, Value>,
    order_key: &str,
    base: Option<&Locator>,
    mapping: &IdentifierMapping,
    removed: &HashSet<String>,
    added: &[NodeId],
) -> EngineResult<()> {
    let existing = vocab::find_key(content, order_key).map(str::to_string);
    if existing.is_none() && added.is_empty() {
        return Ok(());
    }
    let key = existing.unwrap_or_else(|| order_key.to_string());
    let current = content.get(&key).cloned().unwrap_or_else(|| Value::Array(Vec::new()));

    let mut list = mapping.rewrite(&current, base)?;
    let entries = list_entries(&mut list).ok_or_else(|| EngineError::malformed(key.as_str(), "order list is not a list"))?;
    entries.retain(|entry| {
        extract_references(entry, base).map_or(true, |refs| refs.iter().all(|r| !removed.contains(r.key())))
    });

    let present: HashSet<String> = entries
        .iter()
        .filter_map(|entry| extract_references(entry, base).ok())
        .flatten()
        .map(|r| r.key().to_string())
        .collect();
    for id in added {
        if !present.contains(id.as_str()) {
            entries.push(Reference::Local(id.clone()).to_value());
        }
    }

    content.insert(key, list);
    Ok(())
}

/// Entries of a rewritten order list, looking through an `@list` wrapper
fn list_entries(list: &mut Value) -> Option<&mut Vec<Value>> {
    let wrapped = matches!(list.as_array().map(Vec::as_slice), Some([Value::Object(o)]) if o.contains_key("@list"));
    if wrapped {
        return list.get_mut(0)?.get_mut("@list")?.as_array_mut();
    }
    if list.is_array() {
        return list.as_array_mut();
    }
    list.get_mut("@list")?.as_array_mut()
}

/// Nodes whose content or descendants changed and that still exist
fn collect_touched(node: &EditNode, out: &mut Vec<(NodeId, DocumentKind)>) -> bool {
    let mut changed = false;
    for child in &node.children {
        changed |= collect_touched(child, out);
    }
    changed |= node.before != node.after;
    if changed && node.before.is_some() && node.after.is_some() {
        out.push((node.live_id.clone(), node.kind));
    }
    changed
}
