//! Version history management
//!
//! An edit of a protocol runs `begin_edit` → `snapshot_if_changed` (over the
//! whole edited tree, leaves first) → `end_edit`, and only then commits the
//! new content. Every node whose content changed, or that was removed, gets
//! an immutable copy of its pre-edit content in the protocol's history
//! container and a [`VersionSnapshot`] tagged with the version the content
//! was valid through.
//!
//! # Lookup
//!
//! `content_at_version(identifier, v)` takes the first history entry whose
//! version is at or after `v`:
//! - `Created` means the node did not exist yet
//! - a snapshot reference is the answer
//! - no reference defers to the next newer entry, and finally to the live node

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use lde_document::{
    content_digest, Cacheable, Composite, DocumentKind, Identifier, LinkedDocument, Locator, NodeId, Version,
    Versionable,
};
use lde_store::{
    ChangeKind, ContentVersion, DocumentStore, HistoryContainers, HistoryStore, ReferenceEntry,
    SnapshotChild, SnapshotNode, VersionSnapshot,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One node as seen by an edit
#[derive(Debug, Clone, PartialEq)]
pub struct EditNode {
    /// Stable identifier
    pub identifier: Identifier,
    /// Node kind
    pub kind: DocumentKind,
    /// Live node id
    pub live_id: NodeId,
    /// Content before the edit, `None` if the edit creates the node
    pub before: Option<Map<String, Value>>,
    /// Content after the edit, `None` if the edit removes the node
    pub after: Option<Map<String, Value>>,
    /// Children before and after the edit
    pub children: Vec<EditNode>,
}

impl EditNode {
    /// Node the edit leaves untouched (so far)
    #[must_use]
    pub fn unchanged<D: Versionable + Cacheable>(document: &D) -> Self {
        Self {
            identifier: document.identifier().clone(),
            kind: document.model_kind(),
            live_id: document.cache_key().clone(),
            before: Some(document.versioned_content().clone()),
            after: Some(document.versioned_content().clone()),
            children: Vec::new(),
        }
    }

    /// Node introduced by the edit
    #[must_use]
    pub fn created<D: Versionable + Cacheable>(document: &D) -> Self {
        Self {
            before: None,
            ..Self::unchanged(document)
        }
    }

    /// Mark this node and every descendant as removed
    pub fn remove(&mut self) {
        self.after = None;
        for child in &mut self.children {
            child.remove();
        }
    }

    /// Find a node of this subtree by live id
    pub fn find_mut(&mut self, id: &NodeId) -> Option<&mut EditNode> {
        if self.live_id == *id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    /// Every node of this subtree, parents first
    #[must_use]
    pub fn flatten(&self) -> Vec<&EditNode> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.flatten());
        }
        out
    }
}

/// State of one edit in progress
#[derive(Debug)]
pub struct HistoryContext {
    protocol_id: NodeId,
    containers: HistoryContainers,
    base_version: Version,
    started_at: DateTime<Utc>,
    entries: IndexMap<Identifier, ReferenceEntry>,
    references: HashMap<Identifier, Option<NodeId>>,
    snapshots: usize,
}

impl HistoryContext {
    /// Version the pre-edit content was valid through
    #[inline]
    #[must_use]
    pub fn base_version(&self) -> &Version {
        &self.base_version
    }

    /// Containers receiving this edit's history
    #[inline]
    #[must_use]
    pub fn containers(&self) -> &HistoryContainers {
        &self.containers
    }
}

/// What an edit wrote to history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditSummary {
    /// Snapshot nodes written
    pub snapshots: usize,
    /// Reference entries appended to
    pub entries: usize,
}

/// Content of an identifier as of some version
#[derive(Debug, Clone, PartialEq)]
pub enum HistoricalContent {
    /// Content was replaced since; this is the old copy
    Snapshot(SnapshotNode),
    /// Content is unchanged since that version
    Current(LinkedDocument),
    /// Node did not exist at that version (or no longer exists)
    Absent,
}

impl HistoricalContent {
    /// Content payload, if any
    #[must_use]
    pub fn content(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Snapshot(snapshot) => Some(&snapshot.content),
            Self::Current(document) => Some(&document.content),
            Self::Absent => None,
        }
    }
}

/// Version history manager
pub struct HistoryManager {
    history: Arc<dyn HistoryStore>,
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryManager").finish_non_exhaustive()
    }
}

impl HistoryManager {
    /// Create manager
    #[must_use]
    pub fn new(history: Arc<dyn HistoryStore>, store: Arc<dyn DocumentStore>) -> Self {
        Self { history, store }
    }

    /// Start an edit of a protocol
    ///
    /// Returns `None` for a protocol that never declared a version: nothing
    /// can reference its content yet, so the edit records no history.
    /// Containers are created on the first edit.
    ///
    /// # Errors
    /// `NotFound` if the protocol does not exist
    pub async fn begin_edit(&self, protocol_id: &NodeId) -> EngineResult<Option<HistoryContext>> {
        let protocol = self
            .store
            .load(protocol_id)
            .await?
            .ok_or_else(|| EngineError::not_found(protocol_id.as_str()))?;
        let Some(base_version) = protocol.version()? else {
            debug!(protocol = %protocol_id, "unversioned protocol, no history kept");
            return Ok(None);
        };

        let fresh = self.history.containers(protocol_id).await?.is_none();
        let containers = self.history.ensure_containers(protocol_id).await?;
        if fresh {
            info!(
                protocol = %protocol_id,
                history = %containers.history_id,
                references = %containers.reference_id,
                "history containers created"
            );
        }

        Ok(Some(HistoryContext {
            protocol_id: protocol_id.clone(),
            containers,
            base_version,
            started_at: Utc::now(),
            entries: IndexMap::new(),
            references: HashMap::new(),
            snapshots: 0,
        }))
    }

    /// Snapshot `node` and its descendants if the edit changed them
    ///
    /// Descendants are handled first so that a parent's snapshot lists the
    /// historical copies of its children. Returns whether anything in the
    /// subtree changed.
    ///
    /// # Errors
    /// Store failures, or `VersionConflict` if history would go backwards
    pub fn snapshot_if_changed<'a>(
        &'a self,
        ctx: &'a mut HistoryContext,
        node: &'a EditNode,
    ) -> BoxFuture<'a, EngineResult<bool>> {
        async move {
            let mut descendants_changed = false;
            for child in &node.children {
                if self.snapshot_if_changed(ctx, child).await? {
                    descendants_changed = true;
                }
            }

            let Some(before) = &node.before else {
                if node.after.is_some() {
                    self.record(ctx, node, None, ChangeKind::Created).await?;
                    return Ok(true);
                }
                return Ok(false);
            };

            let own_changed = node
                .after
                .as_ref()
                .map_or(true, |after| content_digest(before) != content_digest(after));
            if !own_changed && !descendants_changed {
                return Ok(false);
            }

            let reference = if own_changed {
                let snapshot = SnapshotNode {
                    id: NodeId::generate(),
                    identifier: node.identifier.clone(),
                    kind: node.kind,
                    content: before.clone(),
                    children: node
                        .children
                        .iter()
                        .filter(|c| c.before.is_some())
                        .map(|c| SnapshotChild {
                            identifier: c.identifier.clone(),
                            kind: c.kind,
                            reference: ctx.references.get(&c.identifier).cloned().flatten(),
                        })
                        .collect(),
                    version: ctx.base_version.clone(),
                    snapshot_at: ctx.started_at,
                };
                let id = snapshot.id.clone();
                self.history.save_snapshot(&ctx.protocol_id, snapshot).await?;
                ctx.snapshots += 1;
                Some(id)
            } else {
                None
            };

            let change = if node.after.is_none() {
                ChangeKind::Removed
            } else {
                ChangeKind::Updated
            };
            self.record(ctx, node, reference, change).await?;
            Ok(true)
        }
        .boxed()
    }

    async fn record(
        &self,
        ctx: &mut HistoryContext,
        node: &EditNode,
        reference: Option<NodeId>,
        change: ChangeKind,
    ) -> EngineResult<()> {
        let loaded = if ctx.entries.contains_key(&node.identifier) {
            None
        } else {
            self.history.reference(&ctx.protocol_id, &node.identifier).await?
        };
        let entry = ctx
            .entries
            .entry(node.identifier.clone())
            .or_insert_with(|| loaded.unwrap_or_else(|| ReferenceEntry::new(node.identifier.clone(), node.kind, None)));

        entry.live_id = node.after.as_ref().map(|_| node.live_id.clone());
        entry
            .push(VersionSnapshot {
                version: ctx.base_version.clone(),
                reference: reference.clone(),
                snapshot_at: ctx.started_at,
                change,
            })
            .map_err(|e| EngineError::version_conflict(node.identifier.as_str(), e.to_string()))?;
        ctx.references.insert(node.identifier.clone(), reference);

        debug!(
            identifier = %node.identifier,
            kind = %node.kind,
            change = ?change,
            version = %ctx.base_version,
            "history entry recorded"
        );
        Ok(())
    }

    /// Persist the reference index updates of an edit
    ///
    /// # Errors
    /// Store failures
    pub async fn end_edit(&self, ctx: HistoryContext) -> EngineResult<EditSummary> {
        let summary = EditSummary {
            snapshots: ctx.snapshots,
            entries: ctx.entries.len(),
        };
        for (_, entry) in ctx.entries {
            self.history.save_reference(&ctx.protocol_id, entry).await?;
        }
        info!(
            protocol = %ctx.protocol_id,
            version = %ctx.base_version,
            snapshots = summary.snapshots,
            entries = summary.entries,
            "edit history recorded"
        );
        Ok(summary)
    }

    /// Content of `identifier` as of `version`
    ///
    /// # Errors
    /// Store failures only; unresolvable snapshots degrade to the live node
    pub async fn content_at_version(
        &self,
        protocol_id: &NodeId,
        identifier: &Identifier,
        version: &Version,
    ) -> EngineResult<HistoricalContent> {
        let Some(entry) = self.history.reference(protocol_id, identifier).await? else {
            return self.live_by_identifier(identifier).await;
        };

        if let Some(start) = entry.position_at(version) {
            for snapshot in &entry.history[start..] {
                match (snapshot.change, &snapshot.reference) {
                    (ChangeKind::Created, _) => return Ok(HistoricalContent::Absent),
                    (_, Some(reference)) => {
                        return match self.history.load_snapshot(protocol_id, reference).await? {
                            Some(node) => Ok(HistoricalContent::Snapshot(node)),
                            None => {
                                warn!(
                                    identifier = %identifier,
                                    snapshot = %reference,
                                    "dangling snapshot reference, serving current content"
                                );
                                self.live(&entry).await
                            }
                        };
                    }
                    (_, None) => continue,
                }
            }
        }
        self.live(&entry).await
    }

    async fn live(&self, entry: &ReferenceEntry) -> EngineResult<HistoricalContent> {
        match &entry.live_id {
            Some(id) => Ok(self
                .store
                .load(id)
                .await?
                .map_or(HistoricalContent::Absent, HistoricalContent::Current)),
            None => Ok(HistoricalContent::Absent),
        }
    }

    async fn live_by_identifier(&self, identifier: &Identifier) -> EngineResult<HistoricalContent> {
        if let Some(document) = self.store.load(&NodeId::new(identifier.as_str())).await? {
            return Ok(HistoricalContent::Current(document));
        }
        if let Ok(locator) = Locator::parse(identifier.as_str()) {
            for kind in DocumentKind::ALL {
                if let Some(document) = self.store.find_by_locator(&locator, kind).await? {
                    return Ok(HistoricalContent::Current(document));
                }
            }
        }
        Ok(HistoricalContent::Absent)
    }

    /// Record the full composite published at `version`
    ///
    /// # Errors
    /// Store failures
    pub async fn record_content_version(
        &self,
        protocol_id: &NodeId,
        version: &Version,
        composite: &Composite,
    ) -> EngineResult<()> {
        self.history
            .save_content_version(
                protocol_id,
                ContentVersion {
                    version: version.clone(),
                    created_at: Utc::now(),
                    composite: composite.clone(),
                },
            )
            .await?;
        debug!(protocol = %protocol_id, version = %version, "content version recorded");
        Ok(())
    }

    /// Whether a composite was recorded for `version`
    ///
    /// # Errors
    /// Store failures
    pub async fn has_content_version(&self, protocol_id: &NodeId, version: &Version) -> EngineResult<bool> {
        Ok(self.history.content_version(protocol_id, version).await?.is_some())
    }

    /// Published versions, newest first
    ///
    /// # Errors
    /// Store failures
    pub async fn protocol_versions(&self, protocol_id: &NodeId) -> EngineResult<Vec<(Version, DateTime<Utc>)>> {
        Ok(self.history.content_versions(protocol_id).await?)
    }

    /// Composite published at exactly `version`
    ///
    /// # Errors
    /// `VersionConflict` if nothing was recorded for that version
    pub async fn protocol_at_version(&self, protocol_id: &NodeId, version: &Version) -> EngineResult<Composite> {
        self.history
            .content_version(protocol_id, version)
            .await?
            .map(|c| c.composite)
            .ok_or_else(|| {
                EngineError::version_conflict(protocol_id.as_str(), format!("no content recorded for version {version}"))
            })
    }

    /// Reference entries of a protocol
    ///
    /// # Errors
    /// Store failures
    pub async fn references(&self, protocol_id: &NodeId) -> EngineResult<Vec<ReferenceEntry>> {
        Ok(self.history.references(protocol_id).await?)
    }
}
