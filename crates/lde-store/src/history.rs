//! Version history storage
//!
//! Each protocol that has been edited at least once owns two containers: a
//! history container of immutable [`SnapshotNode`]s and a reference index of
//! [`ReferenceEntry`]s, one per stable identifier. A protocol also keeps the
//! full composite of every version it was published at ([`ContentVersion`]).

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lde_document::{Composite, DocumentKind, Identifier, NodeId, Version};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The two per-protocol history containers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryContainers {
    /// Owning protocol
    pub protocol_id: NodeId,
    /// Container of snapshot nodes
    pub history_id: NodeId,
    /// Container of reference entries
    pub reference_id: NodeId,
    /// When the containers were created
    pub created_at: DateTime<Utc>,
}

/// Child of a snapshotted composite parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotChild {
    /// Stable identifier of the child
    pub identifier: Identifier,
    /// Child kind
    pub kind: DocumentKind,
    /// Historical snapshot of the child, `None` if unchanged since
    pub reference: Option<NodeId>,
}

/// Immutable copy of a node's content as of one version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotNode {
    /// Snapshot id
    pub id: NodeId,
    /// Stable identifier of the snapshotted node
    pub identifier: Identifier,
    /// Kind of the snapshotted node
    pub kind: DocumentKind,
    /// Content as of `version`
    pub content: Map<String, Value>,
    /// Children as of `version` (composite parents only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SnapshotChild>,
    /// Version the content was valid through
    pub version: Version,
    /// When the snapshot was taken
    pub snapshot_at: DateTime<Utc>,
}

/// Kind of change recorded by one history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    /// Content or descendants changed
    Updated,
    /// Node introduced by the edit
    Created,
    /// Node deleted by the edit
    Removed,
}

/// One entry of an identifier's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSnapshot {
    /// Version the referenced content was valid through
    pub version: Version,
    /// Snapshot holding that content; `None` defers to the next newer entry
    pub reference: Option<NodeId>,
    /// When the entry was recorded
    pub snapshot_at: DateTime<Utc>,
    /// What happened to the node
    pub change: ChangeKind,
}

/// Reference-index entry of one stable identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceEntry {
    /// Stable identifier
    pub identifier: Identifier,
    /// Node kind
    pub kind: DocumentKind,
    /// Current live node, `None` once removed
    pub live_id: Option<NodeId>,
    /// Append-only, version-ordered history
    pub history: Vec<VersionSnapshot>,
    /// Version of the newest entry
    pub last_version: Option<Version>,
}

impl ReferenceEntry {
    /// Empty entry for a node
    #[must_use]
    pub fn new(identifier: Identifier, kind: DocumentKind, live_id: Option<NodeId>) -> Self {
        Self {
            identifier,
            kind,
            live_id,
            history: Vec::new(),
            last_version: None,
        }
    }

    /// Append a history entry
    ///
    /// # Errors
    /// Returns [`StoreError::HistoryOrder`] if `snapshot` is older than the
    /// newest entry
    pub fn push(&mut self, snapshot: VersionSnapshot) -> StoreResult<()> {
        if let Some(last) = self.history.last() {
            if snapshot.version < last.version || snapshot.snapshot_at < last.snapshot_at {
                return Err(StoreError::HistoryOrder {
                    identifier: self.identifier.clone(),
                    reason: format!(
                        "{} at {} after {} at {}",
                        snapshot.version, snapshot.snapshot_at, last.version, last.snapshot_at
                    ),
                });
            }
        }
        self.last_version = Some(snapshot.version.clone());
        self.history.push(snapshot);
        Ok(())
    }

    /// Index of the first entry whose version is at or after `version`
    #[must_use]
    pub fn position_at(&self, version: &Version) -> Option<usize> {
        self.history.iter().position(|s| s.version >= *version)
    }

    /// Oldest recorded version
    #[must_use]
    pub fn first_version(&self) -> Option<&Version> {
        self.history.first().map(|s| &s.version)
    }

    /// Most recent change marker
    #[must_use]
    pub fn last_change(&self) -> Option<ChangeKind> {
        self.history.last().map(|s| s.change)
    }
}

/// Full composite of a protocol as published at one version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentVersion {
    /// Published version
    pub version: Version,
    /// When it was recorded
    pub created_at: DateTime<Utc>,
    /// Composite as of that version
    pub composite: Composite,
}

/// Persistent store of version history
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// History containers of a protocol, if it was ever edited
    async fn containers(&self, protocol: &NodeId) -> StoreResult<Option<HistoryContainers>>;

    /// Create the containers of a protocol, or return the existing ones
    async fn ensure_containers(&self, protocol: &NodeId) -> StoreResult<HistoryContainers>;

    /// Persist an immutable snapshot node
    async fn save_snapshot(&self, protocol: &NodeId, snapshot: SnapshotNode) -> StoreResult<()>;

    /// Load a snapshot node
    async fn load_snapshot(&self, protocol: &NodeId, id: &NodeId) -> StoreResult<Option<SnapshotNode>>;

    /// Reference entry of an identifier
    async fn reference(&self, protocol: &NodeId, identifier: &Identifier) -> StoreResult<Option<ReferenceEntry>>;

    /// Insert or replace a reference entry
    async fn save_reference(&self, protocol: &NodeId, entry: ReferenceEntry) -> StoreResult<()>;

    /// Every reference entry of a protocol
    async fn references(&self, protocol: &NodeId) -> StoreResult<Vec<ReferenceEntry>>;

    /// Record the composite published at a version
    async fn save_content_version(&self, protocol: &NodeId, content: ContentVersion) -> StoreResult<()>;

    /// `(version, created_at)` of every published version, newest first
    async fn content_versions(&self, protocol: &NodeId) -> StoreResult<Vec<(Version, DateTime<Utc>)>>;

    /// Composite published at exactly `version`
    async fn content_version(&self, protocol: &NodeId, version: &Version) -> StoreResult<Option<ContentVersion>>;
}

/// Concurrent in-memory [`HistoryStore`]
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    containers: DashMap<NodeId, HistoryContainers>,
    snapshots: DashMap<(NodeId, NodeId), SnapshotNode>,
    references: DashMap<NodeId, Vec<ReferenceEntry>>,
    contents: DashMap<NodeId, Vec<ContentVersion>>,
}

impl InMemoryHistoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of snapshot nodes across all protocols
    #[must_use]
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    fn require_containers(&self, protocol: &NodeId) -> StoreResult<()> {
        if self.containers.contains_key(protocol) {
            Ok(())
        } else {
            Err(StoreError::Conflict {
                id: protocol.clone(),
                reason: "history containers do not exist".to_string(),
            })
        }
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn containers(&self, protocol: &NodeId) -> StoreResult<Option<HistoryContainers>> {
        Ok(self.containers.get(protocol).map(|c| c.value().clone()))
    }

    async fn ensure_containers(&self, protocol: &NodeId) -> StoreResult<HistoryContainers> {
        let entry = self
            .containers
            .entry(protocol.clone())
            .or_insert_with(|| HistoryContainers {
                protocol_id: protocol.clone(),
                history_id: NodeId::generate(),
                reference_id: NodeId::generate(),
                created_at: Utc::now(),
            });
        Ok(entry.value().clone())
    }

    async fn save_snapshot(&self, protocol: &NodeId, snapshot: SnapshotNode) -> StoreResult<()> {
        self.require_containers(protocol)?;
        let key = (protocol.clone(), snapshot.id.clone());
        if self.snapshots.contains_key(&key) {
            return Err(StoreError::Conflict {
                id: snapshot.id,
                reason: "snapshot nodes are immutable".to_string(),
            });
        }
        self.snapshots.insert(key, snapshot);
        Ok(())
    }

    async fn load_snapshot(&self, protocol: &NodeId, id: &NodeId) -> StoreResult<Option<SnapshotNode>> {
        Ok(self
            .snapshots
            .get(&(protocol.clone(), id.clone()))
            .map(|s| s.value().clone()))
    }

    async fn reference(&self, protocol: &NodeId, identifier: &Identifier) -> StoreResult<Option<ReferenceEntry>> {
        Ok(self.references.get(protocol).and_then(|entries| {
            entries
                .iter()
                .find(|e| e.identifier == *identifier)
                .cloned()
        }))
    }

    async fn save_reference(&self, protocol: &NodeId, entry: ReferenceEntry) -> StoreResult<()> {
        self.require_containers(protocol)?;
        let mut entries = self.references.entry(protocol.clone()).or_default();
        match entries.iter_mut().find(|e| e.identifier == entry.identifier) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        Ok(())
    }

    async fn references(&self, protocol: &NodeId) -> StoreResult<Vec<ReferenceEntry>> {
        Ok(self
            .references
            .get(protocol)
            .map(|entries| entries.value().clone())
            .unwrap_or_default())
    }

    async fn save_content_version(&self, protocol: &NodeId, content: ContentVersion) -> StoreResult<()> {
        let mut versions = self.contents.entry(protocol.clone()).or_default();
        versions.retain(|v| v.version != content.version);
        versions.push(content);
        versions.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(())
    }

    async fn content_versions(&self, protocol: &NodeId) -> StoreResult<Vec<(Version, DateTime<Utc>)>> {
        Ok(self
            .contents
            .get(protocol)
            .map(|versions| {
                versions
                    .iter()
                    .rev()
                    .map(|v| (v.version.clone(), v.created_at))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn content_version(&self, protocol: &NodeId, version: &Version) -> StoreResult<Option<ContentVersion>> {
        Ok(self
            .contents
            .get(protocol)
            .and_then(|versions| versions.iter().find(|v| v.version == *version).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn entry(version: &str, at: DateTime<Utc>) -> VersionSnapshot {
        VersionSnapshot {
            version: v(version),
            reference: Some(NodeId::generate()),
            snapshot_at: at,
            change: ChangeKind::Updated,
        }
    }

    #[test]
    fn history_is_append_only() {
        let now = Utc::now();
        let mut reference = ReferenceEntry::new(Identifier::new("i"), DocumentKind::Screen, None);
        reference.push(entry("1.0.0", now)).unwrap();
        reference.push(entry("1.0.0", now)).unwrap();
        reference.push(entry("1.2.0", now + Duration::seconds(1))).unwrap();

        assert!(reference.push(entry("1.1.0", now + Duration::seconds(2))).is_err());
        assert!(reference.push(entry("2.0.0", now)).is_err());
        assert_eq!(reference.last_version, Some(v("1.2.0")));
        assert_eq!(reference.first_version(), Some(&v("1.0.0")));
    }

    #[test]
    fn position_at_finds_smallest_not_below() {
        let now = Utc::now();
        let mut reference = ReferenceEntry::new(Identifier::new("i"), DocumentKind::Screen, None);
        reference.push(entry("1.0.0", now)).unwrap();
        reference.push(entry("1.5.0", now)).unwrap();

        assert_eq!(reference.position_at(&v("0.9")), Some(0));
        assert_eq!(reference.position_at(&v("1.0")), Some(0));
        assert_eq!(reference.position_at(&v("1.1")), Some(1));
        assert_eq!(reference.position_at(&v("2")), None);
    }

    #[tokio::test]
    async fn containers_are_created_once() {
        let store = InMemoryHistoryStore::new();
        let protocol = NodeId::generate();
        assert!(store.containers(&protocol).await.unwrap().is_none());

        let first = store.ensure_containers(&protocol).await.unwrap();
        let second = store.ensure_containers(&protocol).await.unwrap();
        assert_eq!(first, second);
        assert_ne!(first.history_id, first.reference_id);
    }

    #[tokio::test]
    async fn snapshots_need_containers_and_are_immutable() {
        let store = InMemoryHistoryStore::new();
        let protocol = NodeId::generate();
        let snapshot = SnapshotNode {
            id: NodeId::generate(),
            identifier: Identifier::new("i"),
            kind: DocumentKind::Screen,
            content: Map::new(),
            children: Vec::new(),
            version: v("1"),
            snapshot_at: Utc::now(),
        };

        assert!(store.save_snapshot(&protocol, snapshot.clone()).await.is_err());
        store.ensure_containers(&protocol).await.unwrap();
        store.save_snapshot(&protocol, snapshot.clone()).await.unwrap();
        assert!(store.save_snapshot(&protocol, snapshot.clone()).await.is_err());
        assert_eq!(
            store.load_snapshot(&protocol, &snapshot.id).await.unwrap(),
            Some(snapshot)
        );
    }

    #[tokio::test]
    async fn reference_entries_replace_by_identifier() {
        let store = InMemoryHistoryStore::new();
        let protocol = NodeId::generate();
        store.ensure_containers(&protocol).await.unwrap();

        let mut entry = ReferenceEntry::new(Identifier::new("i"), DocumentKind::Activity, None);
        store.save_reference(&protocol, entry.clone()).await.unwrap();
        entry.push(super::tests::entry("1", Utc::now())).unwrap();
        store.save_reference(&protocol, entry.clone()).await.unwrap();

        assert_eq!(store.references(&protocol).await.unwrap(), vec![entry.clone()]);
        assert_eq!(
            store.reference(&protocol, &Identifier::new("i")).await.unwrap(),
            Some(entry)
        );
    }

    #[tokio::test]
    async fn content_versions_newest_first() {
        let store = InMemoryHistoryStore::new();
        let protocol = NodeId::generate();
        for version in ["1.0.0", "1.10.0", "1.2.0"] {
            store
                .save_content_version(
                    &protocol,
                    ContentVersion {
                        version: v(version),
                        created_at: Utc::now(),
                        composite: Composite::new(DocumentKind::Protocol, protocol.clone(), Map::new()),
                    },
                )
                .await
                .unwrap();
        }

        let versions: Vec<String> = store
            .content_versions(&protocol)
            .await
            .unwrap()
            .into_iter()
            .map(|(v, _)| v.to_string())
            .collect();
        assert_eq!(versions, vec!["1.10.0", "1.2.0", "1.0.0"]);
        assert!(store.content_version(&protocol, &v("1.2")).await.unwrap().is_some());
        assert!(store.content_version(&protocol, &v("3")).await.unwrap().is_none());
    }
}
