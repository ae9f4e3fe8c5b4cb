//! Diff engine
//!
//! Two halves:
//! - [`diff`] / [`merge_update`] work on resolved composites and satisfy
//!   `merge_update(b, &diff(b, b2)) == b2`, child order included
//! - [`classify`] reads history reference entries and sorts identifiers into
//!   created / updated / removed since a version or timestamp

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use lde_document::{ChildMap, Composite, DocumentKind, Identifier, NodeId, Version};
use lde_store::{ChangeKind, ReferenceEntry, VersionSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

/// Kinds that can appear in a child map, in assembly order
const CHILD_KINDS: [DocumentKind; 3] = [DocumentKind::Activity, DocumentKind::ActivityFlow, DocumentKind::Screen];

/// Partial update of a composite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositePatch {
    /// Kind of the patched node
    pub kind: DocumentKind,
    /// Id of the patched node
    pub id: NodeId,
    /// Replacement for the node's own fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Map<String, Value>>,
    /// Changes per child map
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ChildMapPatch>,
}

/// Changes to one child map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildMapPatch {
    /// Kind of the children in the map
    pub kind: DocumentKind,
    /// New or replaced children, by composite key
    #[serde(default)]
    pub updated: IndexMap<String, Composite>,
    /// Keys of deleted children
    #[serde(default)]
    pub removed: Vec<String>,
    /// Full key order, when merging alone would not reproduce it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<String>>,
}

impl CompositePatch {
    /// Patch that changes nothing on `composite`
    #[must_use]
    pub fn empty(composite: &Composite) -> Self {
        Self {
            kind: composite.kind,
            id: composite.id.clone(),
            document: None,
            children: Vec::new(),
        }
    }

    /// Whether applying the patch is a no-op
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.document.is_none() && self.children.is_empty()
    }

    /// Number of children the patch carries or deletes
    #[must_use]
    pub fn touched(&self) -> usize {
        self.children.iter().map(|c| c.updated.len() + c.removed.len()).sum()
    }
}

fn map_of(composite: &Composite, kind: DocumentKind) -> Option<&ChildMap> {
    match kind {
        DocumentKind::Activity => Some(&composite.activities),
        DocumentKind::ActivityFlow => Some(&composite.activity_flows),
        DocumentKind::Screen => Some(&composite.items),
        DocumentKind::Protocol => None,
    }
}

fn map_of_mut(composite: &mut Composite, kind: DocumentKind) -> Option<&mut ChildMap> {
    match kind {
        DocumentKind::Activity => Some(&mut composite.activities),
        DocumentKind::ActivityFlow => Some(&mut composite.activity_flows),
        DocumentKind::Screen => Some(&mut composite.items),
        DocumentKind::Protocol => None,
    }
}

/// Compute the patch turning `base` into `target`
#[must_use]
pub fn diff(base: &Composite, target: &Composite) -> CompositePatch {
    let mut patch = CompositePatch::empty(target);
    if base.document != target.document {
        patch.document = Some(target.document.clone());
    }

    for kind in CHILD_KINDS {
        let (Some(before), Some(after)) = (map_of(base, kind), map_of(target, kind)) else {
            continue;
        };

        let removed: Vec<String> = before.keys().filter(|k| !after.contains_key(*k)).cloned().collect();
        let updated: IndexMap<String, Composite> = after
            .iter()
            .filter(|(k, v)| before.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        // Order merging produces: surviving keys in base order, then new keys
        let merged: Vec<&String> = before
            .keys()
            .filter(|k| after.contains_key(*k))
            .chain(updated.keys().filter(|k| !before.contains_key(*k)))
            .collect();
        let order = (!merged.iter().copied().eq(after.keys())).then(|| after.keys().cloned().collect());

        if removed.is_empty() && updated.is_empty() && order.is_none() {
            continue;
        }
        patch.children.push(ChildMapPatch {
            kind,
            updated,
            removed,
            order,
        });
    }
    patch
}

/// Apply `patch` onto a previously resolved composite
///
/// Updated children replace by key, removed keys are deleted, everything
/// else is carried over.
#[must_use]
pub fn merge_update(base: &Composite, patch: &CompositePatch) -> Composite {
    let mut merged = base.clone();
    merged.kind = patch.kind;
    merged.id = patch.id.clone();
    if let Some(document) = &patch.document {
        merged.document = document.clone();
    }

    for change in &patch.children {
        let Some(map) = map_of_mut(&mut merged, change.kind) else {
            continue;
        };
        for key in &change.removed {
            map.shift_remove(key);
        }
        for (key, child) in &change.updated {
            map.insert(key.clone(), child.clone());
        }
        if let Some(order) = &change.order {
            let mut reordered = ChildMap::with_capacity(map.len());
            for key in order {
                if let Some(child) = map.shift_remove(key) {
                    reordered.insert(key.clone(), child);
                }
            }
            reordered.extend(map.drain(..));
            *map = reordered;
        }
    }
    merged
}

/// Identifiers of one kind, by change class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindChanges {
    /// Introduced since
    pub created: Vec<Identifier>,
    /// Changed since
    pub updated: Vec<Identifier>,
    /// Deleted since
    pub removed: Vec<Identifier>,
}

impl KindChanges {
    /// Whether no identifier changed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Incremental sync payload for a client holding `since_version`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    /// Protocol the changes belong to
    pub protocol_id: NodeId,
    /// Version the client holds
    pub since_version: Version,
    /// Version the protocol carries now
    pub current_version: Option<Version>,
    /// Changed identifiers per kind
    pub changes: BTreeMap<DocumentKind, KindChanges>,
    /// Current content of created and updated children
    pub patch: CompositePatch,
}

impl ChangeSet {
    /// Whether anything changed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.values().all(KindChanges::is_empty)
    }

    /// Changes of one kind
    #[must_use]
    pub fn of_kind(&self, kind: DocumentKind) -> Option<&KindChanges> {
        self.changes.get(&kind)
    }
}

/// Sort history entries into change classes
///
/// An entry counts when its version is at or after `since_version`, or its
/// timestamp at or after `since` when given. A node created and removed
/// inside the window is not reported.
#[must_use]
pub fn classify(
    entries: &[ReferenceEntry],
    since_version: &Version,
    since: Option<DateTime<Utc>>,
) -> BTreeMap<DocumentKind, KindChanges> {
    let counts = |s: &VersionSnapshot| s.version >= *since_version || since.is_some_and(|t| s.snapshot_at >= t);

    let mut out: BTreeMap<DocumentKind, KindChanges> = BTreeMap::new();
    for entry in entries {
        let (Some(first), Some(last)) = (entry.history.first(), entry.history.last()) else {
            continue;
        };
        let created_since = first.change == ChangeKind::Created && counts(first);
        let bucket = out.entry(entry.kind).or_default();

        if last.change == ChangeKind::Removed {
            if counts(last) && !created_since {
                bucket.removed.push(entry.identifier.clone());
            }
        } else if created_since {
            bucket.created.push(entry.identifier.clone());
        } else if entry.history.iter().any(counts) {
            bucket.updated.push(entry.identifier.clone());
        }
    }
    out.retain(|_, changes| !changes.is_empty());
    out
}

/// Patch carrying the current content of every changed child of `current`
///
/// Used when no composite was recorded for the client's version: a top-level
/// child is included when it, or any of its descendants, changed.
#[must_use]
pub fn patch_from_changes(current: &Composite, changes: &BTreeMap<DocumentKind, KindChanges>) -> CompositePatch {
    let touched: HashSet<&str> = changes
        .values()
        .flat_map(|c| c.created.iter().chain(&c.updated))
        .map(Identifier::as_str)
        .collect();
    let removed: HashSet<&str> = changes
        .values()
        .flat_map(|c| c.removed.iter())
        .map(Identifier::as_str)
        .collect();

    let mut patch = CompositePatch::empty(current);
    if changes
        .get(&current.kind)
        .is_some_and(|c| !c.updated.is_empty() || !c.created.is_empty())
    {
        patch.document = Some(current.document.clone());
    }

    for (kind, map) in current.child_maps() {
        let updated: IndexMap<String, Composite> = map
            .iter()
            .filter(|(key, child)| {
                touched.contains(key.as_str())
                    || child
                        .descendants()
                        .iter()
                        .any(|(k, _)| touched.contains(k) || removed.contains(k))
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let gone: Vec<String> = changes
            .get(&kind)
            .map(|c| c.removed.iter().map(|i| i.as_str().to_string()).collect())
            .unwrap_or_default();
        if updated.is_empty() && gone.is_empty() {
            continue;
        }
        patch.children.push(ChildMapPatch {
            kind,
            updated,
            removed: gone,
            order: Some(map.keys().cloned().collect()),
        });
    }
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn node(kind: DocumentKind, id: &str, v: Value) -> Composite {
        Composite::new(kind, NodeId::new(id), v.as_object().cloned().unwrap())
    }

    fn protocol() -> Composite {
        let mut activity = node(DocumentKind::Activity, "a1", json!({"title": "A"}));
        activity.items.insert("s1".into(), node(DocumentKind::Screen, "s1", json!({"q": 1})));
        activity.items.insert("s2".into(), node(DocumentKind::Screen, "s2", json!({"q": 2})));
        let mut protocol = node(DocumentKind::Protocol, "p", json!({"title": "P"}));
        protocol.activities.insert("a1".into(), activity);
        protocol
            .activities
            .insert("a2".into(), node(DocumentKind::Activity, "a2", json!({"title": "B"})));
        protocol
    }

    #[test]
    fn identical_composites_diff_to_nothing() {
        let p = protocol();
        assert!(diff(&p, &p).is_empty());
    }

    #[test]
    fn updated_child_replaces_by_key() {
        let base = protocol();
        let mut target = base.clone();
        target.activities["a1"].items["s2"].document.insert("q".into(), json!(20));

        let patch = diff(&base, &target);
        assert_eq!(patch.touched(), 1);
        assert!(patch.children[0].updated.contains_key("a1"));
        assert_eq!(merge_update(&base, &patch), target);
    }

    #[test]
    fn removal_and_reorder() {
        let base = protocol();
        let mut target = base.clone();
        target.activities.shift_remove("a1");
        target
            .activities
            .insert("a0".into(), node(DocumentKind::Activity, "a0", json!({})));
        target.activities.move_index(1, 0);

        let patch = diff(&base, &target);
        assert_eq!(patch.children[0].removed, vec!["a1".to_string()]);
        assert!(patch.children[0].order.is_some());
        assert_eq!(merge_update(&base, &patch), target);
    }

    #[test]
    fn append_needs_no_explicit_order() {
        let base = protocol();
        let mut target = base.clone();
        target
            .activities
            .insert("a3".into(), node(DocumentKind::Activity, "a3", json!({})));
        let patch = diff(&base, &target);
        assert_eq!(patch.children[0].order, None);
        assert_eq!(merge_update(&base, &patch), target);
    }

    fn entry(identifier: &str, kind: DocumentKind, history: &[(&str, ChangeKind)]) -> ReferenceEntry {
        let mut entry = ReferenceEntry::new(Identifier::new(identifier), kind, None);
        for (version, change) in history {
            entry
                .push(VersionSnapshot {
                    version: version.parse().unwrap(),
                    reference: None,
                    snapshot_at: Utc::now(),
                    change: *change,
                })
                .unwrap();
        }
        entry
    }

    #[test]
    fn classification_by_version() {
        let entries = vec![
            entry("old-edit", DocumentKind::Activity, &[("1.0", ChangeKind::Updated)]),
            entry(
                "edited",
                DocumentKind::Activity,
                &[("1.0", ChangeKind::Updated), ("2.0", ChangeKind::Updated)],
            ),
            entry("new", DocumentKind::Screen, &[("2.0", ChangeKind::Created)]),
            entry(
                "gone",
                DocumentKind::Screen,
                &[("1.0", ChangeKind::Updated), ("2.1", ChangeKind::Removed)],
            ),
            entry(
                "ephemeral",
                DocumentKind::Screen,
                &[("2.0", ChangeKind::Created), ("2.1", ChangeKind::Removed)],
            ),
            entry("early", DocumentKind::Screen, &[("0.5", ChangeKind::Created)]),
        ];

        let changes = classify(&entries, &"2.0".parse().unwrap(), None);
        let activities = &changes[&DocumentKind::Activity];
        assert_eq!(activities.updated, vec![Identifier::new("edited")]);
        let screens = &changes[&DocumentKind::Screen];
        assert_eq!(screens.created, vec![Identifier::new("new")]);
        assert_eq!(screens.removed, vec![Identifier::new("gone")]);
        assert!(screens.updated.is_empty());
    }

    #[test]
    fn classification_by_timestamp() {
        let entries = vec![entry("a", DocumentKind::Activity, &[("1.0", ChangeKind::Updated)])];
        let since = Utc::now() - chrono::Duration::hours(1);
        let changes = classify(&entries, &"9.0".parse().unwrap(), Some(since));
        assert_eq!(changes[&DocumentKind::Activity].updated.len(), 1);
        assert!(classify(&entries, &"9.0".parse().unwrap(), None).is_empty());
    }

    #[test]
    fn patch_from_changes_includes_parents_of_changed_screens() {
        let current = protocol();
        let mut changes = BTreeMap::new();
        changes.insert(
            DocumentKind::Screen,
            KindChanges {
                updated: vec![Identifier::new("s2")],
                ..KindChanges::default()
            },
        );
        let patch = patch_from_changes(&current, &changes);
        assert_eq!(patch.document, None);
        assert_eq!(patch.children.len(), 1);
        assert_eq!(patch.children[0].updated.keys().collect::<Vec<_>>(), vec!["a1"]);
    }

    fn arb_screens() -> impl Strategy<Value = ChildMap> {
        prop::collection::vec((0u8..4, 0i64..3), 0..4).prop_map(|entries| {
            entries
                .into_iter()
                .map(|(k, v)| {
                    let key = format!("s{k}");
                    let screen = node(DocumentKind::Screen, &key, json!({ "q": v }));
                    (key, screen)
                })
                .collect()
        })
    }

    fn arb_protocol() -> impl Strategy<Value = Composite> {
        (
            0i64..3,
            prop::collection::vec((0u8..5, 0i64..3, arb_screens()), 0..5),
            prop::collection::vec(0u8..3, 0..3),
        )
            .prop_map(|(title, activities, flows)| {
                let mut protocol = node(DocumentKind::Protocol, "p", json!({ "title": title }));
                for (k, v, items) in activities {
                    let key = format!("a{k}");
                    let mut activity = node(DocumentKind::Activity, &key, json!({ "title": v }));
                    activity.items = items;
                    protocol.activities.insert(key, activity);
                }
                for k in flows {
                    let key = format!("f{k}");
                    protocol
                        .activity_flows
                        .insert(key.clone(), node(DocumentKind::ActivityFlow, &key, json!({})));
                }
                protocol
            })
    }

    proptest! {
        #[test]
        fn merge_of_diff_reproduces_target(base in arb_protocol(), target in arb_protocol()) {
            let merged = merge_update(&base, &diff(&base, &target));
            prop_assert_eq!(merged.to_bytes().unwrap(), target.to_bytes().unwrap());
            prop_assert_eq!(merged, target);
        }

        #[test]
        fn diff_against_self_is_empty(base in arb_protocol()) {
            prop_assert!(diff(&base, &base).is_empty());
        }
    }
}
