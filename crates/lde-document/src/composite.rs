//! Composite documents
//!
//! A [`Composite`] is the fully expanded, self-contained form of a node: its
//! own expanded fields plus every resolved child, keyed by the child's
//! locator (or id for local children). Child maps keep first-seen order so
//! that serializing an unchanged composite twice yields identical bytes.

use crate::document::NodeId;
use crate::kind::{Cacheable, DocumentKind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered map of resolved children
pub type ChildMap = IndexMap<String, Composite>;

/// Fully expanded node with its resolved children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Composite {
    /// Node kind
    pub kind: DocumentKind,
    /// Local storage id of the node
    pub id: NodeId,
    /// Expanded fields of the node itself
    pub document: Map<String, Value>,
    /// Resolved activities (protocol only)
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub activities: ChildMap,
    /// Resolved activity flows (protocol only)
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub activity_flows: ChildMap,
    /// Resolved screens (activity only)
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub items: ChildMap,
}

impl Composite {
    /// Leaf composite with no children
    #[inline]
    #[must_use]
    pub fn new(kind: DocumentKind, id: NodeId, document: Map<String, Value>) -> Self {
        Self {
            kind,
            id,
            document,
            activities: IndexMap::new(),
            activity_flows: IndexMap::new(),
            items: IndexMap::new(),
        }
    }

    /// Child map holding children of `child_kind`, if this kind nests them
    #[must_use]
    pub fn children(&self, child_kind: DocumentKind) -> Option<&ChildMap> {
        match (self.kind, child_kind) {
            (DocumentKind::Protocol, DocumentKind::Activity) => Some(&self.activities),
            (DocumentKind::Protocol, DocumentKind::ActivityFlow) => Some(&self.activity_flows),
            (DocumentKind::Activity, DocumentKind::Screen) => Some(&self.items),
            _ => None,
        }
    }

    /// Mutable child map holding children of `child_kind`
    #[must_use]
    pub fn children_mut(&mut self, child_kind: DocumentKind) -> Option<&mut ChildMap> {
        match (self.kind, child_kind) {
            (DocumentKind::Protocol, DocumentKind::Activity) => Some(&mut self.activities),
            (DocumentKind::Protocol, DocumentKind::ActivityFlow) => Some(&mut self.activity_flows),
            (DocumentKind::Activity, DocumentKind::Screen) => Some(&mut self.items),
            _ => None,
        }
    }

    /// Every nested child map, in assembly order
    pub fn child_maps(&self) -> impl Iterator<Item = (DocumentKind, &ChildMap)> + '_ {
        self.kind
            .child_lists()
            .iter()
            .filter_map(|list| self.children(list.kind).map(|map| (list.kind, map)))
    }

    /// All descendants depth-first, parents before children
    #[must_use]
    pub fn descendants(&self) -> Vec<(&str, &Composite)> {
        let mut out = Vec::new();
        for (_, map) in self.child_maps() {
            for (key, child) in map {
                out.push((key.as_str(), child));
                out.extend(child.descendants());
            }
        }
        out
    }

    /// Number of nodes in the composite, including itself
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self
            .child_maps()
            .flat_map(|(_, map)| map.values())
            .map(Self::node_count)
            .sum::<usize>()
    }

    /// Canonical byte encoding
    ///
    /// # Errors
    /// Returns error if a payload value cannot be serialized
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl Cacheable for Composite {
    fn cache_key(&self) -> &NodeId {
        &self.id
    }

    fn model_kind(&self) -> DocumentKind {
        self.kind
    }
}
