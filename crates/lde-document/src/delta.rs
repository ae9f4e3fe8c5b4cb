//! Edit deltas
//!
//! A [`DocumentDelta`] describes one edit of a protocol graph: the version
//! the edit produces, optional new protocol content, and ordered operations
//! on descendants. Nodes added by the delta are named by caller-chosen keys;
//! order lists and `Add` parents may mention those keys before the nodes
//! exist.

use crate::document::NodeId;
use crate::kind::DocumentKind;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// One edit of a protocol graph
///
/// # Invariants
/// - `Add` keys are unique within the delta
/// - no node is both replaced and removed, or touched twice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDelta {
    target_version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    protocol_content: Option<Map<String, Value>>,
    operations: Vec<DeltaOperation>,
    #[serde(default)]
    description: String,
}

impl DocumentDelta {
    /// Version the protocol carries after the edit
    #[inline]
    #[must_use]
    pub fn target_version(&self) -> &Version {
        &self.target_version
    }

    /// Replacement content for the protocol node itself
    #[inline]
    #[must_use]
    pub fn protocol_content(&self) -> Option<&Map<String, Value>> {
        self.protocol_content.as_ref()
    }

    /// Operations in application order
    #[inline]
    #[must_use]
    pub fn operations(&self) -> &[DeltaOperation] {
        &self.operations
    }

    /// Description
    #[inline]
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether the delta changes anything at all
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.protocol_content.is_none() && self.operations.is_empty()
    }
}

/// Operation on a descendant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum DeltaOperation {
    /// Introduce a new node under `parent`
    ///
    /// `parent` is an existing node id or the key of an earlier `Add`.
    Add {
        key: String,
        kind: DocumentKind,
        parent: String,
        content: Map<String, Value>,
    },

    /// Replace the content of an existing node
    Replace {
        id: NodeId,
        content: Map<String, Value>,
    },

    /// Delete an existing node and its subtree
    Remove { id: NodeId },
}

impl DeltaOperation {
    /// Existing node the operation targets, if any
    #[inline]
    #[must_use]
    pub fn target_id(&self) -> Option<&NodeId> {
        match self {
            Self::Add { .. } => None,
            Self::Replace { id, .. } | Self::Remove { id } => Some(id),
        }
    }

    /// Whether the operation changes the shape of the graph
    #[inline]
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Add { .. } | Self::Remove { .. })
    }

    /// Short name for logs
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Replace { .. } => "replace",
            Self::Remove { .. } => "remove",
        }
    }
}

/// Errors building a delta
#[derive(Debug, thiserror::Error)]
pub enum DeltaError {
    /// Builder finished without a target version
    #[error("delta has no target version")]
    MissingVersion,

    /// Two `Add` operations share a key
    #[error("duplicate add key '{0}'")]
    DuplicateKey(String),

    /// One node is targeted by more than one operation
    #[error("node {0} is targeted more than once")]
    ConflictingTarget(NodeId),

    /// Operation is not valid for its kind
    #[error("invalid operation '{operation}': {reason}")]
    InvalidOperation { operation: String, reason: String },
}

/// Builder for [`DocumentDelta`]
#[derive(Debug, Default)]
pub struct DeltaBuilder {
    target_version: Option<Version>,
    protocol_content: Option<Map<String, Value>>,
    operations: Vec<DeltaOperation>,
    description: Option<String>,
}

impl DeltaBuilder {
    /// Create new builder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set target version
    #[inline]
    #[must_use]
    pub fn target_version(mut self, version: Version) -> Self {
        self.target_version = Some(version);
        self
    }

    /// Set new protocol content
    #[inline]
    #[must_use]
    pub fn protocol_content(mut self, content: Map<String, Value>) -> Self {
        self.protocol_content = Some(content);
        self
    }

    /// Add a node
    #[inline]
    #[must_use]
    pub fn add(
        mut self,
        key: impl Into<String>,
        kind: DocumentKind,
        parent: impl Into<String>,
        content: Map<String, Value>,
    ) -> Self {
        self.operations.push(DeltaOperation::Add {
            key: key.into(),
            kind,
            parent: parent.into(),
            content,
        });
        self
    }

    /// Replace a node's content
    #[inline]
    #[must_use]
    pub fn replace(mut self, id: NodeId, content: Map<String, Value>) -> Self {
        self.operations.push(DeltaOperation::Replace { id, content });
        self
    }

    /// Remove a node
    #[inline]
    #[must_use]
    pub fn remove(mut self, id: NodeId) -> Self {
        self.operations.push(DeltaOperation::Remove { id });
        self
    }

    /// Set description
    #[inline]
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Build delta
    ///
    /// # Errors
    /// Returns error if the version is missing or operations conflict
    pub fn build(self) -> Result<DocumentDelta, DeltaError> {
        let target_version = self.target_version.ok_or(DeltaError::MissingVersion)?;

        let mut keys = HashSet::new();
        let mut targets = HashSet::new();
        for op in &self.operations {
            match op {
                DeltaOperation::Add { key, kind, .. } => {
                    if *kind == DocumentKind::Protocol {
                        return Err(DeltaError::InvalidOperation {
                            operation: op.name().to_string(),
                            reason: "a protocol cannot be added under another node".to_string(),
                        });
                    }
                    if !keys.insert(key.clone()) {
                        return Err(DeltaError::DuplicateKey(key.clone()));
                    }
                }
                DeltaOperation::Replace { id, .. } | DeltaOperation::Remove { id } => {
                    if !targets.insert(id.clone()) {
                        return Err(DeltaError::ConflictingTarget(id.clone()));
                    }
                }
            }
        }

        let description = self.description.unwrap_or_else(|| {
            format!(
                "{} operation(s) to version {target_version}",
                self.operations.len()
            )
        });

        Ok(DocumentDelta {
            target_version,
            protocol_content: self.protocol_content,
            operations: self.operations,
            description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn content(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn builder_success() {
        let delta = DeltaBuilder::new()
            .target_version("1.1.0".parse().unwrap())
            .add("s-new", DocumentKind::Screen, "a1", content(json!({"schema:question": "Q"})))
            .replace(NodeId::new("a1"), Map::new())
            .remove(NodeId::new("s1"))
            .build()
            .unwrap();

        assert_eq!(delta.operations().len(), 3);
        assert_eq!(delta.target_version().to_string(), "1.1.0");
        assert!(delta.description().contains("3 operation"));
        assert!(delta.operations()[0].is_structural());
        assert!(!delta.operations()[1].is_structural());
        assert_eq!(delta.operations()[2].target_id(), Some(&NodeId::new("s1")));
    }

    #[test]
    fn builder_missing_version() {
        let result = DeltaBuilder::new().remove(NodeId::new("x")).build();
        assert!(matches!(result, Err(DeltaError::MissingVersion)));
    }

    #[test]
    fn builder_duplicate_key() {
        let result = DeltaBuilder::new()
            .target_version("2".parse().unwrap())
            .add("k", DocumentKind::Screen, "a", Map::new())
            .add("k", DocumentKind::Screen, "a", Map::new())
            .build();
        assert!(matches!(result, Err(DeltaError::DuplicateKey(_))));
    }

    #[test]
    fn builder_conflicting_target() {
        let result = DeltaBuilder::new()
            .target_version("2".parse().unwrap())
            .replace(NodeId::new("a"), Map::new())
            .remove(NodeId::new("a"))
            .build();
        assert!(matches!(result, Err(DeltaError::ConflictingTarget(_))));
    }

    #[test]
    fn builder_rejects_nested_protocol() {
        let result = DeltaBuilder::new()
            .target_version("2".parse().unwrap())
            .add("p", DocumentKind::Protocol, "a", Map::new())
            .build();
        assert!(matches!(result, Err(DeltaError::InvalidOperation { .. })));
    }

    #[test]
    fn serde_tags_operations() {
        let op = DeltaOperation::Remove { id: NodeId::new("x") };
        assert_eq!(serde_json::to_value(&op).unwrap(), json!({"op": "remove", "id": "x"}));
    }
}
