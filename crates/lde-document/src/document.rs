//! Linked documents
//!
//! A [`LinkedDocument`] is one node of the content graph as persisted by the
//! external document store: its compacted payload plus the bookkeeping the
//! engine needs (owner back-reference, source locator, cache pointer,
//! duplication lineage).

use crate::kind::{Cacheable, DocumentKind, Expandable, Versionable};
use crate::version::Version;
use crate::vocab::{self, keys};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{self, Display, Formatter};
use ulid::Ulid;

/// Opaque local storage id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Fresh, never-before-issued id
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string().to_ascii_lowercase())
    }

    /// Wrap an existing id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Kind-qualified form used inside composites (`activity/<id>`)
    #[inline]
    #[must_use]
    pub fn qualified(&self, kind: DocumentKind) -> String {
        format!("{}/{}", kind.as_str(), self.0)
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// External address a document was imported from
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    /// Parse and normalize an absolute locator
    ///
    /// # Errors
    /// Returns [`DocumentError::InvalidLocator`] if `s` is not an absolute URL
    pub fn parse(s: &str) -> Result<Self, DocumentError> {
        let url = url::Url::parse(s).map_err(|e| DocumentError::InvalidLocator {
            locator: s.to_string(),
            reason: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(DocumentError::InvalidLocator {
                locator: s.to_string(),
                reason: "not a hierarchical URL".to_string(),
            });
        }
        Ok(Self(url.to_string()))
    }

    /// Resolve a (possibly relative) reference against this locator
    ///
    /// # Errors
    /// Returns [`DocumentError::InvalidLocator`] if the join fails
    pub fn join(&self, reference: &str) -> Result<Self, DocumentError> {
        let base = url::Url::parse(&self.0).map_err(|e| DocumentError::InvalidLocator {
            locator: self.0.clone(),
            reason: e.to_string(),
        })?;
        let joined = base.join(reference).map_err(|e| DocumentError::InvalidLocator {
            locator: reference.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self(joined.to_string()))
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Locator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable cross-version key of a node
///
/// Derived once, at creation, from the node's locator (imported nodes) or
/// its first storage id (locally authored nodes). History is indexed by it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Identifier of an imported node
    #[inline]
    #[must_use]
    pub fn from_locator(locator: &Locator) -> Self {
        Self(locator.as_str().to_string())
    }

    /// Identifier of a locally authored node
    #[inline]
    #[must_use]
    pub fn from_id(id: &NodeId) -> Self {
        Self(id.as_str().to_string())
    }

    /// Wrap a raw identifier
    #[inline]
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pointer from a node to its current cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheRef(pub Ulid);

/// One node of the content graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedDocument {
    /// Local storage id
    pub id: NodeId,
    /// Node kind
    pub kind: DocumentKind,
    /// Stable identifier used by version history
    pub identifier: Identifier,
    /// Source locator for imported nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<Locator>,
    /// Compacted payload as authored
    pub content: Map<String, Value>,
    /// Owning node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    /// Kind of the owning node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_kind: Option<DocumentKind>,
    /// Current cache entry, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ref: Option<CacheRef>,
    /// Node this one was duplicated from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<NodeId>,
}

impl LinkedDocument {
    /// New locally authored node with a fresh id
    #[must_use]
    pub fn local(kind: DocumentKind, content: Map<String, Value>) -> Self {
        let id = NodeId::generate();
        Self {
            identifier: Identifier::from_id(&id),
            id,
            kind,
            locator: None,
            content,
            parent_id: None,
            parent_kind: None,
            cache_ref: None,
            duplicate_of: None,
        }
    }

    /// New node imported from `locator`
    #[must_use]
    pub fn imported(kind: DocumentKind, locator: Locator, content: Map<String, Value>) -> Self {
        Self {
            id: NodeId::generate(),
            identifier: Identifier::from_locator(&locator),
            kind,
            locator: Some(locator),
            content,
            parent_id: None,
            parent_kind: None,
            cache_ref: None,
            duplicate_of: None,
        }
    }

    /// Attach to an owning node
    ///
    /// # Errors
    /// Returns [`DocumentError::InvalidParent`] if `parent_kind` cannot own this kind
    pub fn with_parent(mut self, parent_id: NodeId, parent_kind: DocumentKind) -> Result<Self, DocumentError> {
        if self.kind.parent_kind() != Some(parent_kind) {
            return Err(DocumentError::InvalidParent {
                child: self.kind,
                parent: parent_kind,
            });
        }
        self.parent_id = Some(parent_id);
        self.parent_kind = Some(parent_kind);
        Ok(self)
    }

    /// Key under which this node appears in its parent's composite
    #[inline]
    #[must_use]
    pub fn composite_key(&self) -> String {
        self.locator
            .as_ref()
            .map_or_else(|| self.id.as_str().to_string(), |l| l.as_str().to_string())
    }

    /// Declared `schema:version`, if this node carries one
    ///
    /// # Errors
    /// Returns error if the declared version is not dotted-numeric
    pub fn version(&self) -> Result<Option<Version>, DocumentError> {
        let declared = vocab::find_key(&self.content, keys::VERSION).and_then(|k| self.content.get(k));
        match declared {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.parse()?)),
            Some(Value::Number(n)) => Ok(Some(n.to_string().parse()?)),
            Some(other) => Err(DocumentError::InvalidContent {
                id: self.id.clone(),
                reason: format!("schema:version must be a string, got {other}"),
            }),
        }
    }

    /// Overwrite the declared version, keeping the key spelling in use
    pub fn set_version(&mut self, version: &Version) {
        let key = vocab::find_key(&self.content, keys::VERSION)
            .unwrap_or(keys::VERSION)
            .to_string();
        self.content.insert(key, Value::String(version.to_string()));
    }
}

impl Expandable for LinkedDocument {
    fn compacted(&self) -> &Map<String, Value> {
        &self.content
    }

    fn base_locator(&self) -> Option<&Locator> {
        self.locator.as_ref()
    }
}

impl Cacheable for LinkedDocument {
    fn cache_key(&self) -> &NodeId {
        &self.id
    }

    fn model_kind(&self) -> DocumentKind {
        self.kind
    }
}

impl Versionable for LinkedDocument {
    fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    fn versioned_content(&self) -> &Map<String, Value> {
        &self.content
    }
}

/// Errors building or inspecting documents
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Locator is not an absolute, hierarchical URL
    #[error("invalid locator '{locator}': {reason}")]
    InvalidLocator { locator: String, reason: String },

    /// Kind hierarchy violated
    #[error("a {child} cannot be owned by a {parent}")]
    InvalidParent {
        child: DocumentKind,
        parent: DocumentKind,
    },

    /// Content does not have the expected shape
    #[error("invalid content in {id}: {reason}")]
    InvalidContent { id: NodeId, reason: String },

    /// Version string could not be parsed
    #[error(transparent)]
    Version(#[from] crate::version::VersionError),
}
