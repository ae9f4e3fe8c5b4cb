//! Document kinds and per-kind capabilities
//!
//! The content graph has exactly four kinds of node. Kind-specific behavior
//! (which child lists a node owns, how its composite is assembled, which
//! storage prefix its ids carry) is dispatched by `match` on [`DocumentKind`].

use crate::hash::ContentHash;
use crate::document::{Identifier, Locator, NodeId};
use crate::vocab::{self, keys};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// The closed set of node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentKind {
    /// Root of a content graph
    Protocol,
    /// Ordered sequence of activities inside a protocol
    ActivityFlow,
    /// A questionnaire, owned by a protocol
    Activity,
    /// A single screen/item, owned by an activity
    Screen,
}

/// A child list owned by a composite kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildList {
    /// Compact key holding the ordered references
    pub order_key: &'static str,
    /// Kind of every referenced child
    pub kind: DocumentKind,
}

impl DocumentKind {
    /// All kinds, leaves last
    pub const ALL: [Self; 4] = [Self::Protocol, Self::ActivityFlow, Self::Activity, Self::Screen];

    /// Stable lowercase name used in storage ids (`activity/<id>`)
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::ActivityFlow => "activityFlow",
            Self::Activity => "activity",
            Self::Screen => "screen",
        }
    }

    /// Compact type IRI
    #[inline]
    #[must_use]
    pub const fn type_iri(self) -> &'static str {
        match self {
            Self::Protocol => "reprolib:schemas/Protocol",
            Self::ActivityFlow => "reprolib:schemas/ActivityFlow",
            Self::Activity => "reprolib:schemas/Activity",
            Self::Screen => "reprolib:schemas/Field",
        }
    }

    /// Kind of the owning node, if any
    #[inline]
    #[must_use]
    pub const fn parent_kind(self) -> Option<Self> {
        match self {
            Self::Protocol => None,
            Self::ActivityFlow | Self::Activity => Some(Self::Protocol),
            Self::Screen => Some(Self::Activity),
        }
    }

    /// Child lists spliced into this kind's composite, in assembly order
    #[must_use]
    pub fn child_lists(self) -> &'static [ChildList] {
        match self {
            Self::Protocol => &[
                ChildList {
                    order_key: keys::ORDER,
                    kind: Self::Activity,
                },
                ChildList {
                    order_key: keys::FLOW_ORDER,
                    kind: Self::ActivityFlow,
                },
            ],
            Self::Activity => &[ChildList {
                order_key: keys::ORDER,
                kind: Self::Screen,
            }],
            Self::ActivityFlow | Self::Screen => &[],
        }
    }

    /// Every order list of this kind that holds node references
    ///
    /// A superset of [`Self::child_lists`]: flows also reference activities
    /// they do not own. Iterate this alone when rewriting lists.
    #[must_use]
    pub fn referenced_kinds(self) -> &'static [ChildList] {
        match self {
            Self::ActivityFlow => &[ChildList {
                order_key: keys::ORDER,
                kind: Self::Activity,
            }],
            other => other.child_lists(),
        }
    }

    /// Depth below the protocol (protocol = 0)
    #[inline]
    #[must_use]
    pub const fn depth(self) -> u8 {
        match self {
            Self::Protocol => 0,
            Self::ActivityFlow | Self::Activity => 1,
            Self::Screen => 2,
        }
    }

    /// Infer a kind from an `@type` value (compact or absolute, string or list)
    #[must_use]
    pub fn from_type_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Self::from_type_iri(s),
            Value::Array(items) => items.iter().find_map(Self::from_type_value),
            _ => None,
        }
    }

    /// Infer a kind from a type IRI
    #[must_use]
    pub fn from_type_iri(iri: &str) -> Option<Self> {
        let compact = vocab::compact_iri(iri).unwrap_or_else(|| iri.to_string());
        let local = compact
            .rsplit(|c: char| matches!(c, '/' | ':' | '#'))
            .next()
            .unwrap_or(compact.as_str());
        match local.to_ascii_lowercase().as_str() {
            "protocol" | "activityset" => Some(Self::Protocol),
            "activityflow" => Some(Self::ActivityFlow),
            "activity" => Some(Self::Activity),
            "field" | "item" | "screen" => Some(Self::Screen),
            _ => None,
        }
    }
}

impl Display for DocumentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Unrecognized kind name
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown document kind: '{0}'")]
pub struct UnknownKind(pub String);

/// A node whose content can be run through the term expander
pub trait Expandable {
    /// The compacted payload as authored
    fn compacted(&self) -> &Map<String, Value>;

    /// Base locator against which relative references resolve
    fn base_locator(&self) -> Option<&Locator>;
}

/// A node whose expanded form can be cached under its own id
pub trait Cacheable {
    /// Owning entity id (the cache key)
    fn cache_key(&self) -> &NodeId;

    /// Kind recorded on the cache entry
    fn model_kind(&self) -> DocumentKind;
}

/// A node whose prior content can be snapshotted into version history
pub trait Versionable {
    /// Stable cross-version identifier
    fn identifier(&self) -> &Identifier;

    /// Content compared across versions
    fn versioned_content(&self) -> &Map<String, Value>;

    /// Change-detection digest of [`Self::versioned_content`]
    fn content_hash(&self) -> ContentHash {
        content_digest(self.versioned_content())
    }
}

/// Digest used for change detection; the version field is ignored
#[must_use]
pub fn content_digest(content: &Map<String, Value>) -> ContentHash {
    match vocab::find_key(content, keys::VERSION) {
        Some(key) => {
            let mut content = content.clone();
            content.remove(key);
            ContentHash::of_json(&Value::Object(content))
        }
        None => ContentHash::of_json(&Value::Object(content.clone())),
    }
}
