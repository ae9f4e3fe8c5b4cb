//! LDE Document Model
//!
//! Linked documents, their references and versions, and the composites the
//! engine assembles from them.
//!
//! # Core Concepts
//!
//! - [`LinkedDocument`]: one node of the content graph as persisted
//! - [`DocumentKind`]: closed set of node kinds with per-kind capabilities
//! - [`Reference`]: parsed order-list entry (local id or external locator)
//! - [`Composite`]: fully expanded node with its resolved children
//! - [`Version`]: dotted numeric version with component-wise ordering
//! - [`DocumentDelta`]: one edit of a protocol graph
//!
//! # Example
//!
//! ```rust,ignore
//! use lde_document::{DocumentKind, LinkedDocument, Locator};
//!
//! let locator = Locator::parse("https://example.org/activities/phq9")?;
//! let doc = LinkedDocument::imported(DocumentKind::Activity, locator, content);
//! assert_eq!(doc.identifier.as_str(), "https://example.org/activities/phq9");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod composite;
mod delta;
mod document;
mod hash;
mod kind;
mod mapping;
mod reference;
mod version;

/// Vocabulary constants and prefix canonicalization
pub mod vocab;

pub use composite::{ChildMap, Composite};
pub use delta::{DeltaBuilder, DeltaError, DeltaOperation, DocumentDelta};
pub use document::{CacheRef, DocumentError, Identifier, LinkedDocument, Locator, NodeId};
pub use hash::{ContentHash, HashError};
pub use kind::{content_digest, Cacheable, ChildList, DocumentKind, Expandable, UnknownKind, Versionable};
pub use mapping::{IdentifierMapping, MappingError};
pub use reference::{extract_references, map_references, Reference, ReferenceError, LOCAL_SCHEME};
pub use version::{Version, VersionError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
