//! LDE Store Interfaces
//!
//! The collaborators the engine consumes but does not own: node persistence,
//! version history persistence and external dereference.
//!
//! # Overview
//!
//! - **DocumentStore**: nodes by id, by locator and by parent plus kind
//! - **HistoryStore**: per-protocol snapshot and reference-index containers
//! - **LocatorFetcher**: HTTP-style GET of a linked-data payload
//!
//! In-memory implementations back the tests and small deployments;
//! [`HttpFetcher`] is the production fetcher.
//!
//! # Example
//!
//! ```rust,ignore
//! use lde_store::{DocumentStore, InMemoryDocumentStore};
//!
//! let store = InMemoryDocumentStore::new();
//! let saved = store.save(document).await?;
//! let children = store.find_children(&saved.id, DocumentKind::Activity).await?;
//! ```

#![warn(missing_docs)]

pub mod document_store;
pub mod error;
pub mod fetcher;
pub mod history;

// Re-exports
pub use document_store::{DocumentStore, InMemoryDocumentStore};
pub use error::{FetchError, StoreError, StoreResult};
pub use fetcher::{HttpFetcher, LocatorFetcher, USER_AGENT};
pub use history::{
    ChangeKind, ContentVersion, HistoryContainers, HistoryStore, InMemoryHistoryStore,
    ReferenceEntry, SnapshotChild, SnapshotNode, VersionSnapshot,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for store implementations
    pub use crate::{
        DocumentStore, FetchError, HistoryStore, LocatorFetcher, StoreError, StoreResult,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
