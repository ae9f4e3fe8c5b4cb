//! LDE Engine - linked-document resolution, caching and versioning
//!
//! The engine turns a graph of linked protocol documents into fully
//! expanded composites and keeps them consistent across edits:
//! - Resolves local ids and external locators recursively into composites
//! - Caches composites per owning node, with stale fallback on fetch failure
//! - Snapshots pre-edit content so old versions stay resolvable
//! - Computes incremental change sets for client sync
//! - Duplicates protocol graphs under fresh identities
//! - Re-warms caches in the background after edits
//!
//! # Architecture
//!
//! ```text
//! Engine ─┬─ Resolver ──── Expander, SnapshotCache, DocumentStore, LocatorFetcher
//!         ├─ HistoryManager ── HistoryStore
//!         ├─ Duplicator ─── Resolver
//!         └─ WarmupPool ─── Resolver
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use lde_engine::prelude::*;
//!
//! let engine = Engine::new(EngineConfig::default(), store, history, Arc::new(HttpFetcher::default()));
//! let locator = Locator::parse("https://example.org/protocols/phq/phq_schema")?;
//! let resolution = engine
//!     .resolve(&Reference::Locator(locator), DocumentKind::Protocol, ResolveOptions::default())
//!     .await?;
//! println!("{} nodes", resolution.composite.node_count());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod config;
pub mod diff;
pub mod duplicate;
pub mod engine;
pub mod error;
pub mod history;
pub mod resolver;
pub mod warmer;

// Re-exports for convenience
pub use config::{ConfigError, EngineConfig};
pub use diff::{classify, diff, merge_update, ChangeSet, ChildMapPatch, CompositePatch, KindChanges};
pub use duplicate::Duplicator;
pub use engine::{EditOutcome, Engine};
pub use error::{EngineError, EngineResult};
pub use history::{EditNode, EditSummary, HistoricalContent, HistoryContext, HistoryManager};
pub use resolver::{Resolution, ResolveOptions, Resolver};
pub use warmer::{WarmupJob, WarmupPool, WarmupStats};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the engine
    pub use crate::{
        ChangeSet, EditOutcome, Engine, EngineConfig, EngineError, EngineResult, HistoricalContent, Resolution,
        ResolveOptions,
    };
    pub use lde_document::{
        Composite, DeltaBuilder, DocumentDelta, DocumentKind, Identifier, Locator, NodeId, Reference, Version,
    };
    pub use lde_store::{DocumentStore, HistoryStore, HttpFetcher, LocatorFetcher};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
