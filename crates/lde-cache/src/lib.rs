//! LDE Snapshot Cache
//!
//! Precomputed expanded composites keyed by the owning node's id.
//!
//! # Core Concepts
//!
//! - **Entity-addressed**: two content versions of one node share one slot
//! - **Immutable entries**: every write is a fresh [`CacheEntry`]
//! - **Explicit invalidation**: nothing is evicted automatically
//!
//! # Example
//!
//! ```rust,ignore
//! use lde_cache::SnapshotCache;
//!
//! let cache = SnapshotCache::new(store.clone());
//! cache.put(&protocol.id, DocumentKind::Protocol, composite).await?;
//! assert!(cache.get(&protocol.id).await.is_some());
//! cache.invalidate(&protocol.id).await?;
//! ```

#![warn(missing_docs)]

pub mod cache;

pub use cache::{CacheEntry, CacheError, CacheStats, SnapshotCache};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
