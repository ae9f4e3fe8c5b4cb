//! Error types for the engine
//!
//! The taxonomy callers see:
//! - `NotFound`: id or locator does not exist and cannot be fetched
//! - `MalformedDocument`: content cannot be expanded or assembled
//! - `FetchFailed`: transient network or remote error
//! - `VersionConflict`: version ordering violated or no resolvable snapshot
//! - `IdentifierCollision`: remapping produced a clash

use lde_cache::CacheError;
use lde_document::{DeltaError, DocumentError, Locator, MappingError, ReferenceError};
use lde_expand::ExpandError;
use lde_store::{FetchError, StoreError};

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Referenced node does not exist and cannot be fetched
    #[error("not found: {key}")]
    NotFound {
        /// Offending id or locator
        key: String,
        /// Fetch failure that led here, if any
        #[source]
        cause: Option<FetchError>,
    },

    /// Content cannot be expanded or assembled
    #[error("malformed document {key}: {reason}")]
    MalformedDocument {
        /// Offending id or locator
        key: String,
        /// What is wrong
        reason: String,
    },

    /// Transient failure dereferencing a locator
    #[error("fetch failed for {locator}: {source}")]
    FetchFailed {
        /// Locator being fetched
        locator: Locator,
        /// Underlying failure
        #[source]
        source: FetchError,
    },

    /// Version ordering violated or no resolvable snapshot
    #[error("version conflict on {key}: {reason}")]
    VersionConflict {
        /// Offending protocol or identifier
        key: String,
        /// What is wrong
        reason: String,
    },

    /// Remapping produced a clash
    #[error("identifier collision on {key}: {reason}")]
    IdentifierCollision {
        /// Offending key
        key: String,
        /// What is wrong
        reason: String,
    },

    /// Document store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Snapshot cache failure
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl EngineError {
    /// Create a malformed document error
    #[inline]
    pub fn malformed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a not-found error with no fetch cause
    #[inline]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound {
            key: key.into(),
            cause: None,
        }
    }

    /// Create a version conflict error
    #[inline]
    pub fn version_conflict(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::VersionConflict {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Classify a failed dereference of `locator`
    #[must_use]
    pub fn from_fetch(error: FetchError) -> Self {
        match error {
            FetchError::NotFound { ref locator } => Self::NotFound {
                key: locator.to_string(),
                cause: Some(error),
            },
            FetchError::Malformed {
                ref locator,
                ref reason,
            } => Self::MalformedDocument {
                key: locator.to_string(),
                reason: reason.clone(),
            },
            FetchError::Timeout { .. } | FetchError::Transport { .. } => Self::FetchFailed {
                locator: error.locator().clone(),
                source: error,
            },
        }
    }

    /// Wrap an expansion failure of the node at `key`
    #[must_use]
    pub fn from_expand(key: impl Into<String>, error: &ExpandError) -> Self {
        Self::malformed(key, error.to_string())
    }

    /// Wrap a malformed reference list of the node at `key`
    #[must_use]
    pub fn from_reference(key: impl Into<String>, error: &ReferenceError) -> Self {
        Self::malformed(key, error.to_string())
    }

    /// Whether the error came from dereferencing an external locator
    #[inline]
    #[must_use]
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            Self::FetchFailed { .. } | Self::NotFound { cause: Some(_), .. }
        )
    }

    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::FetchFailed { .. } => true,
            Self::NotFound { cause: Some(cause), .. } => cause.is_transient(),
            Self::Store(e) => e.is_retryable(),
            Self::Cache(CacheError::Store { source, .. }) => source.is_retryable(),
            _ => false,
        }
    }

    /// Turn an unrecovered fetch failure into the `NotFound` callers see
    #[must_use]
    pub fn into_unresolved(self) -> Self {
        match self {
            Self::FetchFailed { locator, source } => Self::NotFound {
                key: locator.to_string(),
                cause: Some(source),
            },
            other => other,
        }
    }
}

impl From<MappingError> for EngineError {
    fn from(error: MappingError) -> Self {
        match error {
            MappingError::Collision { key, id } => Self::IdentifierCollision {
                key,
                reason: format!("already mapped to {id}"),
            },
            MappingError::Unmapped(key) => Self::IdentifierCollision {
                key,
                reason: "reference has no counterpart in the destination graph".to_string(),
            },
            MappingError::Reference(e) => Self::malformed("reference list", e.to_string()),
        }
    }
}

impl From<DeltaError> for EngineError {
    fn from(error: DeltaError) -> Self {
        Self::malformed("delta", error.to_string())
    }
}

impl From<DocumentError> for EngineError {
    fn from(error: DocumentError) -> Self {
        match &error {
            DocumentError::InvalidLocator { locator, .. } => Self::malformed(locator.clone(), error.to_string()),
            DocumentError::InvalidContent { id, .. } => Self::malformed(id.to_string(), error.to_string()),
            DocumentError::InvalidParent { .. } | DocumentError::Version(_) => {
                Self::malformed("document", error.to_string())
            }
        }
    }
}

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn locator() -> Locator {
        Locator::parse("https://example.org/a").unwrap()
    }

    #[test]
    fn fetch_errors_map_to_taxonomy() {
        let timeout = EngineError::from_fetch(FetchError::Timeout {
            locator: locator(),
            after_ms: 10,
        });
        assert!(matches!(timeout, EngineError::FetchFailed { .. }));
        assert!(timeout.is_retryable());
        assert!(timeout.is_fetch_failure());

        let missing = EngineError::from_fetch(FetchError::NotFound { locator: locator() });
        assert!(matches!(missing, EngineError::NotFound { .. }));
        assert!(!missing.is_retryable());

        let malformed = EngineError::from_fetch(FetchError::Malformed {
            locator: locator(),
            reason: "not json".into(),
        });
        assert!(matches!(malformed, EngineError::MalformedDocument { .. }));
        assert!(!malformed.is_fetch_failure());
    }

    #[test]
    fn unresolved_fetch_becomes_not_found() {
        let err = EngineError::from_fetch(FetchError::Transport {
            locator: locator(),
            reason: "reset".into(),
        })
        .into_unresolved();
        match err {
            EngineError::NotFound { key, cause } => {
                assert_eq!(key, "https://example.org/a");
                assert!(cause.is_some_and(|c| c.is_transient()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn collisions_keep_key() {
        let err: EngineError = MappingError::Unmapped("node:x".into()).into();
        assert!(matches!(err, EngineError::IdentifierCollision { key, .. } if key == "node:x"));
    }
}
