//! Error types for collaborator interfaces

use lde_document::{Identifier, Locator, NodeId};

/// Errors from the document or history store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No node with this id
    #[error("node not found: {0}")]
    NotFound(NodeId),

    /// History is not append-only for this identifier
    #[error("history for '{identifier}' would go backwards: {reason}")]
    HistoryOrder { identifier: Identifier, reason: String },

    /// Write conflicts with existing state
    #[error("conflict on {id}: {reason}")]
    Conflict { id: NodeId, reason: String },

    /// Storage backend failure
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether retrying the operation may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

/// Errors dereferencing an external locator
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// Remote says the document does not exist
    #[error("not found: {locator}")]
    NotFound { locator: Locator },

    /// No answer within the time bound
    #[error("timed out after {after_ms}ms: {locator}")]
    Timeout { locator: Locator, after_ms: u64 },

    /// Answer is not a linked-data document
    #[error("malformed document at {locator}: {reason}")]
    Malformed { locator: Locator, reason: String },

    /// Network or remote failure
    #[error("transport error for {locator}: {reason}")]
    Transport { locator: Locator, reason: String },
}

impl FetchError {
    /// Locator the fetch was for
    #[must_use]
    pub fn locator(&self) -> &Locator {
        match self {
            Self::NotFound { locator }
            | Self::Timeout { locator, .. }
            | Self::Malformed { locator, .. }
            | Self::Transport { locator, .. } => locator,
        }
    }

    /// Whether the failure is transient (network or timeout)
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport { .. })
    }
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
