//! Error types for the term expander

/// Errors while expanding a compacted document
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpandError {
    /// Context has an unusable shape
    #[error("malformed context: {reason}")]
    MalformedContext { reason: String },

    /// Term definitions refer to each other in a loop
    #[error("cyclic prefix definition involving '{term}'")]
    CyclicPrefix { term: String },

    /// Remote context has not been registered yet
    #[error("unknown remote context: {0}")]
    UnknownContext(String),

    /// Document body cannot be expanded
    #[error("malformed document: {reason}")]
    MalformedDocument { reason: String },
}

impl ExpandError {
    /// Create malformed context error
    pub fn malformed_context(reason: impl Into<String>) -> Self {
        Self::MalformedContext {
            reason: reason.into(),
        }
    }

    /// Create malformed document error
    pub fn malformed_document(reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            reason: reason.into(),
        }
    }

    /// Whether the error concerns the context rather than the document body
    #[inline]
    #[must_use]
    pub fn is_context_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedContext { .. } | Self::CyclicPrefix { .. } | Self::UnknownContext(_)
        )
    }
}

/// Result alias for expansion
pub type ExpandResult<T> = Result<T, ExpandError>;
