//! Identifier remapping
//!
//! An [`IdentifierMapping`] lives for a single re-import, edit or duplication
//! pass. It maps the keys that order lists used before the pass to the ids of
//! the nodes that replace them, and is dropped when the pass completes.

use crate::document::{Locator, NodeId};
use crate::reference::{map_references, Reference, ReferenceError};
use indexmap::IndexMap;
use serde_json::Value;

/// Transient old-key to new-id table
#[derive(Debug, Clone, Default)]
pub struct IdentifierMapping {
    entries: IndexMap<String, NodeId>,
}

impl IdentifierMapping {
    /// Empty mapping
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `old_key -> new_id`
    ///
    /// # Errors
    /// Returns [`MappingError::Collision`] if the key is already mapped or the
    /// new id was already handed out for another key
    pub fn insert(&mut self, old_key: impl Into<String>, new_id: NodeId) -> Result<(), MappingError> {
        let old_key = old_key.into();
        if let Some(existing) = self.entries.get(&old_key) {
            return Err(MappingError::Collision {
                key: old_key,
                id: existing.clone(),
            });
        }
        if self.entries.values().any(|id| *id == new_id) {
            return Err(MappingError::Collision { key: old_key, id: new_id });
        }
        self.entries.insert(old_key, new_id);
        Ok(())
    }

    /// New id for `old_key`
    #[inline]
    #[must_use]
    pub fn get(&self, old_key: &str) -> Option<&NodeId> {
        self.entries.get(old_key)
    }

    /// Whether `id` is one of the new ids
    #[must_use]
    pub fn contains_new(&self, id: &NodeId) -> bool {
        self.entries.values().any(|v| v == id)
    }

    /// Number of mapped keys
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is mapped
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, raw: &str, parsed: &Reference) -> Option<&NodeId> {
        self.entries.get(raw).or_else(|| self.entries.get(parsed.key()))
    }

    /// Rewrite an order list, leaving unmapped entries as they are
    ///
    /// # Errors
    /// Returns error if an entry is not a reference
    pub fn rewrite(&self, value: &Value, base: Option<&Locator>) -> Result<Value, MappingError> {
        map_references(value, base, |raw, parsed| {
            Ok(self.lookup(raw, &parsed).cloned().map(Reference::Local))
        })
    }

    /// Rewrite an order list, requiring every entry to be mapped
    ///
    /// # Errors
    /// Returns [`MappingError::Unmapped`] for the first entry with no mapping
    pub fn rewrite_strict(&self, value: &Value, base: Option<&Locator>) -> Result<Value, MappingError> {
        map_references(value, base, |raw, parsed| match self.lookup(raw, &parsed) {
            Some(id) => Ok(Some(Reference::Local(id.clone()))),
            None => Err(MappingError::Unmapped(parsed.key().to_string())),
        })
    }
}

/// Errors building or applying a mapping
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    /// Key mapped twice or id reused
    #[error("identifier collision on '{key}' (id {id})")]
    Collision { key: String, id: NodeId },

    /// Order list mentions a key the pass never mapped
    #[error("reference '{0}' has no mapping")]
    Unmapped(String),

    /// Malformed order list
    #[error(transparent)]
    Reference(#[from] ReferenceError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collisions_are_rejected() {
        let mut mapping = IdentifierMapping::new();
        mapping.insert("a", NodeId::new("1")).unwrap();
        assert!(matches!(
            mapping.insert("a", NodeId::new("2")),
            Err(MappingError::Collision { .. })
        ));
        assert!(matches!(
            mapping.insert("b", NodeId::new("1")),
            Err(MappingError::Collision { .. })
        ));
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn rewrite_by_raw_or_resolved_key() {
        let base = Locator::parse("https://e.org/p/schema").unwrap();
        let mut mapping = IdentifierMapping::new();
        mapping.insert("new-screen", NodeId::new("n1")).unwrap();
        mapping.insert("https://e.org/p/a1", NodeId::new("n2")).unwrap();

        let out = mapping
            .rewrite(&json!(["new-screen", "a1", "node:existing"]), Some(&base))
            .unwrap();
        assert_eq!(out, json!(["node:n1", "node:n2", "node:existing"]));
    }

    #[test]
    fn strict_rewrite_reports_unmapped() {
        let mut mapping = IdentifierMapping::new();
        mapping.insert("a", NodeId::new("1")).unwrap();
        let err = mapping.rewrite_strict(&json!(["a", "b"]), None).unwrap_err();
        assert!(matches!(err, MappingError::Unmapped(ref k) if k == "b"));
    }
}
