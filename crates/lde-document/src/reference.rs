//! Child references
//!
//! Order lists hold references to child documents in any of these shapes:
//!
//! - a bare string: an absolute locator, a locator relative to the parent's
//!   own locator, or a local id (only when the parent has no locator)
//! - `node:<id>`: an explicit local id
//! - an object carrying `url`, `schema:url`, `@id` or `@value`
//! - any of the above wrapped in `{"@list": [...]}`

use crate::document::{DocumentError, Locator, NodeId};
use crate::vocab::keys;
use serde_json::{Map, Value};
use std::fmt::{self, Display, Formatter};

/// Scheme marking an explicit local reference
pub const LOCAL_SCHEME: &str = "node:";

/// A reference from a parent to a child document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    /// Local storage id
    Local(NodeId),
    /// External locator
    Locator(Locator),
}

impl Reference {
    /// Parse one raw reference string against the parent's locator
    ///
    /// # Errors
    /// Returns error if the string is empty or a relative locator cannot be joined
    pub fn parse(raw: &str, base: Option<&Locator>) -> Result<Self, ReferenceError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ReferenceError::Empty);
        }
        if let Some(id) = raw.strip_prefix(LOCAL_SCHEME) {
            return Ok(Self::Local(NodeId::new(id)));
        }
        if let Ok(locator) = Locator::parse(raw) {
            return Ok(Self::Locator(locator));
        }
        match base {
            Some(base) => Ok(Self::Locator(base.join(raw)?)),
            None => Ok(Self::Local(NodeId::new(raw))),
        }
    }

    /// Key used in composite child maps and identifier mappings
    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Local(id) => id.as_str(),
            Self::Locator(locator) => locator.as_str(),
        }
    }

    /// Serialized form written back into order lists
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Local(id) => Value::String(format!("{LOCAL_SCHEME}{id}")),
            Self::Locator(locator) => Value::String(locator.as_str().to_string()),
        }
    }

    /// Whether resolving this reference may require a network fetch
    #[inline]
    #[must_use]
    pub fn is_external(&self) -> bool {
        matches!(self, Self::Locator(_))
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(id) => write!(f, "{LOCAL_SCHEME}{id}"),
            Self::Locator(locator) => write!(f, "{locator}"),
        }
    }
}

/// Raw string of one order-list entry
fn entry_str(entry: &Value) -> Option<&str> {
    match entry {
        Value::String(s) => Some(s),
        Value::Object(obj) => [keys::URL, keys::SCHEMA_URL, "@id", "@value"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(entry_str)),
        _ => None,
    }
}

fn entries(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => match items.as_slice() {
            [Value::Object(obj)] if obj.contains_key("@list") => entries(&items[0]),
            _ => items,
        },
        Value::Object(obj) => match obj.get("@list") {
            Some(list) => entries(list),
            None => std::slice::from_ref(value),
        },
        Value::Null => &[],
        _ => std::slice::from_ref(value),
    }
}

/// Extract the ordered references held by an order-list value
///
/// # Errors
/// Returns error on an entry that carries no usable reference
pub fn extract_references(value: &Value, base: Option<&Locator>) -> Result<Vec<Reference>, ReferenceError> {
    entries(value)
        .iter()
        .map(|entry| {
            let raw = entry_str(entry).ok_or_else(|| ReferenceError::Unrecognized(entry.to_string()))?;
            Reference::parse(raw, base)
        })
        .collect()
}

/// Rewrite every reference held by an order-list value.
///
/// `f` receives the raw entry string and its parsed form and returns the
/// replacement, or `None` to keep the entry untouched. The result is a flat
/// array of reference strings, wrapped in `@list` when the input was.
///
/// # Errors
/// Propagates parse errors and errors returned by `f`
pub fn map_references<E, F>(value: &Value, base: Option<&Locator>, mut f: F) -> Result<Value, E>
where
    E: From<ReferenceError>,
    F: FnMut(&str, Reference) -> Result<Option<Reference>, E>,
{
    let mut out = Vec::new();
    for entry in entries(value) {
        let raw = entry_str(entry).ok_or_else(|| ReferenceError::Unrecognized(entry.to_string()))?;
        let parsed = Reference::parse(raw, base)?;
        match f(raw, parsed)? {
            Some(replacement) => out.push(replacement.to_value()),
            None => out.push(entry.clone()),
        }
    }
    let list = Value::Array(out);
    if is_list_wrapped(value) {
        let mut wrapper = Map::new();
        wrapper.insert("@list".to_string(), list);
        Ok(Value::Array(vec![Value::Object(wrapper)]))
    } else {
        Ok(list)
    }
}

fn is_list_wrapped(value: &Value) -> bool {
    match value {
        Value::Object(obj) => obj.contains_key("@list"),
        Value::Array(items) => matches!(items.as_slice(), [Value::Object(obj)] if obj.contains_key("@list")),
        _ => false,
    }
}

/// Errors reading references
#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    /// Empty string
    #[error("empty reference")]
    Empty,

    /// Entry holds none of the recognized reference shapes
    #[error("unrecognized reference entry: {0}")]
    Unrecognized(String),

    /// Relative locator could not be joined
    #[error(transparent)]
    Locator(#[from] DocumentError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Locator {
        Locator::parse("https://example.org/protocols/p1/p1_schema").unwrap()
    }

    #[test]
    fn parses_every_entry_shape() {
        let value = json!([
            "https://example.org/activities/a1",
            "../../activities/a2",
            {"@id": "activities/a3"},
            {"url": "https://other.org/a4", "@id": "ignored"},
            {"schema:url": "https://other.org/a5"},
        ]);
        let refs = extract_references(&value, Some(&base())).unwrap();
        let keys: Vec<&str> = refs.iter().map(Reference::key).collect();
        assert_eq!(
            keys,
            vec![
                "https://example.org/activities/a1",
                "https://example.org/activities/a2",
                "https://example.org/protocols/p1/activities/a3",
                "https://other.org/a4",
                "https://other.org/a5",
            ]
        );
    }

    #[test]
    fn unwraps_list_containers() {
        let wrapped = json!([{"@list": [{"@id": "node:x"}, {"@id": "node:y"}]}]);
        let refs = extract_references(&wrapped, None).unwrap();
        assert_eq!(refs, vec![Reference::Local("x".into()), Reference::Local("y".into())]);

        let bare = json!({"@list": ["a", "b"]});
        assert_eq!(extract_references(&bare, None).unwrap().len(), 2);
    }

    #[test]
    fn bare_strings_are_local_without_base() {
        let refs = extract_references(&json!(["abc"]), None).unwrap();
        assert_eq!(refs, vec![Reference::Local(NodeId::new("abc"))]);
        assert!(!refs[0].is_external());
    }

    #[test]
    fn explicit_local_under_imported_parent() {
        let refs = extract_references(&json!(["node:abc"]), Some(&base())).unwrap();
        assert_eq!(refs, vec![Reference::Local(NodeId::new("abc"))]);
    }

    #[test]
    fn rejects_non_reference_entries() {
        assert!(matches!(
            extract_references(&json!([42]), None),
            Err(ReferenceError::Unrecognized(_))
        ));
        assert!(matches!(
            extract_references(&json!([""]), None),
            Err(ReferenceError::Empty)
        ));
    }

    #[test]
    fn null_means_no_children() {
        assert!(extract_references(&Value::Null, None).unwrap().is_empty());
    }

    #[test]
    fn map_keeps_wrapping_and_untouched_entries() {
        let value = json!([{"@list": ["old", {"@id": "keep"}]}]);
        let out = map_references::<ReferenceError, _>(&value, None, |raw, _| {
            Ok((raw == "old").then(|| Reference::Local(NodeId::new("new"))))
        })
        .unwrap();
        assert_eq!(out, json!([{"@list": ["node:new", {"@id": "keep"}]}]));
    }
}
