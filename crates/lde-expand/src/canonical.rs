//! Prefix canonicalization passes
//!
//! Node content is stored compacted (`reprolib:terms/order`) and handed to
//! consumers expanded (absolute canonical IRIs). Both passes rewrite object
//! keys and IRI-like string values, never literal text under `@value` or
//! `@language`.

use lde_document::vocab;
use serde_json::{Map, Value};

fn is_iri_like(s: &str) -> bool {
    !s.is_empty() && s.contains(':') && !s.chars().any(char::is_whitespace)
}

fn rewrite(value: &Value, f: &dyn Fn(&str) -> Option<String>) -> Value {
    match value {
        Value::String(s) if is_iri_like(s) => Value::String(f(s).unwrap_or_else(|| s.clone())),
        Value::Array(items) => Value::Array(items.iter().map(|item| rewrite(item, f)).collect()),
        Value::Object(obj) => {
            let mut out = Map::with_capacity(obj.len());
            for (key, v) in obj {
                let new_key = if is_iri_like(key) {
                    f(key).unwrap_or_else(|| key.clone())
                } else {
                    key.clone()
                };
                let new_value = match key.as_str() {
                    "@value" | "@language" | "@context" => v.clone(),
                    _ => rewrite(v, f),
                };
                out.insert(new_key, new_value);
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Compact every recognized absolute IRI to its prefixed storage form
#[must_use]
pub fn compact_for_storage(value: &Value) -> Value {
    rewrite(value, &vocab::compact_iri)
}

/// Expand every recognized prefix (and legacy alias) to its canonical IRI
#[must_use]
pub fn expand_for_consumption(value: &Value) -> Value {
    rewrite(value, &vocab::canonicalize)
}

fn context_for_key(key: &str) -> Option<(String, String, String)> {
    if !key.contains('.') {
        return None;
    }
    let (namespace, local) = key.rsplit_once('/')?;
    if local.is_empty() {
        return None;
    }
    let namespace = format!("{namespace}/");
    let term = namespace
        .split("://")
        .last()
        .unwrap_or(&namespace)
        .trim_end_matches('/')
        .replace('.', "_dot_")
        .replace(['/', ':'], "_");
    Some((term.clone(), namespace, format!("{term}:{local}")))
}

fn compact_keys_inner(value: &Value, context: &mut Map<String, Value>) -> Value {
    match value {
        Value::Object(obj) => {
            let mut out = Map::with_capacity(obj.len());
            for (key, v) in obj {
                let new_key = match context_for_key(key) {
                    Some((term, namespace, compact)) => {
                        context.entry(term).or_insert(Value::String(namespace));
                        compact
                    }
                    None => key.clone(),
                };
                let new_value = if key == "@context" {
                    v.clone()
                } else {
                    compact_keys_inner(v, context)
                };
                out.insert(new_key, new_value);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| compact_keys_inner(item, context))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Shorten keys that are dotted IRI paths (`https://x.org/terms/foo`) to
/// `x_dot_org_terms:foo`, appending the generated prefix definitions to the
/// document's `@context`.
#[must_use]
pub fn compact_keys(document: &Map<String, Value>) -> Map<String, Value> {
    let mut generated = Map::new();
    let Value::Object(mut out) = compact_keys_inner(&Value::Object(document.clone()), &mut generated) else {
        return document.clone();
    };
    if generated.is_empty() {
        return out;
    }

    let mut contexts = match out.remove("@context") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
    };
    let generated = Value::Object(generated);
    if !contexts.contains(&generated) {
        contexts.push(generated);
    }
    out.insert("@context".to_string(), Value::Array(contexts));
    out
}
