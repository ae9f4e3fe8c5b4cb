//! Term expansion
//!
//! Turns one compacted node into its expanded form: absolute keys, value
//! objects, language maps normalized to tagged lists, plus the three
//! special key sets (expand-recursively, delanguage, dereference).
//!
//! Expansion is pure. Keys marked expand-recursively whose value is only a
//! link come back as [`Embed`]s; the caller fetches and expands the target
//! and hands it back through [`Expander::splice`].

use crate::canonical::expand_for_consumption;
use crate::context::{Container, ContextRegistry, TermContext, BUILTIN_CONTEXT};
use crate::error::{ExpandError, ExpandResult};
use lde_document::vocab::{self, keys};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Expansion options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpandOptions {
    /// Keys whose linked value is replaced by the expanded target document
    pub expand_recursively: Vec<String>,
    /// Keys whose language-tagged list collapses to one scalar
    pub delanguage: Vec<String>,
    /// Keys whose string values are rewritten to canonical absolute IRIs
    pub dereference: Vec<String>,
    /// Keep keys that no context defines
    pub keep_undefined: bool,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            expand_recursively: vec![keys::RESPONSE_OPTIONS.to_string()],
            delanguage: vec![
                keys::VERSION.to_string(),
                "schema:schemaVersion".to_string(),
                keys::INPUT_TYPE.to_string(),
            ],
            dereference: vec!["@type".to_string(), "reprolib:terms/isAbout".to_string()],
            keep_undefined: true,
        }
    }
}

impl ExpandOptions {
    /// Set expand-recursively keys
    #[inline]
    #[must_use]
    pub fn with_expand_recursively(mut self, keys: Vec<String>) -> Self {
        self.expand_recursively = keys;
        self
    }

    /// Set delanguage keys
    #[inline]
    #[must_use]
    pub fn with_delanguage(mut self, keys: Vec<String>) -> Self {
        self.delanguage = keys;
        self
    }

    /// Set dereference keys
    #[inline]
    #[must_use]
    pub fn with_dereference(mut self, keys: Vec<String>) -> Self {
        self.dereference = keys;
        self
    }

    /// Set whether undefined keys are kept
    #[inline]
    #[must_use]
    pub fn with_keep_undefined(mut self, keep: bool) -> Self {
        self.keep_undefined = keep;
        self
    }
}

/// Linked value that must be fetched and spliced in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    /// Expanded key holding the link
    pub key: String,
    /// Link target as written (possibly relative)
    pub target: String,
}

/// Result of expanding one node
#[derive(Debug, Clone, PartialEq)]
pub struct Expanded {
    /// Expanded fields
    pub document: Map<String, Value>,
    /// Links still to be spliced
    pub embeds: Vec<Embed>,
}

fn absolute_keys(keys: &[String]) -> HashSet<String> {
    keys.iter()
        .map(|k| {
            if k.starts_with('@') {
                k.clone()
            } else {
                vocab::canonicalize(k).unwrap_or_else(|| k.clone())
            }
        })
        .collect()
}

/// Collapse a language-tagged list to one scalar: the last entry's
/// `@value`, else its `@id`
#[must_use]
pub fn delanguage(value: &Value) -> Value {
    match value {
        Value::Array(items) => items.last().map_or(Value::Null, delanguage),
        Value::Object(obj) => obj
            .get("@value")
            .or_else(|| obj.get("@id"))
            .cloned()
            .unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

/// Rewrite every string that names a recognized vocabulary term to its
/// canonical absolute IRI
#[must_use]
pub fn dereference(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(vocab::canonicalize(s).unwrap_or_else(|| s.clone())),
        Value::Array(items) => Value::Array(items.iter().map(dereference).collect()),
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), dereference(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Stateless term expander
#[derive(Debug, Clone)]
pub struct Expander {
    options: ExpandOptions,
    recursive: HashSet<String>,
    delanguage: HashSet<String>,
    dereference: HashSet<String>,
}

impl Expander {
    /// Create an expander for `options`
    #[must_use]
    pub fn new(options: ExpandOptions) -> Self {
        Self {
            recursive: absolute_keys(&options.expand_recursively),
            delanguage: absolute_keys(&options.delanguage),
            dereference: absolute_keys(&options.dereference),
            options,
        }
    }

    /// Options in effect
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ExpandOptions {
        &self.options
    }

    /// Context a document sees: the built-in vocabulary followed by its own
    /// `@context`
    ///
    /// # Errors
    /// Returns error on malformed, cyclic or unregistered contexts
    pub fn context_for(&self, compacted: &Map<String, Value>, registry: &ContextRegistry) -> ExpandResult<TermContext> {
        let mut ctx = TermContext::from_value(&Value::String(BUILTIN_CONTEXT.to_string()), registry)?;
        if let Some(local) = compacted.get("@context") {
            ctx.merge(local, registry)?;
        }
        Ok(ctx)
    }

    /// Expand one compacted node
    ///
    /// # Errors
    /// Returns [`ExpandError`] on context problems or values that cannot be expanded
    pub fn expand(&self, compacted: &Map<String, Value>, registry: &ContextRegistry) -> ExpandResult<Expanded> {
        let ctx = self.context_for(compacted, registry)?;
        let mut document = self.expand_fields(compacted, &ctx, registry)?;
        let mut embeds = Vec::new();

        for (key, value) in &mut document {
            if self.recursive.contains(key) {
                if let Some(target) = link_target(value) {
                    embeds.push(Embed {
                        key: key.clone(),
                        target,
                    });
                }
            }
            if self.delanguage.contains(key) {
                *value = delanguage(value);
            }
            if self.dereference.contains(key) {
                *value = dereference(value);
            }
        }
        document.retain(|_, v| !v.is_null());

        Ok(Expanded { document, embeds })
    }

    /// Replace an embed's link with the expanded target document
    pub fn splice(&self, document: &mut Map<String, Value>, key: &str, target: Map<String, Value>) {
        document.insert(key.to_string(), Value::Array(vec![Value::Object(target)]));
    }

    fn expand_node(
        &self,
        node: &Map<String, Value>,
        ctx: &TermContext,
        registry: &ContextRegistry,
    ) -> ExpandResult<Map<String, Value>> {
        match node.get("@context") {
            Some(nested) => {
                let mut merged = ctx.clone();
                merged.merge(nested, registry)?;
                self.expand_fields(node, &merged, registry)
            }
            None => self.expand_fields(node, ctx, registry),
        }
    }

    fn expand_fields(
        &self,
        node: &Map<String, Value>,
        ctx: &TermContext,
        registry: &ContextRegistry,
    ) -> ExpandResult<Map<String, Value>> {
        let mut out = Map::new();
        for (key, value) in node {
            match key.as_str() {
                "@context" => continue,
                "@id" => {
                    let id = value.as_str().ok_or_else(|| {
                        ExpandError::malformed_document(format!("@id must be a string, got {value}"))
                    })?;
                    let expanded = ctx.expand_iri(id, false)?.unwrap_or_else(|| id.to_string());
                    out.insert(key.clone(), Value::String(expanded));
                }
                "@type" => {
                    let types = match value {
                        Value::String(_) => vec![value.clone()],
                        Value::Array(items) => items.clone(),
                        other => {
                            return Err(ExpandError::malformed_document(format!(
                                "@type must be a string or list, got {other}"
                            )))
                        }
                    };
                    let mut expanded = Vec::with_capacity(types.len());
                    for t in types {
                        let t = t.as_str().ok_or_else(|| {
                            ExpandError::malformed_document(format!("@type entry must be a string, got {t}"))
                        })?;
                        expanded.push(Value::String(
                            ctx.expand_iri(t, true)?.unwrap_or_else(|| t.to_string()),
                        ));
                    }
                    out.insert(key.clone(), Value::Array(expanded));
                }
                k if k.starts_with('@') => {
                    out.insert(key.clone(), value.clone());
                }
                _ => {
                    let Some(iri) = ctx.expand_iri(key, true)? else {
                        if self.options.keep_undefined {
                            out.insert(key.clone(), expand_for_consumption(value));
                        }
                        continue;
                    };
                    let expanded = self.expand_value(key, value, ctx, registry)?;
                    if expanded.as_array().is_some_and(Vec::is_empty) {
                        continue;
                    }
                    match out.get_mut(&iri) {
                        Some(Value::Array(existing)) => {
                            if let Value::Array(more) = expanded {
                                existing.extend(more);
                            }
                        }
                        _ => {
                            out.insert(iri, expanded);
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn expand_value(
        &self,
        term: &str,
        value: &Value,
        ctx: &TermContext,
        registry: &ContextRegistry,
    ) -> ExpandResult<Value> {
        let def = ctx.term(term);
        let container = def.and_then(|d| d.container);
        let type_id = def.is_some_and(|d| d.type_id);

        if container == Some(Container::Language) {
            if let Value::Object(map) = value {
                if !map.keys().any(|k| k.starts_with('@')) {
                    let mut tagged = Vec::with_capacity(map.len());
                    for (tag, text) in map {
                        for text in as_list(text) {
                            let mut entry = Map::new();
                            entry.insert("@language".into(), Value::String(tag.to_ascii_lowercase()));
                            entry.insert("@value".into(), text.clone());
                            tagged.push(Value::Object(entry));
                        }
                    }
                    return Ok(Value::Array(tagged));
                }
            }
        }

        let mut items = Vec::new();
        for item in as_list(value) {
            if let Some(expanded) = self.expand_item(item, type_id, ctx, registry)? {
                items.push(expanded);
            }
        }

        if container == Some(Container::List) && !is_list_object(value) {
            let mut list = Map::new();
            list.insert("@list".into(), Value::Array(items));
            return Ok(Value::Array(vec![Value::Object(list)]));
        }
        Ok(Value::Array(items))
    }

    fn expand_item(
        &self,
        item: &Value,
        type_id: bool,
        ctx: &TermContext,
        registry: &ContextRegistry,
    ) -> ExpandResult<Option<Value>> {
        let expanded = match item {
            Value::Null => return Ok(None),
            Value::String(s) if type_id => {
                let iri = ctx.expand_iri(s, false)?.unwrap_or_else(|| s.clone());
                single("@id", Value::String(iri))
            }
            Value::String(s) => {
                let mut entry = Map::new();
                if let Some(lang) = ctx.language() {
                    entry.insert("@language".into(), Value::String(lang.to_string()));
                }
                entry.insert("@value".into(), Value::String(s.clone()));
                Value::Object(entry)
            }
            Value::Bool(_) | Value::Number(_) => single("@value", item.clone()),
            Value::Array(nested) => {
                let mut out = Vec::new();
                for n in nested {
                    if let Some(e) = self.expand_item(n, type_id, ctx, registry)? {
                        out.push(e);
                    }
                }
                Value::Array(out)
            }
            Value::Object(obj) if obj.contains_key("@value") => {
                if obj.get("@value").is_some_and(Value::is_null) {
                    return Ok(None);
                }
                item.clone()
            }
            Value::Object(obj) if obj.contains_key("@list") => {
                let list = obj.get("@list").unwrap_or(&Value::Null);
                let mut out = Vec::new();
                for n in as_list(list) {
                    if let Some(e) = self.expand_item(n, type_id, ctx, registry)? {
                        out.push(e);
                    }
                }
                single("@list", Value::Array(out))
            }
            Value::Object(obj) => Value::Object(self.expand_node(obj, ctx, registry)?),
        };
        Ok(Some(expanded))
    }
}

impl Default for Expander {
    fn default() -> Self {
        Self::new(ExpandOptions::default())
    }
}

fn single(key: &str, value: Value) -> Value {
    let mut obj = Map::new();
    obj.insert(key.to_string(), value);
    Value::Object(obj)
}

fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn is_list_object(value: &Value) -> bool {
    match value {
        Value::Object(obj) => obj.contains_key("@list"),
        Value::Array(items) => matches!(items.as_slice(), [Value::Object(obj)] if obj.contains_key("@list")),
        _ => false,
    }
}

/// Target of a value that is nothing but a link
fn link_target(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) if items.len() == 1 => link_target(&items[0]),
        Value::Object(obj) if obj.len() == 1 => obj.get("@id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lde_document::vocab::{REPROLIB_CANONICAL, SCHEMA_ORG, SKOS};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn r(local: &str) -> String {
        format!("{REPROLIB_CANONICAL}{local}")
    }

    fn expand(v: Value) -> Expanded {
        Expander::default().expand(&obj(v), &ContextRegistry::new()).unwrap()
    }

    #[test]
    fn compact_prefixes_and_types() {
        let out = expand(json!({
            "@id": "phq9_schema",
            "@type": "reprolib:schemas/Activity",
            "schema:name": "PHQ-9",
        }));
        assert_eq!(out.document["@id"], json!("phq9_schema"));
        assert_eq!(out.document["@type"], json!([r("schemas/Activity")]));
        assert_eq!(
            out.document[&format!("{SCHEMA_ORG}name")],
            json!([{"@value": "PHQ-9"}])
        );
        assert!(out.embeds.is_empty());
    }

    #[test]
    fn language_maps_become_tagged_lists() {
        let out = expand(json!({"prefLabel": {"en": "Mood", "FR": "Humeur"}}));
        assert_eq!(
            out.document[&format!("{SKOS}prefLabel")],
            json!([
                {"@language": "en", "@value": "Mood"},
                {"@language": "fr", "@value": "Humeur"},
            ])
        );
    }

    #[test]
    fn order_terms_become_id_lists() {
        let out = expand(json!({"order": ["items/q1", "items/q2"]}));
        assert_eq!(
            out.document[&r("terms/order")],
            json!([{"@list": [{"@id": "items/q1"}, {"@id": "items/q2"}]}])
        );

        let already = expand(json!({"reprolib:terms/order": [{"@list": [{"@id": "a"}]}]}));
        assert_eq!(already.document[&r("terms/order")], json!([{"@list": [{"@id": "a"}]}]));
    }

    #[test]
    fn default_language_applies_to_plain_strings() {
        let out = expand(json!({
            "@context": {"@language": "en"},
            "schema:description": "Plain",
        }));
        assert_eq!(
            out.document[&format!("{SCHEMA_ORG}description")],
            json!([{"@language": "en", "@value": "Plain"}])
        );
    }

    #[test]
    fn delanguage_takes_last_value() {
        let out = expand(json!({"schema:version": [
            {"@language": "en", "@value": "0.0.1"},
            {"@language": "fr", "@value": "0.0.2"},
        ]}));
        assert_eq!(out.document[&format!("{SCHEMA_ORG}version")], json!("0.0.2"));

        assert_eq!(delanguage(&json!([{"@id": "x"}])), json!("x"));
        assert_eq!(delanguage(&json!([])), Value::Null);
    }

    #[test]
    fn dereference_canonicalizes_aliases() {
        let out = expand(json!({"reprolib:terms/isAbout": "http://schema.repronim.org/items/q1"}));
        assert_eq!(
            out.document[&r("terms/isAbout")],
            json!([{"@value": r("items/q1")}])
        );
    }

    #[test]
    fn linked_recursive_keys_become_embeds() {
        let out = expand(json!({"responseOptions": "options/likert.jsonld"}));
        assert_eq!(
            out.embeds,
            vec![Embed {
                key: r("terms/responseOptions"),
                target: "options/likert.jsonld".into(),
            }]
        );

        let inline = expand(json!({"reprolib:terms/responseOptions": {"schema:minValue": 0}}));
        assert!(inline.embeds.is_empty());
    }

    #[test]
    fn splice_replaces_link() {
        let expander = Expander::default();
        let mut out = expand(json!({"responseOptions": "o.jsonld"}));
        let key = out.embeds[0].key.clone();
        expander.splice(&mut out.document, &key, obj(json!({"x": 1})));
        assert_eq!(out.document[&key], json!([{"x": 1}]));
    }

    #[test]
    fn undefined_keys_follow_option() {
        let doc = obj(json!({"mystery": "value", "schema:name": "n"}));
        let registry = ContextRegistry::new();

        let kept = Expander::default().expand(&doc, &registry).unwrap();
        assert_eq!(kept.document["mystery"], json!("value"));

        let strict = Expander::new(ExpandOptions::default().with_keep_undefined(false));
        let dropped = strict.expand(&doc, &registry).unwrap();
        assert!(!dropped.document.contains_key("mystery"));
    }

    #[test]
    fn nested_nodes_see_nested_context() {
        let out = expand(json!({
            "schema:about": {"@context": {"ex": "https://example.org/v/"}, "ex:weight": 3},
        }));
        assert_eq!(
            out.document[&format!("{SCHEMA_ORG}about")],
            json!([{"https://example.org/v/weight": [{"@value": 3}]}])
        );
    }

    #[test]
    fn malformed_values_are_errors() {
        let expander = Expander::default();
        let registry = ContextRegistry::new();
        assert!(matches!(
            expander.expand(&obj(json!({"@type": 7})), &registry),
            Err(ExpandError::MalformedDocument { .. })
        ));
        assert!(matches!(
            expander.expand(&obj(json!({"@context": {"a": "b:x", "b": "a:y"}, "a": 1})), &registry),
            Err(ExpandError::CyclicPrefix { .. })
        ));
        assert!(matches!(
            expander.expand(&obj(json!({"@context": "https://nowhere.example/ctx"})), &registry),
            Err(ExpandError::UnknownContext(_))
        ));
    }

    #[test]
    fn expansion_is_deterministic() {
        let doc = json!({
            "@type": "reprolib:schemas/Protocol",
            "prefLabel": {"en": "P", "fr": "P-fr"},
            "order": ["a", "b"],
        });
        let a = serde_json::to_vec(&expand(doc.clone()).document).unwrap();
        let b = serde_json::to_vec(&expand(doc).document).unwrap();
        assert_eq!(a, b);
    }
}
