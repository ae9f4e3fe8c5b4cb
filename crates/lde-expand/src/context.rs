//! Term contexts
//!
//! A [`TermContext`] is the merged result of every context a document
//! references. Remote contexts are looked up in a [`ContextRegistry`]; the
//! registry never fetches on its own, callers fetch whatever
//! [`ContextRegistry::missing`] reports and register it.

use crate::error::{ExpandError, ExpandResult};
use dashmap::DashMap;
use lde_document::vocab;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Location of the built-in vocabulary context
pub const BUILTIN_CONTEXT: &str =
    "https://raw.githubusercontent.com/ReproNim/reproschema/master/contexts/generic";

/// Container declared by a term definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// Values are `{tag: text}` language maps
    Language,
    /// Values are ordered lists
    List,
}

/// One term definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermDefinition {
    /// IRI, compact IRI or other term the term maps to
    pub iri: String,
    /// `@type: @id`: string values are references
    pub type_id: bool,
    /// Declared container
    pub container: Option<Container>,
}

impl TermDefinition {
    fn parse(term: &str, value: &Value) -> ExpandResult<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::String(iri) => Ok(Some(Self {
                iri: iri.clone(),
                type_id: false,
                container: None,
            })),
            Value::Object(def) => {
                let iri = match def.get("@id") {
                    Some(Value::String(iri)) => iri.clone(),
                    None => term.to_string(),
                    Some(other) => {
                        return Err(ExpandError::malformed_context(format!(
                            "@id of term '{term}' must be a string, got {other}"
                        )))
                    }
                };
                let container = match def.get("@container").and_then(Value::as_str) {
                    Some("@language") => Some(Container::Language),
                    Some("@list") => Some(Container::List),
                    _ => None,
                };
                Ok(Some(Self {
                    iri,
                    type_id: def.get("@type").and_then(Value::as_str) == Some("@id"),
                    container,
                }))
            }
            other => Err(ExpandError::malformed_context(format!(
                "definition of term '{term}' must be a string or object, got {other}"
            ))),
        }
    }
}

/// Registry of known remote contexts, keyed by canonical IRI
#[derive(Debug, Clone)]
pub struct ContextRegistry {
    contexts: Arc<DashMap<String, Value>>,
}

impl ContextRegistry {
    /// Registry holding only the built-in vocabulary context
    #[must_use]
    pub fn new() -> Self {
        let registry = Self {
            contexts: Arc::new(DashMap::new()),
        };
        registry.register(BUILTIN_CONTEXT, builtin_context());
        registry
    }

    fn normalize(iri: &str) -> String {
        let iri = iri.trim();
        vocab::canonicalize(iri).unwrap_or_else(|| iri.to_string())
    }

    /// Register (or replace) a remote context
    ///
    /// A document wrapping its context in `{"@context": ...}` is unwrapped.
    pub fn register(&self, iri: &str, document: Value) {
        let context = match document {
            Value::Object(mut obj) if obj.contains_key("@context") => {
                obj.remove("@context").unwrap_or(Value::Null)
            }
            other => other,
        };
        self.contexts.insert(Self::normalize(iri), context);
    }

    /// Registered context for `iri`
    #[must_use]
    pub fn get(&self, iri: &str) -> Option<Value> {
        self.contexts
            .get(&Self::normalize(iri))
            .map(|entry| entry.value().clone())
    }

    /// Whether `iri` is registered
    #[must_use]
    pub fn contains(&self, iri: &str) -> bool {
        self.contexts.contains_key(&Self::normalize(iri))
    }

    /// Number of registered contexts
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Remote context IRIs referenced by `context` that are not registered,
    /// including those referenced from registered contexts
    #[must_use]
    pub fn missing(&self, context: &Value) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        self.collect_missing(context, &mut seen, &mut out);
        out
    }

    fn collect_missing(&self, context: &Value, seen: &mut HashSet<String>, out: &mut Vec<String>) {
        match context {
            Value::String(iri) => {
                let key = Self::normalize(iri);
                if !seen.insert(key.clone()) {
                    return;
                }
                match self.get(iri) {
                    Some(nested) => self.collect_missing(&nested, seen, out),
                    None => out.push(iri.clone()),
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.collect_missing(item, seen, out);
                }
            }
            _ => {}
        }
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin_context() -> Value {
    let mut ctx = Map::new();
    for (prefix, namespace) in vocab::PREFIXES {
        ctx.insert((*prefix).to_string(), Value::String((*namespace).to_string()));
    }
    ctx.insert(
        "prefLabel".into(),
        json!({"@id": "skos:prefLabel", "@container": "@language"}),
    );
    ctx.insert(
        "altLabel".into(),
        json!({"@id": "skos:altLabel", "@container": "@language"}),
    );
    ctx.insert(
        "description".into(),
        json!({"@id": "schema:description", "@container": "@language"}),
    );
    ctx.insert(
        "question".into(),
        json!({"@id": "schema:question", "@container": "@language"}),
    );
    ctx.insert("version".into(), json!({"@id": "schema:version"}));
    ctx.insert(
        "order".into(),
        json!({"@id": "reprolib:terms/order", "@type": "@id", "@container": "@list"}),
    );
    ctx.insert(
        "activityFlowOrder".into(),
        json!({"@id": "reprolib:terms/activityFlowOrder", "@type": "@id", "@container": "@list"}),
    );
    ctx.insert("inputType".into(), json!({"@id": "reprolib:terms/inputType"}));
    ctx.insert(
        "responseOptions".into(),
        json!({"@id": "reprolib:terms/responseOptions", "@type": "@id"}),
    );
    ctx.insert("isAbout".into(), json!({"@id": "reprolib:terms/isAbout", "@type": "@id"}));
    Value::Object(ctx)
}

/// Merged term context of one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermContext {
    terms: HashMap<String, TermDefinition>,
    language: Option<String>,
    vocab: Option<String>,
}

impl TermContext {
    /// Empty context
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context built from a `@context` value
    ///
    /// # Errors
    /// Returns error on malformed or unregistered contexts
    pub fn from_value(context: &Value, registry: &ContextRegistry) -> ExpandResult<Self> {
        let mut ctx = Self::new();
        ctx.merge(context, registry)?;
        Ok(ctx)
    }

    /// Merge another `@context` value into this one, left to right
    ///
    /// # Errors
    /// Returns error on malformed, cyclic or unregistered contexts
    pub fn merge(&mut self, context: &Value, registry: &ContextRegistry) -> ExpandResult<()> {
        self.merge_inner(context, registry, &mut Vec::new())
    }

    fn merge_inner(
        &mut self,
        context: &Value,
        registry: &ContextRegistry,
        stack: &mut Vec<String>,
    ) -> ExpandResult<()> {
        match context {
            Value::Null => {
                *self = Self::new();
                Ok(())
            }
            Value::String(iri) => {
                let key = ContextRegistry::normalize(iri);
                if stack.contains(&key) {
                    return Err(ExpandError::malformed_context(format!(
                        "context '{iri}' includes itself"
                    )));
                }
                let nested = registry
                    .get(iri)
                    .ok_or_else(|| ExpandError::UnknownContext(iri.clone()))?;
                stack.push(key);
                let result = self.merge_inner(&nested, registry, stack);
                stack.pop();
                result
            }
            Value::Array(items) => items
                .iter()
                .try_for_each(|item| self.merge_inner(item, registry, stack)),
            Value::Object(defs) => {
                for (term, def) in defs {
                    match term.as_str() {
                        "@language" => self.language = def.as_str().map(str::to_string),
                        "@vocab" => self.vocab = def.as_str().map(str::to_string),
                        "@base" | "@version" | "@protected" => {}
                        _ => match TermDefinition::parse(term, def)? {
                            Some(parsed) => {
                                self.terms.insert(term.clone(), parsed);
                            }
                            None => {
                                self.terms.remove(term);
                            }
                        },
                    }
                }
                Ok(())
            }
            other => Err(ExpandError::malformed_context(format!(
                "context must be a string, object or array, got {other}"
            ))),
        }
    }

    /// Term definition for `term`
    #[inline]
    #[must_use]
    pub fn term(&self, term: &str) -> Option<&TermDefinition> {
        self.terms.get(term)
    }

    /// Default language for plain strings
    #[inline]
    #[must_use]
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Insert or replace one term definition
    pub fn define(&mut self, term: impl Into<String>, definition: TermDefinition) {
        self.terms.insert(term.into(), definition);
    }

    /// Expand a key or IRI value to an absolute IRI
    ///
    /// `as_term` enables term and `@vocab` lookup (keys and `@type` values).
    /// Returns `None` for a bare word that nothing defines.
    ///
    /// # Errors
    /// Returns [`ExpandError::CyclicPrefix`] if term definitions loop
    pub fn expand_iri(&self, value: &str, as_term: bool) -> ExpandResult<Option<String>> {
        self.expand_inner(value, as_term, &mut Vec::new())
    }

    fn expand_inner(&self, value: &str, as_term: bool, stack: &mut Vec<String>) -> ExpandResult<Option<String>> {
        if value.starts_with('@') {
            return Ok(Some(value.to_string()));
        }
        if as_term {
            if let Some(def) = self.terms.get(value) {
                if def.iri != value {
                    return self.follow(value, &def.iri, stack);
                }
            }
        }
        if let Some((prefix, rest)) = value.split_once(':') {
            if rest.starts_with("//") {
                return Ok(Some(
                    vocab::canonicalize(value).unwrap_or_else(|| value.to_string()),
                ));
            }
            if let Some(def) = self.terms.get(prefix) {
                return Ok(self
                    .follow(prefix, &def.iri, stack)?
                    .map(|namespace| canonical(&format!("{namespace}{rest}"))));
            }
            if let Some(expanded) = vocab::expand_iri(value) {
                return Ok(Some(expanded));
            }
            return Ok(Some(value.to_string()));
        }
        if as_term {
            if let Some(base) = &self.vocab {
                return Ok(Some(canonical(&format!("{base}{value}"))));
            }
        }
        Ok(None)
    }

    fn follow(&self, term: &str, iri: &str, stack: &mut Vec<String>) -> ExpandResult<Option<String>> {
        if stack.iter().any(|t| t == term) {
            return Err(ExpandError::CyclicPrefix {
                term: term.to_string(),
            });
        }
        stack.push(term.to_string());
        let result = self.expand_inner(iri, true, stack);
        stack.pop();
        result
    }
}

fn canonical(iri: &str) -> String {
    vocab::canonicalize(iri).unwrap_or_else(|| iri.to_string())
}
