//! Vocabulary constants and prefix canonicalization
//!
//! Documents are stored with compact prefixes (`reprolib:`, `schema:`,
//! `skos:`) and handed to consumers with absolute IRIs. The two passes
//! [`compact_iri`] and [`expand_iri`] are pure inverses for every prefix in
//! [`PREFIXES`].

/// Canonical absolute form of the `reprolib:` prefix
pub const REPROLIB_CANONICAL: &str = "https://raw.githubusercontent.com/ReproNim/reproschema/master/";

/// Historic locations of the reproschema vocabulary, all compacted to `reprolib:`
pub const REPROLIB_ALIASES: &[&str] = &[
    REPROLIB_CANONICAL,
    "https://raw.githubusercontent.com/ReproNim/schema-standardization/master/",
    "http://schema.repronim.org/",
    "https://schema.repronim.org/",
];

/// Canonical `schema:` namespace
pub const SCHEMA_ORG: &str = "http://schema.org/";

/// Canonical `skos:` namespace
pub const SKOS: &str = "http://www.w3.org/2004/02/skos/core#";

/// Recognized `(prefix, canonical IRI)` pairs
pub const PREFIXES: &[(&str, &str)] = &[
    ("reprolib", REPROLIB_CANONICAL),
    ("schema", SCHEMA_ORG),
    ("skos", SKOS),
];

/// Well-known compact keys
pub mod keys {
    /// Ordered child references (activities of a protocol, screens of an activity)
    pub const ORDER: &str = "reprolib:terms/order";
    /// Ordered activity flow references of a protocol
    pub const FLOW_ORDER: &str = "reprolib:terms/activityFlowOrder";
    /// Protocol version
    pub const VERSION: &str = "schema:version";
    /// Source URL as recorded on imported documents
    pub const SCHEMA_URL: &str = "schema:url";
    /// Bare source URL
    pub const URL: &str = "url";
    /// Preferred label
    pub const PREF_LABEL: &str = "skos:prefLabel";
    /// Human readable name
    pub const NAME: &str = "schema:name";
    /// Description
    pub const DESCRIPTION: &str = "schema:description";
    /// Screen question text
    pub const QUESTION: &str = "schema:question";
    /// Response options (expanded recursively when given by reference)
    pub const RESPONSE_OPTIONS: &str = "reprolib:terms/responseOptions";
    /// Visibility flag
    pub const IS_VIS: &str = "reprolib:terms/isVis";
    /// Input type of a screen
    pub const INPUT_TYPE: &str = "reprolib:terms/inputType";
    /// Per-child properties of an activity or protocol
    pub const ADD_PROPERTIES: &str = "reprolib:terms/addProperties";
}

/// Compact an absolute IRI to its prefixed storage form.
///
/// IRIs that equal a namespace exactly are left untouched.
#[must_use]
pub fn compact_iri(iri: &str) -> Option<String> {
    for alias in REPROLIB_ALIASES {
        if let Some(rest) = iri.strip_prefix(alias) {
            if !rest.is_empty() {
                return Some(format!("reprolib:{rest}"));
            }
        }
    }
    for (prefix, namespace) in &PREFIXES[1..] {
        if let Some(rest) = iri.strip_prefix(namespace) {
            if !rest.is_empty() {
                return Some(format!("{prefix}:{rest}"));
            }
        }
    }
    None
}

/// Expand a prefixed name to its canonical absolute IRI.
#[must_use]
pub fn expand_iri(compact: &str) -> Option<String> {
    let (prefix, rest) = compact.split_once(':')?;
    if rest.starts_with("//") {
        return None;
    }
    PREFIXES
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, namespace)| format!("{namespace}{rest}"))
}

/// Canonicalize any string that names a recognized vocabulary term.
///
/// Legacy aliases and prefixed names both map to the canonical absolute IRI.
#[must_use]
pub fn canonicalize(s: &str) -> Option<String> {
    compact_iri(s)
        .as_deref()
        .and_then(expand_iri)
        .or_else(|| expand_iri(s))
}

/// Key of `document` that holds the well-known `compact` key, whether it was
/// written compact, absolute, or as the bare built-in term
#[must_use]
pub fn find_key<'a>(document: &'a serde_json::Map<String, serde_json::Value>, compact: &str) -> Option<&'a str> {
    let absolute = expand_iri(compact);
    let bare = compact
        .rsplit(|c: char| c == '/' || c == ':')
        .next()
        .unwrap_or(compact);
    document
        .keys()
        .find(|k| {
            k.as_str() == compact
                || k.as_str() == bare
                || (absolute.is_some() && canonicalize(k) == absolute)
        })
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_key_accepts_every_spelling() {
        for key in ["reprolib:terms/order", "order", "https://schema.repronim.org/terms/order"] {
            let mut doc = serde_json::Map::new();
            doc.insert(key.to_string(), serde_json::Value::Null);
            assert_eq!(find_key(&doc, keys::ORDER), Some(key));
        }
        let mut doc = serde_json::Map::new();
        doc.insert("activityFlowOrder".to_string(), serde_json::Value::Null);
        assert_eq!(find_key(&doc, keys::ORDER), None);
    }

    #[test]
    fn compacts_every_alias() {
        for alias in REPROLIB_ALIASES {
            let iri = format!("{alias}terms/order");
            assert_eq!(compact_iri(&iri).as_deref(), Some("reprolib:terms/order"));
        }
        assert_eq!(
            compact_iri("http://schema.org/name").as_deref(),
            Some("schema:name")
        );
    }

    #[test]
    fn namespace_alone_is_not_compacted() {
        assert_eq!(compact_iri(SCHEMA_ORG), None);
        assert_eq!(compact_iri(REPROLIB_CANONICAL), None);
    }

    #[test]
    fn expand_inverts_compact() {
        let iri = format!("{REPROLIB_CANONICAL}schemas/Activity");
        let compact = compact_iri(&iri).unwrap();
        assert_eq!(expand_iri(&compact).unwrap(), iri);
    }

    #[test]
    fn expand_ignores_urls_and_unknown_prefixes() {
        assert_eq!(expand_iri("https://example.org/x"), None);
        assert_eq!(expand_iri("foo:bar"), None);
        assert_eq!(expand_iri("plain"), None);
    }

    #[test]
    fn canonicalize_legacy_alias() {
        assert_eq!(
            canonicalize("http://schema.repronim.org/Field").unwrap(),
            format!("{REPROLIB_CANONICAL}Field")
        );
        assert_eq!(
            canonicalize("skos:prefLabel").unwrap(),
            format!("{SKOS}prefLabel")
        );
    }
}
