//! BCP-47 language selection
//!
//! Works on both shapes a language-tagged value can take:
//! a list of `{"@language": tag, "@value": text}` objects, or a
//! `{tag: text}` language map.

use serde_json::Value;

/// Successively more generic forms of a tag, most specific first
///
/// `zh-Hant-TW` → `["zh-Hant-TW", "zh-Hant", "zh"]`
#[must_use]
pub fn more_generic(tag: &str) -> Vec<String> {
    let mut out = vec![tag.to_string()];
    let mut current = tag;
    while let Some((head, _)) = current.rsplit_once('-') {
        out.push(head.to_string());
        current = head;
    }
    out
}

fn primary_subtag(tag: &str) -> &str {
    tag.split('-').next().unwrap_or(tag)
}

/// `(tag, value)` pairs in declaration order; untagged entries have no tag
fn tagged(value: &Value) -> Vec<(Option<&str>, &Value)> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(obj) => (
                    obj.get("@language").and_then(Value::as_str),
                    obj.get("@value").unwrap_or(item),
                ),
                other => (None, other),
            })
            .collect(),
        Value::Object(map) if !map.contains_key("@value") => map
            .iter()
            .map(|(tag, v)| {
                let tag = tag.trim_start_matches('@');
                (if tag == "none" { None } else { Some(tag) }, v)
            })
            .collect(),
        Value::Object(obj) => vec![(
            obj.get("@language").and_then(Value::as_str),
            obj.get("@value").unwrap_or(value),
        )],
        other => vec![(None, other)],
    }
}

/// Select the value best matching `tag`.
///
/// 1. exact (case-insensitive) match against `tag` and each more generic
///    form, longest first, first occurrence winning ties;
/// 2. wildcard match on the primary subtag, shortest tag first;
/// 3. the first untagged value;
/// 4. the first value.
#[must_use]
pub fn select_language<'a>(value: &'a Value, tag: &str) -> Option<&'a Value> {
    let entries = tagged(value);
    if entries.is_empty() {
        return None;
    }

    for candidate in more_generic(tag) {
        if let Some((_, v)) = entries
            .iter()
            .find(|(t, _)| t.is_some_and(|t| t.eq_ignore_ascii_case(&candidate)))
        {
            return Some(*v);
        }
    }

    let primary = primary_subtag(tag);
    let wildcard = entries
        .iter()
        .filter_map(|(t, v)| t.map(|t| (t, v)))
        .filter(|(t, _)| primary_subtag(t).eq_ignore_ascii_case(primary))
        .min_by_key(|(t, _)| t.len());
    if let Some((_, v)) = wildcard {
        return Some(*v);
    }

    entries
        .iter()
        .find(|(t, _)| t.is_none())
        .or_else(|| entries.first())
        .map(|(_, v)| *v)
}

/// Text of the value best matching `tag`, if it is a string
#[must_use]
pub fn select_text<'a>(value: &'a Value, tag: &str) -> Option<&'a str> {
    select_language(value, tag).and_then(Value::as_str)
}
