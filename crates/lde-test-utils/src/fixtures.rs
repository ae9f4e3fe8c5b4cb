//! Protocol graphs used across test suites
//!
//! The remote graph is one protocol with one activity (English and French
//! labels) holding one screen whose response options live in a separate
//! document.

use crate::ScriptedFetcher;
use lde_document::vocab::{keys, REPROLIB_CANONICAL};
use lde_document::{DocumentKind, LinkedDocument, NodeId};
use lde_store::DocumentStore;
use serde_json::{json, Map, Value};

pub const PROTOCOL_URL: &str = "https://example.org/protocols/mood/mood_schema";
pub const ACTIVITY_URL: &str = "https://example.org/activities/mood/mood_schema";
pub const SCREEN_URL: &str = "https://example.org/activities/mood/items/feeling";
pub const OPTIONS_URL: &str = "https://example.org/activities/mood/items/feeling_options";

/// Label of the activity before any edit
pub const ACTIVITY_TITLE_EN: &str = "How are you";

pub fn generic_context() -> String {
    format!("{REPROLIB_CANONICAL}contexts/generic")
}

pub fn protocol_document() -> Value {
    json!({
        "@context": generic_context(),
        "@type": "reprolib:schemas/Protocol",
        "@id": "mood_schema",
        "prefLabel": {"en": "Mood study", "fr": "Étude d'humeur"},
        "schema:version": "1.0.0",
        "order": ["../../activities/mood/mood_schema"],
    })
}

pub fn activity_document() -> Value {
    json!({
        "@context": generic_context(),
        "@type": "reprolib:schemas/Activity",
        "@id": "mood_schema",
        "prefLabel": {"en": ACTIVITY_TITLE_EN, "fr": "Comment allez-vous"},
        "order": ["items/feeling"],
    })
}

pub fn screen_document() -> Value {
    json!({
        "@context": generic_context(),
        "@type": "reprolib:schemas/Field",
        "@id": "feeling",
        "question": {"en": "How do you feel today?"},
        "inputType": "radio",
        "responseOptions": "feeling_options",
    })
}

pub fn options_document() -> Value {
    json!({
        "@context": generic_context(),
        "@type": "reprolib:schemas/ResponseOptions",
        "reprolib:terms/choices": [
            {"schema:name": "good", "schema:value": 1},
            {"schema:name": "bad", "schema:value": 0},
        ],
    })
}

/// Fetcher serving the whole remote graph
pub fn remote_protocol() -> ScriptedFetcher {
    ScriptedFetcher::new()
        .with_document(PROTOCOL_URL, protocol_document())
        .with_document(ACTIVITY_URL, activity_document())
        .with_document(SCREEN_URL, screen_document())
        .with_document(OPTIONS_URL, options_document())
}

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture is not an object: {other}"),
    }
}

fn local_ref(id: &NodeId) -> Value {
    Value::String(format!("node:{id}"))
}

/// Store a purely local protocol (one activity, two screens, one flow);
/// returns the protocol id
pub async fn seed_local_protocol(store: &dyn DocumentStore) -> NodeId {
    let mut protocol = LinkedDocument::local(
        DocumentKind::Protocol,
        object(json!({
            "@type": "reprolib:schemas/Protocol",
            "skos:prefLabel": "Local study",
            "schema:version": "0.1.0",
        })),
    );
    let mut activity = LinkedDocument::local(
        DocumentKind::Activity,
        object(json!({"@type": "reprolib:schemas/Activity", "skos:prefLabel": "Sleep"})),
    )
    .with_parent(protocol.id.clone(), DocumentKind::Protocol)
    .expect("activity under protocol");

    let screens: Vec<LinkedDocument> = ["hours", "quality"]
        .iter()
        .map(|name| {
            LinkedDocument::local(
                DocumentKind::Screen,
                object(json!({"@type": "reprolib:schemas/Field", "schema:question": *name})),
            )
            .with_parent(activity.id.clone(), DocumentKind::Activity)
            .expect("screen under activity")
        })
        .collect();

    activity.content.insert(
        keys::ORDER.to_string(),
        Value::Array(screens.iter().map(|s| local_ref(&s.id)).collect()),
    );
    protocol
        .content
        .insert(keys::ORDER.to_string(), Value::Array(vec![local_ref(&activity.id)]));

    let flow = LinkedDocument::local(
        DocumentKind::ActivityFlow,
        object(json!({
            "@type": "reprolib:schemas/ActivityFlow",
            "skos:prefLabel": "Nightly",
            "reprolib:terms/order": [local_ref(&activity.id)],
        })),
    )
    .with_parent(protocol.id.clone(), DocumentKind::Protocol)
    .expect("flow under protocol");
    protocol
        .content
        .insert(keys::FLOW_ORDER.to_string(), Value::Array(vec![local_ref(&flow.id)]));

    let protocol_id = protocol.id.clone();
    store.save(protocol).await.expect("save protocol");
    store.save(activity).await.expect("save activity");
    for screen in screens {
        store.save(screen).await.expect("save screen");
    }
    store.save(flow).await.expect("save flow");
    protocol_id
}
