//! Protocol duplication
//!
//! A duplicate is a purely local copy of a resolved protocol graph: fresh
//! ids everywhere, no locators, `duplicate_of` pointing back at each source
//! node. Order lists are rewritten through [`IdentifierMapping`]s built
//! bottom-up (each activity's screens, then the protocol's activities and
//! flows), and nodes are saved in the same order so that no list entry ever
//! names an id missing from the destination graph.

use crate::error::{EngineError, EngineResult};
use crate::resolver::{ResolveOptions, Resolver};
use lde_document::vocab::{self, keys};
use lde_document::{
    Composite, DocumentKind, Identifier, IdentifierMapping, LinkedDocument, Locator, NodeId, Reference,
    LOCAL_SCHEME,
};
use lde_store::DocumentStore;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Keys that tie a node to its remote source
const SOURCE_KEYS: [&str; 3] = [keys::URL, keys::SCHEMA_URL, "@id"];

/// Clones protocol graphs under fresh identities
pub struct Duplicator {
    store: Arc<dyn DocumentStore>,
    resolver: Arc<Resolver>,
    language: String,
}

impl std::fmt::Debug for Duplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Duplicator")
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

/// Source node paired with its copy
struct Planned {
    source: LinkedDocument,
    copy: LinkedDocument,
}

impl Duplicator {
    /// Create duplicator writing labels in `language`
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, resolver: Arc<Resolver>, language: impl Into<String>) -> Self {
        Self {
            store,
            resolver,
            language: language.into(),
        }
    }

    /// Duplicate the protocol `protocol_id`, optionally relabelled
    ///
    /// # Errors
    /// - resolution errors of the source graph
    /// - `IdentifierCollision` if an order list names a node outside the copy
    pub async fn duplicate(&self, protocol_id: &NodeId, label: Option<&str>) -> EngineResult<NodeId> {
        let source = self
            .resolver
            .resolve(
                &Reference::Local(protocol_id.clone()),
                DocumentKind::Protocol,
                ResolveOptions::default(),
            )
            .await?
            .composite;

        let protocol = self.load(&source.id).await?;
        let new_protocol_id = NodeId::generate();
        let mut top = IdentifierMapping::new();
        let mut planned: Vec<Planned> = Vec::new();

        for (kind, children) in source.child_maps() {
            for (key, child) in children {
                let original = self.load(&child.id).await?;
                let copy = self.copy_of(original.clone(), &new_protocol_id)?;
                top.insert(key.clone(), copy.id.clone())?;

                if kind == DocumentKind::Activity {
                    planned.extend(self.plan_screens(child, &copy.id).await?);
                }
                planned.push(Planned { source: original, copy });
            }
        }

        // Screens come first in `planned`, then their activity; flows and
        // activities only need the top-level mapping
        let mut screens_of: Option<IdentifierMapping> = None;
        for item in &mut planned {
            match item.copy.kind {
                DocumentKind::Screen => {
                    let mapping = screens_of.get_or_insert_with(IdentifierMapping::new);
                    let key = item.source.composite_key();
                    mapping.insert(key, item.copy.id.clone())?;
                }
                DocumentKind::Activity => {
                    let mapping = screens_of.take().unwrap_or_default();
                    rewrite_lists(&mut item.copy, &mapping, item.source.locator.as_ref())?;
                }
                DocumentKind::ActivityFlow => {
                    rewrite_lists(&mut item.copy, &top, item.source.locator.as_ref())?;
                }
                DocumentKind::Protocol => {}
            }
        }

        let mut copy = self.copy_of(protocol.clone(), &new_protocol_id)?;
        copy.id = new_protocol_id.clone();
        copy.identifier = Identifier::from_id(&new_protocol_id);
        copy.parent_id = None;
        copy.parent_kind = None;
        rewrite_lists(&mut copy, &top, protocol.locator.as_ref())?;
        if let Some(label) = label {
            self.relabel(&mut copy.content, label);
        }

        let nodes = planned.len() + 1;
        for item in planned {
            debug!(source = %item.source.id, copy = %item.copy.id, kind = %item.copy.kind, "node duplicated");
            self.store.save(item.copy).await?;
        }
        self.store.save(copy).await?;

        self.resolver
            .resolve(
                &Reference::Local(new_protocol_id.clone()),
                DocumentKind::Protocol,
                ResolveOptions::default(),
            )
            .await?;

        info!(source = %protocol_id, copy = %new_protocol_id, nodes, "protocol duplicated");
        Ok(new_protocol_id)
    }

    async fn plan_screens(&self, activity: &Composite, new_activity_id: &NodeId) -> EngineResult<Vec<Planned>> {
        let mut out = Vec::with_capacity(activity.items.len());
        for screen in activity.items.values() {
            let source = self.load(&screen.id).await?;
            let copy = self.copy_of(source.clone(), new_activity_id)?;
            out.push(Planned { source, copy });
        }
        Ok(out)
    }

    async fn load(&self, id: &NodeId) -> EngineResult<LinkedDocument> {
        self.store
            .load(id)
            .await?
            .ok_or_else(|| EngineError::not_found(id.as_str()))
    }

    /// Fresh local copy of `source` owned by `parent`
    fn copy_of(&self, source: LinkedDocument, parent: &NodeId) -> EngineResult<LinkedDocument> {
        let mut content = source.content.clone();
        for key in SOURCE_KEYS {
            while let Some(found) = vocab::find_key(&content, key).map(str::to_string) {
                content.remove(&found);
            }
        }

        if let Some(base) = &source.locator {
            let embeds = &self.resolver.expander().options().expand_recursively;
            for key in embeds.iter().map(String::as_str).chain(["@context"]) {
                if let Some(found) = vocab::find_key(&content, key).map(str::to_string) {
                    if let Some(value) = content.get_mut(&found) {
                        absolutize(value, base);
                    }
                }
            }
        }

        let mut copy = LinkedDocument::local(source.kind, content);
        if let Some(parent_kind) = source.kind.parent_kind() {
            copy = copy.with_parent(parent.clone(), parent_kind)?;
        }
        copy.duplicate_of = Some(source.id);
        Ok(copy)
    }

    fn relabel(&self, content: &mut Map<String, Value>, label: &str) {
        let name = vocab::find_key(content, keys::NAME).unwrap_or(keys::NAME).to_string();
        content.insert(name, Value::String(label.to_string()));
        let pref = vocab::find_key(content, keys::PREF_LABEL)
            .unwrap_or(keys::PREF_LABEL)
            .to_string();
        content.insert(pref, json!([{ "@language": self.language, "@value": label }]));
    }
}

/// Resolve relative links against the locator they were written for
fn absolutize(value: &mut Value, base: &Locator) {
    match value {
        Value::String(s) if !s.starts_with(LOCAL_SCHEME) && Locator::parse(s).is_err() => {
            if let Ok(joined) = base.join(s) {
                *s = joined.as_str().to_string();
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| absolutize(item, base)),
        Value::Object(obj) => {
            if let Some(id) = obj.get_mut("@id") {
                absolutize(id, base);
            }
        }
        _ => {}
    }
}

/// Rewrite every order list of `document` through `mapping`
fn rewrite_lists(document: &mut LinkedDocument, mapping: &IdentifierMapping, base: Option<&Locator>) -> EngineResult<()> {
    for list in document.kind.referenced_kinds() {
        let Some(key) = vocab::find_key(&document.content, list.order_key).map(str::to_string) else {
            continue;
        };
        let rewritten = mapping
            .rewrite_strict(&document.content[&key], base)
            .map_err(|e| match EngineError::from(e) {
                EngineError::IdentifierCollision { key: entry, reason } => EngineError::IdentifierCollision {
                    key: entry,
                    reason: format!("{reason} (list {key} of {})", document.id),
                },
                other => other,
            })?;
        document.content.insert(key, rewritten);
    }
    Ok(())
}
