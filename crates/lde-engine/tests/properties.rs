//! Behavioral laws checked against real edits of the seeded local protocol

use lde_engine::prelude::*;
use lde_engine::{diff, merge_update};
use lde_store::{InMemoryDocumentStore, InMemoryHistoryStore};
use lde_test_utils::{fixtures, init_tracing};
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::sync::Arc;

struct World {
    store: Arc<InMemoryDocumentStore>,
    history: Arc<InMemoryHistoryStore>,
    engine: Engine,
    protocol: NodeId,
}

async fn world() -> World {
    init_tracing();
    let store = Arc::new(InMemoryDocumentStore::new());
    let history = Arc::new(InMemoryHistoryStore::new());
    let protocol = fixtures::seed_local_protocol(store.as_ref()).await;
    let engine = Engine::new(
        EngineConfig::default(),
        store.clone(),
        history.clone(),
        Arc::new(fixtures::remote_protocol()),
    );
    World {
        store,
        history,
        engine,
        protocol,
    }
}

impl World {
    async fn resolve(&self, options: ResolveOptions) -> anyhow::Result<Arc<Composite>> {
        let resolution = self
            .engine
            .resolve(&Reference::Local(self.protocol.clone()), DocumentKind::Protocol, options)
            .await?;
        Ok(resolution.composite)
    }

    async fn activity(&self) -> anyhow::Result<lde_document::LinkedDocument> {
        self.store
            .find_children(&self.protocol, DocumentKind::Activity)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("seeded protocol has no activity"))
    }

    /// Relabel the activity and publish `version`
    async fn relabel(&self, label: &str, version: &str) -> anyhow::Result<EditOutcome> {
        let activity = self.activity().await?;
        let mut content = activity.content.clone();
        content.insert("skos:prefLabel".into(), Value::String(label.to_string()));
        let delta = DeltaBuilder::new()
            .target_version(version.parse()?)
            .replace(activity.id, content)
            .build()?;
        Ok(self.engine.apply_delta(&self.protocol, &delta).await?)
    }
}

fn label_of(content: Option<&serde_json::Map<String, Value>>) -> Option<&str> {
    content?.get("skos:prefLabel")?.as_str()
}

#[tokio::test]
async fn resolution_is_idempotent() -> anyhow::Result<()> {
    let w = world().await;

    let first = w.resolve(ResolveOptions::default()).await?;
    let cached = w.resolve(ResolveOptions::default()).await?;
    let rebuilt = w.resolve(ResolveOptions::refresh()).await?;

    let bytes = serde_json::to_vec(first.as_ref())?;
    assert_eq!(serde_json::to_vec(cached.as_ref())?, bytes);
    assert_eq!(serde_json::to_vec(rebuilt.as_ref())?, bytes);
    Ok(())
}

#[tokio::test]
async fn diff_then_merge_reproduces_an_edit() -> anyhow::Result<()> {
    let w = world().await;
    let before = w.resolve(ResolveOptions::default()).await?;

    let outcome = w.relabel("Sleep diary", "0.2.0").await?;
    let after = outcome.composite;

    let patch = diff(&before, &after);
    assert!(!patch.is_empty());
    assert_eq!(merge_update(&before, &patch), *after);
    assert!(diff(&after, &after).is_empty());

    let changes = w.engine.changes_since(&w.protocol, &"0.1.0".parse()?, None).await?;
    assert_eq!(changes.current_version, Some("0.2.0".parse()?));
    let activity = w.activity().await?;
    assert_eq!(
        changes.of_kind(DocumentKind::Activity).map(|c| c.updated.clone()),
        Some(vec![activity.identifier])
    );
    assert_eq!(merge_update(&before, &changes.patch), *after);

    let nothing = w.engine.changes_since(&w.protocol, &"0.2.1".parse()?, None).await?;
    assert!(nothing.is_empty());
    Ok(())
}

#[tokio::test]
async fn history_versions_never_decrease() -> anyhow::Result<()> {
    let w = world().await;
    w.relabel("Sleep 2", "0.2.0").await?;
    w.relabel("Sleep 3", "0.3.0").await?;
    w.relabel("Sleep 4", "0.4.0").await?;

    let entries = w.history.references(&w.protocol).await?;
    assert!(!entries.is_empty());
    for entry in entries {
        let versions: Vec<&Version> = entry.history.iter().map(|s| &s.version).collect();
        assert!(
            versions.windows(2).all(|pair| pair[0] <= pair[1]),
            "{}: {versions:?}",
            entry.identifier
        );
    }

    let stale = DeltaBuilder::new()
        .target_version("0.3.5".parse()?)
        .description("older than the current version")
        .build()?;
    let rejected = w.engine.apply_delta(&w.protocol, &stale).await;
    assert!(matches!(rejected, Err(EngineError::VersionConflict { .. })));
    Ok(())
}

#[tokio::test]
async fn every_published_version_stays_resolvable() -> anyhow::Result<()> {
    let w = world().await;
    let identifier = w.activity().await?.identifier;
    w.relabel("Sleep 2", "0.2.0").await?;
    w.relabel("Sleep 3", "0.3.0").await?;

    let expected = [("0.1.0", "Sleep"), ("0.1.5", "Sleep 2"), ("0.2.0", "Sleep 2"), ("0.3.0", "Sleep 3")];
    for (version, label) in expected {
        let content = w
            .engine
            .content_at_version(&w.protocol, &identifier, &version.parse()?)
            .await?;
        assert_eq!(label_of(content.content()), Some(label), "at {version}");
    }

    let published: Vec<Version> = w
        .engine
        .protocol_versions(&w.protocol)
        .await?
        .into_iter()
        .map(|(version, _)| version)
        .collect();
    assert_eq!(published, vec!["0.3.0".parse()?, "0.2.0".parse()?, "0.1.0".parse()?]);

    for version in &published {
        let composite = w.engine.protocol_at_version(&w.protocol, version).await?;
        assert_eq!(composite.activities.len(), 1);
    }
    Ok(())
}

#[tokio::test]
async fn duplicates_are_closed_and_independent() -> anyhow::Result<()> {
    let w = world().await;
    let source = w.resolve(ResolveOptions::default()).await?;

    let copy = w.engine.duplicate(&w.protocol, Some("Copy of local")).await?;
    assert_ne!(copy, w.protocol);
    let duplicated = w
        .engine
        .resolve(&Reference::Local(copy.clone()), DocumentKind::Protocol, ResolveOptions::default())
        .await?
        .composite;
    assert_eq!(duplicated.node_count(), source.node_count());

    let copied_activity = w
        .store
        .find_children(&copy, DocumentKind::Activity)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("copy has no activity"))?;
    let original_activity = w.activity().await?;
    assert_ne!(copied_activity.id, original_activity.id);
    assert_ne!(copied_activity.identifier, original_activity.identifier);
    assert_eq!(copied_activity.duplicate_of, Some(original_activity.id));
    assert!(copied_activity.locator.is_none());

    let screens = w.store.find_children(&copied_activity.id, DocumentKind::Screen).await?;
    assert_eq!(screens.len(), 2);
    for screen in screens {
        assert_eq!(screen.parent_id.as_ref(), Some(&copied_activity.id));
        assert!(screen.duplicate_of.is_some());
    }

    // Editing the source leaves the copy untouched
    w.relabel("Edited source", "0.2.0").await?;
    let copy_again = w
        .engine
        .resolve(&Reference::Local(copy), DocumentKind::Protocol, ResolveOptions::refresh())
        .await?
        .composite;
    assert_eq!(copy_again, duplicated);
    Ok(())
}
