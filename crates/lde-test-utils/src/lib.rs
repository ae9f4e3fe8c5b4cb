//! Testing utilities for the LDE workspace
//!
//! Shared fixtures, a scripted [`LocatorFetcher`] and tracing setup.

#![allow(missing_docs)]

pub mod fixtures;

use async_trait::async_trait;
use dashmap::DashMap;
use lde_document::Locator;
use lde_store::{FetchError, LocatorFetcher};
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static TRACING: OnceCell<()> = OnceCell::new();

/// Install a test-writer fmt subscriber filtered by `RUST_LOG` (default `warn`)
pub fn init_tracing() {
    TRACING.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

/// In-memory [`LocatorFetcher`] serving documents registered by URL
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    documents: DashMap<String, Value>,
    hits: DashMap<String, usize>,
    failing: AtomicBool,
    fetches: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `document` at `url`
    #[must_use]
    pub fn with_document(self, url: &str, document: Value) -> Self {
        self.insert(url, document);
        self
    }

    /// Sleep this long before answering
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn insert(&self, url: &str, document: Value) {
        self.documents.insert(url.to_string(), document);
    }

    pub fn remove(&self, url: &str) {
        self.documents.remove(url);
    }

    /// Make every fetch fail with a transport error
    pub fn fail_all(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Total fetches attempted
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Fetches attempted for one URL
    pub fn fetches_of(&self, url: &str) -> usize {
        self.hits.get(url).map_or(0, |n| *n)
    }
}

#[async_trait]
impl LocatorFetcher for ScriptedFetcher {
    async fn fetch(&self, locator: &Locator) -> Result<Value, FetchError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);
        *self.hits.entry(locator.as_str().to_string()).or_default() += 1;

        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::Transport {
                locator: locator.clone(),
                reason: "scripted failure".to_string(),
            });
        }
        self.documents
            .get(locator.as_str())
            .map(|doc| doc.value().clone())
            .ok_or_else(|| FetchError::NotFound {
                locator: locator.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_and_counts() {
        let fetcher = ScriptedFetcher::new().with_document("https://e.org/a", serde_json::json!({"a": 1}));
        let a = Locator::parse("https://e.org/a").unwrap();
        let b = Locator::parse("https://e.org/b").unwrap();

        assert_eq!(fetcher.fetch(&a).await.unwrap()["a"], 1);
        assert!(matches!(fetcher.fetch(&b).await, Err(FetchError::NotFound { .. })));
        fetcher.fail_all(true);
        assert!(fetcher.fetch(&a).await.unwrap_err().is_transient());

        assert_eq!(fetcher.fetch_count(), 3);
        assert_eq!(fetcher.fetches_of("https://e.org/a"), 2);
    }
}
