//! Engine configuration
//!
//! Every field has a default, so an empty TOML document is a valid config:
//!
//! ```toml
//! fetch_timeout_ms = 5000
//! max_depth = 8
//! default_language = "fr"
//!
//! [expand]
//! delanguage = ["schema:version", "reprolib:terms/inputType"]
//! keep_undefined = false
//! ```

use lde_expand::ExpandOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Errors loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for [`EngineConfig`]
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on each external dereference
    pub fetch_timeout_ms: u64,
    /// Maximum nesting below the resolved root
    pub max_depth: usize,
    /// Background warm-up workers
    pub warmup_workers: usize,
    /// Pending warm-up jobs before new ones are dropped
    pub warmup_queue: usize,
    /// Language tag for labels the engine writes
    pub default_language: String,
    /// Term expander options
    pub expand: ExpandOptions,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] on invalid TOML or mistyped fields
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load a TOML file
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Fetch timeout as a [`Duration`]
    #[inline]
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// With fetch timeout
    #[inline]
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With maximum depth
    #[inline]
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// With warm-up pool size
    #[inline]
    #[must_use]
    pub fn with_warmup(mut self, workers: usize, queue: usize) -> Self {
        self.warmup_workers = workers;
        self.warmup_queue = queue;
        self
    }

    /// With default language
    #[inline]
    #[must_use]
    pub fn with_default_language(mut self, tag: impl Into<String>) -> Self {
        self.default_language = tag.into();
        self
    }

    /// With expander options
    #[inline]
    #[must_use]
    pub fn with_expand(mut self, options: ExpandOptions) -> Self {
        self.expand = options;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 10_000,
            max_depth: 16,
            warmup_workers: 2,
            warmup_queue: 256,
            default_language: "en".to_string(),
            expand: ExpandOptions::default(),
        }
    }
}
