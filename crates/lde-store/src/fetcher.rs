//! External locator fetcher
//!
//! [`LocatorFetcher`] is an HTTP-style GET returning a linked-data payload.
//! [`HttpFetcher`] implements it over `reqwest`.

use crate::error::FetchError;
use async_trait::async_trait;
use lde_document::Locator;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Default user agent sent by [`HttpFetcher`]
pub const USER_AGENT: &str = concat!("lde-engine/", env!("CARGO_PKG_VERSION"));

/// Source of external linked documents
#[async_trait]
pub trait LocatorFetcher: Send + Sync {
    /// Fetch the raw document at `locator`
    async fn fetch(&self, locator: &Locator) -> Result<Value, FetchError>;
}

/// [`LocatorFetcher`] over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher whose requests time out after `timeout`
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client, timeout }
    }

    /// Create a fetcher over an existing client
    #[must_use]
    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn map_error(&self, locator: &Locator, error: &reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout {
                locator: locator.clone(),
                after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            FetchError::Transport {
                locator: locator.clone(),
                reason: error.to_string(),
            }
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl LocatorFetcher for HttpFetcher {
    async fn fetch(&self, locator: &Locator) -> Result<Value, FetchError> {
        debug!(locator = %locator, "fetching linked document");

        let response = self
            .client
            .get(locator.as_str())
            .header(
                reqwest::header::ACCEPT,
                "application/ld+json, application/json;q=0.9",
            )
            .send()
            .await
            .map_err(|e| self.map_error(locator, &e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Err(FetchError::NotFound {
                locator: locator.clone(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Transport {
                locator: locator.clone(),
                reason: format!("HTTP {status}"),
            });
        }

        let value: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.map_error(locator, &e)
            } else {
                FetchError::Malformed {
                    locator: locator.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        if !value.is_object() {
            return Err(FetchError::Malformed {
                locator: locator.clone(),
                reason: "top level is not a JSON object".to_string(),
            });
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_names_crate_version() {
        assert!(USER_AGENT.starts_with("lde-engine/"));
    }

    #[tokio::test]
    async fn unreachable_host_is_transient() {
        let fetcher = HttpFetcher::new(Duration::from_millis(200));
        let locator = Locator::parse("http://127.0.0.1:9/p_schema").unwrap();
        let err = fetcher.fetch(&locator).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(err.locator(), &locator);
    }
}
