//! Mock resource bundle fetcher for testing.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::{BundleFetcher, EngineError};

/// Mock implementation of the BundleFetcher trait.
///
/// Serves `asset:<url>` for every URL and records what was fetched. URLs
/// registered with [`fail_url`](Self::fail_url) fail with
/// [`EngineError::BundleFetch`].
#[derive(Debug, Clone, Default)]
pub struct MockBundleFetcher {
    fetched: Arc<RwLock<Vec<String>>>,
    failing: Arc<RwLock<HashSet<String>>>,
}

impl MockBundleFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_url(&self, url: &str) {
        self.failing.write().await.insert(url.to_string());
    }

    /// URLs requested so far, in order.
    pub async fn fetched_urls(&self) -> Vec<String> {
        self.fetched.read().await.clone()
    }
}

#[async_trait]
impl BundleFetcher for MockBundleFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, EngineError> {
        self.fetched.write().await.push(url.to_string());

        if self.failing.read().await.contains(url) {
            return Err(EngineError::BundleFetch {
                url: url.to_string(),
                reason: "HTTP 404 Not Found".to_string(),
            });
        }
        Ok(Bytes::from(format!("asset:{url}")))
    }
}
