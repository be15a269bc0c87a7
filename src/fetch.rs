// src/fetch.rs
//! Posting body fetch capability.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::FetchError;

#[async_trait]
pub trait BodyFetcher: Send + Sync {
    async fn fetch_body(&self, url: &str) -> Result<String, FetchError>;
}

#[derive(Clone)]
pub struct HttpBodyFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpBodyFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            timeout: Duration::from_secs(20),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

impl Default for HttpBodyFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BodyFetcher for HttpBodyFetcher {
    async fn fetch_body(&self, url: &str) -> Result<String, FetchError> {
        let rsp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(self.timeout)
                } else {
                    FetchError::from(e)
                }
            })?
            .error_for_status()?;
        let bytes = rsp.bytes().await?;
        // Posting pages aren't always valid UTF-8; the classifier only needs text.
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
