// src/search/json_feed.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use super::{SearchAdapter, SearchPage};
use crate::error::FetchError;
use crate::posting::RawPosting;

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    results: Vec<FeedItem>,
    #[serde(rename = "totalResults", default)]
    total_results: usize,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    jobkey: String,
    jobtitle: String,
    url: String,
    date: String,
}

/// Date-sorted JSON job search API (`results[]` + `totalResults`).
pub struct JsonFeedAdapter {
    endpoint: String,
    api_key: Option<String>,
    page_size: usize,
    client: Client,
    timeout: Duration,
}

impl JsonFeedAdapter {
    pub fn new(endpoint: impl Into<String>, page_size: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            page_size: page_size.max(1),
            client: Client::new(),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    fn parse(body: &str) -> Result<SearchPage, FetchError> {
        let rsp: FeedResponse =
            serde_json::from_str(body).map_err(|e| FetchError::Decode(format!("feed json: {e}")))?;
        let results = rsp
            .results
            .into_iter()
            .map(|it| {
                Ok(RawPosting {
                    posted_at: parse_feed_date(&it.date)?,
                    id: it.jobkey,
                    title: it.jobtitle,
                    url: it.url,
                })
            })
            .collect::<Result<Vec<_>, FetchError>>()?;
        Ok(SearchPage {
            results,
            total: rsp.total_results,
        })
    }
}

/// Feed dates are RFC 2822 ("Mon, 02 Oct 2017 14:05:11 GMT"); RFC 3339 is accepted too.
pub fn parse_feed_date(s: &str) -> Result<DateTime<Utc>, FetchError> {
    let s = s.trim();
    DateTime::parse_from_rfc2822(s)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FetchError::Decode(format!("bad date '{s}': {e}")))
}

#[async_trait]
impl SearchAdapter for JsonFeedAdapter {
    async fn fetch_page(
        &self,
        term: &str,
        location: &str,
        offset: usize,
    ) -> Result<SearchPage, FetchError> {
        let start = offset.to_string();
        let limit = self.page_size.to_string();
        let mut query: Vec<(&str, &str)> = vec![
            ("q", term),
            ("l", location),
            ("start", start.as_str()),
            ("limit", limit.as_str()),
            ("sort", "date"),
            ("format", "json"),
            ("v", "2"),
        ];
        if let Some(key) = &self.api_key {
            query.push(("publisher", key.as_str()));
        }

        let rsp = self
            .client
            .get(&self.endpoint)
            .query(&query)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(self.timeout)
                } else {
                    FetchError::from(e)
                }
            })?;

        let status = rsp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited(format!("{} returned 429", self.endpoint)));
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = rsp.text().await.map_err(FetchError::from)?;
        Self::parse(&body)
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn name(&self) -> &'static str {
        "json-feed"
    }
}
