// src/search/mod.rs
//! Paginated search feed capability.
//!
//! Adapters only fetch and parse. Dedup, cursors and retry policy all live in
//! the sync engine.

pub mod json_feed;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::posting::RawPosting;

pub use json_feed::JsonFeedAdapter;

/// One page of results, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    pub results: Vec<RawPosting>,
    /// Total results the provider claims to have for the query.
    pub total: usize,
}

#[async_trait]
pub trait SearchAdapter: Send + Sync {
    /// Fetch the page starting at `offset` for `term` in `location`.
    async fn fetch_page(
        &self,
        term: &str,
        location: &str,
        offset: usize,
    ) -> Result<SearchPage, FetchError>;

    /// Results requested per page; a shorter page is the last one.
    fn page_size(&self) -> usize;

    fn name(&self) -> &'static str;
}
