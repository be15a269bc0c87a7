// src/store/mod.rs
//! Posting store contract.
//!
//! The store is the single source of truth. Every mutation is narrow and
//! idempotent (insert-if-absent, set-union, conditional flag set) so retried
//! or overlapping passes converge.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::posting::{Posting, PostingQuery};

pub use file::JsonFileStore;
pub use memory::{MemoryStore, PostingTable};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// Id was already stored; nothing changed.
    AlreadyPresent,
}

#[async_trait]
pub trait PostingStore: Send + Sync {
    async fn get(&self, id: &str) -> StoreResult<Option<Posting>>;

    async fn upsert_if_absent(&self, posting: Posting) -> StoreResult<UpsertOutcome>;

    /// Insert a batch in one step. Outcomes are positional.
    async fn insert_batch(&self, postings: Vec<Posting>) -> StoreResult<Vec<UpsertOutcome>> {
        let mut out = Vec::with_capacity(postings.len());
        for p in postings {
            out.push(self.upsert_if_absent(p).await?);
        }
        Ok(out)
    }

    /// Union `location` into the posting's locations. Ok(false) if already present.
    async fn append_location(&self, id: &str, location: &str) -> StoreResult<bool>;

    /// Newest `posted_at` among postings seen in `location`, whatever term
    /// found them.
    async fn latest_posted_at(&self, location: &str) -> StoreResult<Option<DateTime<Utc>>>;

    async fn find_by_flags(&self, query: PostingQuery) -> StoreResult<Vec<Posting>>;

    /// Record the classifier outcome and `body_fetched` together.
    /// Ok(false) if the posting was already processed.
    async fn set_processed(&self, id: &str, matched: bool) -> StoreResult<bool>;

    /// Mark exactly `ids` notified, skipping any that are not awaiting
    /// notification. Returns how many changed.
    async fn mark_notified(&self, ids: &[String]) -> StoreResult<usize>;
}
