// src/store/memory.rs
use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PostingStore, StoreResult, UpsertOutcome};
use crate::error::StoreError;
use crate::posting::{Posting, PostingQuery};

/// Plain in-memory table; both store backends are built on it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostingTable {
    postings: BTreeMap<String, Posting>,
}

impl PostingTable {
    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Posting> {
        self.postings.values()
    }

    pub fn get(&self, id: &str) -> Option<&Posting> {
        self.postings.get(id)
    }

    pub fn upsert_if_absent(&mut self, posting: Posting) -> UpsertOutcome {
        if self.postings.contains_key(&posting.id) {
            return UpsertOutcome::AlreadyPresent;
        }
        self.postings.insert(posting.id.clone(), posting);
        UpsertOutcome::Inserted
    }

    pub fn append_location(&mut self, id: &str, location: &str) -> StoreResult<bool> {
        let p = self
            .postings
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(p.add_location(location))
    }

    /// Any search term counts: a posting first found by another term still
    /// bounds this location's feed.
    pub fn latest_posted_at(&self, location: &str) -> Option<DateTime<Utc>> {
        self.postings
            .values()
            .filter(|p| p.search_locations.contains(location))
            .map(|p| p.posted_at)
            .max()
    }

    pub fn find_by_flags(&self, query: PostingQuery) -> Vec<Posting> {
        self.postings
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect()
    }

    pub fn set_processed(&mut self, id: &str, matched: bool) -> StoreResult<bool> {
        let p = self
            .postings
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(p.record_classification(matched))
    }

    /// Unknown or ineligible ids are skipped, never an error.
    pub fn mark_notified(&mut self, ids: &[String]) -> usize {
        let mut n = 0;
        for id in ids {
            if let Some(p) = self.postings.get_mut(id) {
                if p.record_notified() {
                    n += 1;
                }
            }
        }
        n
    }
}

/// Process-local store. Used in tests and for dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: Mutex<PostingTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(table: PostingTable) -> Self {
        Self {
            table: Mutex::new(table),
        }
    }

    pub fn snapshot(&self) -> PostingTable {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PostingTable> {
        self.table.lock().expect("posting table mutex poisoned")
    }
}

#[async_trait]
impl PostingStore for MemoryStore {
    async fn get(&self, id: &str) -> StoreResult<Option<Posting>> {
        Ok(self.lock().get(id).cloned())
    }

    async fn upsert_if_absent(&self, posting: Posting) -> StoreResult<UpsertOutcome> {
        Ok(self.lock().upsert_if_absent(posting))
    }

    async fn insert_batch(&self, postings: Vec<Posting>) -> StoreResult<Vec<UpsertOutcome>> {
        let mut table = self.lock();
        Ok(postings
            .into_iter()
            .map(|p| table.upsert_if_absent(p))
            .collect())
    }

    async fn append_location(&self, id: &str, location: &str) -> StoreResult<bool> {
        self.lock().append_location(id, location)
    }

    async fn latest_posted_at(&self, location: &str) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.lock().latest_posted_at(location))
    }

    async fn find_by_flags(&self, query: PostingQuery) -> StoreResult<Vec<Posting>> {
        Ok(self.lock().find_by_flags(query))
    }

    async fn set_processed(&self, id: &str, matched: bool) -> StoreResult<bool> {
        self.lock().set_processed(id, matched)
    }

    async fn mark_notified(&self, ids: &[String]) -> StoreResult<usize> {
        Ok(self.lock().mark_notified(ids))
    }
}
