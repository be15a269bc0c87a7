// src/sync.rs
//! # Sync Engine
//! Incremental catch-up of one (location, term) pair against the search feed.
//!
//! The cursor is the newest `posted_at` already stored for the location, under
//! any term. Pages are read newest-first until a page reaches back to the
//! cursor, the feed runs out, or the page bound is hit. Each raw posting becomes an explicit
//! `SyncAction`; actions are only flushed after pagination completes, so an
//! aborted sync never advances the cursor past a gap.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::SyncError;
use crate::posting::{Posting, RawPosting};
use crate::report::{PassEvent, Reporter};
use crate::retry::RetryPolicy;
use crate::search::{SearchAdapter, SearchPage};
use crate::store::{PostingStore, UpsertOutcome};

/// What to do with the first posting ever seen for a location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedPolicy {
    /// Store the seed as processed and not matching; it is never mailed.
    #[default]
    Suppress,
    /// Treat the seed like any other new posting.
    Classify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub retry: RetryPolicy,
    pub seed_policy: SeedPolicy,
    /// Upper bound on pages read per sync.
    pub max_pages: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            seed_policy: SeedPolicy::default(),
            max_pages: 40,
        }
    }
}

/// Per-posting decision made while paging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    Insert(Posting),
    AppendLocation(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub location: String,
    pub term: String,
    pub pages_fetched: usize,
    pub inserted: usize,
    pub locations_added: usize,
    pub seeded: bool,
}

pub struct SyncEngine {
    store: Arc<dyn PostingStore>,
    search: Arc<dyn SearchAdapter>,
    reporter: Arc<dyn Reporter>,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn PostingStore>,
        search: Arc<dyn SearchAdapter>,
        reporter: Arc<dyn Reporter>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            search,
            reporter,
            settings,
        }
    }

    /// Sync one location for one term.
    pub async fn sync_location(&self, location: &str, term: &str) -> Result<SyncOutcome, SyncError> {
        let cursor = self
            .store
            .latest_posted_at(location)
            .await
            .map_err(|source| SyncError::Persistence {
                location: location.to_string(),
                source,
            })?;

        let mut outcome = SyncOutcome {
            location: location.to_string(),
            term: term.to_string(),
            ..SyncOutcome::default()
        };

        let actions = match cursor {
            None => self.collect_seed(location, term, &mut outcome).await?,
            Some(cursor) => self.collect_since(location, term, cursor, &mut outcome).await?,
        };

        self.flush(location, actions, &mut outcome).await?;

        self.reporter.report(PassEvent::LocationSynced {
            location: location.to_string(),
            term: term.to_string(),
            pages: outcome.pages_fetched,
            inserted: outcome.inserted,
            locations_added: outcome.locations_added,
        });
        Ok(outcome)
    }

    async fn fetch(&self, location: &str, term: &str, offset: usize) -> Result<SearchPage, SyncError> {
        let what = format!("{} page {offset} for '{term}' in {location}", self.search.name());
        let page = self
            .settings
            .retry
            .run(&what, self.reporter.as_ref(), || {
                self.search.fetch_page(term, location, offset)
            })
            .await
            .map_err(|(source, attempts)| SyncError::Fetch {
                location: location.to_string(),
                term: term.to_string(),
                attempts,
                source,
            })?;
        self.reporter.report(PassEvent::PageFetched {
            location: location.to_string(),
            term: term.to_string(),
            offset,
            results: page.results.len(),
        });
        Ok(page)
    }

    /// First sync for this pair: only the newest posting of the first page.
    async fn collect_seed(
        &self,
        location: &str,
        term: &str,
        outcome: &mut SyncOutcome,
    ) -> Result<Vec<SyncAction>, SyncError> {
        let page = self.fetch(location, term, 0).await?;
        outcome.pages_fetched = 1;

        let Some(newest) = page.results.into_iter().max_by_key(|r| r.posted_at) else {
            self.reporter.report(PassEvent::EmptyFeed {
                location: location.to_string(),
                term: term.to_string(),
            });
            return Ok(Vec::new());
        };
        outcome.seeded = true;

        if self.is_known(location, &newest.id).await? {
            return Ok(vec![SyncAction::AppendLocation(newest.id)]);
        }
        let now = Utc::now();
        let seed = match self.settings.seed_policy {
            SeedPolicy::Suppress => Posting::suppressed_seed(newest, location, term, now),
            SeedPolicy::Classify => Posting::discovered(newest, location, term, now),
        };
        Ok(vec![SyncAction::Insert(seed)])
    }

    /// Page forward until the feed's descending order guarantees nothing
    /// newer than `cursor` remains.
    async fn collect_since(
        &self,
        location: &str,
        term: &str,
        cursor: DateTime<Utc>,
        outcome: &mut SyncOutcome,
    ) -> Result<Vec<SyncAction>, SyncError> {
        let page_size = self.search.page_size().max(1);
        let mut actions = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut offset = 0usize;

        loop {
            let page = self.fetch(location, term, offset).await?;
            outcome.pages_fetched += 1;

            if page.results.is_empty() {
                if outcome.pages_fetched == 1 {
                    self.reporter.report(PassEvent::EmptyFeed {
                        location: location.to_string(),
                        term: term.to_string(),
                    });
                }
                break;
            }

            let full_page = page.results.len() >= page_size;
            let oldest = page.results.iter().map(|r| r.posted_at).min();

            for raw in page.results {
                if !seen.insert(raw.id.clone()) {
                    continue;
                }
                actions.push(self.classify_raw(raw, location, term).await?);
            }

            offset += page_size;
            let more_available = offset < page.total && full_page;
            let may_hold_newer = oldest.is_some_and(|oldest| oldest > cursor);
            let within_bound = outcome.pages_fetched < self.settings.max_pages;
            if !(more_available && may_hold_newer && within_bound) {
                break;
            }
        }

        Ok(actions)
    }

    async fn classify_raw(
        &self,
        raw: RawPosting,
        location: &str,
        term: &str,
    ) -> Result<SyncAction, SyncError> {
        if self.is_known(location, &raw.id).await? {
            Ok(SyncAction::AppendLocation(raw.id))
        } else {
            Ok(SyncAction::Insert(Posting::discovered(raw, location, term, Utc::now())))
        }
    }

    async fn is_known(&self, location: &str, id: &str) -> Result<bool, SyncError> {
        self.store
            .get(id)
            .await
            .map(|p| p.is_some())
            .map_err(|source| SyncError::Persistence {
                location: location.to_string(),
                source,
            })
    }

    /// Inserts go as one batch; ids another sync stored in the meantime fall
    /// back to a location append.
    async fn flush(
        &self,
        location: &str,
        actions: Vec<SyncAction>,
        outcome: &mut SyncOutcome,
    ) -> Result<(), SyncError> {
        let persistence = |source| SyncError::Persistence {
            location: location.to_string(),
            source,
        };

        let mut inserts = Vec::new();
        let mut appends = Vec::new();
        for action in actions {
            match action {
                SyncAction::Insert(p) => inserts.push(p),
                SyncAction::AppendLocation(id) => appends.push(id),
            }
        }

        if !inserts.is_empty() {
            let ids: Vec<String> = inserts.iter().map(|p| p.id.clone()).collect();
            let results = self.store.insert_batch(inserts).await.map_err(persistence)?;
            for (id, result) in ids.into_iter().zip(results) {
                match result {
                    UpsertOutcome::Inserted => outcome.inserted += 1,
                    UpsertOutcome::AlreadyPresent => appends.push(id),
                }
            }
        }

        for id in appends {
            if self
                .store
                .append_location(&id, location)
                .await
                .map_err(persistence)?
            {
                outcome.locations_added += 1;
            }
        }
        Ok(())
    }
}
