// src/enrich.rs
//! Enrichment & classification of unprocessed postings.
//!
//! Each posting is an independent unit: fetch body, classify, persist the
//! outcome in one store call. A failed unit leaves its posting unprocessed for
//! the next pass and does not affect the others.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::classify::ClassifierSet;
use crate::error::{EnrichError, StoreError};
use crate::fetch::BodyFetcher;
use crate::posting::{Posting, PostingQuery};
use crate::report::{PassEvent, Reporter};
use crate::retry::RetryPolicy;
use crate::store::PostingStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichSettings {
    pub retry: RetryPolicy,
    pub concurrency: usize,
}

impl Default for EnrichSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            concurrency: 4,
        }
    }
}

#[derive(Debug, Default)]
pub struct EnrichOutcome {
    pub processed: usize,
    pub matched: usize,
    pub failed: Vec<EnrichError>,
}

#[derive(Clone)]
pub struct Enricher {
    store: Arc<dyn PostingStore>,
    fetcher: Arc<dyn BodyFetcher>,
    classifiers: ClassifierSet,
    reporter: Arc<dyn Reporter>,
    settings: EnrichSettings,
}

impl Enricher {
    pub fn new(
        store: Arc<dyn PostingStore>,
        fetcher: Arc<dyn BodyFetcher>,
        classifiers: ClassifierSet,
        reporter: Arc<dyn Reporter>,
        settings: EnrichSettings,
    ) -> Self {
        Self {
            store,
            fetcher,
            classifiers,
            reporter,
            settings,
        }
    }

    /// Process every posting with `body_fetched = false`.
    pub async fn run(&self) -> Result<EnrichOutcome, StoreError> {
        let pending = self.store.find_by_flags(PostingQuery::unprocessed()).await?;
        let total = pending.len();
        tracing::debug!(target: "enrich", total, "postings to process");

        let permits = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for posting in pending {
            let this = self.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let id = posting.id.clone();
                (id, this.process(posting).await)
            });
        }

        let mut outcome = EnrichOutcome::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(Some(matched)))) => {
                    outcome.processed += 1;
                    if matched {
                        outcome.matched += 1;
                    }
                }
                // Someone else processed it first.
                Ok((_, Ok(None))) => {}
                Ok((id, Err(e))) => {
                    self.reporter.report(PassEvent::PostingFailed {
                        id,
                        error: e.to_string(),
                    });
                    outcome.failed.push(e);
                }
                Err(join_err) => {
                    tracing::error!(target: "enrich", error = %join_err, "enrichment task panicked");
                }
            }
        }
        Ok(outcome)
    }

    /// Ok(Some(matched)) when this call moved the posting to processed.
    pub async fn process(&self, posting: Posting) -> Result<Option<bool>, EnrichError> {
        let what = format!("body of {}", posting.id);
        let body = self
            .settings
            .retry
            .run(&what, self.reporter.as_ref(), || {
                self.fetcher.fetch_body(&posting.url)
            })
            .await
            .map_err(|(source, _)| EnrichError::Fetch {
                id: posting.id.clone(),
                source,
            })?;

        let matched = self
            .classifiers
            .for_term(&posting.search_term)
            .matches(&posting.title, &body);

        let changed = self
            .store
            .set_processed(&posting.id, matched)
            .await
            .map_err(|source| EnrichError::Persistence {
                id: posting.id.clone(),
                source,
            })?;
        if !changed {
            return Ok(None);
        }
        self.reporter.report(PassEvent::PostingProcessed {
            id: posting.id,
            matched,
        });
        Ok(Some(matched))
    }
}
