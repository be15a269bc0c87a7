// src/pipeline.rs
//! One pass: sync every (term, location) pair, enrich, then dispatch once.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::enrich::{EnrichOutcome, Enricher};
use crate::error::{DispatchError, StoreError, SyncError};
use crate::notify::{DispatchOutcome, Dispatcher};
use crate::report::{PassEvent, Reporter};
use crate::sync::{SyncEngine, SyncOutcome};

/// Everything a pass produced. Scoped failures are collected here rather than
/// aborting the pass.
#[derive(Debug)]
pub struct PassReport {
    pub synced: Vec<SyncOutcome>,
    pub sync_failures: Vec<SyncError>,
    pub enrich: Result<EnrichOutcome, StoreError>,
    pub dispatch: Result<DispatchOutcome, DispatchError>,
}

impl PassReport {
    /// True when state may now disagree with what was mailed, or a store
    /// write failed. The binary turns this into a non-zero exit.
    pub fn needs_attention(&self) -> bool {
        let sync_persistence = self
            .sync_failures
            .iter()
            .any(|e| matches!(e, SyncError::Persistence { .. }));
        let enrich_persistence = match &self.enrich {
            Err(_) => true,
            Ok(o) => o
                .failed
                .iter()
                .any(|e| matches!(e, crate::error::EnrichError::Persistence { .. })),
        };
        let post_delivery = matches!(self.dispatch, Err(DispatchError::PostDelivery { .. }));
        sync_persistence || enrich_persistence || post_delivery
    }
}

pub struct Pipeline {
    sync: Arc<SyncEngine>,
    enricher: Enricher,
    dispatcher: Dispatcher,
    reporter: Arc<dyn Reporter>,
    sync_concurrency: usize,
}

impl Pipeline {
    pub fn new(
        sync: SyncEngine,
        enricher: Enricher,
        dispatcher: Dispatcher,
        reporter: Arc<dyn Reporter>,
        sync_concurrency: usize,
    ) -> Self {
        Self {
            sync: Arc::new(sync),
            enricher,
            dispatcher,
            reporter,
            sync_concurrency: sync_concurrency.max(1),
        }
    }

    pub async fn run_pass(&self, terms: &[String], locations: &[String]) -> PassReport {
        let (synced, sync_failures) = self.sync_all(terms, locations).await;
        let enrich = self.enricher.run().await;
        if let Err(e) = &enrich {
            tracing::error!(target: "enrich", error = %e, "could not list unprocessed postings");
        }
        let dispatch = self.dispatcher.dispatch().await;
        PassReport {
            synced,
            sync_failures,
            enrich,
            dispatch,
        }
    }

    async fn sync_all(
        &self,
        terms: &[String],
        locations: &[String],
    ) -> (Vec<SyncOutcome>, Vec<SyncError>) {
        let permits = Arc::new(Semaphore::new(self.sync_concurrency));
        let mut tasks = JoinSet::new();
        for term in terms {
            for location in locations {
                let engine = Arc::clone(&self.sync);
                let permits = Arc::clone(&permits);
                let (term, location) = (term.clone(), location.clone());
                tasks.spawn(async move {
                    let _permit = permits.acquire_owned().await;
                    let result = engine.sync_location(&location, &term).await;
                    (location, term, result)
                });
            }
        }

        let mut synced = Vec::new();
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, _, Ok(outcome))) => synced.push(outcome),
                Ok((location, term, Err(e))) => {
                    self.reporter.report(PassEvent::LocationFailed {
                        location,
                        term,
                        error: e.to_string(),
                    });
                    failures.push(e);
                }
                Err(join_err) => {
                    tracing::error!(target: "sync", error = %join_err, "sync task panicked");
                }
            }
        }
        (synced, failures)
    }
}
