// src/report.rs
//! Reporting capability handed to every pipeline component.
//!
//! Components never log through a global; they emit `PassEvent`s to the
//! `Reporter` they were given. `TracingReporter` forwards to `tracing`,
//! `MemoryReporter` keeps events for assertions.

use std::sync::Mutex;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassEvent {
    PageFetched {
        location: String,
        term: String,
        offset: usize,
        results: usize,
    },
    FetchRetry {
        what: String,
        attempt: u32,
        error: String,
    },
    EmptyFeed {
        location: String,
        term: String,
    },
    LocationSynced {
        location: String,
        term: String,
        pages: usize,
        inserted: usize,
        locations_added: usize,
    },
    LocationFailed {
        location: String,
        term: String,
        error: String,
    },
    PostingProcessed {
        id: String,
        matched: bool,
    },
    PostingFailed {
        id: String,
        error: String,
    },
    NothingToSend,
    BatchSent {
        count: usize,
    },
    DispatchFailed {
        error: String,
    },
    /// Mail went out but the batch is not marked; next pass may resend.
    DuplicateRisk {
        ids: Vec<String>,
        error: String,
    },
}

pub trait Reporter: Send + Sync {
    fn report(&self, event: PassEvent);
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sync_pages_fetched_total", "Search pages fetched.");
        describe_counter!("sync_postings_inserted_total", "New postings stored by sync.");
        describe_counter!(
            "sync_locations_added_total",
            "Locations unioned into known postings."
        );
        describe_counter!("sync_failures_total", "Location syncs aborted.");
        describe_counter!("enrich_processed_total", "Postings classified.");
        describe_counter!("enrich_matched_total", "Postings that matched the filter.");
        describe_counter!("enrich_failures_total", "Postings left unprocessed after an error.");
        describe_counter!("notify_batches_sent_total", "Notification batches delivered.");
        describe_counter!("notify_postings_sent_total", "Postings included in delivered batches.");
    });
}

/// Logs through `tracing` and bumps the pipeline counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: PassEvent) {
        ensure_metrics_described();
        match event {
            PassEvent::PageFetched {
                location,
                term,
                offset,
                results,
            } => {
                counter!("sync_pages_fetched_total").increment(1);
                tracing::debug!(target: "sync", %location, %term, offset, results, "page fetched");
            }
            PassEvent::FetchRetry {
                what,
                attempt,
                error,
            } => {
                tracing::warn!(%what, attempt, %error, "retrying fetch");
            }
            PassEvent::EmptyFeed { location, term } => {
                tracing::debug!(target: "sync", %location, %term, "feed returned no postings");
            }
            PassEvent::LocationSynced {
                location,
                term,
                pages,
                inserted,
                locations_added,
            } => {
                counter!("sync_postings_inserted_total").increment(inserted as u64);
                counter!("sync_locations_added_total").increment(locations_added as u64);
                tracing::info!(
                    target: "sync",
                    %location,
                    %term,
                    pages,
                    inserted,
                    locations_added,
                    "location synced"
                );
            }
            PassEvent::LocationFailed {
                location,
                term,
                error,
            } => {
                counter!("sync_failures_total").increment(1);
                tracing::error!(target: "sync", %location, %term, %error, "location sync aborted");
            }
            PassEvent::PostingProcessed { id, matched } => {
                counter!("enrich_processed_total").increment(1);
                if matched {
                    counter!("enrich_matched_total").increment(1);
                }
                tracing::debug!(target: "enrich", %id, matched, "posting classified");
            }
            PassEvent::PostingFailed { id, error } => {
                counter!("enrich_failures_total").increment(1);
                tracing::warn!(target: "enrich", %id, %error, "posting left for next pass");
            }
            PassEvent::NothingToSend => {
                tracing::info!(target: "notify", "no new matches to send");
            }
            PassEvent::BatchSent { count } => {
                counter!("notify_batches_sent_total").increment(1);
                counter!("notify_postings_sent_total").increment(count as u64);
                tracing::info!(target: "notify", count, "notification batch delivered");
            }
            PassEvent::DispatchFailed { error } => {
                tracing::error!(target: "notify", %error, "notification batch not delivered");
            }
            PassEvent::DuplicateRisk { ids, error } => {
                tracing::error!(
                    target: "notify",
                    ?ids,
                    %error,
                    "mail sent but postings not marked notified; they will be mailed again"
                );
            }
        }
    }
}

/// Keeps every event in order.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<PassEvent>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PassEvent> {
        self.events.lock().expect("reporter mutex poisoned").clone()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, event: PassEvent) {
        self.events
            .lock()
            .expect("reporter mutex poisoned")
            .push(event);
    }
}
