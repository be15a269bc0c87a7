// tests/common/mod.rs
// Shared fakes for the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use top_of_the_pile::error::{FetchError, MailError, StoreError};
use top_of_the_pile::fetch::BodyFetcher;
use top_of_the_pile::notify::{Mailer, Notification};
use top_of_the_pile::posting::{Posting, PostingQuery, RawPosting};
use top_of_the_pile::search::{SearchAdapter, SearchPage};
use top_of_the_pile::store::{MemoryStore, PostingStore, StoreResult, UpsertOutcome};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Item `i` of a feed; larger `i` is older.
pub fn item(i: usize) -> RawPosting {
    RawPosting {
        id: format!("job-{i:03}"),
        title: format!("Machine Learning Engineer {i}"),
        url: format!("https://jobs.example/view?jk=job-{i:03}"),
        posted_at: base_time() - Duration::minutes(i as i64),
    }
}

pub fn feed(n: usize) -> Vec<RawPosting> {
    (0..n).map(item).collect()
}

/// Paged in-memory feed, newest first. Scripted failures are served before
/// any page; `fail_from_offset` fails every request at or past that offset.
pub struct FakeFeed {
    items: Vec<RawPosting>,
    page_size: usize,
    failures: Mutex<VecDeque<FetchError>>,
    fail_from_offset: Option<(usize, FetchError)>,
    calls: AtomicUsize,
}

impl FakeFeed {
    pub fn new(items: Vec<RawPosting>, page_size: usize) -> Self {
        Self {
            items,
            page_size,
            failures: Mutex::new(VecDeque::new()),
            fail_from_offset: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_first(self, errors: Vec<FetchError>) -> Self {
        *self.failures.lock().unwrap() = errors.into();
        self
    }

    pub fn failing_from(mut self, offset: usize, error: FetchError) -> Self {
        self.fail_from_offset = Some((offset, error));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchAdapter for FakeFeed {
    async fn fetch_page(
        &self,
        _term: &str,
        _location: &str,
        offset: usize,
    ) -> Result<SearchPage, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.failures.lock().unwrap().pop_front() {
            return Err(e);
        }
        if let Some((from, e)) = &self.fail_from_offset {
            if offset >= *from {
                return Err(e.clone());
            }
        }
        let results = self
            .items
            .iter()
            .skip(offset)
            .take(self.page_size)
            .cloned()
            .collect();
        Ok(SearchPage {
            results,
            total: self.items.len(),
        })
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Bodies keyed by url; unknown urls fail with a 404.
#[derive(Default)]
pub struct FakeFetcher {
    bodies: HashMap<String, String>,
    failing: HashMap<String, FetchError>,
}

impl FakeFetcher {
    pub fn body(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), body.to_string());
        self
    }

    pub fn fail(mut self, url: &str, error: FetchError) -> Self {
        self.failing.insert(url.to_string(), error);
        self
    }
}

#[async_trait]
impl BodyFetcher for FakeFetcher {
    async fn fetch_body(&self, url: &str) -> Result<String, FetchError> {
        if let Some(e) = self.failing.get(url) {
            return Err(e.clone());
        }
        self.bodies
            .get(url)
            .cloned()
            .ok_or(FetchError::Status(404))
    }
}

/// Records every accepted notification.
#[derive(Default)]
pub struct FakeMailer {
    sent: Mutex<Vec<(Notification, Vec<String>)>>,
    fail_with: Option<MailError>,
    /// Posting to classify as matched while the send is in flight.
    during_send: Option<(Arc<dyn PostingStore>, String)>,
}

impl FakeMailer {
    pub fn failing(error: MailError) -> Self {
        Self {
            fail_with: Some(error),
            ..Default::default()
        }
    }

    pub fn matching_during_send(mut self, store: Arc<dyn PostingStore>, id: &str) -> Self {
        self.during_send = Some((store, id.to_string()));
        self
    }

    pub fn sent(&self) -> Vec<(Notification, Vec<String>)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, notification: &Notification, recipients: &[String]) -> Result<(), MailError> {
        if let Some((store, id)) = &self.during_send {
            store.set_processed(id, true).await.unwrap();
        }
        if let Some(e) = &self.fail_with {
            return Err(e.clone());
        }
        self.sent
            .lock()
            .unwrap()
            .push((notification.clone(), recipients.to_vec()));
        Ok(())
    }
}

/// Wraps a `MemoryStore`; selected operations fail with an I/O error.
#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
    pub fail_mark_notified: bool,
    pub fail_set_processed_for: Option<String>,
}

fn io_failure() -> StoreError {
    StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
}

#[async_trait]
impl PostingStore for FailingStore {
    async fn get(&self, id: &str) -> StoreResult<Option<Posting>> {
        self.inner.get(id).await
    }

    async fn upsert_if_absent(&self, posting: Posting) -> StoreResult<UpsertOutcome> {
        self.inner.upsert_if_absent(posting).await
    }

    async fn append_location(&self, id: &str, location: &str) -> StoreResult<bool> {
        self.inner.append_location(id, location).await
    }

    async fn latest_posted_at(&self, location: &str) -> StoreResult<Option<DateTime<Utc>>> {
        self.inner.latest_posted_at(location).await
    }

    async fn find_by_flags(&self, query: PostingQuery) -> StoreResult<Vec<Posting>> {
        self.inner.find_by_flags(query).await
    }

    async fn set_processed(&self, id: &str, matched: bool) -> StoreResult<bool> {
        if self.fail_set_processed_for.as_deref() == Some(id) {
            return Err(io_failure());
        }
        self.inner.set_processed(id, matched).await
    }

    async fn mark_notified(&self, ids: &[String]) -> StoreResult<usize> {
        if self.fail_mark_notified {
            return Err(io_failure());
        }
        self.inner.mark_notified(ids).await
    }
}
