// tests/enrichment.rs
mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{item, FailingStore, FakeFetcher};
use top_of_the_pile::classify::{ClassifierProfile, ClassifierSet};
use top_of_the_pile::enrich::{EnrichSettings, Enricher};
use top_of_the_pile::error::{EnrichError, FetchError};
use top_of_the_pile::posting::{Lifecycle, Posting, PostingQuery};
use top_of_the_pile::report::{MemoryReporter, PassEvent};
use top_of_the_pile::retry::RetryPolicy;
use top_of_the_pile::store::{MemoryStore, PostingStore};

const TERM: &str = "machine learning";

fn settings() -> EnrichSettings {
    EnrichSettings {
        retry: RetryPolicy {
            max_attempts: 2,
            backoff: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        },
        concurrency: 2,
    }
}

fn classifiers() -> ClassifierSet {
    ClassifierSet::from_profiles(&[ClassifierProfile::machine_learning()]).unwrap()
}

async fn seed(store: &dyn PostingStore, ids: &[usize]) {
    for &i in ids {
        store
            .upsert_if_absent(Posting::discovered(item(i), "Remote", TERM, Utc::now()))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn one_failure_does_not_affect_the_others() {
    let store = Arc::new(MemoryStore::new());
    seed(store.as_ref(), &[1, 2, 3]).await;
    let fetcher = FakeFetcher::default()
        .body(&item(1).url, "<p>Python and SQL</p>")
        .fail(&item(2).url, FetchError::Status(500))
        .body(&item(3).url, "<p>Excel only</p>");
    let reporter = Arc::new(MemoryReporter::new());

    let out = Enricher::new(
        store.clone(),
        Arc::new(fetcher),
        classifiers(),
        reporter.clone(),
        settings(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(out.processed, 2);
    assert_eq!(out.matched, 1);
    assert_eq!(out.failed.len(), 1);
    assert!(matches!(&out.failed[0], EnrichError::Fetch { id, .. } if id == "job-002"));

    let lifecycle = |id: &str| {
        let store = store.clone();
        let id = id.to_string();
        async move { store.get(&id).await.unwrap().unwrap().lifecycle() }
    };
    assert_eq!(lifecycle("job-001").await, Lifecycle::Processed { matched: true });
    assert_eq!(lifecycle("job-002").await, Lifecycle::Discovered);
    assert_eq!(lifecycle("job-003").await, Lifecycle::Processed { matched: false });

    assert!(reporter
        .events()
        .iter()
        .any(|e| matches!(e, PassEvent::PostingFailed { id, .. } if id == "job-002")));
}

#[tokio::test]
async fn failed_posting_is_retried_next_pass() {
    let store = Arc::new(MemoryStore::new());
    seed(store.as_ref(), &[7]).await;
    let reporter = Arc::new(MemoryReporter::new());

    let broken = Enricher::new(
        store.clone(),
        Arc::new(FakeFetcher::default()),
        classifiers(),
        reporter.clone(),
        settings(),
    );
    assert_eq!(broken.run().await.unwrap().failed.len(), 1);

    let fixed = Enricher::new(
        store.clone(),
        Arc::new(FakeFetcher::default().body(&item(7).url, "python")),
        classifiers(),
        reporter,
        settings(),
    );
    let out = fixed.run().await.unwrap();
    assert_eq!(out.processed, 1);
    assert!(store
        .find_by_flags(PostingQuery::unprocessed())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn store_failure_is_scoped_to_its_posting() {
    let store = Arc::new(FailingStore {
        fail_set_processed_for: Some("job-001".into()),
        ..Default::default()
    });
    seed(store.as_ref(), &[1, 2]).await;
    let fetcher = FakeFetcher::default()
        .body(&item(1).url, "python")
        .body(&item(2).url, "python");

    let out = Enricher::new(
        store.clone(),
        Arc::new(fetcher),
        classifiers(),
        Arc::new(MemoryReporter::new()),
        settings(),
    )
    .run()
    .await
    .unwrap();
    assert_eq!(out.processed, 1);
    assert!(matches!(&out.failed[0], EnrichError::Persistence { id, .. } if id == "job-001"));
}

#[tokio::test]
async fn second_process_call_is_a_no_op() {
    let store = Arc::new(MemoryStore::new());
    seed(store.as_ref(), &[4]).await;
    let enricher = Enricher::new(
        store.clone(),
        Arc::new(FakeFetcher::default().body(&item(4).url, "python")),
        classifiers(),
        Arc::new(MemoryReporter::new()),
        settings(),
    );
    let posting = store.get("job-004").await.unwrap().unwrap();
    assert_eq!(enricher.process(posting.clone()).await.unwrap(), Some(true));
    assert_eq!(enricher.process(posting).await.unwrap(), None);
}
