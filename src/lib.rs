// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod classify;
pub mod config;
pub mod error;
pub mod fetch;
pub mod locations;
pub mod posting;
pub mod report;
pub mod retry;
pub mod search;
pub mod store;

// Pass stages: sync -> enrich -> notify
pub mod enrich;
pub mod notify;
pub mod pipeline;
pub mod sync;

// ---- Re-exports for stable public API ----
pub use crate::classify::{Classifier, ClassifierProfile, ClassifierSet, KeywordClassifier};
pub use crate::config::AppConfig;
pub use crate::posting::{Lifecycle, Posting, PostingQuery, RawPosting};
pub use crate::report::{MemoryReporter, PassEvent, Reporter, TracingReporter};
pub use crate::store::{JsonFileStore, MemoryStore, PostingStore};
pub use crate::pipeline::{PassReport, Pipeline};
