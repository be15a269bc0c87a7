// src/error.rs
//! Error taxonomy for the discovery pipeline.
//!
//! Errors scoped to one location or one posting are contained by the pipeline
//! and reported; errors that threaten the at-most-once mail guarantee
//! (`DispatchError::PostDelivery`) are always surfaced.

use std::time::Duration;

use thiserror::Error;

/// Failure of an outbound fetch (search page or posting body).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Connection, DNS, TLS or body read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Provider asked us to slow down (HTTP 429).
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Non-success HTTP status other than 429.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The call did not finish within its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Response arrived but could not be understood.
    #[error("decode error: {0}")]
    Decode(String),
}

impl FetchError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(_) | FetchError::RateLimited(_) | FetchError::Timeout(_) => true,
            FetchError::Status(code) => *code >= 500,
            FetchError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            if status.as_u16() == 429 {
                return FetchError::RateLimited(e.to_string());
            }
            return FetchError::Status(status.as_u16());
        }
        if e.is_decode() {
            return FetchError::Decode(e.to_string());
        }
        FetchError::Transport(e.to_string())
    }
}

/// Posting store failure.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("posting {0} not found")]
    NotFound(String),
}

/// Sync of one (location, term) pair failed; nothing from it was persisted
/// unless the variant is `Persistence`.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("fetching '{term}' in {location} failed after {attempts} attempt(s): {source}")]
    Fetch {
        location: String,
        term: String,
        attempts: u32,
        #[source]
        source: FetchError,
    },

    #[error("persisting sync results for {location}: {source}")]
    Persistence {
        location: String,
        #[source]
        source: StoreError,
    },
}

/// Enrichment of a single posting failed; the posting stays unprocessed.
#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("fetching body of {id} failed: {source}")]
    Fetch {
        id: String,
        #[source]
        source: FetchError,
    },

    #[error("recording classification of {id} failed: {source}")]
    Persistence {
        id: String,
        #[source]
        source: StoreError,
    },
}

/// Mail transport failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MailError {
    #[error("invalid mailbox '{address}': {message}")]
    Address { address: String, message: String },

    #[error("building message: {0}")]
    Build(String),

    #[error("SMTP transport: {0}")]
    Transport(String),

    #[error("mail send timed out after {0:?}")]
    Timeout(Duration),
}

/// Notification dispatch failure.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Could not read the pending batch; nothing was sent.
    #[error("querying pending notifications: {0}")]
    Query(#[source] StoreError),

    /// Mail was not delivered; nothing was marked, the batch is retried next pass.
    #[error("delivering notification batch: {0}")]
    Delivery(#[source] MailError),

    /// Mail WAS delivered but the batch could not be marked notified.
    /// The next pass would mail these postings again.
    #[error("mail delivered but marking {} posting(s) notified failed: {source}", .ids.len())]
    PostDelivery {
        ids: Vec<String>,
        #[source]
        source: StoreError,
    },
}
