// src/posting.rs
//! Posting data model and lifecycle.
//!
//! A `Posting` is created on first sighting, processed once by enrichment and
//! marked notified once after a confirmed delivery. The flag fields are private
//! to the crate so the only way to move a posting forward is through the
//! transition methods, which refuse illegal moves.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A posting as the search feed returns it, before any bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPosting {
    pub id: String,
    pub title: String,
    pub url: String,
    pub posted_at: DateTime<Utc>,
}

/// Where a posting sits in its lifecycle, derived from the stored flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Discovered,
    Processed { matched: bool },
    Notified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub id: String,
    pub title: String,
    pub url: String,
    pub posted_at: DateTime<Utc>,
    pub search_term: String,
    pub search_locations: BTreeSet<String>,
    pub discovered_at: DateTime<Utc>,
    pub(crate) body_fetched: bool,
    #[serde(default)]
    pub(crate) matches_filter: Option<bool>,
    pub(crate) notified: bool,
}

impl Posting {
    /// First sighting of `raw` in `location` while searching for `term`.
    pub fn discovered(raw: RawPosting, location: &str, term: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: raw.id,
            title: raw.title,
            url: raw.url,
            posted_at: raw.posted_at,
            search_term: term.to_string(),
            search_locations: BTreeSet::from([location.to_string()]),
            discovered_at: now,
            body_fetched: false,
            matches_filter: None,
            notified: false,
        }
    }

    /// A seed stored as already processed and not matching, so it is never mailed.
    pub fn suppressed_seed(raw: RawPosting, location: &str, term: &str, now: DateTime<Utc>) -> Self {
        let mut p = Self::discovered(raw, location, term, now);
        p.body_fetched = true;
        p.matches_filter = Some(false);
        p
    }

    pub fn body_fetched(&self) -> bool {
        self.body_fetched
    }

    pub fn matches_filter(&self) -> Option<bool> {
        self.matches_filter
    }

    pub fn notified(&self) -> bool {
        self.notified
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match (self.body_fetched, self.matches_filter, self.notified) {
            (_, _, true) => Lifecycle::Notified,
            (true, Some(matched), false) => Lifecycle::Processed { matched },
            _ => Lifecycle::Discovered,
        }
    }

    /// `notified ⇒ body_fetched ∧ matched` and `¬body_fetched ⇒ matches_filter = None`.
    pub fn invariants_hold(&self) -> bool {
        let unprocessed_ok = self.body_fetched || self.matches_filter.is_none();
        let processed_ok = !self.body_fetched || self.matches_filter.is_some();
        let notified_ok =
            !self.notified || (self.body_fetched && self.matches_filter == Some(true));
        unprocessed_ok && processed_ok && notified_ok
    }

    /// Adds `location`; returns false if it was already present.
    pub(crate) fn add_location(&mut self, location: &str) -> bool {
        if self.search_locations.contains(location) {
            return false;
        }
        self.search_locations.insert(location.to_string())
    }

    /// Records the classifier outcome. No-op (false) once processed.
    pub(crate) fn record_classification(&mut self, matched: bool) -> bool {
        if self.body_fetched {
            return false;
        }
        self.body_fetched = true;
        self.matches_filter = Some(matched);
        true
    }

    pub fn awaiting_notification(&self) -> bool {
        self.body_fetched && self.matches_filter == Some(true) && !self.notified
    }

    /// Marks delivered. Refused unless the posting is a processed match.
    pub(crate) fn record_notified(&mut self) -> bool {
        if !self.awaiting_notification() {
            return false;
        }
        self.notified = true;
        true
    }
}

/// Flag predicate for `find_by_flags`; `None` means "don't care".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostingQuery {
    pub body_fetched: Option<bool>,
    pub matches_filter: Option<bool>,
    pub notified: Option<bool>,
}

impl PostingQuery {
    pub fn unprocessed() -> Self {
        Self {
            body_fetched: Some(false),
            ..Self::default()
        }
    }

    pub fn pending_notification() -> Self {
        Self {
            body_fetched: Some(true),
            matches_filter: Some(true),
            notified: Some(false),
        }
    }

    pub fn matches(&self, p: &Posting) -> bool {
        self.body_fetched.map_or(true, |v| v == p.body_fetched)
            && self
                .matches_filter
                .map_or(true, |v| p.matches_filter == Some(v))
            && self.notified.map_or(true, |v| v == p.notified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw(id: &str) -> RawPosting {
        RawPosting {
            id: id.into(),
            title: "Data Scientist".into(),
            url: format!("https://jobs.example/{id}"),
            posted_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn discovered_posting_starts_clean() {
        let p = Posting::discovered(raw("a"), "Austin, TX", "machine learning", Utc::now());
        assert_eq!(p.lifecycle(), Lifecycle::Discovered);
        assert!(p.invariants_hold());
        assert!(!PostingQuery::pending_notification().matches(&p));
        assert!(PostingQuery::unprocessed().matches(&p));
    }

    #[test]
    fn notify_requires_processed_match() {
        let mut p = Posting::discovered(raw("a"), "Remote", "ml", Utc::now());
        assert!(!p.record_notified());

        assert!(p.record_classification(false));
        assert!(!p.record_notified());
        assert_eq!(p.lifecycle(), Lifecycle::Processed { matched: false });
    }

    #[test]
    fn classification_is_set_once() {
        let mut p = Posting::discovered(raw("a"), "Remote", "ml", Utc::now());
        assert!(p.record_classification(true));
        assert!(!p.record_classification(false));
        assert_eq!(p.matches_filter(), Some(true));
        assert!(p.record_notified());
        assert!(!p.record_notified());
        assert_eq!(p.lifecycle(), Lifecycle::Notified);
        assert!(p.invariants_hold());
    }

    #[test]
    fn suppressed_seed_is_never_pending() {
        let p = Posting::suppressed_seed(raw("s"), "Remote", "ml", Utc::now());
        assert!(p.invariants_hold());
        assert!(!PostingQuery::unprocessed().matches(&p));
        assert!(!PostingQuery::pending_notification().matches(&p));
    }

    #[test]
    fn add_location_is_idempotent() {
        let mut p = Posting::discovered(raw("a"), "Austin, TX", "ml", Utc::now());
        assert!(!p.add_location("Austin, TX"));
        assert!(p.add_location("Remote"));
        assert_eq!(p.search_locations.len(), 2);
    }
}
