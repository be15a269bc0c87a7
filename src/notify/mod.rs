// src/notify/mod.rs
//! Notification batching.
//!
//! All matched, unnotified postings go out in one message. Only after the
//! mailer confirms delivery is exactly that batch marked notified. The gap
//! between "sent" and "marked" cannot be closed across an SMTP server and a
//! store; a failure in it is reported as `DispatchError::PostDelivery` and
//! never retried automatically.

pub mod email;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{DispatchError, MailError};
use crate::posting::{Posting, PostingQuery};
use crate::report::{PassEvent, Reporter};
use crate::store::PostingStore;

pub use email::SmtpMailer;

/// A rendered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

impl Notification {
    pub fn for_postings(postings: &[Posting]) -> Self {
        let n = postings.len();
        let plural = if n == 1 { "" } else { "s" };
        let subject = format!("Top of the Pile: Found {n} Job{plural}");

        let links: Vec<String> = postings
            .iter()
            .map(|p| {
                format!(
                    r#"<a href="{}">{}</a>"#,
                    html_escape::encode_double_quoted_attribute(&p.url),
                    html_escape::encode_text(&p.title)
                )
            })
            .collect();
        let html_body = format!("<html><body>{}</body></html>", links.join("<br>\n"));

        let text_body = postings
            .iter()
            .map(|p| format!("{}\n  {}", p.title, p.url))
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            subject,
            html_body,
            text_body,
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Ok(()) only once the transport accepted the message.
    async fn send(&self, notification: &Notification, recipients: &[String]) -> Result<(), MailError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Nothing,
    Sent { count: usize },
}

pub struct Dispatcher {
    store: Arc<dyn PostingStore>,
    mailer: Arc<dyn Mailer>,
    reporter: Arc<dyn Reporter>,
    recipients: Vec<String>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn PostingStore>,
        mailer: Arc<dyn Mailer>,
        reporter: Arc<dyn Reporter>,
        recipients: Vec<String>,
    ) -> Self {
        Self {
            store,
            mailer,
            reporter,
            recipients,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Must not run concurrently with another dispatch over the same store.
    pub async fn dispatch(&self) -> Result<DispatchOutcome, DispatchError> {
        let batch = self
            .store
            .find_by_flags(PostingQuery::pending_notification())
            .await
            .map_err(DispatchError::Query)?;
        if batch.is_empty() {
            self.reporter.report(PassEvent::NothingToSend);
            return Ok(DispatchOutcome::Nothing);
        }

        let ids: Vec<String> = batch.iter().map(|p| p.id.clone()).collect();
        let notification = Notification::for_postings(&batch);

        let sent = match tokio::time::timeout(
            self.timeout,
            self.mailer.send(&notification, &self.recipients),
        )
        .await
        {
            Ok(r) => r,
            Err(_) => Err(MailError::Timeout(self.timeout)),
        };
        if let Err(e) = sent {
            self.reporter.report(PassEvent::DispatchFailed {
                error: e.to_string(),
            });
            return Err(DispatchError::Delivery(e));
        }

        if let Err(source) = self.store.mark_notified(&ids).await {
            self.reporter.report(PassEvent::DuplicateRisk {
                ids: ids.clone(),
                error: source.to_string(),
            });
            return Err(DispatchError::PostDelivery { ids, source });
        }

        self.reporter.report(PassEvent::BatchSent { count: ids.len() });
        Ok(DispatchOutcome::Sent { count: ids.len() })
    }
}
