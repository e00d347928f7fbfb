//! C5 Submission Adapter and C6 Status Aggregator (§4.5, §4.6).
//!
//! The HTTP front-end (`mailgun-api`) is the thin shell named out of
//! scope in §1; this crate is the logic it calls into: fan-out by domain
//! and submission-id assignment on the write path, status collapsing on
//! the read path.

use std::collections::BTreeMap;

use mailgun_common::{Domain, EnvelopeStatus, NewEnvelope};
use mailgun_queue::{ProxyError, QueueProxy};
use thiserror::Error;
use ulid::Ulid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("recipients must contain at least one address")]
    EmptyRecipients,
    #[error("recipient address {0:?} has no domain part")]
    InvalidRecipient(String),
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// The fields a submission request carries, pre-validation.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub client_id: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// C5: accepts a logical submission, fans it out into one envelope per
/// destination domain, and persists each through the queue proxy.
#[derive(Clone)]
pub struct SubmissionAdapter {
    proxy: QueueProxy,
}

impl SubmissionAdapter {
    #[must_use]
    pub fn new(proxy: QueueProxy) -> Self {
        Self { proxy }
    }

    /// Validate, split by domain, and persist. Returns the freshly
    /// generated `submission_id`. No envelope is persisted if validation
    /// fails (§4.5 "Failure").
    pub async fn submit(&self, request: SubmissionRequest) -> Result<String, SubmissionError> {
        validate(&request)?;

        let submission_id = Ulid::new().to_string();
        let by_domain = partition_by_domain(&request.recipients)?;
        let message = build_message(&request);

        for (domain, recipients) in by_domain {
            let envelope = NewEnvelope {
                client_id: request.client_id.clone(),
                submission_id: submission_id.clone(),
                sender: request.sender.clone(),
                recipients,
                destination_domain: domain,
                message: message.clone(),
            };
            self.proxy.put(envelope).await?;
        }

        Ok(submission_id)
    }
}

fn validate(request: &SubmissionRequest) -> Result<(), ValidationError> {
    if request.client_id.trim().is_empty() {
        return Err(ValidationError::MissingField("client_id"));
    }
    if request.sender.trim().is_empty() {
        return Err(ValidationError::MissingField("sender"));
    }
    if request.subject.trim().is_empty() {
        return Err(ValidationError::MissingField("subject"));
    }
    if request.body.is_empty() {
        return Err(ValidationError::MissingField("body"));
    }
    if request.recipients.is_empty() {
        return Err(ValidationError::EmptyRecipients);
    }
    Ok(())
}

/// Partition recipients by lowercased domain part (§4.5 step 2), keeping
/// the original per-domain recipient order. Uses a `BTreeMap` so the
/// fan-out order is deterministic, which testable property 9 relies on.
fn partition_by_domain(
    recipients: &[String],
) -> Result<Vec<(Domain, Vec<String>)>, ValidationError> {
    let mut grouped: BTreeMap<Domain, Vec<String>> = BTreeMap::new();
    for recipient in recipients {
        let domain = Domain::from_address(recipient)
            .ok_or_else(|| ValidationError::InvalidRecipient(recipient.clone()))?;
        grouped.entry(domain).or_default().push(recipient.clone());
    }
    Ok(grouped.into_iter().collect())
}

/// Build the RFC-5322 message body. The `To:` header lists every
/// original recipient regardless of which envelope this is for -- only
/// the envelope-level `recipients` (used for `RCPT TO`) are split by
/// domain (§4.5 step 3).
fn build_message(request: &SubmissionRequest) -> String {
    format!(
        "From: {}\r\nTo: {}\r\nSubject: {}\r\n\r\n{}",
        request.sender,
        request.recipients.join(", "),
        request.subject,
        request.body
    )
}

/// The user-visible, collapsed status of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateStatus {
    Queued,
    Sent,
    Undeliverable,
}

impl AggregateStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Undeliverable => "undeliverable",
        }
    }
}

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("unknown submission id {submission_id:?} for client {client_id:?}")]
    UnknownSubmission {
        client_id: String,
        submission_id: String,
    },
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// C6: collapses the per-envelope statuses of one submission into a
/// single user-visible status (§4.6).
#[derive(Clone)]
pub struct StatusAggregator {
    proxy: QueueProxy,
}

impl StatusAggregator {
    #[must_use]
    pub fn new(proxy: QueueProxy) -> Self {
        Self { proxy }
    }

    pub async fn status_of(
        &self,
        client_id: &str,
        submission_id: &str,
    ) -> Result<AggregateStatus, StatusError> {
        let rows = self
            .proxy
            .status_of(client_id, submission_id)
            .await?
            .ok_or_else(|| StatusError::UnknownSubmission {
                client_id: client_id.to_string(),
                submission_id: submission_id.to_string(),
            })?;

        Ok(collapse(&rows))
    }
}

/// If every row shares a status, return it; any mixture collapses to
/// `Queued` ("still in progress"), since a mix always means some
/// envelope has not reached a terminal, unanimous outcome (§4.6 step 3).
fn collapse(rows: &[(u64, EnvelopeStatus)]) -> AggregateStatus {
    let mut rows = rows.iter();
    let Some(&(_, first)) = rows.next() else {
        return AggregateStatus::Queued;
    };
    if rows.all(|&(_, status)| status == first) {
        match first {
            EnvelopeStatus::Queued => AggregateStatus::Queued,
            EnvelopeStatus::Sent => AggregateStatus::Sent,
            EnvelopeStatus::Undeliverable => AggregateStatus::Undeliverable,
        }
    } else {
        AggregateStatus::Queued
    }
}
