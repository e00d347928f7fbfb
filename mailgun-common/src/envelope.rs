//! The envelope data model shared by every component of the relay.
//!
//! An envelope is the unit of delivery: one submission fans out into one
//! envelope per distinct recipient destination domain (§3, §4.5).

use serde::{Deserialize, Serialize};

/// Default maximum number of delivery attempts before an envelope is given
/// up on (one initial attempt plus three retries).
pub const DEFAULT_MAX_DELIVERY_ATTEMPTS: u32 = 4;
/// Default seconds between retry attempts.
pub const DEFAULT_RETRY_INTERVAL_SECS: i64 = 600;
/// Default seconds between retention-cleaner sweeps.
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;
/// Default retention period: 2x the 3-retry window, so a submission's
/// sibling envelopes do not desynchronize mid-retry (§4.4).
pub const DEFAULT_RETENTION_PERIOD_SECS: i64 = 2 * 3 * 3600;
/// Default number of concurrent delivery workers per process.
pub const DEFAULT_DELIVERY_THREADS: usize = 5;
/// Default outbound SMTP port.
pub const DEFAULT_SMTP_PORT: u16 = 25;

use crate::domain::Domain;

/// The lifecycle state of an envelope. Terminal states (`Sent`,
/// `Undeliverable`) are absorbing (§3 invariant 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Queued,
    Sent,
    Undeliverable,
}

impl EnvelopeStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Undeliverable)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Undeliverable => "undeliverable",
        }
    }
}

impl std::fmt::Display for EnvelopeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A caller-constructed envelope, not yet assigned an id or store-owned
/// bookkeeping fields. This is what C5 (the submission adapter) builds and
/// hands to `Store::put`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEnvelope {
    pub client_id: String,
    pub submission_id: String,
    /// The envelope-level sender (SMTP `MAIL FROM`), kept distinct from
    /// the `From:` header baked into `message` since the store treats
    /// `message` as an opaque blob (§4.1).
    pub sender: String,
    pub recipients: Vec<String>,
    pub destination_domain: Domain,
    pub message: String,
}

/// A fully persisted envelope, as returned by `claim` and read operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: u64,
    pub client_id: String,
    pub submission_id: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub destination_domain: Domain,
    pub message: String,
    pub status: EnvelopeStatus,
    pub next_attempt_at: i64,
    pub delivery_attempts: u32,
    pub being_processed: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Envelope {
    /// An envelope is eligible for claim iff it is queued, not already
    /// in-flight, and its scheduled retry time has passed (§3 invariant 2).
    #[must_use]
    pub fn is_eligible(&self, now: i64) -> bool {
        self.status == EnvelopeStatus::Queued && !self.being_processed && self.next_attempt_at <= now
    }
}
