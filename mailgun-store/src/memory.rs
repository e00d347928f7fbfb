//! An in-memory `EnvelopeStore`, used by tests and by the in-process
//! stub wiring. Mirrors the sqlite backend's semantics exactly so the
//! contract tests in `lib.rs` run unmodified against either.

use mailgun_common::{Clock, Envelope, EnvelopeStatus, NewEnvelope, Shard};

use crate::error::{Result, StoreError};
use crate::EnvelopeStore;

#[derive(Debug)]
pub struct MemoryStore<C: Clock> {
    rows: Vec<Envelope>,
    next_id: u64,
    shard: Shard,
    clock: C,
}

impl<C: Clock> MemoryStore<C> {
    #[must_use]
    pub fn new(shard: Shard, clock: C) -> Self {
        Self {
            rows: Vec::new(),
            next_id: 1,
            shard,
            clock,
        }
    }

    fn find_mut(&mut self, id: u64) -> Option<&mut Envelope> {
        self.rows
            .iter_mut()
            .find(|e| e.id == id && self.shard.owns(e.id))
    }
}

impl<C: Clock + Send> EnvelopeStore for MemoryStore<C> {
    fn put(&mut self, envelope: NewEnvelope) -> Result<u64> {
        let id = self.next_id;
        self.next_id += 1;
        let now = self.clock.now();
        self.rows.push(Envelope {
            id,
            client_id: envelope.client_id,
            submission_id: envelope.submission_id,
            sender: envelope.sender,
            recipients: envelope.recipients,
            destination_domain: envelope.destination_domain,
            message: envelope.message,
            status: EnvelopeStatus::Queued,
            next_attempt_at: now,
            delivery_attempts: 0,
            being_processed: false,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    fn claim(&mut self) -> Result<Option<Envelope>> {
        let now = self.clock.now();
        let shard = self.shard;
        let row = self
            .rows
            .iter_mut()
            .find(|e| shard.owns(e.id) && e.is_eligible(now));
        Ok(row.map(|row| {
            row.being_processed = true;
            row.clone()
        }))
    }

    fn mark_sent(&mut self, id: u64) -> Result<()> {
        let now = self.clock.now();
        let row = self.find_mut(id).ok_or(StoreError::NotFound(id))?;
        if row.status != EnvelopeStatus::Queued {
            return Err(StoreError::WrongState {
                id,
                status: "not queued",
            });
        }
        row.status = EnvelopeStatus::Sent;
        row.being_processed = false;
        row.updated_at = now;
        Ok(())
    }

    fn mark_undeliverable(&mut self, id: u64) -> Result<()> {
        let now = self.clock.now();
        let row = self.find_mut(id).ok_or(StoreError::NotFound(id))?;
        if row.status != EnvelopeStatus::Queued {
            return Err(StoreError::WrongState {
                id,
                status: "not queued",
            });
        }
        row.status = EnvelopeStatus::Undeliverable;
        row.being_processed = false;
        row.updated_at = now;
        Ok(())
    }

    fn schedule_retry(&mut self, id: u64, retry_after_seconds: i64) -> Result<()> {
        let now = self.clock.now();
        let row = self.find_mut(id).ok_or(StoreError::NotFound(id))?;
        row.next_attempt_at = now + retry_after_seconds;
        row.delivery_attempts += 1;
        row.being_processed = false;
        row.updated_at = now;
        Ok(())
    }

    fn status_of(
        &mut self,
        client_id: &str,
        submission_id: &str,
    ) -> Result<Option<Vec<(u64, EnvelopeStatus)>>> {
        let shard = self.shard;
        let rows: Vec<_> = self
            .rows
            .iter()
            .filter(|e| {
                shard.owns(e.id) && e.submission_id == submission_id && e.client_id == client_id
            })
            .map(|e| (e.id, e.status))
            .collect();
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows))
        }
    }

    fn remove_inactive(&mut self, retention_seconds: i64) -> Result<u64> {
        let now = self.clock.now();
        let shard = self.shard;
        let before = self.rows.len();
        self.rows.retain(|e| {
            !(shard.owns(e.id)
                && e.status.is_terminal()
                && now - e.updated_at >= retention_seconds)
        });
        Ok((before - self.rows.len()) as u64)
    }
}
