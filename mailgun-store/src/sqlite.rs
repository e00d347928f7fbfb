//! The production `EnvelopeStore` backend: a single on-disk sqlite file
//! (§6 "Persisted state"), owned by one connection. Multiple shards may
//! point at the same file; correctness comes from the `id % shard_count`
//! filter applied to every read, not from file-level isolation (§4.1
//! "Sharding").

use std::path::Path;

use mailgun_common::{Clock, Envelope, EnvelopeStatus, NewEnvelope, Shard};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::EnvelopeStore;

pub struct SqliteStore<C: Clock> {
    conn: Connection,
    shard: Shard,
    clock: C,
}

fn status_to_str(status: EnvelopeStatus) -> &'static str {
    status.as_str()
}

fn status_from_str(value: &str) -> EnvelopeStatus {
    match value {
        "sent" => EnvelopeStatus::Sent,
        "undeliverable" => EnvelopeStatus::Undeliverable,
        _ => EnvelopeStatus::Queued,
    }
}

const RECIPIENT_SEP: char = '\u{1f}'; // unit separator; addresses cannot contain it

fn join_recipients(recipients: &[String]) -> String {
    recipients.join(&RECIPIENT_SEP.to_string())
}

fn split_recipients(value: &str) -> Vec<String> {
    value.split(RECIPIENT_SEP).map(str::to_string).collect()
}

impl<C: Clock> SqliteStore<C> {
    /// Open (creating if absent) the store file, and run the startup
    /// recovery sweep that clears any `being_processed` flag left set by
    /// a crashed worker (§4.1 "Atomicity", §9 "Open question").
    pub fn open(path: impl AsRef<Path>, shard: Shard, clock: C) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.display().to_string(),
            source,
        })?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS envelopes (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id           TEXT NOT NULL,
                submission_id       TEXT NOT NULL,
                sender              TEXT NOT NULL,
                recipients          TEXT NOT NULL,
                destination_domain  TEXT NOT NULL,
                message             TEXT NOT NULL,
                status              TEXT NOT NULL,
                next_attempt_at     INTEGER NOT NULL,
                delivery_attempts   INTEGER NOT NULL,
                being_processed     INTEGER NOT NULL,
                created_at          INTEGER NOT NULL,
                updated_at          INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_envelopes_claimable
                ON envelopes (status, being_processed, next_attempt_at);
            CREATE INDEX IF NOT EXISTS idx_envelopes_submission
                ON envelopes (client_id, submission_id);",
        )?;
        conn.execute(
            "UPDATE envelopes SET being_processed = 0 WHERE status = 'queued' AND being_processed = 1",
            [],
        )?;
        Ok(Self { conn, shard, clock })
    }

    fn row_status(&self, id: u64) -> Result<Option<EnvelopeStatus>> {
        Ok(self
            .conn
            .query_row(
                "SELECT status FROM envelopes WHERE id = ?1",
                params![id],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(|s| status_from_str(&s)))
    }

    /// Turn a zero-row `UPDATE ... WHERE status = 'queued'` into the right
    /// error: not found at all, or found but in the wrong state.
    fn classify_update_miss(&self, id: u64) -> StoreError {
        match self.row_status(id) {
            Ok(Some(status)) => StoreError::WrongState {
                id,
                status: status.as_str(),
            },
            Ok(None) => StoreError::NotFound(id),
            Err(err) => err,
        }
    }
}

impl<C: Clock + Send> EnvelopeStore for SqliteStore<C> {
    fn put(&mut self, envelope: NewEnvelope) -> Result<u64> {
        let now = self.clock.now();
        self.conn.execute(
            "INSERT INTO envelopes (
                client_id, submission_id, sender, recipients, destination_domain, message,
                status, next_attempt_at, delivery_attempts, being_processed,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'queued', ?7, 0, 0, ?7, ?7)",
            params![
                envelope.client_id,
                envelope.submission_id,
                envelope.sender,
                join_recipients(&envelope.recipients),
                envelope.destination_domain.as_str(),
                envelope.message,
                now,
            ],
        )?;
        Ok(self.conn.last_insert_rowid() as u64)
    }

    fn claim(&mut self) -> Result<Option<Envelope>> {
        let now = self.clock.now();
        let tx = self.conn.transaction()?;
        let candidate: Option<u64> = tx
            .query_row(
                "SELECT id FROM envelopes
                 WHERE status = 'queued' AND being_processed = 0 AND next_attempt_at <= ?1
                   AND id % ?2 = ?3
                 LIMIT 1",
                params![now, i64::from(self.shard.count), i64::from(self.shard.index)],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = candidate else {
            tx.commit()?;
            return Ok(None);
        };

        tx.execute(
            "UPDATE envelopes SET being_processed = 1 WHERE id = ?1",
            params![id],
        )?;

        let envelope = tx.query_row(
            "SELECT id, client_id, submission_id, sender, recipients, destination_domain, message,
                    status, next_attempt_at, delivery_attempts, created_at, updated_at
             FROM envelopes WHERE id = ?1",
            params![id],
            |row| {
                Ok(Envelope {
                    id: row.get::<_, i64>(0)? as u64,
                    client_id: row.get(1)?,
                    submission_id: row.get(2)?,
                    sender: row.get(3)?,
                    recipients: split_recipients(&row.get::<_, String>(4)?),
                    destination_domain: row.get::<_, String>(5)?.into(),
                    message: row.get(6)?,
                    status: status_from_str(&row.get::<_, String>(7)?),
                    next_attempt_at: row.get(8)?,
                    delivery_attempts: row.get::<_, i64>(9)? as u32,
                    being_processed: true,
                    created_at: row.get(10)?,
                    updated_at: row.get(11)?,
                })
            },
        )?;
        tx.commit()?;
        Ok(Some(envelope))
    }

    fn mark_sent(&mut self, id: u64) -> Result<()> {
        let now = self.clock.now();
        let affected = self.conn.execute(
            "UPDATE envelopes SET status = 'sent', being_processed = 0, updated_at = ?2
             WHERE id = ?1 AND status = 'queued'",
            params![id, now],
        )?;
        if affected == 0 {
            return Err(self.classify_update_miss(id));
        }
        Ok(())
    }

    fn mark_undeliverable(&mut self, id: u64) -> Result<()> {
        let now = self.clock.now();
        let affected = self.conn.execute(
            "UPDATE envelopes SET status = 'undeliverable', being_processed = 0, updated_at = ?2
             WHERE id = ?1 AND status = 'queued'",
            params![id, now],
        )?;
        if affected == 0 {
            return Err(self.classify_update_miss(id));
        }
        Ok(())
    }

    fn schedule_retry(&mut self, id: u64, retry_after_seconds: i64) -> Result<()> {
        let now = self.clock.now();
        let affected = self.conn.execute(
            "UPDATE envelopes
             SET next_attempt_at = ?2, delivery_attempts = delivery_attempts + 1,
                 being_processed = 0, updated_at = ?3
             WHERE id = ?1 AND status = 'queued'",
            params![id, now + retry_after_seconds, now],
        )?;
        if affected == 0 {
            return Err(self.classify_update_miss(id));
        }
        Ok(())
    }

    fn status_of(
        &mut self,
        client_id: &str,
        submission_id: &str,
    ) -> Result<Option<Vec<(u64, EnvelopeStatus)>>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, status FROM envelopes
             WHERE client_id = ?1 AND submission_id = ?2 AND id % ?3 = ?4",
        )?;
        let rows = stmt
            .query_map(
                params![
                    client_id,
                    submission_id,
                    i64::from(self.shard.count),
                    i64::from(self.shard.index)
                ],
                |row| {
                    let id: i64 = row.get(0)?;
                    let status: String = row.get(1)?;
                    Ok((id as u64, status_from_str(&status)))
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows))
        }
    }

    fn remove_inactive(&mut self, retention_seconds: i64) -> Result<u64> {
        let now = self.clock.now();
        let affected = self.conn.execute(
            "DELETE FROM envelopes
             WHERE status IN ('sent', 'undeliverable')
               AND (?1 - updated_at) >= ?2
               AND id % ?3 = ?4",
            params![
                now,
                retention_seconds,
                i64::from(self.shard.count),
                i64::from(self.shard.index)
            ],
        )?;
        Ok(affected as u64)
    }
}
