//! C1: the durable envelope store.
//!
//! Owns persistence and is the single source of truth for envelope state
//! (spec §4.1). Every operation here is meant to run on a single,
//! store-owning thread -- callers reach it exclusively through the C2
//! queue proxy (`mailgun-queue`), never directly from multiple threads.

pub mod error;
pub mod memory;
pub mod sqlite;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use mailgun_common::{Envelope, EnvelopeStatus, NewEnvelope};

/// The exact operation set of §4.1. Implementations own a thread-affine
/// handle (a `rusqlite::Connection`, or an in-memory table for tests) and
/// are not required to be `Sync` -- only `Send`, so a single owning task
/// can be moved into the queue proxy's worker.
pub trait EnvelopeStore: Send {
    /// Insert a new envelope with `status=QUEUED`, `delivery_attempts=0`,
    /// `next_attempt_at=clock.now()`, `being_processed=false`. Returns the
    /// assigned id.
    fn put(&mut self, envelope: NewEnvelope) -> Result<u64>;

    /// Atomically select one eligible envelope (§3 invariant 2) and mark
    /// it `being_processed=true`, returning the pre-update view.
    fn claim(&mut self) -> Result<Option<Envelope>>;

    /// `QUEUED -> SENT`; clears `being_processed`.
    fn mark_sent(&mut self, id: u64) -> Result<()>;

    /// `QUEUED -> UNDELIVERABLE`; clears `being_processed`.
    fn mark_undeliverable(&mut self, id: u64) -> Result<()>;

    /// Set `next_attempt_at = now + retry_after_seconds`, increment
    /// `delivery_attempts`, clear `being_processed`. Does not change
    /// `status`.
    fn schedule_retry(&mut self, id: u64, retry_after_seconds: i64) -> Result<()>;

    /// Returns `None` only when no row matches both `client_id` and
    /// `submission_id` -- a mismatched client must not see the data.
    fn status_of(
        &mut self,
        client_id: &str,
        submission_id: &str,
    ) -> Result<Option<Vec<(u64, EnvelopeStatus)>>>;

    /// Delete terminal envelopes whose last state-change is at least
    /// `retention_seconds` old. Returns the number removed.
    fn remove_inactive(&mut self, retention_seconds: i64) -> Result<u64>;
}

#[cfg(test)]
mod contract_tests {
    //! Tests that every `EnvelopeStore` implementation must satisfy,
    //! exercised against both backends.
    use super::*;
    use mailgun_common::{Clock, Domain, FakeClock};

    fn new_envelope(client: &str, submission: &str, domain: &str) -> NewEnvelope {
        NewEnvelope {
            client_id: client.to_string(),
            submission_id: submission.to_string(),
            sender: "sender@e2e-test.com".to_string(),
            recipients: vec![format!("a@{domain}")],
            destination_domain: Domain::new(domain),
            message: "Subject: hi\r\n\r\nbody".to_string(),
        }
    }

    fn run_roundtrip(mut store: impl EnvelopeStore, clock: &FakeClock) {
        let id = store.put(new_envelope("c1", "s1", "a.com")).unwrap();
        let claimed = store.claim().unwrap().expect("should be claimable");
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.status, EnvelopeStatus::Queued);
        assert_eq!(claimed.delivery_attempts, 0);
        assert_eq!(claimed.next_attempt_at, clock.now());
        assert!(claimed.being_processed);
    }

    fn run_claim_exclusivity(mut store: impl EnvelopeStore) {
        store.put(new_envelope("c1", "s1", "a.com")).unwrap();
        let first = store.claim().unwrap().expect("first claim");
        let second = store.claim().unwrap();
        assert!(second.is_none() || second.unwrap().id != first.id);
    }

    fn run_retry_scheduling(mut store: impl EnvelopeStore, clock: &FakeClock) {
        let id = store.put(new_envelope("c1", "s1", "a.com")).unwrap();
        store.claim().unwrap().unwrap();
        store.schedule_retry(id, 600).unwrap();

        assert!(store.claim().unwrap().is_none());
        clock.advance(599);
        assert!(store.claim().unwrap().is_none());
        clock.advance(1);
        let claimed = store.claim().unwrap().expect("eligible after delta");
        assert_eq!(claimed.delivery_attempts, 1);
    }

    fn run_attempt_cap(mut store: impl EnvelopeStore) {
        let id = store.put(new_envelope("c1", "s1", "a.com")).unwrap();
        store.claim().unwrap().unwrap();
        // simulate 3 prior failed attempts, then the 4th exhausts the cap
        store.schedule_retry(id, 0).unwrap();
        store.claim().unwrap().unwrap();
        store.schedule_retry(id, 0).unwrap();
        store.claim().unwrap().unwrap();
        store.schedule_retry(id, 0).unwrap();
        let claimed = store.claim().unwrap().unwrap();
        assert_eq!(claimed.delivery_attempts, 3);
        store.mark_undeliverable(id).unwrap();
        let rows = store.status_of("c1", "s1").unwrap().unwrap();
        assert_eq!(rows[0].1, EnvelopeStatus::Undeliverable);
    }

    fn run_client_isolation(mut store: impl EnvelopeStore) {
        store.put(new_envelope("client-a", "sub-1", "a.com")).unwrap();
        assert!(store.status_of("client-b", "sub-1").unwrap().is_none());
        assert!(store.status_of("client-a", "sub-1").unwrap().is_some());
    }

    fn run_retention(mut store: impl EnvelopeStore, clock: &FakeClock) {
        let id = store.put(new_envelope("c1", "s1", "a.com")).unwrap();
        store.claim().unwrap().unwrap();
        store.mark_sent(id).unwrap();
        assert_eq!(store.remove_inactive(100).unwrap(), 0);
        clock.advance(100);
        assert_eq!(store.remove_inactive(100).unwrap(), 1);
        assert!(store.status_of("c1", "s1").unwrap().is_none());
    }

    #[test]
    fn memory_store_contract() {
        let clock = FakeClock::new(1_000);
        run_roundtrip(MemoryStore::new(Default::default(), clock.clone()), &clock);

        let clock = FakeClock::new(1_000);
        run_claim_exclusivity(MemoryStore::new(Default::default(), clock));

        let clock = FakeClock::new(1_000);
        run_retry_scheduling(MemoryStore::new(Default::default(), clock.clone()), &clock);

        let clock = FakeClock::new(1_000);
        run_attempt_cap(MemoryStore::new(Default::default(), clock));

        let clock = FakeClock::new(1_000);
        run_client_isolation(MemoryStore::new(Default::default(), clock));

        let clock = FakeClock::new(1_000);
        run_retention(MemoryStore::new(Default::default(), clock.clone()), &clock);
    }

    #[test]
    fn sqlite_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        let clock = FakeClock::new(1_000);
        run_roundtrip(
            SqliteStore::open(&path, Default::default(), clock.clone()).unwrap(),
            &clock,
        );
        std::fs::remove_file(&path).ok();

        let clock = FakeClock::new(1_000);
        run_claim_exclusivity(SqliteStore::open(&path, Default::default(), clock).unwrap());
        std::fs::remove_file(&path).ok();

        let clock = FakeClock::new(1_000);
        run_retry_scheduling(
            SqliteStore::open(&path, Default::default(), clock.clone()).unwrap(),
            &clock,
        );
        std::fs::remove_file(&path).ok();

        let clock = FakeClock::new(1_000);
        run_attempt_cap(SqliteStore::open(&path, Default::default(), clock).unwrap());
        std::fs::remove_file(&path).ok();

        let clock = FakeClock::new(1_000);
        run_client_isolation(SqliteStore::open(&path, Default::default(), clock).unwrap());
        std::fs::remove_file(&path).ok();

        let clock = FakeClock::new(1_000);
        run_retention(
            SqliteStore::open(&path, Default::default(), clock.clone()).unwrap(),
            &clock,
        );
    }

    #[test]
    fn cross_shard_isolation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sharded.db");
        let clock = FakeClock::new(1_000);

        let shard_cfg = mailgun_common::Shard { index: 0, count: 2 };
        let mut shard0 = SqliteStore::open(&path, shard_cfg, clock.clone()).unwrap();
        let mut shard1 = SqliteStore::open(
            &path,
            mailgun_common::Shard { index: 1, count: 2 },
            clock.clone(),
        )
        .unwrap();

        // put several rows; ids are assigned by sqlite AUTOINCREMENT, so
        // put enough to guarantee both even and odd ids exist.
        for _ in 0..4 {
            shard0.put(new_envelope("c1", "s1", "a.com")).unwrap();
        }

        let mut seen_on_0 = 0;
        while shard0.claim().unwrap().is_some() {
            seen_on_0 += 1;
        }
        let mut seen_on_1 = 0;
        while shard1.claim().unwrap().is_some() {
            seen_on_1 += 1;
        }

        assert_eq!(seen_on_0 + seen_on_1, 4);
        assert!(seen_on_1 < 4, "shard 1 must not see all of shard 0's ids");
    }
}
