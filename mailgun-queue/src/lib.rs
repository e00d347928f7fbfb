//! C2: the queue proxy.
//!
//! The persistence engine underneath (`mailgun_store::SqliteStore`) is a
//! `rusqlite::Connection`, which is not meant to be hammered from several
//! threads concurrently. The proxy decouples that constraint from the
//! worker pool (§4.2): it owns one long-lived blocking task that owns the
//! real store, and exposes the same operation set over a bounded(1)
//! request channel plus a one-shot reply per call. Two in-flight calls
//! from the same caller are impossible because the caller awaits its
//! reply before issuing the next one -- that, plus a single worker
//! draining requests one at a time, gives per-call FIFO without
//! call-ids.

use mailgun_common::{Envelope, EnvelopeStatus, NewEnvelope};
use mailgun_store::EnvelopeStore;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Store(#[from] mailgun_store::StoreError),

    /// The proxy's worker task has exited; every subsequent call fails
    /// this way.
    #[error("queue proxy worker is no longer running")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ProxyError>;

type Reply<T> = oneshot::Sender<mailgun_store::Result<T>>;

enum Command {
    Put(NewEnvelope, Reply<u64>),
    Claim(Reply<Option<Envelope>>),
    MarkSent(u64, Reply<()>),
    MarkUndeliverable(u64, Reply<()>),
    ScheduleRetry(u64, i64, Reply<()>),
    StatusOf(String, String, Reply<Option<Vec<(u64, EnvelopeStatus)>>>),
    RemoveInactive(i64, Reply<u64>),
}

/// A handle to the running proxy. Cloning it is cheap (it's just a
/// channel sender) and every clone serializes through the same worker.
#[derive(Clone)]
pub struct QueueProxy {
    tx: mpsc::Sender<Command>,
}

impl QueueProxy {
    /// Spawn the proxy's worker as a blocking task owning `store`, and
    /// return a handle plus the task's join handle (for shutdown
    /// awaiting).
    pub fn spawn<S>(mut store: S) -> (Self, tokio::task::JoinHandle<()>)
    where
        S: EnvelopeStore + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<Command>(1);
        let handle = tokio::task::spawn_blocking(move || {
            while let Some(command) = rx.blocking_recv() {
                match command {
                    Command::Put(envelope, reply) => {
                        let _ = reply.send(store.put(envelope));
                    }
                    Command::Claim(reply) => {
                        let _ = reply.send(store.claim());
                    }
                    Command::MarkSent(id, reply) => {
                        let _ = reply.send(store.mark_sent(id));
                    }
                    Command::MarkUndeliverable(id, reply) => {
                        let _ = reply.send(store.mark_undeliverable(id));
                    }
                    Command::ScheduleRetry(id, delta, reply) => {
                        let _ = reply.send(store.schedule_retry(id, delta));
                    }
                    Command::StatusOf(client_id, submission_id, reply) => {
                        let _ = reply.send(store.status_of(&client_id, &submission_id));
                    }
                    Command::RemoveInactive(retention, reply) => {
                        let _ = reply.send(store.remove_inactive(retention));
                    }
                }
            }
        });
        (Self { tx }, handle)
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| ProxyError::Closed)?;
        reply_rx.await.map_err(|_| ProxyError::Closed)?.map_err(Into::into)
    }

    pub async fn put(&self, envelope: NewEnvelope) -> Result<u64> {
        self.call(|reply| Command::Put(envelope, reply)).await
    }

    pub async fn claim(&self) -> Result<Option<Envelope>> {
        self.call(Command::Claim).await
    }

    pub async fn mark_sent(&self, id: u64) -> Result<()> {
        self.call(|reply| Command::MarkSent(id, reply)).await
    }

    pub async fn mark_undeliverable(&self, id: u64) -> Result<()> {
        self.call(|reply| Command::MarkUndeliverable(id, reply)).await
    }

    pub async fn schedule_retry(&self, id: u64, retry_after_seconds: i64) -> Result<()> {
        self.call(|reply| Command::ScheduleRetry(id, retry_after_seconds, reply))
            .await
    }

    pub async fn status_of(
        &self,
        client_id: &str,
        submission_id: &str,
    ) -> Result<Option<Vec<(u64, EnvelopeStatus)>>> {
        self.call(|reply| {
            Command::StatusOf(client_id.to_string(), submission_id.to_string(), reply)
        })
        .await
    }

    pub async fn remove_inactive(&self, retention_seconds: i64) -> Result<u64> {
        self.call(|reply| Command::RemoveInactive(retention_seconds, reply))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailgun_common::{Domain, FakeClock, Shard};
    use mailgun_store::MemoryStore;

    fn envelope(domain: &str) -> NewEnvelope {
        NewEnvelope {
            client_id: "c1".into(),
            submission_id: "s1".into(),
            sender: "sender@e2e-test.com".into(),
            recipients: vec![format!("a@{domain}")],
            destination_domain: Domain::new(domain),
            message: "Subject: hi\r\n\r\nbody".into(),
        }
    }

    #[tokio::test]
    async fn serializes_calls_to_a_single_store() {
        let clock = FakeClock::new(1_000);
        let store = MemoryStore::new(Shard::default(), clock.clone());
        let (proxy, _handle) = QueueProxy::spawn(store);

        let id = proxy.put(envelope("a.com")).await.unwrap();
        let claimed = proxy.claim().await.unwrap().unwrap();
        assert_eq!(claimed.id, id);
        proxy.mark_sent(id).await.unwrap();

        let status = proxy.status_of("c1", "s1").await.unwrap().unwrap();
        assert_eq!(status, vec![(id, EnvelopeStatus::Sent)]);
    }

    #[tokio::test]
    async fn many_concurrent_callers_each_get_their_own_reply() {
        let clock = FakeClock::new(1_000);
        let store = MemoryStore::new(Shard::default(), clock);
        let (proxy, _handle) = QueueProxy::spawn(store);

        let mut ids = Vec::new();
        for i in 0..20 {
            ids.push(proxy.put(envelope(&format!("{i}.com"))).await.unwrap());
        }

        let mut handles = Vec::new();
        for id in ids {
            let proxy = proxy.clone();
            handles.push(tokio::spawn(async move { proxy.mark_sent(id).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    }
}
