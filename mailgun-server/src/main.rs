//! Process entry point: wires the store, the queue proxy, N delivery
//! workers, the retention cleaner, and the HTTP front-end together, then
//! waits for a shutdown signal (§6).

use std::sync::Arc;

use mailgun_api::{AppState, ClientRegistry};
use mailgun_common::{config::env_or, Logger, Shard, Signal};
use mailgun_delivery::{
    cleaner, DeliveryAgentConfig, HickoryMxResolver, MxResolver, RetentionCleanerConfig,
    SmtpClient, StaticMxResolver, TcpSmtpClient,
};
use mailgun_queue::QueueProxy;
use mailgun_store::SqliteStore;
use mailgun_submission::{StatusAggregator, SubmissionAdapter};
use tokio::sync::broadcast;
use tracing::{error, info};

const DEFAULT_DB_PATH: &str = "/mailq/messages.db";
const DEFAULT_HTTP_PORT: u16 = 5000;

#[tokio::main]
async fn main() {
    Logger::init();

    if let Err(err) = run().await {
        error!(error = %err, "fatal error during startup");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let shard = match std::env::var("SHARD") {
        Ok(raw) => Shard::parse(&raw)?,
        Err(_) => Shard::default(),
    };
    let db_path: String = env_or("DB_PATH", DEFAULT_DB_PATH.to_string())?;
    let http_port: u16 = env_or("HTTP_PORT", DEFAULT_HTTP_PORT)?;
    let smtp_port: u16 = env_or("SMTP_PORT", mailgun_common::DEFAULT_SMTP_PORT)?;
    let delivery_threads: usize = env_or("DELIVERY_THREADS", mailgun_common::DEFAULT_DELIVERY_THREADS)?;
    let retry_interval_secs: i64 = env_or("RETRY_INTERVAL", mailgun_common::DEFAULT_RETRY_INTERVAL_SECS)?;
    let max_delivery_attempts: u32 = env_or("MAX_DELIVERY_ATTEMPTS", mailgun_common::DEFAULT_MAX_DELIVERY_ATTEMPTS)?;
    let cleanup_interval_secs: u64 = env_or("CLEANUP_INTERVAL", mailgun_common::DEFAULT_CLEANUP_INTERVAL_SECS)?;
    let retention_period_secs: i64 = env_or("RETENTION_PERIOD", mailgun_common::DEFAULT_RETENTION_PERIOD_SECS)?;
    let helo_domain: String = env_or("HELO_DOMAIN", "mailgun.local".to_string())?;

    info!(?shard, %db_path, http_port, delivery_threads, "starting mailgun-server");

    let store = SqliteStore::open(&db_path, shard, mailgun_common::SystemClock)?;
    let (proxy, store_task) = QueueProxy::spawn(store);

    let (shutdown_tx, _) = broadcast::channel::<Signal>(1);

    let resolver: Arc<dyn MxResolver> = match std::env::var("STATIC_MX_CONFIG") {
        Ok(raw) => Arc::new(StaticMxResolver::parse(&raw)),
        Err(_) => Arc::new(HickoryMxResolver::new(1024)),
    };
    let smtp: Arc<dyn SmtpClient> = Arc::new(TcpSmtpClient::new(smtp_port, helo_domain));

    let delivery_config = DeliveryAgentConfig {
        max_delivery_attempts,
        retry_interval_secs,
        idle_sleep: std::time::Duration::from_secs(1),
    };

    let mut worker_handles = Vec::with_capacity(delivery_threads);
    for worker_id in 0..delivery_threads {
        let proxy = proxy.clone();
        let resolver = Arc::clone(&resolver);
        let smtp = Arc::clone(&smtp);
        let shutdown_rx = shutdown_tx.subscribe();
        worker_handles.push(tokio::spawn(mailgun_delivery::run_worker(
            worker_id,
            proxy,
            resolver,
            smtp,
            delivery_config,
            shutdown_rx,
        )));
    }

    let cleaner_handle = tokio::spawn(cleaner::run(
        proxy.clone(),
        RetentionCleanerConfig {
            cleanup_interval_secs,
            retention_period_secs,
        },
        shutdown_tx.subscribe(),
    ));

    let clients = ClientRegistry::load_default()?;
    let state = AppState {
        submission: SubmissionAdapter::new(proxy.clone()),
        aggregator: StatusAggregator::new(proxy),
        clients: Arc::new(clients),
    };
    let app = mailgun_api::app(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", http_port)).await?;
    info!(http_port, "listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(err) = result {
                error!(error = %err, "http server exited with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    let _ = shutdown_tx.send(Signal::Shutdown);
    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = cleaner_handle.await;
    drop(store_task);

    Ok(())
}
