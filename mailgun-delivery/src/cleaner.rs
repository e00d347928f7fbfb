//! C4: the retention cleaner (§4.4). Runs on its own schedule, purging
//! terminal envelopes older than `RETENTION_PERIOD`.

use mailgun_common::{Signal, DEFAULT_CLEANUP_INTERVAL_SECS, DEFAULT_RETENTION_PERIOD_SECS};
use mailgun_queue::QueueProxy;
use tokio::sync::broadcast;
use tracing::{error, info};

#[derive(Debug, Clone, Copy)]
pub struct RetentionCleanerConfig {
    pub cleanup_interval_secs: u64,
    pub retention_period_secs: i64,
}

impl Default for RetentionCleanerConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
            retention_period_secs: DEFAULT_RETENTION_PERIOD_SECS,
        }
    }
}

pub async fn run(
    proxy: QueueProxy,
    config: RetentionCleanerConfig,
    mut shutdown: broadcast::Receiver<Signal>,
) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(
        config.cleanup_interval_secs.max(1),
    ));
    ticker.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                info!("retention cleaner shutting down");
                break;
            }
            _ = ticker.tick() => {
                match proxy.remove_inactive(config.retention_period_secs).await {
                    Ok(count) if count > 0 => info!(count, "purged inactive envelopes"),
                    Ok(_) => {}
                    Err(err) => error!(%err, "remove_inactive failed"),
                }
            }
        }
    }
}
