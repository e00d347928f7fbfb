//! C3: the delivery agent.
//!
//! Each worker runs claim -> resolve MX -> try each MX -> classify ->
//! update store, forever, until a shutdown signal arrives (§4.3, §5).

use std::sync::Arc;
use std::time::Duration;

use mailgun_common::{
    Envelope, Signal, DEFAULT_MAX_DELIVERY_ATTEMPTS, DEFAULT_RETRY_INTERVAL_SECS,
};
use mailgun_queue::QueueProxy;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::error::SendError;
use crate::resolver::MxResolver;
use crate::smtp::SmtpClient;

#[derive(Debug, Clone, Copy)]
pub struct DeliveryAgentConfig {
    pub max_delivery_attempts: u32,
    pub retry_interval_secs: i64,
    pub idle_sleep: Duration,
}

impl Default for DeliveryAgentConfig {
    fn default() -> Self {
        Self {
            max_delivery_attempts: DEFAULT_MAX_DELIVERY_ATTEMPTS,
            retry_interval_secs: DEFAULT_RETRY_INTERVAL_SECS,
            idle_sleep: Duration::from_secs(1),
        }
    }
}

/// Run one delivery worker until `shutdown` fires. Workers are
/// independent: there is no coordination between them beyond the store
/// (§5 "Suspension points").
pub async fn run_worker(
    worker_id: usize,
    proxy: QueueProxy,
    resolver: Arc<dyn MxResolver>,
    smtp: Arc<dyn SmtpClient>,
    config: DeliveryAgentConfig,
    mut shutdown: broadcast::Receiver<Signal>,
) {
    info!(worker_id, "delivery worker starting");
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                info!(worker_id, "delivery worker shutting down");
                break;
            }
            () = deliver_one(worker_id, &proxy, &*resolver, &*smtp, &config) => {}
        }
    }
}

async fn deliver_one(
    worker_id: usize,
    proxy: &QueueProxy,
    resolver: &dyn MxResolver,
    smtp: &dyn SmtpClient,
    config: &DeliveryAgentConfig,
) {
    let envelope = match proxy.claim().await {
        Ok(Some(envelope)) => envelope,
        Ok(None) => {
            tokio::time::sleep(config.idle_sleep).await;
            return;
        }
        Err(err) => {
            error!(worker_id, %err, "claim failed");
            tokio::time::sleep(config.idle_sleep).await;
            return;
        }
    };

    debug!(worker_id, envelope_id = envelope.id, domain = %envelope.destination_domain, "claimed envelope");

    let mxs = match resolver.resolve(&envelope.destination_domain).await {
        Ok(mxs) if !mxs.is_empty() => mxs,
        Ok(_) => {
            warn!(envelope_id = envelope.id, domain = %envelope.destination_domain, "no mail servers found");
            handle_transient(proxy, &envelope, config).await;
            return;
        }
        Err(err) => {
            warn!(envelope_id = envelope.id, %err, "MX resolution failed");
            handle_transient(proxy, &envelope, config).await;
            return;
        }
    };

    for mx in &mxs {
        match smtp.send(mx, &envelope).await {
            Ok(()) => {
                if let Err(err) = proxy.mark_sent(envelope.id).await {
                    error!(envelope_id = envelope.id, %err, "mark_sent failed");
                }
                return;
            }
            Err(SendError::Permanent(reason)) => {
                warn!(envelope_id = envelope.id, mx, reason, "permanent failure");
                if let Err(err) = proxy.mark_undeliverable(envelope.id).await {
                    error!(envelope_id = envelope.id, %err, "mark_undeliverable failed");
                }
                return;
            }
            Err(SendError::Temporary(reason)) => {
                debug!(envelope_id = envelope.id, mx, reason, "transient failure, trying next MX");
            }
        }
    }

    handle_transient(proxy, &envelope, config).await;
}

/// Every MX failed transiently, or none could be resolved: schedule a
/// retry unless the attempt cap is reached (§4.3 "Transient-failure
/// handling").
async fn handle_transient(proxy: &QueueProxy, envelope: &Envelope, config: &DeliveryAgentConfig) {
    let attempted = envelope.delivery_attempts + 1;
    if attempted < config.max_delivery_attempts {
        if let Err(err) = proxy
            .schedule_retry(envelope.id, config.retry_interval_secs)
            .await
        {
            error!(envelope_id = envelope.id, %err, "schedule_retry failed");
        }
    } else if let Err(err) = proxy.mark_undeliverable(envelope.id).await {
        error!(envelope_id = envelope.id, %err, "mark_undeliverable failed");
    }
}
