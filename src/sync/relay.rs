use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::metrics::Metrics;
use crate::mirror::IndexMirror;
use crate::store::{CatalogRepository, SyncIntent, SyncOutbox};
use crate::utils::RetryConfig;

// ============================================================================
// Outbox Relay - drains deferred index updates
// ============================================================================
//
// 1. Polls the outbox for due intents (oldest first)
// 2. Re-reads the catalog entry so the mirror receives current values and
//    the current version, never the value captured when the update failed
// 3. Deletes the intent on success
// 4. On failure reschedules with exponential backoff; after `max_attempts`
//    moves the intent to the dead letter table
//
// After every poll the backlog size, the age of the oldest pending update and
// the mirror's circuit state are exported as gauges.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub max_attempts: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            batch_size: 100,
            max_attempts: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub delivered: usize,
    pub rescheduled: usize,
    pub dead_lettered: usize,
    /// Intents whose catalog entry no longer exists
    pub discarded: usize,
}

impl RelayStats {
    pub fn total(&self) -> usize {
        self.delivered + self.rescheduled + self.dead_lettered + self.discarded
    }
}

enum Delivery {
    Delivered,
    Discarded,
    Failed(String),
}

pub struct OutboxRelay {
    outbox: Arc<dyn SyncOutbox>,
    catalog: Arc<dyn CatalogRepository>,
    mirror: Arc<dyn IndexMirror>,
    metrics: Arc<Metrics>,
    config: RelayConfig,
    backoff: RetryConfig,
}

impl OutboxRelay {
    pub fn new(
        outbox: Arc<dyn SyncOutbox>,
        catalog: Arc<dyn CatalogRepository>,
        mirror: Arc<dyn IndexMirror>,
        metrics: Arc<Metrics>,
        config: RelayConfig,
    ) -> Self {
        let backoff = RetryConfig::for_outbox(config.max_attempts);
        Self { outbox, catalog, mirror, metrics, config, backoff }
    }

    /// Spawn the polling loop; it stops when `shutdown` flips to true or its
    /// sender is dropped
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                poll_interval_ms = self.config.poll_interval.as_millis() as u64,
                batch_size = self.config.batch_size,
                "🔄 Starting index outbox relay"
            );

            let mut ticker = tokio::time::interval(self.config.poll_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }

                match self.run_once().await {
                    Ok(stats) if stats.total() > 0 => {
                        tracing::info!(
                            delivered = stats.delivered,
                            rescheduled = stats.rescheduled,
                            dead_lettered = stats.dead_lettered,
                            discarded = stats.discarded,
                            "📬 Outbox relay pass finished"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "Outbox relay pass failed"),
                }

                self.refresh_gauges().await;
            }

            tracing::info!("Index outbox relay stopped");
        })
    }

    pub async fn run_once(&self) -> anyhow::Result<RelayStats> {
        self.run_once_at(Utc::now()).await
    }

    /// One pass over intents due at `now`
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> anyhow::Result<RelayStats> {
        let intents = self.outbox.due(now, self.config.batch_size).await?;
        let mut stats = RelayStats::default();

        for mut intent in intents {
            match self.deliver(&intent).await {
                Delivery::Delivered => {
                    self.outbox.complete(intent.id).await?;
                    self.metrics.record_index_sync("relay", "success");
                    stats.delivered += 1;
                    tracing::debug!(intent_id = %intent.id, catalog_id = %intent.catalog_id, "✅ Index update delivered");
                }
                Delivery::Discarded => {
                    self.outbox.complete(intent.id).await?;
                    self.metrics.record_index_sync("relay", "discarded");
                    stats.discarded += 1;
                    tracing::warn!(
                        intent_id = %intent.id,
                        catalog_id = %intent.catalog_id,
                        "Catalog entry gone, dropping index update"
                    );
                }
                Delivery::Failed(error) => {
                    intent.attempts += 1;
                    intent.last_error = Some(error.clone());

                    if intent.attempts >= self.config.max_attempts {
                        self.outbox.dead_letter(&intent, &error).await?;
                        self.metrics.record_index_sync("relay", "dead_lettered");
                        self.metrics.record_dlq_message();
                        stats.dead_lettered += 1;
                        tracing::error!(
                            intent_id = %intent.id,
                            catalog_id = %intent.catalog_id,
                            attempts = intent.attempts,
                            error = %error,
                            "💀 Index update moved to dead letter table"
                        );
                    } else {
                        let delay = self.backoff.delay_for(intent.attempts);
                        intent.next_attempt_at = now
                            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::minutes(5));
                        self.outbox.reschedule(&intent).await?;
                        self.metrics.record_index_sync("relay", "failure");
                        stats.rescheduled += 1;
                        tracing::warn!(
                            intent_id = %intent.id,
                            attempts = intent.attempts,
                            next_attempt_at = %intent.next_attempt_at,
                            error = %error,
                            "Index update failed, rescheduled"
                        );
                    }
                }
            }
        }

        Ok(stats)
    }

    async fn deliver(&self, intent: &SyncIntent) -> Delivery {
        let entry = match self.catalog.find_by_id(intent.catalog_id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Delivery::Discarded,
            Err(e) => return Delivery::Failed(e.to_string()),
        };

        let fields = intent.fields.refreshed_from(entry.aggregate_stock, entry.rating);
        match self.mirror.upsert_partial(entry.id, fields, entry.version).await {
            Ok(()) => Delivery::Delivered,
            Err(e) => Delivery::Failed(e.to_string()),
        }
    }

    /// Export staleness and breaker gauges
    pub async fn refresh_gauges(&self) {
        match self.outbox.backlog().await {
            Ok(backlog) => {
                self.metrics
                    .update_outbox_staleness(backlog.pending, backlog.oldest_age_secs(Utc::now()));
            }
            Err(e) => tracing::warn!(error = %e, "Could not read outbox backlog"),
        }

        if let Some(state) = self.mirror.circuit_state().await {
            self.metrics.update_circuit_breaker_state(state.as_gauge());
        }
    }
}
