use std::sync::Arc;

use uuid::Uuid;

use crate::metrics::Metrics;
use crate::mirror::{IndexFields, IndexMirror};
use crate::store::{SyncIntent, SyncOutbox};

/// What happened to an index update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Mirror updated inline
    Applied,
    /// Mirror failed, update parked in the outbox for the relay
    Deferred,
    /// Mirror and outbox both failed; the next change of the entry repairs it
    Dropped,
}

/// Pushes catalog stock/rating changes to the index mirror.
///
/// Never fails the caller: an order transition that already committed its
/// stock change must not be undone because the search index is down.
pub struct IndexSynchronizer {
    mirror: Arc<dyn IndexMirror>,
    outbox: Arc<dyn SyncOutbox>,
    metrics: Arc<Metrics>,
}

impl IndexSynchronizer {
    pub fn new(mirror: Arc<dyn IndexMirror>, outbox: Arc<dyn SyncOutbox>, metrics: Arc<Metrics>) -> Self {
        Self { mirror, outbox, metrics }
    }

    pub async fn sync(&self, catalog_id: Uuid, fields: IndexFields, version: i64) -> SyncOutcome {
        match self.mirror.upsert_partial(catalog_id, fields, version).await {
            Ok(()) => {
                self.metrics.record_index_sync("inline", "success");
                SyncOutcome::Applied
            }
            Err(e) => {
                tracing::warn!(
                    catalog_id = %catalog_id,
                    version = version,
                    error = %e,
                    "IndexSyncFailure: mirror update failed, deferring to outbox"
                );
                self.defer(catalog_id, fields, &e.to_string()).await
            }
        }
    }

    /// Park an update for the relay without trying the mirror first
    pub async fn defer(&self, catalog_id: Uuid, fields: IndexFields, reason: &str) -> SyncOutcome {
        let mut intent = SyncIntent::new(catalog_id, fields);
        intent.last_error = Some(reason.to_string());

        match self.outbox.enqueue(&intent).await {
            Ok(()) => {
                self.metrics.record_index_sync("inline", "deferred");
                SyncOutcome::Deferred
            }
            Err(e) => {
                tracing::error!(
                    catalog_id = %catalog_id,
                    error = %e,
                    "IndexSyncFailure: could not record index update in outbox"
                );
                self.metrics.record_index_sync("inline", "dropped");
                SyncOutcome::Dropped
            }
        }
    }

    /// Queue a stock refresh; the relay reads the current value on delivery
    pub async fn resync_stock(&self, catalog_id: Uuid) -> SyncOutcome {
        self.defer(catalog_id, IndexFields::stock(0), "resync requested").await
    }

    pub async fn sync_stock(&self, catalog_id: Uuid, aggregate_stock: i64, version: i64) -> SyncOutcome {
        self.sync(catalog_id, IndexFields::stock(aggregate_stock), version).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::InMemoryIndexMirror;
    use crate::store::memory::InMemoryOutbox;

    fn synchronizer() -> (IndexSynchronizer, Arc<InMemoryIndexMirror>, Arc<InMemoryOutbox>) {
        let mirror = Arc::new(InMemoryIndexMirror::new());
        let outbox = Arc::new(InMemoryOutbox::new());
        let sync = IndexSynchronizer::new(mirror.clone(), outbox.clone(), Arc::new(Metrics::new().unwrap()));
        (sync, mirror, outbox)
    }

    #[tokio::test]
    async fn test_sync_applies_inline() {
        let (sync, mirror, outbox) = synchronizer();
        let id = Uuid::new_v4();

        assert_eq!(sync.sync_stock(id, 12, 1).await, SyncOutcome::Applied);
        assert_eq!(mirror.get(id).await.unwrap().unwrap().stock, Some(12));
        assert_eq!(outbox.backlog().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn test_failed_sync_lands_in_outbox() {
        let (sync, mirror, outbox) = synchronizer();
        mirror.set_available(false);
        let id = Uuid::new_v4();

        assert_eq!(sync.sync_stock(id, 12, 1).await, SyncOutcome::Deferred);

        let due = outbox.due(chrono::Utc::now(), 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].catalog_id, id);
        assert!(due[0].last_error.is_some());
    }
}
