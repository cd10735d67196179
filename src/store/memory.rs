use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    CatalogRepository, DeadLetter, OrderFilter, OrderRepository, OutboxBacklog, RepoError,
    SyncIntent, SyncOutbox,
};
use crate::domain::catalog::CatalogEntry;
use crate::domain::order::Order;

// ============================================================================
// In-Memory Stores
// ============================================================================
//
// Single-process implementations of the storage ports. Each collection sits
// behind one lock, which gives the same per-document atomicity the real
// backends offer (and atomic `create_many`). Used by tests and by the demo
// binary when STORAGE_BACKEND=memory.
//
// ============================================================================

#[derive(Default)]
pub struct InMemoryCatalog {
    entries: RwLock<HashMap<Uuid, CatalogEntry>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<CatalogEntry>, RepoError> {
        let entries = self.entries.read().await;
        Ok(entries.values().find(|e| e.slug == slug).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CatalogEntry>, RepoError> {
        Ok(self.entries.read().await.get(&id).cloned())
    }

    async fn save(&self, entry: &CatalogEntry, expected_version: i64) -> Result<(), RepoError> {
        let mut entries = self.entries.write().await;

        match entries.get(&entry.id) {
            Some(stored) if stored.version == expected_version => {
                entries.insert(entry.id, entry.clone());
                Ok(())
            }
            _ => Err(RepoError::Conflict {
                entity: "Catalog entry",
                id: entry.id.to_string(),
                expected: expected_version,
            }),
        }
    }

    async fn insert(&self, entry: &CatalogEntry) -> Result<(), RepoError> {
        let mut entries = self.entries.write().await;

        if entries.contains_key(&entry.id) || entries.values().any(|e| e.slug == entry.slug) {
            return Err(RepoError::Duplicate {
                entity: "Catalog entry",
                id: entry.slug.clone(),
            });
        }

        entries.insert(entry.id, entry.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOrders {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl InMemoryOrders {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrders {
    async fn create_many(&self, orders: &[Order]) -> Result<(), RepoError> {
        let mut stored = self.orders.write().await;

        for order in orders {
            let number_taken = stored.values().any(|o| o.order_number == order.order_number);
            if stored.contains_key(&order.id) || number_taken {
                return Err(RepoError::Duplicate {
                    entity: "Order",
                    id: order.order_number.clone(),
                });
            }
        }

        for order in orders {
            stored.insert(order.id, order.clone());
        }
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, RepoError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn save(&self, order: &Order, expected_version: i64) -> Result<(), RepoError> {
        let mut orders = self.orders.write().await;

        match orders.get(&order.id) {
            Some(stored) if stored.version == expected_version => {
                orders.insert(order.id, order.clone());
                Ok(())
            }
            _ => Err(RepoError::Conflict {
                entity: "Order",
                id: order.id.to_string(),
                expected: expected_version,
            }),
        }
    }

    async fn scan(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepoError> {
        let orders = self.orders.read().await;
        Ok(orders.values().filter(|o| filter.matches(o)).cloned().collect())
    }

    async fn find_with_pending_stock_op(&self) -> Result<Vec<Order>, RepoError> {
        let orders = self.orders.read().await;
        Ok(orders.values().filter(|o| o.pending_stock_op.is_some()).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryOutbox {
    pending: RwLock<HashMap<Uuid, SyncIntent>>,
    dead: RwLock<Vec<DeadLetter>>,
}

impl InMemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncOutbox for InMemoryOutbox {
    async fn enqueue(&self, intent: &SyncIntent) -> Result<(), RepoError> {
        self.pending.write().await.insert(intent.id, intent.clone());
        Ok(())
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<SyncIntent>, RepoError> {
        let pending = self.pending.read().await;
        let mut due: Vec<SyncIntent> = pending
            .values()
            .filter(|i| i.next_attempt_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|i| i.created_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn complete(&self, id: Uuid) -> Result<(), RepoError> {
        self.pending.write().await.remove(&id);
        Ok(())
    }

    async fn reschedule(&self, intent: &SyncIntent) -> Result<(), RepoError> {
        self.pending.write().await.insert(intent.id, intent.clone());
        Ok(())
    }

    async fn dead_letter(&self, intent: &SyncIntent, error: &str) -> Result<(), RepoError> {
        self.pending.write().await.remove(&intent.id);
        self.dead.write().await.push(DeadLetter {
            intent: intent.clone(),
            error: error.to_string(),
            failed_at: Utc::now(),
        });
        Ok(())
    }

    async fn backlog(&self) -> Result<OutboxBacklog, RepoError> {
        let pending = self.pending.read().await;
        Ok(OutboxBacklog {
            pending: pending.len(),
            oldest_created_at: pending.values().map(|i| i.created_at).min(),
        })
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, RepoError> {
        let dead = self.dead.read().await;
        Ok(dead.iter().take(limit).cloned().collect())
    }
}
