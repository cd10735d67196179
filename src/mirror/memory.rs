use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{IndexDocument, IndexFields, IndexMirror, MirrorError};

/// Process-local mirror. `set_available(false)` makes every call fail, which
/// is how tests exercise the outbox path.
pub struct InMemoryIndexMirror {
    documents: RwLock<HashMap<Uuid, IndexDocument>>,
    available: AtomicBool,
    writes: AtomicU64,
}

impl Default for InMemoryIndexMirror {
    fn default() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            writes: AtomicU64::new(0),
        }
    }
}

impl InMemoryIndexMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of accepted upserts
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> Result<(), MirrorError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MirrorError::Backend("connection refused".to_string()))
        }
    }
}

#[async_trait]
impl IndexMirror for InMemoryIndexMirror {
    async fn upsert_partial(&self, catalog_id: Uuid, fields: IndexFields, version: i64) -> Result<(), MirrorError> {
        self.ensure_available()?;

        let mut documents = self.documents.write().await;
        let document = documents.entry(catalog_id).or_insert(IndexDocument {
            catalog_id,
            stock: None,
            rating: None,
            version,
        });

        if document.version > version {
            tracing::debug!(
                catalog_id = %catalog_id,
                held = document.version,
                incoming = version,
                "Ignoring stale index update"
            );
            return Ok(());
        }

        if let Some(stock) = fields.stock {
            document.stock = Some(stock);
        }
        if let Some(rating) = fields.rating {
            document.rating = Some(rating);
        }
        document.version = version;
        self.writes.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    async fn get(&self, catalog_id: Uuid) -> Result<Option<IndexDocument>, MirrorError> {
        self.ensure_available()?;
        Ok(self.documents.read().await.get(&catalog_id).cloned())
    }
}
