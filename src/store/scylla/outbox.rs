use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use scylla::client::session::Session;
use scylla::statement::batch::Batch;
use uuid::Uuid;

use super::{text_column, BatchRow};
use crate::store::{DeadLetter, OutboxBacklog, RepoError, SyncIntent, SyncOutbox};

pub struct ScyllaOutbox {
    session: Arc<Session>,
}

impl ScyllaOutbox {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    async fn upsert(&self, intent: &SyncIntent) -> Result<(), RepoError> {
        let payload = serde_json::to_string(intent)?;

        self.session
            .query_unpaged(
                "INSERT INTO index_outbox (id, catalog_id, next_attempt_at, created_at, intent)
                 VALUES (?, ?, ?, ?, ?)",
                (intent.id, intent.catalog_id, intent.next_attempt_at, intent.created_at, payload),
            )
            .await
            .map_err(RepoError::backend)?;
        Ok(())
    }
}

#[async_trait]
impl SyncOutbox for ScyllaOutbox {
    async fn enqueue(&self, intent: &SyncIntent) -> Result<(), RepoError> {
        self.upsert(intent).await
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<SyncIntent>, RepoError> {
        let result = self
            .session
            .query_unpaged(
                "SELECT intent FROM index_outbox WHERE next_attempt_at <= ? ALLOW FILTERING",
                (now,),
            )
            .await
            .map_err(RepoError::backend)?;

        let mut intents = text_column(result)?
            .iter()
            .map(|payload| serde_json::from_str::<SyncIntent>(payload))
            .collect::<Result<Vec<_>, _>>()?;

        intents.sort_by_key(|i| i.created_at);
        intents.truncate(limit);
        Ok(intents)
    }

    async fn complete(&self, id: Uuid) -> Result<(), RepoError> {
        self.session
            .query_unpaged("DELETE FROM index_outbox WHERE id = ?", (id,))
            .await
            .map_err(RepoError::backend)?;
        Ok(())
    }

    async fn reschedule(&self, intent: &SyncIntent) -> Result<(), RepoError> {
        self.upsert(intent).await
    }

    async fn dead_letter(&self, intent: &SyncIntent, error: &str) -> Result<(), RepoError> {
        let payload = serde_json::to_string(intent)?;

        let mut batch = Batch::default();
        let mut values: Vec<BatchRow> = vec![];

        batch.append_statement("INSERT INTO index_dlq (id, intent, error, failed_at) VALUES (?, ?, ?, ?)");
        values.push(Box::new((intent.id, payload, error.to_string(), Utc::now())));

        batch.append_statement("DELETE FROM index_outbox WHERE id = ?");
        values.push(Box::new((intent.id,)));

        self.session.batch(&batch, values).await.map_err(RepoError::backend)?;
        Ok(())
    }

    async fn backlog(&self) -> Result<OutboxBacklog, RepoError> {
        let mut stream = self
            .session
            .query_iter("SELECT created_at FROM index_outbox", ())
            .await
            .map_err(RepoError::backend)?
            .rows_stream::<(DateTime<Utc>,)>()
            .map_err(RepoError::backend)?;

        let mut backlog = OutboxBacklog::default();
        while let Some((created_at,)) = stream.try_next().await.map_err(RepoError::backend)? {
            backlog.pending += 1;
            backlog.oldest_created_at = Some(match backlog.oldest_created_at {
                Some(oldest) => oldest.min(created_at),
                None => created_at,
            });
        }
        Ok(backlog)
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, RepoError> {
        let limit = i32::try_from(limit).unwrap_or(i32::MAX);
        let result = self
            .session
            .query_unpaged("SELECT intent, error, failed_at FROM index_dlq LIMIT ?", (limit,))
            .await
            .map_err(RepoError::backend)?;

        let rows = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(Vec::new()),
        };

        let mut dead = Vec::new();
        for row in rows.rows::<(String, String, DateTime<Utc>)>().map_err(RepoError::backend)? {
            let (payload, error, failed_at) = row.map_err(RepoError::backend)?;
            dead.push(DeadLetter {
                intent: serde_json::from_str(&payload)?,
                error,
                failed_at,
            });
        }
        Ok(dead)
    }
}
