use std::sync::Arc;

use async_trait::async_trait;
use scylla::client::session::Session;
use uuid::Uuid;

use super::{lwt_applied, text_column};
use crate::domain::catalog::CatalogEntry;
use crate::store::{CatalogRepository, RepoError};

pub struct ScyllaCatalog {
    session: Arc<Session>,
}

impl ScyllaCatalog {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl CatalogRepository for ScyllaCatalog {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<CatalogEntry>, RepoError> {
        let result = self
            .session
            .query_unpaged("SELECT id FROM catalog_slugs WHERE slug = ?", (slug,))
            .await
            .map_err(RepoError::backend)?;

        let rows = match result.into_rows_result() {
            Ok(rows) => rows,
            Err(_) => return Ok(None),
        };

        match rows.maybe_first_row::<(Uuid,)>().map_err(RepoError::backend)? {
            Some((id,)) => self.find_by_id(id).await,
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CatalogEntry>, RepoError> {
        let result = self
            .session
            .query_unpaged("SELECT document FROM catalog_entries WHERE id = ?", (id,))
            .await
            .map_err(RepoError::backend)?;

        match text_column(result)?.into_iter().next() {
            Some(document) => Ok(Some(serde_json::from_str(&document)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, entry: &CatalogEntry, expected_version: i64) -> Result<(), RepoError> {
        let document = serde_json::to_string(entry)?;

        let result = self
            .session
            .query_unpaged(
                "UPDATE catalog_entries SET version = ?, document = ? WHERE id = ? IF version = ?",
                (entry.version, document, entry.id, expected_version),
            )
            .await
            .map_err(RepoError::backend)?;

        if lwt_applied(result)? {
            Ok(())
        } else {
            Err(RepoError::Conflict {
                entity: "Catalog entry",
                id: entry.id.to_string(),
                expected: expected_version,
            })
        }
    }

    async fn insert(&self, entry: &CatalogEntry) -> Result<(), RepoError> {
        let claimed = self
            .session
            .query_unpaged(
                "INSERT INTO catalog_slugs (slug, id) VALUES (?, ?) IF NOT EXISTS",
                (entry.slug.as_str(), entry.id),
            )
            .await
            .map_err(RepoError::backend)?;

        if !lwt_applied(claimed)? {
            return Err(RepoError::Duplicate {
                entity: "Catalog entry",
                id: entry.slug.clone(),
            });
        }

        let document = serde_json::to_string(entry)?;
        let inserted = self
            .session
            .query_unpaged(
                "INSERT INTO catalog_entries (id, slug, version, document) VALUES (?, ?, ?, ?) IF NOT EXISTS",
                (entry.id, entry.slug.as_str(), entry.version, document),
            )
            .await
            .map_err(RepoError::backend)?;

        if !lwt_applied(inserted)? {
            return Err(RepoError::Duplicate {
                entity: "Catalog entry",
                id: entry.id.to_string(),
            });
        }

        tracing::debug!(catalog_id = %entry.id, slug = %entry.slug, "Catalog entry inserted");
        Ok(())
    }
}
