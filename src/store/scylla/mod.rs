// ============================================================================
// ScyllaDB Stores
// ============================================================================
//
// Documents are stored as JSON text next to the columns the queries need
// (version, status, created_at, ...). Compare-and-set writes are lightweight
// transactions (`IF version = ?`); checkout writes are one logged batch
// after each order number has been claimed with `IF NOT EXISTS`.
//
// Tables:
// - catalog_entries / catalog_slugs   catalog documents and slug lookup
// - orders / order_numbers            order documents and number uniqueness
// - index_outbox / index_dlq          deferred mirror updates and dead letters
//
// ============================================================================

mod catalog;
mod orders;
mod outbox;

pub use catalog::ScyllaCatalog;
pub use orders::ScyllaOrders;
pub use outbox::ScyllaOutbox;

use std::sync::Arc;

use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::response::query_result::QueryResult;
use scylla::serialize::row::SerializeRow;
use scylla::value::{CqlValue, Row};

use super::RepoError;

/// Bound values of one batch statement. Batches are built inside
/// `async_trait` futures, so the rows must be sendable across threads.
type BatchRow = Box<dyn SerializeRow + Send + Sync>;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS catalog_entries (
        id uuid PRIMARY KEY,
        slug text,
        version bigint,
        document text
    )",
    "CREATE TABLE IF NOT EXISTS catalog_slugs (
        slug text PRIMARY KEY,
        id uuid
    )",
    "CREATE TABLE IF NOT EXISTS orders (
        id uuid PRIMARY KEY,
        order_number text,
        checkout_id uuid,
        vendor_id text,
        is_admin boolean,
        status text,
        has_pending_op boolean,
        version bigint,
        created_at timestamp,
        document text
    )",
    "CREATE TABLE IF NOT EXISTS order_numbers (
        order_number text PRIMARY KEY,
        order_id uuid
    )",
    "CREATE TABLE IF NOT EXISTS index_outbox (
        id uuid PRIMARY KEY,
        catalog_id uuid,
        next_attempt_at timestamp,
        created_at timestamp,
        intent text
    )",
    "CREATE TABLE IF NOT EXISTS index_dlq (
        id uuid PRIMARY KEY,
        intent text,
        error text,
        failed_at timestamp
    )",
];

/// Connect, create the keyspace and tables if missing, and switch to the keyspace
pub async fn connect(nodes: &[String], keyspace: &str) -> anyhow::Result<Arc<Session>> {
    tracing::info!(nodes = ?nodes, keyspace = %keyspace, "Connecting to ScyllaDB...");

    let session: Session = SessionBuilder::new().known_nodes(nodes).build().await?;

    session
        .query_unpaged(
            format!(
                "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                 {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                keyspace
            ),
            &[],
        )
        .await?;
    session.use_keyspace(keyspace, false).await?;

    for statement in SCHEMA {
        session.query_unpaged(*statement, &[]).await?;
    }

    tracing::info!(keyspace = %keyspace, "✅ ScyllaDB schema ready");
    Ok(Arc::new(session))
}

/// Whether a lightweight transaction took effect (`[applied]` column)
fn lwt_applied(result: QueryResult) -> Result<bool, RepoError> {
    let rows = result.into_rows_result().map_err(RepoError::backend)?;
    let row = rows.maybe_first_row::<Row>().map_err(RepoError::backend)?;

    let applied = row.and_then(|row| row.columns.into_iter().next().flatten());
    Ok(matches!(applied, Some(CqlValue::Boolean(true))))
}

/// Single `text` column of every row
fn text_column(result: QueryResult) -> Result<Vec<String>, RepoError> {
    let rows = match result.into_rows_result() {
        Ok(rows) => rows,
        Err(_) => return Ok(Vec::new()),
    };

    let mut values = Vec::new();
    for row in rows.rows::<(String,)>().map_err(RepoError::backend)? {
        let (value,) = row.map_err(RepoError::backend)?;
        values.push(value);
    }
    Ok(values)
}
