use std::sync::Arc;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use scylla::client::session::Session;
use scylla::statement::batch::Batch;
use uuid::Uuid;

use super::{lwt_applied, text_column, BatchRow};
use crate::domain::order::Order;
use crate::store::{OrderFilter, OrderRepository, RepoError};

pub struct ScyllaOrders {
    session: Arc<Session>,
}

impl ScyllaOrders {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Stream `document` rows of a query and keep those matching `filter`
    async fn collect_documents<V>(&self, query: &str, values: V, filter: &OrderFilter) -> Result<Vec<Order>, RepoError>
    where
        V: scylla::serialize::row::SerializeRow,
    {
        let mut stream = self
            .session
            .query_iter(query, values)
            .await
            .map_err(RepoError::backend)?
            .rows_stream::<(String,)>()
            .map_err(RepoError::backend)?;

        let mut orders = Vec::new();
        while let Some((document,)) = stream.try_next().await.map_err(RepoError::backend)? {
            let order: Order = serde_json::from_str(&document)?;
            if filter.matches(&order) {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    async fn claim_order_number(&self, order: &Order) -> Result<bool, RepoError> {
        let result = self
            .session
            .query_unpaged(
                "INSERT INTO order_numbers (order_number, order_id) VALUES (?, ?) IF NOT EXISTS",
                (order.order_number.as_str(), order.id),
            )
            .await
            .map_err(RepoError::backend)?;
        lwt_applied(result)
    }

    /// Best effort; a leaked claim only blocks a number that was never used
    async fn release_order_numbers(&self, numbers: &[&str]) {
        for number in numbers {
            let released = self
                .session
                .query_unpaged("DELETE FROM order_numbers WHERE order_number = ? IF EXISTS", (*number,))
                .await;
            if let Err(e) = released {
                tracing::warn!(order_number = %number, error = %e, "Could not release order number claim");
            }
        }
    }
}

#[async_trait]
impl OrderRepository for ScyllaOrders {
    async fn create_many(&self, orders: &[Order]) -> Result<(), RepoError> {
        if orders.is_empty() {
            return Ok(());
        }

        let documents = orders
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;

        // Claim every order number first; LWT makes the claim race-free
        let mut claimed = Vec::with_capacity(orders.len());
        for order in orders {
            match self.claim_order_number(order).await {
                Ok(true) => claimed.push(order.order_number.as_str()),
                Ok(false) => {
                    self.release_order_numbers(&claimed).await;
                    return Err(RepoError::Duplicate {
                        entity: "Order",
                        id: order.order_number.clone(),
                    });
                }
                Err(e) => {
                    self.release_order_numbers(&claimed).await;
                    return Err(e);
                }
            }
        }

        // Logged batch: every order of the checkout lands, or none does
        let mut batch = Batch::default();
        let mut values: Vec<BatchRow> = vec![];

        for (order, document) in orders.iter().zip(documents) {
            batch.append_statement(
                "INSERT INTO orders (
                    id, order_number, checkout_id, vendor_id, is_admin, status,
                    has_pending_op, version, created_at, document
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            );
            values.push(Box::new((
                order.id,
                order.order_number.clone(),
                order.checkout_id,
                order.vendor_id.clone(),
                order.is_admin,
                order.status.as_str().to_string(),
                order.pending_stock_op.is_some(),
                order.version,
                order.created_at,
                document,
            )));
        }

        if let Err(e) = self.session.batch(&batch, values).await {
            self.release_order_numbers(&claimed).await;
            return Err(RepoError::backend(e));
        }

        tracing::debug!(count = orders.len(), "Orders written in one batch");
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, RepoError> {
        let result = self
            .session
            .query_unpaged("SELECT document FROM orders WHERE id = ?", (id,))
            .await
            .map_err(RepoError::backend)?;

        match text_column(result)?.into_iter().next() {
            Some(document) => Ok(Some(serde_json::from_str(&document)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, order: &Order, expected_version: i64) -> Result<(), RepoError> {
        let document = serde_json::to_string(order)?;

        let result = self
            .session
            .query_unpaged(
                "UPDATE orders SET status = ?, has_pending_op = ?, version = ?, document = ?
                 WHERE id = ? IF version = ?",
                (
                    order.status.as_str(),
                    order.pending_stock_op.is_some(),
                    order.version,
                    document,
                    order.id,
                    expected_version,
                ),
            )
            .await
            .map_err(RepoError::backend)?;

        if lwt_applied(result)? {
            Ok(())
        } else {
            Err(RepoError::Conflict {
                entity: "Order",
                id: order.id.to_string(),
                expected: expected_version,
            })
        }
    }

    async fn scan(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepoError> {
        // The time window is pushed down; the rest is matched on the documents
        match (filter.created_from, filter.created_to) {
            (Some(from), Some(to)) => {
                self.collect_documents(
                    "SELECT document FROM orders WHERE created_at >= ? AND created_at < ? ALLOW FILTERING",
                    (from, to),
                    filter,
                )
                .await
            }
            (Some(from), None) => {
                self.collect_documents(
                    "SELECT document FROM orders WHERE created_at >= ? ALLOW FILTERING",
                    (from,),
                    filter,
                )
                .await
            }
            _ => self.collect_documents("SELECT document FROM orders", (), filter).await,
        }
    }

    async fn find_with_pending_stock_op(&self) -> Result<Vec<Order>, RepoError> {
        self.collect_documents(
            "SELECT document FROM orders WHERE has_pending_op = true ALLOW FILTERING",
            (),
            &OrderFilter::default(),
        )
        .await
    }
}
