//! Order service providing listing and status management over an order store.

use common::OrderId;
use store::{Order, OrderStatus, OrderStore, OwnerIdentity, Result, StoreError};

/// Service for reading orders and moving them through their statuses.
pub struct OrderService<S: OrderStore> {
    store: S,
}

impl<S: OrderStore> OrderService<S> {
    /// Creates a new order service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Orders placed by an owner, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_by_owner(&self, owner: &OwnerIdentity) -> Result<Vec<Order>> {
        self.store.list_by_owner(owner).await
    }

    /// All orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<Order>> {
        self.store.list_all().await
    }

    /// Loads an order by ID.
    ///
    /// Returns None if the order doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        self.store.get_order(order_id).await
    }

    /// Sets the status of an order and returns the updated order.
    ///
    /// Any status may follow any other. Moving backwards is allowed but logged.
    #[tracing::instrument(skip(self))]
    pub async fn set_status(&self, order_id: OrderId, status: OrderStatus) -> Result<Order> {
        let previous = self.store.set_status(order_id, status).await?;

        metrics::counter!("order_status_updates_total", "status" => status.as_str()).increment(1);
        if previous.is_backwards_to(status) {
            tracing::warn!(%order_id, from = %previous, to = %status, "order status moved backwards");
        } else {
            tracing::info!(%order_id, from = %previous, to = %status, "order status updated");
        }

        self.store
            .get_order(order_id)
            .await?
            .ok_or(StoreError::OrderNotFound(order_id))
    }
}
