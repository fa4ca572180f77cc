use async_trait::async_trait;

use crate::{
    NewProduct, Order, OrderId, OrderStatus, OwnerIdentity, Product, ProductId, Result, StoreError,
};

/// A unit of work against the inventory and order tables.
///
/// Every product row read through [`get_for_update`](Self::get_for_update)
/// stays exclusively locked until the transaction ends. Dropping a transaction
/// without calling [`commit`](Self::commit) rolls it back and releases its
/// locks; callers never unlock rows themselves.
///
/// Callers locking several rows must do so in ascending [`ProductId`] order so
/// two transactions over overlapping products cannot deadlock.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Locks a product row for the rest of the transaction and returns its
    /// current state, including writes already staged by this transaction.
    ///
    /// Blocks while another transaction holds the row, up to the store's lock
    /// timeout.
    async fn get_for_update(&mut self, product_id: ProductId) -> Result<Product>;

    /// Decrements the stock of a product locked by this transaction.
    ///
    /// Fails with [`StoreError::NotLocked`] if the row was not locked first,
    /// and with [`StoreError::StockUnderflow`] if `amount` exceeds the stock.
    async fn decrement_stock(&mut self, product_id: ProductId, amount: u32) -> Result<()>;

    /// Persists an order and all of its lines as part of this transaction.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Makes every write of the transaction visible at once and releases its locks.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discards every write of the transaction and releases its locks.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Product storage with transactional stock updates.
///
/// All implementations must be thread-safe (Send + Sync) and must serialize
/// concurrent transactions on each product row.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Opens a new transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    /// Reads a product without locking it.
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>>;

    /// Lists every product, ordered by ID.
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Adds a product to the catalog and returns it with its assigned ID.
    async fn create_product(&self, product: NewProduct) -> Result<Product>;
}

/// Read and status-update access to confirmed orders.
///
/// Orders are only ever created through [`StoreTransaction::insert_order`].
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Loads an order with its lines.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Lists the orders placed under `owner`'s name, newest first.
    async fn list_by_owner(&self, owner: &OwnerIdentity) -> Result<Vec<Order>>;

    /// Lists every order, newest first.
    async fn list_all(&self) -> Result<Vec<Order>>;

    /// Overwrites the status of an order and returns the previous status.
    ///
    /// Any status may follow any other.
    async fn set_status(&self, order_id: OrderId, status: OrderStatus) -> Result<OrderStatus>;
}

/// Validates a product before it is written to the catalog.
pub fn validate_new_product(product: &NewProduct) -> Result<()> {
    if product.name.trim().is_empty() {
        return Err(StoreError::InvalidProduct(
            "product name cannot be empty".to_string(),
        ));
    }

    if product.price.is_negative() {
        return Err(StoreError::InvalidProduct(format!(
            "price cannot be negative, got {}",
            product.price
        )));
    }

    if !product.price.is_storable() {
        return Err(StoreError::InvalidProduct(format!(
            "price cannot exceed {}, got {}",
            crate::Money::MAX_STORABLE,
            product.price
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Money;

    #[test]
    fn rejects_blank_names() {
        let product = NewProduct::new("   ", Money::from_cents(100), 1);
        assert!(matches!(
            validate_new_product(&product),
            Err(StoreError::InvalidProduct(_))
        ));
    }

    #[test]
    fn rejects_negative_prices() {
        let product = NewProduct::new("Widget", Money::from_cents(-1), 1);
        assert!(validate_new_product(&product).is_err());
    }

    #[test]
    fn rejects_prices_past_the_stored_range() {
        let product = NewProduct::new("Vault", Money::from_cents(10_000_000_000), 1);
        assert!(matches!(
            validate_new_product(&product),
            Err(StoreError::InvalidProduct(_))
        ));

        let product = NewProduct::new("Vault", Money::MAX_STORABLE, 1);
        assert!(validate_new_product(&product).is_ok());
    }

    #[test]
    fn accepts_free_products() {
        let product = NewProduct::new("Sticker", Money::zero(), 0);
        assert!(validate_new_product(&product).is_ok());
    }
}
