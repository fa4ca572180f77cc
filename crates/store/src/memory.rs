use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    NewProduct, Order, OrderId, OrderStatus, OwnerIdentity, Product, ProductId, Result,
    StoreError,
    store::{InventoryStore, OrderStore, StoreTransaction, validate_new_product},
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

type ProductRow = Arc<Mutex<Product>>;

/// In-memory store implementation.
///
/// Each product row sits behind its own mutex. A transaction keeps the owned
/// guards of the rows it locked and stages its writes next to them; commit
/// copies the staged stock into the guarded rows and publishes the staged
/// orders before any guard is released.
#[derive(Clone)]
pub struct InMemoryStore {
    products: Arc<RwLock<BTreeMap<ProductId, ProductRow>>>,
    orders: Arc<RwLock<Vec<Order>>>,
    next_product_id: Arc<AtomicI64>,
    fail_next_commit: Arc<AtomicBool>,
    lock_timeout: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            products: Arc::default(),
            orders: Arc::default(),
            next_product_id: Arc::new(AtomicI64::new(1)),
            fail_next_commit: Arc::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long a transaction waits for a row lock before giving up.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Makes the next commit fail as if the store had become unreachable.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    async fn row(&self, product_id: ProductId) -> Result<ProductRow> {
        self.products
            .read()
            .await
            .get(&product_id)
            .cloned()
            .ok_or(StoreError::ProductNotFound(product_id))
    }
}

/// Transaction handed out by [`InMemoryStore::begin`].
pub struct InMemoryTransaction {
    store: InMemoryStore,
    locked: BTreeMap<ProductId, OwnedMutexGuard<Product>>,
    staged_stock: BTreeMap<ProductId, u32>,
    staged_orders: Vec<Order>,
}

impl InMemoryTransaction {
    fn current(&self, product_id: ProductId) -> Option<Product> {
        self.locked.get(&product_id).map(|guard| {
            let mut product = (**guard).clone();
            if let Some(stock) = self.staged_stock.get(&product_id) {
                product.stock = *stock;
            }
            product
        })
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn get_for_update(&mut self, product_id: ProductId) -> Result<Product> {
        if let Some(product) = self.current(product_id) {
            return Ok(product);
        }

        let row = self.store.row(product_id).await?;
        let guard = tokio::time::timeout(self.store.lock_timeout, row.lock_owned())
            .await
            .map_err(|_elapsed| StoreError::LockTimeout(product_id))?;

        let product = (*guard).clone();
        self.locked.insert(product_id, guard);
        tracing::debug!(%product_id, stock = product.stock, "product row locked");
        Ok(product)
    }

    async fn decrement_stock(&mut self, product_id: ProductId, amount: u32) -> Result<()> {
        let available = self
            .current(product_id)
            .ok_or(StoreError::NotLocked(product_id))?
            .stock;

        let remaining = available
            .checked_sub(amount)
            .ok_or(StoreError::StockUnderflow {
                product_id,
                available,
                requested: amount,
            })?;

        self.staged_stock.insert(product_id, remaining);
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.staged_orders.push(order.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTransaction {
            store,
            mut locked,
            staged_stock,
            staged_orders,
        } = *self;

        if store.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "commit rejected by the store".to_string(),
            ));
        }

        let mut orders = store.orders.write().await;
        for (product_id, stock) in staged_stock {
            if let Some(row) = locked.get_mut(&product_id) {
                row.stock = stock;
            }
        }
        orders.extend(staged_orders);
        drop(orders);

        // Row guards are released only after the orders are visible.
        drop(locked);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            store: self.clone(),
            locked: BTreeMap::new(),
            staged_stock: BTreeMap::new(),
            staged_orders: Vec::new(),
        }))
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row = self.products.read().await.get(&product_id).cloned();
        match row {
            Some(row) => Ok(Some(row.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows: Vec<ProductRow> = self.products.read().await.values().cloned().collect();

        let mut products = Vec::with_capacity(rows.len());
        for row in rows {
            products.push(row.lock().await.clone());
        }
        Ok(products)
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        validate_new_product(&product)?;

        let id = ProductId::new(self.next_product_id.fetch_add(1, Ordering::SeqCst));
        let product = product.into_product(id);
        self.products
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(product.clone())));
        Ok(product)
    }
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.reverse();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.iter().find(|o| o.id == order_id).cloned())
    }

    async fn list_by_owner(&self, owner: &OwnerIdentity) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let owned = orders
            .iter()
            .filter(|o| o.owner.name == owner.name)
            .cloned()
            .collect();
        Ok(newest_first(owned))
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        let orders = self.orders.read().await.clone();
        Ok(newest_first(orders))
    }

    async fn set_status(&self, order_id: OrderId, status: OrderStatus) -> Result<OrderStatus> {
        let mut orders = self.orders.write().await;
        let order = orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        let previous = order.status;
        order.status = status;
        Ok(previous)
    }
}
