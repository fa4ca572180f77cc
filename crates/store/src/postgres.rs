use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Money, NewProduct, Order, OrderId, OrderLine, OrderLineId, OrderStatus, OwnerIdentity,
    Product, ProductId, Result, StoreError,
    store::{InventoryStore, OrderStore, StoreTransaction, validate_new_product},
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// PostgreSQL-backed store implementation.
///
/// Product locks are row locks taken with `SELECT ... FOR UPDATE`, so they
/// hold across every process attached to the same database.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Sets the `lock_timeout` applied to every checkout transaction.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock: non_negative(row.try_get("stock")?, "stock")?,
        })
    }

    fn row_to_line(row: &PgRow) -> Result<OrderLine> {
        Ok(OrderLine {
            id: OrderLineId::from_uuid(row.try_get::<Uuid, _>("id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            product_name: row.try_get("product_name")?,
            quantity: non_negative(row.try_get("quantity")?, "quantity")?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
        })
    }

    fn row_to_order(row: &PgRow, lines: Vec<OrderLine>) -> Result<Order> {
        let status: String = row.try_get("status")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            owner: OwnerIdentity {
                name: row.try_get("owner_name")?,
                email: row.try_get("owner_email")?,
            },
            address: row.try_get("address")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            status: status.parse()?,
            total: Money::from_cents(row.try_get("total_cents")?),
            lines,
        })
    }

    /// Loads the lines of the given order rows and assembles the orders,
    /// keeping the row order.
    async fn with_lines(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let line_rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, product_name, quantity,
                   (unit_price * 100)::BIGINT AS unit_price_cents,
                   (subtotal * 100)::BIGINT AS subtotal_cents
            FROM order_lines
            WHERE order_id = ANY($1)
            ORDER BY product_id ASC
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut lines: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for row in &line_rows {
            let order_id: Uuid = row.try_get("order_id")?;
            lines
                .entry(order_id)
                .or_default()
                .push(Self::row_to_line(row)?);
        }

        rows.iter()
            .map(|row| {
                let id: Uuid = row.try_get("id")?;
                Self::row_to_order(row, lines.remove(&id).unwrap_or_default())
            })
            .collect()
    }
}

fn non_negative(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_negative| StoreError::InvalidRecord(format!("negative {column}: {value}")))
}

fn lock_error(product_id: ProductId, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.code().as_deref() == Some("55P03")
    {
        return StoreError::LockTimeout(product_id);
    }
    StoreError::Database(err)
}

/// Transaction handed out by [`PostgresStore::begin`].
///
/// Dropping it without committing rolls the database transaction back.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
    locked: BTreeSet<ProductId>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn get_for_update(&mut self, product_id: ProductId) -> Result<Product> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, name, description, (price * 100)::BIGINT AS price_cents, stock
            FROM products
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(product_id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| lock_error(product_id, e))?;

        let product = match row {
            Some(row) => PostgresStore::row_to_product(&row)?,
            None => return Err(StoreError::ProductNotFound(product_id)),
        };

        self.locked.insert(product_id);
        tracing::debug!(%product_id, stock = product.stock, "product row locked");
        Ok(product)
    }

    async fn decrement_stock(&mut self, product_id: ProductId, amount: u32) -> Result<()> {
        if !self.locked.contains(&product_id) {
            return Err(StoreError::NotLocked(product_id));
        }

        let stock: i32 = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(product_id.as_i64())
            .fetch_one(&mut *self.tx)
            .await?;
        let available = non_negative(stock, "stock")?;

        if amount > available {
            return Err(StoreError::StockUnderflow {
                product_id,
                available,
                requested: amount,
            });
        }

        sqlx::query("UPDATE products SET stock = stock - $2 WHERE id = $1")
            .bind(product_id.as_i64())
            .bind(i64::from(amount))
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, owner_name, owner_email, address, created_at, status, total)
            VALUES ($1, $2, $3, $4, $5, $6, $7::BIGINT::NUMERIC / 100)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.owner.name)
        .bind(&order.owner.email)
        .bind(&order.address)
        .bind(order.created_at)
        .bind(order.status.as_str())
        .bind(order.total.cents())
        .execute(&mut *self.tx)
        .await?;

        for line in &order.lines {
            sqlx::query(
                r#"
                INSERT INTO order_lines (id, order_id, product_id, product_name, quantity, unit_price, subtotal)
                VALUES ($1, $2, $3, $4, $5::INTEGER, $6::BIGINT::NUMERIC / 100, $7::BIGINT::NUMERIC / 100)
                "#,
            )
            .bind(line.id.as_uuid())
            .bind(order.id.as_uuid())
            .bind(line.product_id.as_i64())
            .bind(&line.product_name)
            .bind(i64::from(line.quantity))
            .bind(line.unit_price.cents())
            .bind(line.subtotal.cents())
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PostgresTransaction {
            tx,
            locked: BTreeSet::new(),
        }))
    }

    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, name, description, (price * 100)::BIGINT AS price_cents, stock
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(product_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, (price * 100)::BIGINT AS price_cents, stock
            FROM products
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_product).collect()
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product> {
        validate_new_product(&product)?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO products (name, description, price, stock)
            VALUES ($1, $2, $3::BIGINT::NUMERIC / 100, $4::INTEGER)
            RETURNING id
            "#,
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(i64::from(product.stock))
        .fetch_one(&self.pool)
        .await?;

        Ok(product.into_product(ProductId::new(id)))
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_name, owner_email, address, created_at, status,
                   (total * 100)::BIGINT AS total_cents
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        Ok(self.with_lines(rows).await?.into_iter().next())
    }

    async fn list_by_owner(&self, owner: &OwnerIdentity) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_name, owner_email, address, created_at, status,
                   (total * 100)::BIGINT AS total_cents
            FROM orders
            WHERE owner_name = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(&owner.name)
        .fetch_all(&self.pool)
        .await?;

        self.with_lines(rows).await
    }

    async fn list_all(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_name, owner_email, address, created_at, status,
                   (total * 100)::BIGINT AS total_cents
            FROM orders
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        self.with_lines(rows).await
    }

    async fn set_status(&self, order_id: OrderId, status: OrderStatus) -> Result<OrderStatus> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<String> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(order_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        let previous: OrderStatus = previous
            .ok_or(StoreError::OrderNotFound(order_id))?
            .parse()?;

        sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(order_id.as_uuid())
            .bind(status.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(previous)
    }
}
