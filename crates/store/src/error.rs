use thiserror::Error;

use crate::{OrderId, ProductId};

/// SQLSTATE codes that mean "the same work may succeed if retried".
const TRANSIENT_SQLSTATES: [&str; 4] = [
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available
    "57014", // query_canceled (statement_timeout)
];

/// Errors that can occur when interacting with the inventory or order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Stock was modified for a product whose row lock is not held by the
    /// transaction.
    #[error("Product {0} is not locked by this transaction")]
    NotLocked(ProductId),

    /// A decrement would have driven the stock counter below zero.
    #[error("Stock underflow for product {product_id}: available {available}, requested {requested}")]
    StockUnderflow {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    /// The product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A product record failed validation before being written.
    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    /// Waiting for a product row lock exceeded the configured timeout.
    #[error("Timed out waiting for the lock on product {0}")]
    LockTimeout(ProductId),

    /// The store could not be reached or refused the write.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A persisted record could not be decoded into a domain value.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true when retrying the whole operation unchanged may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::LockTimeout(_) | StoreError::Unavailable(_) => true,
            StoreError::Database(err) => is_transient_sqlx(err),
            _ => false,
        }
    }

    /// Returns true for errors that only a caller breaking the locking
    /// protocol can produce.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            StoreError::NotLocked(_) | StoreError::StockUnderflow { .. }
        )
    }
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| TRANSIENT_SQLSTATES.iter().any(|state| *state == code)),
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        _ => false,
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
