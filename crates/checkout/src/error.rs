//! Checkout error types.

use common::ProductId;
use serde::Serialize;
use store::StoreError;
use thiserror::Error;

/// One product whose requested quantity exceeds the stock on hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shortfall {
    pub product_id: ProductId,
    pub product_name: String,
    pub available: u32,
    pub requested: u32,
}

impl Shortfall {
    /// Units missing to satisfy the request.
    pub fn missing(&self) -> u32 {
        self.requested.saturating_sub(self.available)
    }
}

/// A cart that cannot be checked out as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The cart holds no entries.
    #[error("Cart is empty")]
    EmptyCart,

    /// A cart entry asks for zero units.
    #[error("Quantity for product {0} must be at least 1")]
    NonPositiveQuantity(ProductId),

    /// A cart entry would exceed the largest representable quantity.
    #[error("Quantity for product {0} is too large")]
    QuantityTooLarge(ProductId),

    /// A line subtotal does not fit the amount range orders are stored with.
    #[error("Amount for product {0} is too large")]
    AmountTooLarge(ProductId),

    /// The order total does not fit the amount range orders are stored with.
    #[error("Order total is too large")]
    TotalTooLarge,
}

/// Errors that can occur while confirming an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The cart was rejected as submitted. Nothing was written.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// One or more products lack stock. Every shortfall is listed.
    #[error("Insufficient stock for {} product(s)", .0.len())]
    InsufficientStock(Vec<Shortfall>),

    /// The customer account is blocked from purchasing.
    #[error("Account is blocked")]
    BlockedAccount,

    /// The session has no signed-in customer.
    #[error("No customer is signed in")]
    NotSignedIn,

    /// The cart references a product that is not in the catalog.
    #[error("Product not found: {0}")]
    UnknownProduct(ProductId),

    /// The store failed in a way that may succeed on retry. Nothing was written.
    #[error("Transient store failure: {0}")]
    TransientStoreFailure(#[source] StoreError),

    /// The store rejected a write that the locking protocol should have
    /// made impossible.
    #[error("Store contract violated: {0}")]
    ContractViolation(#[source] StoreError),

    /// The store failed permanently. Retrying the same checkout will not help.
    #[error("Store failure: {0}")]
    Store(#[source] StoreError),
}

impl CheckoutError {
    /// Returns true when the caller may retry the whole checkout unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckoutError::TransientStoreFailure(_))
    }

    /// Returns the shortfalls carried by an insufficient-stock error.
    pub fn shortfalls(&self) -> Option<&[Shortfall]> {
        match self {
            CheckoutError::InsufficientStock(shortfalls) => Some(shortfalls),
            _ => None,
        }
    }
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ProductNotFound(product_id) => CheckoutError::UnknownProduct(product_id),
            err if err.is_contract_violation() => CheckoutError::ContractViolation(err),
            err if err.is_transient() => CheckoutError::TransientStoreFailure(err),
            err => CheckoutError::Store(err),
        }
    }
}

/// Result type for checkout operations.
pub type Result<T> = std::result::Result<T, CheckoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_classified() {
        let err: CheckoutError = StoreError::LockTimeout(ProductId::new(1)).into();
        assert!(err.is_retryable());

        let err: CheckoutError = StoreError::ProductNotFound(ProductId::new(7)).into();
        assert!(matches!(err, CheckoutError::UnknownProduct(id) if id == ProductId::new(7)));

        let err: CheckoutError = StoreError::NotLocked(ProductId::new(2)).into();
        assert!(matches!(err, CheckoutError::ContractViolation(_)));
        assert!(!err.is_retryable());

        let err: CheckoutError = StoreError::InvalidRecord("bad status".to_string()).into();
        assert!(matches!(err, CheckoutError::Store(StoreError::InvalidRecord(_))));
        assert!(!err.is_retryable());
    }

    #[test]
    fn insufficient_stock_exposes_shortfalls() {
        let shortfall = Shortfall {
            product_id: ProductId::new(4),
            product_name: "Lamp".to_string(),
            available: 1,
            requested: 3,
        };
        assert_eq!(shortfall.missing(), 2);

        let err = CheckoutError::InsufficientStock(vec![shortfall.clone()]);
        assert_eq!(err.shortfalls(), Some(&[shortfall][..]));
        assert_eq!(err.to_string(), "Insufficient stock for 1 product(s)");
        assert!(CheckoutError::BlockedAccount.shortfalls().is_none());
    }
}
