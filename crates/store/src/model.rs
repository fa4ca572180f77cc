//! Persisted records: products, orders and order lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Money, OrderId, OrderLineId, ProductId, StoreError};

/// A catalog product with its stock counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    /// Unit price, never negative.
    pub price: Money,
    pub stock: u32,
}

/// Fields for a product that has not been assigned an ID yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: u32,
}

impl NewProduct {
    /// Creates a new product with an empty description.
    pub fn new(name: impl Into<String>, price: Money, stock: u32) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            price,
            stock,
        }
    }

    /// Sets the product description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Attaches the store-assigned ID.
    pub fn into_product(self, id: ProductId) -> Product {
        Product {
            id,
            name: self.name,
            description: self.description,
            price: self.price,
            stock: self.stock,
        }
    }
}

/// Order fulfillment status.
///
/// ```text
/// Pending ──► InProgress ──► Completed
/// ```
///
/// The arrow is the expected flow; the store accepts any status from any
/// status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl OrderStatus {
    /// Returns the persisted name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Completed => "completed",
        }
    }

    /// Position along the expected flow, starting at 0 for `Pending`.
    pub fn stage(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::InProgress => 1,
            OrderStatus::Completed => 2,
        }
    }

    /// Returns true if moving from `self` to `next` goes against the expected flow.
    pub fn is_backwards_to(&self, next: OrderStatus) -> bool {
        next.stage() < self.stage()
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "in_progress" => Ok(OrderStatus::InProgress),
            "completed" => Ok(OrderStatus::Completed),
            other => Err(StoreError::InvalidRecord(format!(
                "unknown order status '{other}'"
            ))),
        }
    }
}

/// Snapshot of who placed an order, taken at confirmation time.
///
/// Later profile edits do not reach orders that were already placed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerIdentity {
    pub name: String,
    pub email: String,
}

impl OwnerIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// One purchased product within an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub product_id: ProductId,
    /// Product name at the time of purchase.
    pub product_name: String,
    pub quantity: u32,
    /// Unit price at the time of purchase.
    pub unit_price: Money,
    pub subtotal: Money,
}

impl OrderLine {
    /// Prices `quantity` units of `product` at its current price.
    ///
    /// Returns `None` when the subtotal overflows.
    pub fn for_product(product: &Product, quantity: u32) -> Option<Self> {
        let subtotal = product.price.multiply(quantity)?;
        Some(Self {
            id: OrderLineId::new(),
            product_id: product.id,
            product_name: product.name.clone(),
            quantity,
            unit_price: product.price,
            subtotal,
        })
    }
}

/// A confirmed order with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner: OwnerIdentity,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    /// Sum of the line subtotals.
    pub total: Money,
    pub lines: Vec<OrderLine>,
}

impl Order {
    /// Builds a pending order whose total is the sum of `lines`.
    ///
    /// Returns `None` when the total overflows.
    pub fn place(
        owner: OwnerIdentity,
        address: impl Into<String>,
        lines: Vec<OrderLine>,
    ) -> Option<Self> {
        let total = lines
            .iter()
            .try_fold(Money::zero(), |acc, line| acc.checked_add(line.subtotal))?;
        Some(Self {
            id: OrderId::new(),
            owner,
            address: address.into(),
            created_at: Utc::now(),
            status: OrderStatus::Pending,
            total,
            lines,
        })
    }

    /// Total number of units across all lines, saturating at `u32::MAX`.
    pub fn unit_count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0u32, |acc, line| acc.saturating_add(line.quantity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget(price_cents: i64) -> Product {
        NewProduct::new("Widget", Money::from_cents(price_cents), 5).into_product(ProductId::new(1))
    }

    #[test]
    fn line_subtotal_uses_unit_price() {
        let line = OrderLine::for_product(&widget(1000), 3).unwrap();
        assert_eq!(line.subtotal, Money::from_cents(3000));
        assert_eq!(line.unit_price, Money::from_cents(1000));
        assert_eq!(line.product_name, "Widget");
    }

    #[test]
    fn placed_order_is_pending_with_summed_total() {
        let gadget = NewProduct::new("Gadget", Money::from_cents(250), 1)
            .into_product(ProductId::new(2));
        let lines = vec![
            OrderLine::for_product(&widget(1000), 3).unwrap(),
            OrderLine::for_product(&gadget, 2).unwrap(),
        ];

        let order =
            Order::place(OwnerIdentity::new("ana", "ana@example.com"), "Main St 1", lines).unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total, Money::from_cents(3500));
        assert_eq!(order.unit_count(), 5);
    }

    #[test]
    fn overflowing_amounts_are_rejected() {
        let pricey = widget(9_999_999_999);
        assert!(OrderLine::for_product(&pricey, 1_000_000_000).is_none());

        let big = OrderLine::for_product(&widget(i64::MAX), 1).unwrap();
        let lines = vec![big.clone(), big];
        assert!(Order::place(OwnerIdentity::new("ana", "ana@example.com"), "Main St 1", lines).is_none());
    }

    #[test]
    fn status_parses_persisted_names() {
        assert_eq!("pending".parse::<OrderStatus>().unwrap(), OrderStatus::Pending);
        assert_eq!(
            "in_progress".parse::<OrderStatus>().unwrap(),
            OrderStatus::InProgress
        );
        assert_eq!(
            "completed".parse::<OrderStatus>().unwrap(),
            OrderStatus::Completed
        );
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&OrderStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn backwards_moves_are_detected() {
        assert!(OrderStatus::Completed.is_backwards_to(OrderStatus::Pending));
        assert!(OrderStatus::InProgress.is_backwards_to(OrderStatus::Pending));
        assert!(!OrderStatus::Pending.is_backwards_to(OrderStatus::Completed));
        assert!(!OrderStatus::Pending.is_backwards_to(OrderStatus::Pending));
    }
}
