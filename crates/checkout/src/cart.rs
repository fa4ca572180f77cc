//! Session carts and the service that edits and prices them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, ProductId, SessionId};
use serde::{Deserialize, Serialize};
use store::InventoryStore;
use tokio::sync::RwLock;

use crate::error::{CheckoutError, Result, ValidationError};

/// A session's selection of products and quantities.
///
/// Entries iterate in ascending product id, which is also the order in which
/// checkout locks product rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    entries: BTreeMap<ProductId, u32>,
}

impl Cart {
    /// Creates an empty cart.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a cart from raw entries. Repeated product ids are summed,
    /// saturating at `u32::MAX`.
    pub fn from_entries(entries: impl IntoIterator<Item = (ProductId, u32)>) -> Self {
        let mut cart = Self::new();
        for (product_id, quantity) in entries {
            let held = cart.entries.entry(product_id).or_insert(0);
            *held = held.saturating_add(quantity);
        }
        cart
    }

    /// Adds one unit of a product and returns the new quantity.
    ///
    /// The cart is left unchanged when the quantity is already `u32::MAX`.
    pub fn add_one(&mut self, product_id: ProductId) -> std::result::Result<u32, ValidationError> {
        let next = self
            .quantity(product_id)
            .checked_add(1)
            .ok_or(ValidationError::QuantityTooLarge(product_id))?;
        self.entries.insert(product_id, next);
        Ok(next)
    }

    /// Sets the quantity of a product. Zero removes the entry.
    pub fn set_quantity(&mut self, product_id: ProductId, quantity: u32) {
        if quantity == 0 {
            self.entries.remove(&product_id);
        } else {
            self.entries.insert(product_id, quantity);
        }
    }

    /// Removes a product. Returns true if it was present.
    pub fn remove(&mut self, product_id: ProductId) -> bool {
        self.entries.remove(&product_id).is_some()
    }

    /// Returns the quantity held for a product, zero when absent.
    pub fn quantity(&self, product_id: ProductId) -> u32 {
        self.entries.get(&product_id).copied().unwrap_or(0)
    }

    /// Iterates entries in ascending product id.
    pub fn entries(&self) -> impl Iterator<Item = (ProductId, u32)> + '_ {
        self.entries.iter().map(|(id, quantity)| (*id, *quantity))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of units across all entries, saturating at `u32::MAX`.
    pub fn unit_count(&self) -> u32 {
        self.entries
            .values()
            .fold(0u32, |acc, quantity| acc.saturating_add(*quantity))
    }

    /// Takes the quantities held by `ordered` out of this cart.
    ///
    /// Entries that drop to zero are removed. Products absent from `ordered`
    /// and units added beyond the ordered quantity are kept.
    pub fn subtract(&mut self, ordered: &Cart) {
        for (product_id, quantity) in ordered.entries() {
            if let Some(held) = self.entries.get_mut(&product_id) {
                *held = held.saturating_sub(quantity);
                if *held == 0 {
                    self.entries.remove(&product_id);
                }
            }
        }
    }
}

/// Session-scoped cart persistence.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Loads the cart for a session, empty if none was saved.
    async fn load(&self, session: &SessionId) -> Cart;

    /// Replaces the cart for a session.
    async fn save(&self, session: &SessionId, cart: Cart);

    /// Drops the cart for a session.
    async fn clear(&self, session: &SessionId);

    /// Takes the quantities of a confirmed order out of the session cart,
    /// keeping anything added after the order was built.
    async fn remove_ordered(&self, session: &SessionId, ordered: &Cart) {
        let mut cart = self.load(session).await;
        cart.subtract(ordered);
        self.save(session, cart).await;
    }
}

/// In-memory cart store keyed by session id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartStore {
    carts: Arc<RwLock<HashMap<SessionId, Cart>>>,
}

impl InMemoryCartStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of sessions with a non-empty cart.
    pub async fn session_count(&self) -> usize {
        self.carts.read().await.len()
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn load(&self, session: &SessionId) -> Cart {
        self.carts
            .read()
            .await
            .get(session)
            .cloned()
            .unwrap_or_default()
    }

    async fn save(&self, session: &SessionId, cart: Cart) {
        let mut carts = self.carts.write().await;
        if cart.is_empty() {
            carts.remove(session);
        } else {
            carts.insert(session.clone(), cart);
        }
    }

    async fn clear(&self, session: &SessionId) {
        self.carts.write().await.remove(session);
    }

    async fn remove_ordered(&self, session: &SessionId, ordered: &Cart) {
        let mut carts = self.carts.write().await;
        if let Some(cart) = carts.get_mut(session) {
            cart.subtract(ordered);
            if cart.is_empty() {
                carts.remove(session);
            }
        }
    }
}

/// One priced line of a cart view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub subtotal: Money,
    /// Stock on hand when the view was built. Informational only.
    pub available: u32,
}

/// A cart priced with current catalog prices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub total: Money,
}

/// Edits and prices session carts against the catalog.
pub struct CartService<S, C>
where
    S: InventoryStore,
    C: CartStore,
{
    store: S,
    carts: C,
}

impl<S, C> CartService<S, C>
where
    S: InventoryStore,
    C: CartStore,
{
    pub fn new(store: S, carts: C) -> Self {
        Self { store, carts }
    }

    /// Adds one unit of a catalog product to the session cart.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(&self, session: &SessionId, product_id: ProductId) -> Result<Cart> {
        self.require_product(product_id).await?;
        let mut cart = self.carts.load(session).await;
        let quantity = cart.add_one(product_id)?;
        self.carts.save(session, cart.clone()).await;
        tracing::debug!(%product_id, quantity, "cart item added");
        Ok(cart)
    }

    /// Sets the quantity of a catalog product. Zero removes the entry.
    #[tracing::instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        session: &SessionId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Cart> {
        if quantity > 0 {
            self.require_product(product_id).await?;
        }
        let mut cart = self.carts.load(session).await;
        cart.set_quantity(product_id, quantity);
        self.carts.save(session, cart.clone()).await;
        Ok(cart)
    }

    /// Removes a product from the session cart.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, session: &SessionId, product_id: ProductId) -> Cart {
        let mut cart = self.carts.load(session).await;
        if cart.remove(product_id) {
            self.carts.save(session, cart.clone()).await;
        }
        cart
    }

    /// Prices the session cart with current catalog prices.
    ///
    /// Entries whose product left the catalog are skipped; checkout reports
    /// them as unknown products.
    pub async fn view(&self, session: &SessionId) -> Result<CartView> {
        let cart = self.carts.load(session).await;
        let mut view = CartView::default();

        for (product_id, quantity) in cart.entries() {
            let Some(product) = self.store.get_product(product_id).await? else {
                tracing::warn!(%product_id, "cart references a product missing from the catalog");
                continue;
            };
            let subtotal = product
                .price
                .multiply(quantity)
                .filter(Money::is_storable)
                .ok_or(ValidationError::AmountTooLarge(product_id))?;
            view.total = view
                .total
                .checked_add(subtotal)
                .filter(Money::is_storable)
                .ok_or(ValidationError::TotalTooLarge)?;
            view.lines.push(CartLine {
                product_id,
                product_name: product.name,
                unit_price: product.price,
                quantity,
                subtotal,
                available: product.stock,
            });
        }

        Ok(view)
    }

    async fn require_product(&self, product_id: ProductId) -> Result<()> {
        match self.store.get_product(product_id).await? {
            Some(_) => Ok(()),
            None => Err(CheckoutError::UnknownProduct(product_id)),
        }
    }
}
