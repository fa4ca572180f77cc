//! Checkout engine: turns a cart into a confirmed order.

use std::time::Instant;

use common::SessionId;
use store::{InventoryStore, Order, OrderLine, OwnerIdentity, Product};

use crate::cart::{Cart, CartStore};
use crate::error::{CheckoutError, Result, Shortfall, ValidationError};
use crate::identity::IdentityService;

/// Confirms orders against the inventory store.
///
/// Each confirmation runs in one store transaction: product rows are locked in
/// ascending id order, every shortfall is collected, and only when all lines
/// can be served are the order, its lines and the stock decrements written
/// together. The engine keeps no state between calls; concurrent checkouts
/// coordinate through the store's row locks.
pub struct CheckoutEngine<S, I, C>
where
    S: InventoryStore,
    I: IdentityService,
    C: CartStore,
{
    store: S,
    identity: I,
    carts: C,
}

impl<S, I, C> CheckoutEngine<S, I, C>
where
    S: InventoryStore,
    I: IdentityService,
    C: CartStore,
{
    /// Creates a new checkout engine.
    pub fn new(store: S, identity: I, carts: C) -> Self {
        Self {
            store,
            identity,
            carts,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn identity(&self) -> &I {
        &self.identity
    }

    pub fn carts(&self) -> &C {
        &self.carts
    }

    /// Checks out the cart of the customer signed in on `session`.
    ///
    /// The delivery address is `address_override` when given and non-blank,
    /// otherwise the customer's address on file. Only when the order commits are
    /// the ordered quantities taken out of the cart; anything added to the
    /// session meanwhile stays.
    #[tracing::instrument(skip(self))]
    pub async fn checkout(
        &self,
        session: &SessionId,
        address_override: Option<String>,
    ) -> Result<Order> {
        let customer = self
            .identity
            .current_customer(session)
            .await
            .ok_or(CheckoutError::NotSignedIn)?;

        let address = address_override
            .map(|address| address.trim().to_string())
            .filter(|address| !address.is_empty())
            .unwrap_or_else(|| customer.delivery_address());

        let cart = self.carts.load(session).await;
        let order = self
            .confirm_order(&customer.identity(), &address, &cart)
            .await?;

        self.carts.remove_ordered(session, &cart).await;
        Ok(order)
    }

    /// Reserves stock for every cart entry and persists the order.
    ///
    /// Either the order, its lines and all stock decrements are committed
    /// together, or nothing is written.
    #[tracing::instrument(skip(self, owner, cart), fields(owner = %owner.name, entries = cart.len()))]
    pub async fn confirm_order(
        &self,
        owner: &OwnerIdentity,
        address: &str,
        cart: &Cart,
    ) -> Result<Order> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let started = Instant::now();

        let result = self.reserve_and_persist(owner, address, cart).await;

        match &result {
            Ok(order) => {
                metrics::counter!("checkout_confirmed_total").increment(1);
                metrics::histogram!("checkout_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(
                    order_id = %order.id,
                    total = %order.total,
                    lines = order.lines.len(),
                    "order confirmed"
                );
            }
            Err(CheckoutError::InsufficientStock(shortfalls)) => {
                metrics::counter!("checkout_insufficient_stock_total").increment(1);
                tracing::warn!(shortfalls = shortfalls.len(), "checkout rejected: insufficient stock");
            }
            Err(err @ CheckoutError::TransientStoreFailure(_)) => {
                metrics::counter!("checkout_transient_failures_total").increment(1);
                tracing::warn!(error = %err, "checkout aborted by a transient store failure");
            }
            Err(err @ CheckoutError::ContractViolation(_)) => {
                tracing::error!(error = %err, "checkout hit a store contract violation");
            }
            Err(err @ CheckoutError::Store(_)) => {
                tracing::error!(error = %err, "checkout failed in the store");
            }
            Err(err) => {
                tracing::debug!(error = %err, "checkout rejected");
            }
        }

        result
    }

    async fn reserve_and_persist(
        &self,
        owner: &OwnerIdentity,
        address: &str,
        cart: &Cart,
    ) -> Result<Order> {
        validate_cart(cart)?;

        if self.identity.is_blocked(owner).await {
            return Err(CheckoutError::BlockedAccount);
        }

        let mut tx = self.store.begin().await?;

        // Cart entries iterate in ascending product id, so every checkout
        // acquires row locks in the same global order.
        let mut reserved: Vec<(Product, u32)> = Vec::with_capacity(cart.len());
        let mut shortfalls = Vec::new();
        for (product_id, requested) in cart.entries() {
            let product = tx.get_for_update(product_id).await?;
            if product.stock < requested {
                shortfalls.push(Shortfall {
                    product_id,
                    product_name: product.name.clone(),
                    available: product.stock,
                    requested,
                });
            }
            reserved.push((product, requested));
        }

        if !shortfalls.is_empty() {
            if let Err(err) = tx.rollback().await {
                tracing::warn!(error = %err, "rollback after stock shortfall failed");
            }
            return Err(CheckoutError::InsufficientStock(shortfalls));
        }

        // Amounts are checked before any write; returning drops `tx`, which
        // rolls back the row locks.
        let mut lines = Vec::with_capacity(reserved.len());
        for (product, quantity) in &reserved {
            let line = OrderLine::for_product(product, *quantity)
                .filter(|line| line.subtotal.is_storable())
                .ok_or(ValidationError::AmountTooLarge(product.id))?;
            lines.push(line);
        }
        let order = Order::place(owner.clone(), address, lines)
            .filter(|order| order.total.is_storable())
            .ok_or(ValidationError::TotalTooLarge)?;

        tx.insert_order(&order).await?;
        for (product, quantity) in &reserved {
            tx.decrement_stock(product.id, *quantity).await?;
        }
        tx.commit().await?;

        Ok(order)
    }
}

fn validate_cart(cart: &Cart) -> std::result::Result<(), ValidationError> {
    if cart.is_empty() {
        return Err(ValidationError::EmptyCart);
    }
    match cart.entries().find(|(_, quantity)| *quantity == 0) {
        Some((product_id, _)) => Err(ValidationError::NonPositiveQuantity(product_id)),
        None => Ok(()),
    }
}
