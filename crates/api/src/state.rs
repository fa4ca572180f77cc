//! Shared application state.

use checkout::{
    CartService, CheckoutEngine, InMemoryCartStore, InMemoryIdentityService, OrderService,
};
use store::{InventoryStore, OrderStore};

/// A backend that serves both the catalog and the orders.
pub trait StorefrontStore: InventoryStore + OrderStore + Clone + 'static {}

impl<T> StorefrontStore for T where T: InventoryStore + OrderStore + Clone + 'static {}

/// Shared application state accessible from all handlers.
pub struct AppState<S: StorefrontStore> {
    pub checkout: CheckoutEngine<S, InMemoryIdentityService, InMemoryCartStore>,
    pub carts: CartService<S, InMemoryCartStore>,
    pub orders: OrderService<S>,
    pub identity: InMemoryIdentityService,
    pub store: S,
}

impl<S: StorefrontStore> AppState<S> {
    /// Wires the services around one store, with in-memory sessions and carts.
    pub fn new(store: S) -> Self {
        let identity = InMemoryIdentityService::new();
        let carts = InMemoryCartStore::new();

        Self {
            checkout: CheckoutEngine::new(store.clone(), identity.clone(), carts.clone()),
            carts: CartService::new(store.clone(), carts),
            orders: OrderService::new(store.clone()),
            identity,
            store,
        }
    }
}
