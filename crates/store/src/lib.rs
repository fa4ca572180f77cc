//! Inventory and order persistence for the storefront.
//!
//! The checkout path talks to the store through [`InventoryStore::begin`],
//! which hands out a [`StoreTransaction`]. Product rows locked through
//! [`StoreTransaction::get_for_update`] stay locked until the transaction is
//! committed, rolled back, or dropped.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use common::{Money, OrderId, OrderLineId, ProductId};
pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use model::{NewProduct, Order, OrderLine, OrderStatus, OwnerIdentity, Product};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use store::{InventoryStore, OrderStore, StoreTransaction, validate_new_product};
