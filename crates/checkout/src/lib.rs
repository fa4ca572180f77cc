//! Checkout core for the storefront.
//!
//! This crate turns a session cart into a confirmed order:
//! - [`CheckoutEngine`] validates the cart, locks the products in ascending ID
//!   order, reports every shortfall, and persists the order together with the
//!   stock decrements in one store transaction
//! - [`CartService`] manages the per-session cart through an injected [`CartStore`]
//! - [`OrderService`] lists orders and updates their status
//!
//! Sessions, customers and blocking belong to an external identity service,
//! reached through the [`IdentityService`] trait.

pub mod cart;
pub mod engine;
pub mod error;
pub mod identity;
pub mod orders;

pub use cart::{Cart, CartLine, CartService, CartStore, CartView, InMemoryCartStore};
pub use engine::CheckoutEngine;
pub use error::{CheckoutError, Result, Shortfall, ValidationError};
pub use identity::{Customer, IdentityService, InMemoryIdentityService, NO_ADDRESS};
pub use orders::OrderService;
