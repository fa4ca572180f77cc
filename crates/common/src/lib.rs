//! Shared identifiers and value types used by every storefront crate.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{OrderId, OrderLineId, ProductId, SessionId};
