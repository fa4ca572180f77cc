//! Identity collaborator: who is signed in and whether they may buy.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::SessionId;
use serde::{Deserialize, Serialize};
use store::OwnerIdentity;
use tokio::sync::RwLock;

/// Delivery address recorded when the customer has none on file.
pub const NO_ADDRESS: &str = "No address provided";

/// A storefront customer account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub username: String,
    pub email: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub blocked: bool,
}

impl Customer {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            address: None,
            phone: None,
            blocked: false,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// The owner snapshot copied onto orders.
    pub fn identity(&self) -> OwnerIdentity {
        OwnerIdentity::new(self.username.clone(), self.email.clone())
    }

    /// The address orders ship to, or [`NO_ADDRESS`] when none is on file.
    pub fn delivery_address(&self) -> String {
        self.address
            .as_deref()
            .map(str::trim)
            .filter(|address| !address.is_empty())
            .unwrap_or(NO_ADDRESS)
            .to_string()
    }
}

/// Session and account lookups consumed by checkout.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Returns the customer signed in on a session, if any.
    async fn current_customer(&self, session: &SessionId) -> Option<Customer>;

    /// Returns true if the account behind an owner identity is blocked.
    async fn is_blocked(&self, identity: &OwnerIdentity) -> bool;
}

#[derive(Debug, Default)]
struct IdentityState {
    customers: HashMap<String, Customer>,
    sessions: HashMap<SessionId, String>,
}

/// In-memory identity service for tests and the demo server.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityService {
    state: Arc<RwLock<IdentityState>>,
}

impl InMemoryIdentityService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a customer account.
    pub async fn register(&self, customer: Customer) {
        let mut state = self.state.write().await;
        tracing::info!(username = %customer.username, "customer registered");
        state.customers.insert(customer.username.clone(), customer);
    }

    /// Binds a session to a registered customer. Returns false for unknown
    /// usernames.
    pub async fn sign_in(&self, session: &SessionId, username: &str) -> bool {
        let mut state = self.state.write().await;
        if !state.customers.contains_key(username) {
            return false;
        }
        state.sessions.insert(session.clone(), username.to_string());
        true
    }

    pub async fn sign_out(&self, session: &SessionId) {
        self.state.write().await.sessions.remove(session);
    }

    /// Blocks a customer from purchasing. Returns false for unknown usernames.
    pub async fn block(&self, username: &str) -> bool {
        self.set_blocked(username, true).await
    }

    /// Lifts a block. Returns false for unknown usernames.
    pub async fn unblock(&self, username: &str) -> bool {
        self.set_blocked(username, false).await
    }

    /// Replaces the contact details of a customer. Orders already placed keep
    /// their snapshot.
    pub async fn update_profile(
        &self,
        username: &str,
        email: impl Into<String>,
        address: Option<String>,
    ) -> bool {
        let mut state = self.state.write().await;
        match state.customers.get_mut(username) {
            Some(customer) => {
                customer.email = email.into();
                customer.address = address;
                true
            }
            None => false,
        }
    }

    async fn set_blocked(&self, username: &str, blocked: bool) -> bool {
        let mut state = self.state.write().await;
        let Some(customer) = state.customers.get_mut(username) else {
            return false;
        };
        customer.blocked = blocked;
        if blocked {
            tracing::info!(username, action = "block", "customer access changed");
        } else {
            tracing::info!(username, action = "unblock", "customer access changed");
        }
        true
    }
}

#[async_trait]
impl IdentityService for InMemoryIdentityService {
    async fn current_customer(&self, session: &SessionId) -> Option<Customer> {
        let state = self.state.read().await;
        let username = state.sessions.get(session)?;
        state.customers.get(username).cloned()
    }

    async fn is_blocked(&self, identity: &OwnerIdentity) -> bool {
        self.state
            .read()
            .await
            .customers
            .get(&identity.name)
            .is_some_and(|customer| customer.blocked)
    }
}
