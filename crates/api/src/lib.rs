//! HTTP API server for the storefront checkout.
//!
//! Provides REST endpoints for the catalog, session carts, checkout and order
//! management, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod session;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use checkout::Customer;
use common::{Money, SessionId};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{NewProduct, StoreError};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, StorefrontStore};

/// Session bound to the demo customer when the demo catalog is seeded.
pub const DEMO_SESSION: &str = "demo-session";

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: StorefrontStore>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/products", get(routes::products::list::<S>))
        .route("/products/{id}", get(routes::products::get::<S>))
        .route("/cart", get(routes::cart::view::<S>))
        .route(
            "/cart/items/{product_id}",
            post(routes::cart::add::<S>)
                .put(routes::cart::set_quantity::<S>)
                .delete(routes::cart::remove::<S>),
        )
        .route("/checkout", post(routes::checkout::confirm::<S>))
        .route("/orders/mine", get(routes::orders::mine::<S>))
        .route("/admin/orders", get(routes::orders::list_all::<S>))
        .route("/admin/orders/{id}", get(routes::orders::get::<S>))
        .route(
            "/admin/orders/{id}/status",
            put(routes::orders::set_status::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the default application state around a store.
pub fn create_default_state<S: StorefrontStore>(store: S) -> Arc<AppState<S>> {
    Arc::new(AppState::new(store))
}

/// Seeds a small catalog and a demo customer signed in on [`DEMO_SESSION`].
pub async fn seed_demo<S: StorefrontStore>(state: &AppState<S>) -> Result<(), StoreError> {
    let catalog = [
        ("Desk lamp", "Adjustable LED desk lamp", 2599, 12),
        ("Ceramic mug", "350 ml stoneware mug", 899, 40),
        ("Notebook", "A5 dotted notebook, 120 pages", 650, 25),
        ("Fountain pen", "Steel nib, medium", 3450, 3),
    ];

    for (name, description, cents, stock) in catalog {
        state
            .store
            .create_product(
                NewProduct::new(name, Money::from_cents(cents), stock).with_description(description),
            )
            .await?;
    }

    state
        .identity
        .register(Customer::new("demo", "demo@example.com").with_address("1 Demo Street"))
        .await;
    state
        .identity
        .sign_in(&SessionId::new(DEMO_SESSION), "demo")
        .await;

    tracing::info!(products = catalog.len(), session = DEMO_SESSION, "demo catalog seeded");
    Ok(())
}
