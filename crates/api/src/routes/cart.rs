//! Session cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use checkout::CartView;
use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::session::Session;
use crate::state::{AppState, StorefrontStore};

#[derive(Deserialize)]
pub struct SetQuantityRequest {
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct CartLineResponse {
    pub product_id: i64,
    pub product_name: String,
    pub unit_price: String,
    pub quantity: u32,
    pub subtotal: String,
    pub available: u32,
}

#[derive(Serialize)]
pub struct CartResponse {
    pub lines: Vec<CartLineResponse>,
    pub total: String,
    pub total_cents: i64,
}

impl From<CartView> for CartResponse {
    fn from(view: CartView) -> Self {
        Self {
            lines: view
                .lines
                .into_iter()
                .map(|line| CartLineResponse {
                    product_id: line.product_id.as_i64(),
                    product_name: line.product_name,
                    unit_price: line.unit_price.to_decimal_string(),
                    quantity: line.quantity,
                    subtotal: line.subtotal.to_decimal_string(),
                    available: line.available,
                })
                .collect(),
            total: view.total.to_decimal_string(),
            total_cents: view.total.cents(),
        }
    }
}

async fn priced<S: StorefrontStore>(
    state: &AppState<S>,
    session: &Session,
) -> Result<Json<CartResponse>, ApiError> {
    let view = state.carts.view(&session.0).await?;
    Ok(Json(view.into()))
}

/// GET /cart — the session cart priced with current prices.
#[tracing::instrument(skip(state))]
pub async fn view<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
) -> Result<Json<CartResponse>, ApiError> {
    priced(&state, &session).await
}

/// POST /cart/items/{product_id} — add one unit.
#[tracing::instrument(skip(state))]
pub async fn add<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(product_id): Path<i64>,
) -> Result<Json<CartResponse>, ApiError> {
    state
        .carts
        .add_item(&session.0, ProductId::new(product_id))
        .await?;
    priced(&state, &session).await
}

/// PUT /cart/items/{product_id} — set the quantity; zero removes the entry.
#[tracing::instrument(skip(state, req))]
pub async fn set_quantity<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(product_id): Path<i64>,
    Json(req): Json<SetQuantityRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    state
        .carts
        .set_quantity(&session.0, ProductId::new(product_id), req.quantity)
        .await?;
    priced(&state, &session).await
}

/// DELETE /cart/items/{product_id} — remove the entry.
#[tracing::instrument(skip(state))]
pub async fn remove<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    session: Session,
    Path(product_id): Path<i64>,
) -> Result<Json<CartResponse>, ApiError> {
    state
        .carts
        .remove_item(&session.0, ProductId::new(product_id))
        .await;
    priced(&state, &session).await
}
