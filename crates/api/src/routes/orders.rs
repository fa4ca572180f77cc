//! Order history and admin order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use checkout::{CheckoutError, IdentityService};
use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};
use store::{Order, OrderStatus};

use crate::error::ApiError;
use crate::session::Session;
use crate::state::{AppState, StorefrontStore};

#[derive(Deserialize)]
pub struct SetStatusRequest {
    pub status: String,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: String,
    pub subtotal: String,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub owner: String,
    pub email: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub total: String,
    pub total_cents: i64,
    pub lines: Vec<OrderLineResponse>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            owner: order.owner.name,
            email: order.owner.email,
            address: order.address,
            created_at: order.created_at,
            status: order.status,
            total: order.total.to_decimal_string(),
            total_cents: order.total.cents(),
            lines: order
                .lines
                .into_iter()
                .map(|line| OrderLineResponse {
                    product_id: line.product_id.as_i64(),
                    product_name: line.product_name,
                    quantity: line.quantity,
                    unit_price: line.unit_price.to_decimal_string(),
                    subtotal: line.subtotal.to_decimal_string(),
                })
                .collect(),
        }
    }
}

fn to_responses(orders: Vec<Order>) -> Vec<OrderResponse> {
    orders.into_iter().map(OrderResponse::from).collect()
}

/// GET /orders/mine — the signed-in customer's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn mine<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    Session(session): Session,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let customer = state
        .identity
        .current_customer(&session)
        .await
        .ok_or(CheckoutError::NotSignedIn)?;

    let orders = state.orders.list_by_owner(&customer.identity()).await?;
    Ok(Json(to_responses(orders)))
}

/// GET /admin/orders — every order, newest first.
#[tracing::instrument(skip(state))]
pub async fn list_all<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.orders.list_all().await?;
    Ok(Json(to_responses(orders)))
}

/// GET /admin/orders/{id} — order detail with lines.
#[tracing::instrument(skip(state))]
pub async fn get<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .orders
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json(order.into()))
}

/// PUT /admin/orders/{id}/status — move an order to another status.
#[tracing::instrument(skip(state, req))]
pub async fn set_status<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<SetStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let status: OrderStatus = req
        .status
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid status: {}", req.status)))?;

    let order = state.orders.set_status(order_id, status).await?;
    Ok(Json(order.into()))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid order ID: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}
