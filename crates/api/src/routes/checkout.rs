//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;

use crate::error::ApiError;
use crate::routes::orders::OrderResponse;
use crate::session::Session;
use crate::state::{AppState, StorefrontStore};

#[derive(Deserialize, Default)]
pub struct CheckoutRequest {
    /// Ships to this address instead of the one on file.
    pub address: Option<String>,
}

/// POST /checkout — confirm the session cart as an order.
///
/// The body is optional; an empty body checks out to the address on file.
#[tracing::instrument(skip(state, body))]
pub async fn confirm<S: StorefrontStore>(
    State(state): State<Arc<AppState<S>>>,
    Session(session): Session,
    body: Bytes,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let req: CheckoutRequest = if body.is_empty() {
        CheckoutRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid checkout request: {e}")))?
    };

    let order = state.checkout.checkout(&session, req.address).await?;

    Ok((StatusCode::CREATED, Json(order.into())))
}
