//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use serde_json::{Value, json};
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// The request carries no usable session.
    Unauthorized(String),
    /// Checkout rejected or failed.
    Checkout(CheckoutError),
    /// Store error outside of checkout.
    Store(StoreError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, error_body(msg)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, error_body(msg)),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, error_body(msg)),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Store(err) => store_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, error_body(msg))
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

fn error_body(message: String) -> Value {
    json!({ "error": message })
}

fn retryable_body(message: String) -> Value {
    json!({ "error": message, "retryable": true })
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, Value) {
    let message = err.to_string();
    match err {
        CheckoutError::Validation(_) => (StatusCode::BAD_REQUEST, error_body(message)),
        CheckoutError::InsufficientStock(shortfalls) => (
            StatusCode::CONFLICT,
            json!({ "error": message, "shortfalls": shortfalls }),
        ),
        CheckoutError::BlockedAccount => (StatusCode::FORBIDDEN, error_body(message)),
        CheckoutError::NotSignedIn => (StatusCode::UNAUTHORIZED, error_body(message)),
        CheckoutError::UnknownProduct(_) => (StatusCode::NOT_FOUND, error_body(message)),
        CheckoutError::TransientStoreFailure(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, retryable_body(message))
        }
        CheckoutError::ContractViolation(_) => {
            tracing::error!(error = %message, "checkout contract violation");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(message))
        }
        CheckoutError::Store(_) => {
            tracing::error!(error = %message, "checkout store failure");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(message))
        }
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, Value) {
    let message = err.to_string();
    match &err {
        StoreError::OrderNotFound(_) | StoreError::ProductNotFound(_) => {
            (StatusCode::NOT_FOUND, error_body(message))
        }
        StoreError::InvalidProduct(_) => (StatusCode::BAD_REQUEST, error_body(message)),
        _ if err.is_transient() => (StatusCode::SERVICE_UNAVAILABLE, retryable_body(message)),
        _ => {
            tracing::error!(error = %message, "store error");
            (StatusCode::INTERNAL_SERVER_ERROR, error_body(message))
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}
