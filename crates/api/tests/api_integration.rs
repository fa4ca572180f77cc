//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use checkout::Customer;
use common::{Money, ProductId, SessionId};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{InMemoryStore, InventoryStore, NewProduct};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (axum::Router, Arc<AppState<InMemoryStore>>) {
    let state = api::create_default_state(InMemoryStore::new());
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

async fn seed_product(
    state: &AppState<InMemoryStore>,
    name: &str,
    cents: i64,
    stock: u32,
) -> ProductId {
    state
        .store
        .create_product(NewProduct::new(name, Money::from_cents(cents), stock))
        .await
        .unwrap()
        .id
}

async fn signed_in(state: &AppState<InMemoryStore>, username: &str) -> String {
    state
        .identity
        .register(
            Customer::new(username, format!("{username}@example.com"))
                .with_address(format!("{username} street 1")),
        )
        .await;
    let session = format!("session-{username}");
    assert!(
        state
            .identity
            .sign_in(&SessionId::new(session.as_str()), username)
            .await
    );
    session
}

fn request(method: &str, uri: &str, session: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(session) = session {
        builder = builder.header("x-session-id", session);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn fill_cart(app: &axum::Router, session: &str, product_id: ProductId, quantity: u32) {
    let uri = format!("/cart/items/{product_id}");
    let (status, _) = send(
        app,
        request("PUT", &uri, Some(session), Some(json!({ "quantity": quantity }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();

    let (status, json) = send(&app, request("GET", "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_product_catalog() {
    let (app, state) = setup();
    let lamp = seed_product(&state, "Lamp", 1000, 5).await;
    seed_product(&state, "Mug", 899, 2).await;

    let (status, json) = send(&app, request("GET", "/products", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 2);

    let (status, json) = send(&app, request("GET", &format!("/products/{lamp}"), None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "Lamp");
    assert_eq!(json["price"], "10.00");
    assert_eq!(json["stock"], 5);

    let (status, _) = send(&app, request("GET", "/products/999", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cart_editing() {
    let (app, state) = setup();
    let lamp = seed_product(&state, "Lamp", 1000, 5).await;
    let mug = seed_product(&state, "Mug", 250, 5).await;
    let session = "anonymous-cart";

    let lamp_uri = format!("/cart/items/{lamp}");
    send(&app, request("POST", &lamp_uri, Some(session), None)).await;
    let (status, json) = send(&app, request("POST", &lamp_uri, Some(session), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["lines"][0]["quantity"], 2);
    assert_eq!(json["total"], "20.00");

    fill_cart(&app, session, mug, 4).await;
    let (_, json) = send(&app, request("GET", "/cart", Some(session), None)).await;
    assert_eq!(json["lines"].as_array().unwrap().len(), 2);
    assert_eq!(json["total_cents"], 3000);

    let (status, json) = send(&app, request("DELETE", &lamp_uri, Some(session), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["lines"].as_array().unwrap().len(), 1);
    assert_eq!(json["total"], "10.00");
}

#[tokio::test]
async fn test_cart_requires_session_header() {
    let (app, _) = setup();

    let (status, json) = send(&app, request("GET", "/cart", None, None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].as_str().unwrap().contains("x-session-id"));
}

#[tokio::test]
async fn test_adding_unknown_product_is_not_found() {
    let (app, _) = setup();

    let (status, _) = send(&app, request("POST", "/cart/items/42", Some("s"), None)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_adding_past_max_quantity_is_bad_request() {
    let (app, state) = setup();
    let sticker = seed_product(&state, "Sticker", 0, 1).await;
    let session = "greedy-cart";
    fill_cart(&app, session, sticker, u32::MAX).await;

    let uri = format!("/cart/items/{sticker}");
    let (status, json) = send(&app, request("POST", &uri, Some(session), None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("too large"));
    let (_, json) = send(&app, request("GET", "/cart", Some(session), None)).await;
    assert_eq!(json["lines"][0]["quantity"], u32::MAX);
}

#[tokio::test]
async fn test_cart_amount_past_stored_range_is_bad_request() {
    let (app, state) = setup();
    let vault = seed_product(&state, "Vault", 9_999_999_999, 5).await;
    let session = "vault-cart";

    let uri = format!("/cart/items/{vault}");
    let (status, json) = send(
        &app,
        request("PUT", &uri, Some(session), Some(json!({ "quantity": 2 }))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json.get("retryable").is_none());
}

#[tokio::test]
async fn test_checkout_confirms_order() {
    let (app, state) = setup();
    let lamp = seed_product(&state, "Lamp", 1000, 5).await;
    let session = signed_in(&state, "ana").await;
    fill_cart(&app, &session, lamp, 3).await;

    let (status, json) = send(&app, request("POST", "/checkout", Some(&session), None)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["total"], "30.00");
    assert_eq!(json["status"], "pending");
    assert_eq!(json["owner"], "ana");
    assert_eq!(json["address"], "ana street 1");
    assert_eq!(json["lines"][0]["quantity"], 3);
    assert_eq!(json["lines"][0]["subtotal"], "30.00");

    let (_, cart) = send(&app, request("GET", "/cart", Some(&session), None)).await;
    assert!(cart["lines"].as_array().unwrap().is_empty());

    let (_, product) = send(&app, request("GET", &format!("/products/{lamp}"), None, None)).await;
    assert_eq!(product["stock"], 2);
}

#[tokio::test]
async fn test_checkout_with_address_override() {
    let (app, state) = setup();
    let lamp = seed_product(&state, "Lamp", 1000, 5).await;
    let session = signed_in(&state, "ana").await;
    fill_cart(&app, &session, lamp, 1).await;

    let (status, json) = send(
        &app,
        request(
            "POST",
            "/checkout",
            Some(&session),
            Some(json!({ "address": "Side St 9" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["address"], "Side St 9");
}

#[tokio::test]
async fn test_checkout_reports_shortfalls() {
    let (app, state) = setup();
    let lamp = seed_product(&state, "Lamp", 1000, 2).await;
    let session = signed_in(&state, "ana").await;
    fill_cart(&app, &session, lamp, 3).await;

    let (status, json) = send(&app, request("POST", "/checkout", Some(&session), None)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    let shortfalls = json["shortfalls"].as_array().unwrap();
    assert_eq!(shortfalls.len(), 1);
    assert_eq!(shortfalls[0]["product_name"], "Lamp");
    assert_eq!(shortfalls[0]["available"], 2);
    assert_eq!(shortfalls[0]["requested"], 3);

    let (_, cart) = send(&app, request("GET", "/cart", Some(&session), None)).await;
    assert_eq!(cart["lines"][0]["quantity"], 3);
}

#[tokio::test]
async fn test_checkout_rejections() {
    let (app, state) = setup();
    let lamp = seed_product(&state, "Lamp", 1000, 5).await;

    // no customer behind the session
    let (status, _) = send(&app, request("POST", "/checkout", Some("stranger"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // empty cart
    let session = signed_in(&state, "ana").await;
    let (status, _) = send(&app, request("POST", "/checkout", Some(&session), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // blocked account
    fill_cart(&app, &session, lamp, 1).await;
    state.identity.block("ana").await;
    let (status, json) = send(&app, request("POST", "/checkout", Some(&session), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "Account is blocked");

    // malformed body
    state.identity.unblock("ana").await;
    let bad = Request::builder()
        .method("POST")
        .uri("/checkout")
        .header("x-session-id", session.as_str())
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&app, bad).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_transient_failure_is_retryable() {
    let (app, state) = setup();
    let lamp = seed_product(&state, "Lamp", 1000, 5).await;
    let session = signed_in(&state, "ana").await;
    fill_cart(&app, &session, lamp, 1).await;

    state.store.fail_next_commit();
    let (status, json) = send(&app, request("POST", "/checkout", Some(&session), None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["retryable"], true);

    let (status, _) = send(&app, request("POST", "/checkout", Some(&session), None)).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_order_history_and_admin() {
    let (app, state) = setup();
    let lamp = seed_product(&state, "Lamp", 1000, 10).await;
    let ana = signed_in(&state, "ana").await;
    let bob = signed_in(&state, "bob").await;

    fill_cart(&app, &ana, lamp, 1).await;
    let (_, order) = send(&app, request("POST", "/checkout", Some(&ana), None)).await;
    fill_cart(&app, &bob, lamp, 2).await;
    send(&app, request("POST", "/checkout", Some(&bob), None)).await;

    let (status, mine) = send(&app, request("GET", "/orders/mine", Some(&ana), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);
    assert_eq!(mine[0]["id"], order["id"]);

    let (_, all) = send(&app, request("GET", "/admin/orders", None, None)).await;
    assert_eq!(all.as_array().unwrap().len(), 2);
    assert_eq!(all[0]["owner"], "bob");

    let order_id = order["id"].as_str().unwrap();
    let detail_uri = format!("/admin/orders/{order_id}");
    let (status, detail) = send(&app, request("GET", &detail_uri, None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["lines"][0]["product_name"], "Lamp");

    let status_uri = format!("/admin/orders/{order_id}/status");
    let (status, updated) = send(
        &app,
        request("PUT", &status_uri, None, Some(json!({ "status": "in_progress" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "in_progress");

    let (status, _) = send(
        &app,
        request("PUT", &status_uri, None, Some(json!({ "status": "shipped" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_order_lookup_errors() {
    let (app, _) = setup();

    let (status, _) = send(&app, request("GET", "/admin/orders/not-a-uuid", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = format!("/admin/orders/{}", common::OrderId::new());
    let (status, _) = send(&app, request("GET", &missing, None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        request(
            "PUT",
            &format!("{missing}/status"),
            None,
            Some(json!({ "status": "completed" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_orders_mine_requires_customer() {
    let (app, _) = setup();

    let (status, _) = send(&app, request("GET", "/orders/mine", Some("stranger"), None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_demo_seed_supports_checkout() {
    let (app, state) = setup();
    api::seed_demo(&state).await.unwrap();

    let (_, products) = send(&app, request("GET", "/products", None, None)).await;
    let first = products[0]["id"].as_i64().unwrap();
    let (status, _) = send(
        &app,
        request("POST", &format!("/cart/items/{first}"), Some(api::DEMO_SESSION), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, order) = send(
        &app,
        request("POST", "/checkout", Some(api::DEMO_SESSION), None),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["owner"], "demo");
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_checkout_counters() {
    let (app, state) = setup();
    let lamp = seed_product(&state, "Lamp", 1000, 5).await;
    let session = signed_in(&state, "ana").await;
    fill_cart(&app, &session, lamp, 1).await;
    send(&app, request("POST", "/checkout", Some(&session), None)).await;

    let response = app
        .oneshot(request("GET", "/metrics", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("checkout_attempts_total"));
    assert!(text.contains("checkout_confirmed_total"));
}
