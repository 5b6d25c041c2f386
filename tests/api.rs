use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use storefront::domain::aggregates::{Coupon, Discount, Offer, Product};
use storefront::domain::value_objects::{Money, Sku};
use storefront::{build_app, webhook, AppConfig, AppState, EventPublisher, MemoryStore, Store};

const SECRET: &str = "whsec_test";
const ADMIN_KEY: &str = "admin-key";

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
}

fn harness_with(config: AppConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store.clone(), config, EventPublisher::disabled());
    Harness { app: build_app(state), store }
}

fn harness() -> Harness {
    harness_with(AppConfig { shipping_webhook_secret: Some(SECRET.to_string()), ..AppConfig::default() })
}

async fn seed_product(store: &MemoryStore, sku: &str, cents: i64, stock: u32) -> Uuid {
    let mut product = Product::create(Sku::new(sku).unwrap(), format!("Product {sku}"), Money::usd(Decimal::new(cents, 2)));
    product.publish().unwrap();
    product.add_inventory(stock);
    store.insert_product(&product).await.unwrap();
    product.id
}

async fn send(app: &Router, method: &str, uri: &str, customer: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(c) = customer {
        builder = builder.header("x-customer-id", c);
    }
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json)
}

async fn send_webhook(app: &Router, payload: Value, secret: &str) -> (StatusCode, Value) {
    let body = payload.to_string();
    let signature = webhook::sign(secret, Utc::now().timestamp(), body.as_bytes()).unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/webhooks/shipping")
        .header("content-type", "application/json")
        .header(webhook::SIGNATURE_HEADER, signature)
        .body(Body::from(body))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn address() -> Value {
    json!({
        "name": "Ada Lovelace",
        "street1": "12 Analytical Way",
        "city": "London",
        "zip": "N1 9GU",
        "country": "GB"
    })
}

async fn place_order(h: &Harness, customer: &str, product_id: Uuid, quantity: u32) -> Value {
    let (status, _) =
        send(&h.app, "POST", "/api/v1/cart/items", Some(customer), Some(json!({"product_id": product_id, "quantity": quantity}))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, order) = send(
        &h.app,
        "POST",
        "/api/v1/checkout",
        Some(customer),
        Some(json!({"email": "ada@example.com", "shipping_address": address()})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    order
}

fn amount(v: &Value) -> Decimal {
    v["amount"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn health_reports_healthy() {
    let h = harness();
    let (status, body) = send(&h.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "storefront");
}

#[tokio::test]
async fn product_listing_hides_drafts() {
    let h = harness();
    let active = seed_product(&h.store, "ACT-1", 1000, 3).await;
    let draft = Product::create(Sku::new("DRAFT-1").unwrap(), "Draft", Money::usd(Decimal::new(500, 2)));
    h.store.insert_product(&draft).await.unwrap();

    let (status, body) = send(&h.app, "GET", "/api/v1/products", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body["data"].as_array().unwrap().iter().map(|p| p["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec![active.to_string().as_str()]);

    let (status, _) = send(&h.app, "GET", &format!("/api/v1/products/{}", draft.id), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cart_requires_customer_identity() {
    let h = harness();
    let (status, body) = send(&h.app, "GET", "/api/v1/cart", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn cart_sync_keeps_server_quantity_and_skips_unknown() {
    let h = harness();
    let a = seed_product(&h.store, "SYNC-A", 1000, 10).await;
    let b = seed_product(&h.store, "SYNC-B", 250, 10).await;
    let unknown = Uuid::new_v4();

    send(&h.app, "POST", "/api/v1/cart/items", Some("cust-1"), Some(json!({"product_id": a, "quantity": 2}))).await;
    let (status, body) = send(
        &h.app,
        "POST",
        "/api/v1/cart/sync",
        Some("cust-1"),
        Some(json!({"items": [
            {"product_id": a, "quantity": 5},
            {"product_id": b, "quantity": 1},
            {"product_id": unknown, "quantity": 1}
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["inserted"], json!([b]));
    assert_eq!(body["skipped"], json!([unknown]));

    let items = body["cart"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["product_id"], json!(a));
    assert_eq!(items[0]["quantity"], 2);
    assert_eq!(items[1]["product_id"], json!(b));
    assert_eq!(amount(&body["cart"]["subtotal"]), Decimal::new(2250, 2));
}

#[tokio::test]
async fn cart_rejects_quantity_beyond_stock() {
    let h = harness();
    let id = seed_product(&h.store, "LOW-1", 1000, 1).await;
    let (status, body) =
        send(&h.app, "POST", "/api/v1/cart/items", Some("cust-1"), Some(json!({"product_id": id, "quantity": 2}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "insufficient_inventory");
}

#[tokio::test]
async fn wishlist_sync_is_a_union_with_server_first() {
    let h = harness();
    let a = seed_product(&h.store, "WISH-A", 1000, 1).await;
    let b = seed_product(&h.store, "WISH-B", 1000, 1).await;

    let (status, _) = send(&h.app, "POST", "/api/v1/wishlist/items", Some("cust-1"), Some(json!({"product_id": a}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&h.app, "POST", "/api/v1/wishlist/items", Some("cust-1"), Some(json!({"product_id": a}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) =
        send(&h.app, "POST", "/api/v1/wishlist/sync", Some("cust-1"), Some(json!({"product_ids": [b, a]}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["wishlist"]["product_ids"], json!([a, b]));
    assert_eq!(body["inserted"], json!([b]));

    let (_, toggled) =
        send(&h.app, "POST", &format!("/api/v1/wishlist/items/{a}/toggle"), Some("cust-1"), None).await;
    assert_eq!(toggled["listed"], false);
    assert_eq!(toggled["wishlist"]["product_ids"], json!([b]));
}

#[tokio::test]
async fn checkout_places_order_and_decrements_stock() {
    let h = harness();
    let id = seed_product(&h.store, "CHK-1", 1000, 5).await;
    let order = place_order(&h, "cust-1", id, 2).await;

    assert_eq!(order["status"], "pending");
    assert_eq!(order["items"][0]["quantity"], 2);
    assert_eq!(amount(&order["subtotal"]), Decimal::new(2000, 2));

    let product = h.store.get_product(id).await.unwrap().unwrap();
    assert_eq!(product.inventory.value(), 3);

    let (_, cart) = send(&h.app, "GET", "/api/v1/cart", Some("cust-1"), None).await;
    assert_eq!(cart["items"], json!([]));

    let (_, notifications) = send(&h.app, "GET", "/api/v1/notifications", Some("cust-1"), None).await;
    assert_eq!(notifications[0]["kind"], "order_placed");
}

#[tokio::test]
async fn checkout_with_empty_cart_is_rejected() {
    let h = harness();
    let (status, body) = send(
        &h.app,
        "POST",
        "/api/v1/checkout",
        Some("cust-1"),
        Some(json!({"email": "ada@example.com", "shipping_address": address()})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn checkout_fails_when_stock_ran_out() {
    let h = harness();
    let id = seed_product(&h.store, "RACE-1", 1000, 2).await;
    send(&h.app, "POST", "/api/v1/cart/items", Some("cust-1"), Some(json!({"product_id": id, "quantity": 2}))).await;

    h.store.adjust_inventory(id, -1).await.unwrap();

    let (status, body) = send(
        &h.app,
        "POST",
        "/api/v1/checkout",
        Some("cust-1"),
        Some(json!({"email": "ada@example.com", "shipping_address": address()})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "insufficient_inventory");
    assert_eq!(h.store.get_product(id).await.unwrap().unwrap().inventory.value(), 1);
}

#[tokio::test]
async fn coupon_below_minimum_is_unprocessable() {
    let h = harness();
    let id = seed_product(&h.store, "CPN-1", 1000, 5).await;
    let mut coupon = Coupon::new("save10", Discount::Percentage(Decimal::new(10, 0))).unwrap();
    coupon.min_subtotal = Some(Decimal::new(100, 0));
    h.store.insert_coupon(&coupon).await.unwrap();
    send(&h.app, "POST", "/api/v1/cart/items", Some("cust-1"), Some(json!({"product_id": id, "quantity": 1}))).await;

    let (status, body) =
        send(&h.app, "POST", "/api/v1/checkout/quote", Some("cust-1"), Some(json!({"coupon_code": "SAVE10"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "coupon_rejected");

    let (status, _) =
        send(&h.app, "POST", "/api/v1/checkout/quote", Some("cust-1"), Some(json!({"coupon_code": "nope"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn coupon_discount_is_applied_and_redeemed() {
    let h = harness();
    let id = seed_product(&h.store, "CPN-2", 1000, 5).await;
    let coupon = Coupon::new("TENOFF", Discount::Percentage(Decimal::new(10, 0))).unwrap();
    h.store.insert_coupon(&coupon).await.unwrap();
    send(&h.app, "POST", "/api/v1/cart/items", Some("cust-1"), Some(json!({"product_id": id, "quantity": 2}))).await;

    let (status, order) = send(
        &h.app,
        "POST",
        "/api/v1/checkout",
        Some("cust-1"),
        Some(json!({"email": "ada@example.com", "shipping_address": address(), "coupon_code": " tenoff "})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(amount(&order["discount"]), Decimal::new(200, 2));
    assert_eq!(order["coupon_code"], "TENOFF");
    assert_eq!(h.store.get_coupon("TENOFF").await.unwrap().unwrap().times_used, 1);
}

#[tokio::test]
async fn orders_are_private_to_their_customer() {
    let h = harness();
    let id = seed_product(&h.store, "OWN-1", 1000, 5).await;
    let order = place_order(&h, "cust-1", id, 1).await;
    let uri = format!("/api/v1/orders/{}", order["id"].as_str().unwrap());

    let (status, _) = send(&h.app, "GET", &uri, Some("cust-1"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&h.app, "GET", &uri, Some("cust-2"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (_, listing) = send(&h.app, "GET", "/api/v1/orders", Some("cust-2"), None).await;
    assert_eq!(listing["total"], 0);
}

#[tokio::test]
async fn cancelling_returns_stock() {
    let h = harness();
    let id = seed_product(&h.store, "CXL-1", 1000, 5).await;
    let order = place_order(&h, "cust-1", id, 3).await;
    assert_eq!(h.store.get_product(id).await.unwrap().unwrap().inventory.value(), 2);

    let uri = format!("/api/v1/orders/{}/cancel", order["id"].as_str().unwrap());
    let (status, body) = send(&h.app, "POST", &uri, Some("cust-1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
    assert_eq!(h.store.get_product(id).await.unwrap().unwrap().inventory.value(), 5);

    let (status, body) = send(&h.app, "POST", &uri, Some("cust-1"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "invalid_transition");
}

#[tokio::test]
async fn shipping_webhook_advances_order_once() {
    let h = harness();
    let id = seed_product(&h.store, "SHIP-1", 1000, 5).await;
    let order = place_order(&h, "cust-1", id, 1).await;
    let order_id = order["id"].as_str().unwrap();

    let event = json!({
        "event_id": "evt-1",
        "order_id": order_id,
        "tracking_number": "1Z999",
        "carrier": "UPS",
        "status": "in_transit"
    });
    let (status, ack) = send_webhook(&h.app, event.clone(), SECRET).await;
    assert_eq!(status, StatusCode::OK, "{ack}");
    assert_eq!(ack["result"], "applied");
    assert_eq!(ack["order_status"], "shipped");

    let (status, ack) = send_webhook(&h.app, event, SECRET).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["result"], "duplicate");
    assert_eq!(ack["order_status"], "shipped");

    let (_, stored) = send(&h.app, "GET", &format!("/api/v1/orders/{order_id}"), Some("cust-1"), None).await;
    assert_eq!(stored["tracking_number"], "1Z999");
    assert_eq!(stored["carrier"], "UPS");

    let (_, history) =
        send(&h.app, "GET", &format!("/api/v1/orders/{order_id}/shipments"), Some("cust-1"), None).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn late_carrier_update_is_ignored() {
    let h = harness();
    let id = seed_product(&h.store, "SHIP-2", 1000, 5).await;
    let order = place_order(&h, "cust-1", id, 1).await;
    let order_id = order["id"].as_str().unwrap();

    let delivered = json!({"event_id": "evt-d", "order_id": order_id, "carrier": "UPS", "status": "delivered"});
    let (_, ack) = send_webhook(&h.app, delivered, SECRET).await;
    assert_eq!(ack["order_status"], "delivered");

    let late = json!({"event_id": "evt-t", "order_id": order_id, "carrier": "UPS", "status": "In Transit"});
    let (status, ack) = send_webhook(&h.app, late, SECRET).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["result"], "ignored");
    assert_eq!(ack["order_status"], "delivered");
}

#[tokio::test]
async fn shipping_webhook_rejects_bad_input() {
    let h = harness();
    let id = seed_product(&h.store, "SHIP-3", 1000, 5).await;
    let order = place_order(&h, "cust-1", id, 1).await;
    let order_id = order["id"].as_str().unwrap();

    let event = json!({"event_id": "evt-x", "order_id": order_id, "carrier": "UPS", "status": "in_transit"});
    let (status, body) = send_webhook(&h.app, event, "wrong-secret").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let unknown_status = json!({"event_id": "evt-y", "order_id": order_id, "carrier": "UPS", "status": "teleported"});
    let (status, _) = send_webhook(&h.app, unknown_status, SECRET).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown_order = json!({"event_id": "evt-z", "order_id": Uuid::new_v4(), "carrier": "UPS", "status": "delivered"});
    let (status, _) = send_webhook(&h.app, unknown_order, SECRET).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn refunded_return_settles_the_order() {
    let h = harness();
    let id = seed_product(&h.store, "RET-1", 1000, 5).await;
    let order = place_order(&h, "cust-1", id, 2).await;
    let order_id = order["id"].as_str().unwrap();

    let delivered = json!({"event_id": "evt-ret", "order_id": order_id, "carrier": "UPS", "status": "delivered"});
    send_webhook(&h.app, delivered, SECRET).await;

    let (status, request) = send(
        &h.app,
        "POST",
        &format!("/api/v1/orders/{order_id}/returns"),
        Some("cust-1"),
        Some(json!({"items": [{"product_id": id, "quantity": 2}], "reason": "wrong size"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{request}");
    let return_uri = format!("/api/v1/admin/returns/{}/status", request["id"].as_str().unwrap());

    for step in ["approved", "received", "refunded"] {
        let (status, body) = send(&h.app, "PUT", &return_uri, None, Some(json!({"status": step}))).await;
        assert_eq!(status, StatusCode::OK, "{step}: {body}");
        assert_eq!(body["status"], step);
    }

    let (_, stored) = send(&h.app, "GET", &format!("/api/v1/orders/{order_id}"), Some("cust-1"), None).await;
    assert_eq!(stored["status"], "refunded");
    assert_eq!(stored["payment_status"], "refunded");
    assert_eq!(h.store.get_product(id).await.unwrap().unwrap().inventory.value(), 5);
}

#[tokio::test]
async fn return_rejected_before_delivery() {
    let h = harness();
    let id = seed_product(&h.store, "RET-2", 1000, 5).await;
    let order = place_order(&h, "cust-1", id, 1).await;
    let (status, _) = send(
        &h.app,
        "POST",
        &format!("/api/v1/orders/{}/returns", order["id"].as_str().unwrap()),
        Some("cust-1"),
        Some(json!({"items": [{"product_id": id, "quantity": 1}], "reason": "changed my mind"})),
    )
    .await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn notifications_are_marked_read_per_customer() {
    let h = harness();
    let id = seed_product(&h.store, "NTF-1", 1000, 5).await;
    place_order(&h, "cust-1", id, 1).await;

    let (_, unread) = send(&h.app, "GET", "/api/v1/notifications?unread=true", Some("cust-1"), None).await;
    let notification_id = unread[0]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/notifications/{notification_id}/read");

    let (status, _) = send(&h.app, "POST", &uri, Some("cust-2"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&h.app, "POST", &uri, Some("cust-1"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, unread) = send(&h.app, "GET", "/api/v1/notifications?unread=true", Some("cust-1"), None).await;
    assert_eq!(unread, json!([]));
}

#[tokio::test]
async fn admin_routes_require_bearer_key_when_configured() {
    let h = harness_with(AppConfig { admin_api_keys: vec![ADMIN_KEY.to_string()], ..AppConfig::default() });

    let (status, body) = send(&h.app, "GET", "/api/v1/admin/products", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let request = Request::builder()
        .uri("/api/v1/admin/products")
        .header("authorization", format!("Bearer {ADMIN_KEY}"))
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_creates_and_publishes_product() {
    let h = harness();
    let (status, product) = send(
        &h.app,
        "POST",
        "/api/v1/admin/products",
        None,
        Some(json!({"name": "Linen Shirt", "price": "49.50"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{product}");
    assert_eq!(product["status"], "draft");
    let id = product["id"].as_str().unwrap();

    let (status, published) = send(&h.app, "POST", &format!("/api/v1/admin/products/{id}/publish"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(published["status"], "active");

    let (status, adjusted) = send(
        &h.app,
        "POST",
        &format!("/api/v1/admin/products/{id}/inventory"),
        None,
        Some(json!({"delta": 4})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(adjusted["inventory"], 4);

    let (_, listing) = send(&h.app, "GET", "/api/v1/products", None, None).await;
    assert_eq!(listing["total"], 1);
}

#[tokio::test]
async fn live_offer_lowers_cart_price() {
    let h = harness();
    let id = seed_product(&h.store, "OFF-1", 2000, 5).await;
    let now = Utc::now();
    let offer = Offer::new("Spring", Decimal::new(25, 0), vec![id], None, now - Duration::hours(1), now + Duration::days(1)).unwrap();
    h.store.insert_offer(&offer).await.unwrap();

    let (_, offers) = send(&h.app, "GET", "/api/v1/offers", None, None).await;
    assert_eq!(offers[0]["id"], json!(offer.id));

    let (_, cart) =
        send(&h.app, "POST", "/api/v1/cart/items", Some("cust-1"), Some(json!({"product_id": id, "quantity": 1}))).await;
    let line = &cart["items"][0];
    assert_eq!(line["offer_id"], json!(offer.id));
    assert_eq!(amount(&line["unit_price"]), Decimal::new(1500, 2));
    assert_eq!(amount(&line["list_price"]), Decimal::new(2000, 2));
}

#[tokio::test]
async fn cart_sync_reports_zero_quantity_lines_as_skipped() {
    let h = harness();
    let a = seed_product(&h.store, "ZERO-A", 1000, 10).await;
    let b = seed_product(&h.store, "ZERO-B", 1000, 10).await;

    let (status, body) = send(
        &h.app,
        "POST",
        "/api/v1/cart/sync",
        Some("cust-1"),
        Some(json!({"items": [{"product_id": a, "quantity": 0}, {"product_id": b, "quantity": 1}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["inserted"], json!([b]));
    assert_eq!(body["skipped"], json!([a]));
}

#[tokio::test]
async fn reviews_feed_the_rating_summary_once_per_customer() {
    let h = harness();
    let id = seed_product(&h.store, "REV-1", 1000, 5).await;
    let uri = format!("/api/v1/products/{id}/reviews");

    let (status, review) =
        send(&h.app, "POST", &uri, Some("cust-1"), Some(json!({"rating": 5, "comment": "Lovely"}))).await;
    assert_eq!(status, StatusCode::CREATED, "{review}");
    assert_eq!(review["rating"], 5);
    let (status, _) = send(&h.app, "POST", &uri, Some("cust-2"), Some(json!({"rating": 4}))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&h.app, "POST", &uri, Some("cust-1"), Some(json!({"rating": 1}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");
    let (status, _) = send(&h.app, "POST", &uri, Some("cust-3"), Some(json!({"rating": 6}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, listing) = send(&h.app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["summary"]["count"], 2);
    assert_eq!(listing["summary"]["average"], 4.5);
    assert_eq!(listing["reviews"].as_array().unwrap().len(), 2);

    let (_, product) = send(&h.app, "GET", &format!("/api/v1/products/{id}"), None, None).await;
    assert_eq!(product["rating"]["count"], 2);
}

#[tokio::test]
async fn duplicate_category_slug_conflicts() {
    let h = harness();
    let (status, created) =
        send(&h.app, "POST", "/api/v1/admin/categories", None, Some(json!({"name": "Home Decor"}))).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["slug"], "home-decor");

    let (status, body) =
        send(&h.app, "POST", "/api/v1/admin/categories", None, Some(json!({"name": "home  decor"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");
}

#[tokio::test]
async fn shipping_webhook_finds_order_by_tracking_number() {
    let h = harness();
    let id = seed_product(&h.store, "TRK-1", 1000, 5).await;
    let order = place_order(&h, "cust-1", id, 1).await;
    let order_id = order["id"].as_str().unwrap();

    let (status, shipped) = send(
        &h.app,
        "PUT",
        &format!("/api/v1/admin/orders/{order_id}/status"),
        None,
        Some(json!({"status": "shipped", "carrier": "UPS", "tracking_number": "1ZTRACK"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{shipped}");

    let delivered = json!({"event_id": "evt-trk", "tracking_number": "1ZTRACK", "carrier": "UPS", "status": "delivered"});
    let (status, ack) = send_webhook(&h.app, delivered, SECRET).await;
    assert_eq!(status, StatusCode::OK, "{ack}");
    assert_eq!(ack["result"], "applied");
    assert_eq!(ack["order_id"], order_id);
    assert_eq!(ack["order_status"], "delivered");

    let stray = json!({"event_id": "evt-stray", "tracking_number": "NOPE", "carrier": "UPS", "status": "delivered"});
    let (status, body) = send_webhook(&h.app, stray, SECRET).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn shipping_by_admin_needs_carrier_and_tracking() {
    let h = harness();
    let id = seed_product(&h.store, "TRK-2", 1000, 5).await;
    let order = place_order(&h, "cust-1", id, 1).await;
    let uri = format!("/api/v1/admin/orders/{}/status", order["id"].as_str().unwrap());

    let (status, body) = send(&h.app, "PUT", &uri, None, Some(json!({"status": "shipped", "carrier": "UPS"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");

    let (status, _) =
        send(&h.app, "PUT", &uri, None, Some(json!({"status": "shipped", "carrier": " ", "tracking_number": "1Z"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, stored) = send(&h.app, "GET", &format!("/api/v1/orders/{}", order["id"].as_str().unwrap()), Some("cust-1"), None).await;
    assert_eq!(stored["status"], "pending");
}

#[tokio::test]
async fn listing_caps_page_size_and_searches_by_name() {
    let h = harness();
    for n in 0..101 {
        seed_product(&h.store, &format!("BULK-{n}"), 500, 1).await;
    }
    let mut candle = Product::create(Sku::new("CANDLE-1").unwrap(), "Beeswax Candle", Money::usd(Decimal::new(900, 2)));
    candle.publish().unwrap();
    h.store.insert_product(&candle).await.unwrap();

    let (status, page) = send(&h.app, "GET", "/api/v1/products?per_page=500", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["data"].as_array().unwrap().len(), 100);
    assert_eq!(page["total"], 102);

    let (_, second) = send(&h.app, "GET", "/api/v1/products?per_page=500&page=2", None, None).await;
    assert_eq!(second["data"].as_array().unwrap().len(), 2);

    let (_, found) = send(&h.app, "GET", "/api/v1/products?search=CANDLE", None, None).await;
    assert_eq!(found["total"], 1);
    assert_eq!(found["data"][0]["id"], json!(candle.id));
}
