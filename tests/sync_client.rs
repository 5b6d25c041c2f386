//! Login sync of the signed-out cart and wishlist against a mocked storefront.

use serde_json::{json, Value};
use storefront::client::{ClientError, LocalState, StorefrontClient};
use storefront::domain::aggregates::CartItem;
use uuid::Uuid;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str) -> StorefrontClient {
    StorefrontClient::new(base_url, "cust-42", 5).expect("client construction should not fail")
}

fn money(amount: &str) -> Value {
    json!({ "amount": amount, "currency": "USD" })
}

fn cart_body(lines: &[(Uuid, u32)]) -> Value {
    let items: Vec<Value> = lines
        .iter()
        .map(|(id, qty)| {
            json!({
                "product_id": id,
                "quantity": qty,
                "available": true,
                "in_stock": true,
                "name": "Candle",
                "sku": "CND-1",
                "list_price": money("9.00"),
                "unit_price": money("9.00"),
                "total": money("9.00"),
                "offer_id": null
            })
        })
        .collect();
    json!({
        "customer_id": "cust-42",
        "items": items,
        "item_count": lines.len(),
        "subtotal": money("9.00"),
        "updated_at": "2024-06-01T12:00:00Z"
    })
}

fn wishlist_body(ids: &[Uuid]) -> Value {
    json!({ "customer_id": "cust-42", "product_ids": ids, "updated_at": "2024-06-01T12:00:00Z" })
}

#[tokio::test]
async fn sync_pushes_local_state_and_adopts_server_state() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("state.json");
    let (server_item, local_item, unknown, wished) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    let mut local = LocalState::default();
    local.add_to_cart(local_item, 2);
    local.add_to_cart(unknown, 1);
    local.toggle_wishlist(wished);
    local.save(&state_path).unwrap();

    Mock::given(method("POST"))
        .and(path("/api/v1/cart/sync"))
        .and(header("x-customer-id", "cust-42"))
        .and(body_json(json!({ "items": [
            { "product_id": local_item, "quantity": 2 },
            { "product_id": unknown, "quantity": 1 }
        ]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cart": cart_body(&[(server_item, 3), (local_item, 2)]),
            "inserted": [local_item],
            "skipped": [unknown]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/wishlist/sync"))
        .and(body_json(json!({ "product_ids": [wished] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "wishlist": wishlist_body(&[wished]),
            "inserted": [wished],
            "skipped": []
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/cart"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cart_body(&[(server_item, 3), (local_item, 2)])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/wishlist"))
        .respond_with(ResponseTemplate::new(200).set_body_json(wishlist_body(&[wished])))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let summary = client.sync_on_login(&mut local, &state_path).await.expect("sync should succeed");

    assert_eq!(summary.cart_inserted, vec![local_item]);
    assert_eq!(summary.cart_skipped, vec![unknown]);
    assert_eq!(summary.wishlist_inserted, vec![wished]);
    assert_eq!(
        local.cart,
        vec![CartItem { product_id: server_item, quantity: 3 }, CartItem { product_id: local_item, quantity: 2 }]
    );
    assert_eq!(local.wishlist, vec![wished]);
    assert_eq!(LocalState::load(&state_path).unwrap(), local);
}

#[tokio::test]
async fn failed_sync_leaves_local_state_untouched() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("state.json");
    let item = Uuid::new_v4();

    let mut local = LocalState::default();
    local.add_to_cart(item, 1);
    local.save(&state_path).unwrap();
    let before = local.clone();

    Mock::given(method("POST"))
        .and(path("/api/v1/cart/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cart": cart_body(&[(item, 1)]),
            "inserted": [item],
            "skipped": []
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/cart"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": { "code": "internal_error", "message": "database unavailable" }
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client.sync_on_login(&mut local, &state_path).await.unwrap_err();

    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 503);
            assert_eq!(message, "database unavailable");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(local, before);
    assert_eq!(LocalState::load(&state_path).unwrap(), before);
}

#[tokio::test]
async fn empty_local_state_only_pulls() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("fresh").join("state.json");
    let (server_item, wished) = (Uuid::new_v4(), Uuid::new_v4());

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/cart"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cart_body(&[(server_item, 1)])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/wishlist"))
        .respond_with(ResponseTemplate::new(200).set_body_json(wishlist_body(&[wished])))
        .mount(&server)
        .await;

    let mut local = LocalState::default();
    let client = test_client(&server.uri());
    let summary = client.sync_on_login(&mut local, &state_path).await.expect("pull should succeed");

    assert!(summary.cart_inserted.is_empty());
    assert_eq!(local.cart, vec![CartItem { product_id: server_item, quantity: 1 }]);
    assert_eq!(local.wishlist, vec![wished]);
    assert!(state_path.exists());
}

#[test]
fn rejects_unparseable_base_url() {
    assert!(matches!(StorefrontClient::new("not a url", "cust-42", 5), Err(ClientError::InvalidUrl(_))));
}
