//! HTTP surface: storefront routes under `/api/v1`, admin routes under
//! `/api/v1/admin`, and the carrier webhook.

mod cart;
mod catalog;
mod checkout;
mod marketing;
mod notifications;
mod orders;
mod returns;
mod webhooks;
mod wishlist;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::domain::aggregates::Notification;
use crate::domain::events::DomainEvent;
use crate::middleware::{request_id, require_admin, AdminAuth, CUSTOMER_HEADER, REQUEST_ID_HEADER};
use crate::publisher::EventPublisher;
use crate::store::Store;
use crate::webhook::SIGNATURE_HEADER;

pub use cart::{PricedCart, PricedLine};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub publisher: EventPublisher,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: AppConfig, publisher: EventPublisher) -> Self {
        Self { store, config: Arc::new(config), publisher }
    }

    /// Stores a notification. A failed insert is logged and does not fail the request.
    pub(crate) async fn notify(&self, notification: Notification) {
        if let Err(e) = self.store.insert_notification(&notification).await {
            tracing::error!(customer_id = %notification.customer_id, error = %e, "failed to store notification");
        }
    }

    pub(crate) async fn publish(&self, events: Vec<DomainEvent>) {
        if !events.is_empty() {
            self.publisher.publish_all(events).await;
        }
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(REQUEST_ID_HEADER),
            HeaderName::from_static(CUSTOMER_HEADER),
            HeaderName::from_static(SIGNATURE_HEADER),
        ])
}

fn storefront_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/products", get(catalog::list_products))
        .route("/api/v1/products/:id", get(catalog::get_product))
        .route("/api/v1/products/:id/reviews", get(catalog::list_reviews).post(catalog::create_review))
        .route("/api/v1/categories", get(catalog::list_categories))
        .route("/api/v1/categories/:id", get(catalog::get_category))
        .route("/api/v1/offers", get(marketing::live_offers))
        .route("/api/v1/cart", get(cart::get_cart).delete(cart::clear_cart))
        .route("/api/v1/cart/items", post(cart::add_item))
        .route("/api/v1/cart/items/:product_id", put(cart::update_item).delete(cart::remove_item))
        .route("/api/v1/cart/sync", post(cart::sync_cart))
        .route("/api/v1/wishlist", get(wishlist::get_wishlist))
        .route("/api/v1/wishlist/items", post(wishlist::add_item))
        .route("/api/v1/wishlist/items/:product_id", delete(wishlist::remove_item))
        .route("/api/v1/wishlist/items/:product_id/toggle", post(wishlist::toggle_item))
        .route("/api/v1/wishlist/sync", post(wishlist::sync_wishlist))
        .route("/api/v1/checkout/quote", post(checkout::preview))
        .route("/api/v1/checkout", post(checkout::checkout))
        .route("/api/v1/orders", get(orders::list_my_orders))
        .route("/api/v1/orders/:id", get(orders::get_my_order))
        .route("/api/v1/orders/:id/cancel", post(orders::cancel_my_order))
        .route("/api/v1/orders/:id/shipments", get(orders::shipment_history))
        .route("/api/v1/orders/:id/returns", post(returns::request_return))
        .route("/api/v1/returns", get(returns::list_my_returns))
        .route("/api/v1/notifications", get(notifications::list))
        .route("/api/v1/notifications/:id/read", post(notifications::mark_read))
        .route("/api/v1/webhooks/shipping", post(webhooks::shipping))
}

fn admin_router(auth: AdminAuth) -> Router<AppState> {
    Router::new()
        .route("/api/v1/admin/products", get(catalog::admin_list_products).post(catalog::create_product))
        .route(
            "/api/v1/admin/products/:id",
            get(catalog::admin_get_product).put(catalog::update_product).delete(catalog::archive_product),
        )
        .route("/api/v1/admin/products/:id/publish", post(catalog::publish_product))
        .route("/api/v1/admin/products/:id/inventory", post(catalog::adjust_inventory))
        .route("/api/v1/admin/categories", post(catalog::create_category))
        .route("/api/v1/admin/coupons", get(marketing::list_coupons).post(marketing::create_coupon))
        .route("/api/v1/admin/coupons/:code", axum::routing::patch(marketing::set_coupon_active))
        .route("/api/v1/admin/offers", get(marketing::list_offers).post(marketing::create_offer))
        .route("/api/v1/admin/orders", get(orders::admin_list_orders))
        .route("/api/v1/admin/orders/:id", get(orders::admin_get_order))
        .route("/api/v1/admin/orders/:id/status", put(orders::admin_update_status))
        .route("/api/v1/admin/orders/:id/pay", post(orders::admin_mark_paid))
        .route("/api/v1/admin/returns", get(returns::admin_list_returns))
        .route("/api/v1/admin/returns/:id/status", put(returns::admin_update_return))
        .route_layer(axum::middleware::from_fn_with_state(auth, require_admin))
}

pub fn build_app(state: AppState) -> Router {
    let auth = AdminAuth::new(state.config.admin_api_keys.clone());
    Router::new()
        .route("/health", get(health))
        .merge(storefront_router())
        .merge(admin_router(auth))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(request_id))
                .layer(TraceLayer::new_for_http())
                .layer(build_cors()),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    service: &'static str,
    database: &'static str,
    timestamp: DateTime<Utc>,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(Health { status: "healthy", service: "storefront", database: "ok", timestamp: Utc::now() }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(Health { status: "degraded", service: "storefront", database: "unavailable", timestamp: Utc::now() }),
            )
        }
    }
}
