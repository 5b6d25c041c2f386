use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Deserialize;
use validator::Validate;

use super::cart::load_catalog;
use super::AppState;
use crate::domain::aggregates::{coupon::normalize_code, Address, Cart, Coupon, Notification, Order};
use crate::domain::pricing::{quote, Quote};
use crate::error::{EcommerceError, Result};
use crate::middleware::Customer;

#[derive(Debug, Default, Deserialize)]
pub struct QuoteRequest {
    pub coupon_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(email)]
    pub email: String,
    #[validate]
    pub shipping_address: Address,
    pub coupon_code: Option<String>,
}

async fn find_coupon(s: &AppState, code: Option<&str>) -> Result<Option<Coupon>> {
    let Some(code) = code.map(normalize_code).filter(|c| !c.is_empty()) else { return Ok(None) };
    let coupon = s.store.get_coupon(&code).await?.ok_or(EcommerceError::NotFound("coupon"))?;
    Ok(Some(coupon))
}

async fn quote_cart(s: &AppState, cart: &Cart, coupon_code: Option<&str>) -> Result<Quote> {
    if cart.is_empty() {
        return Err(EcommerceError::Validation("cart is empty".into()));
    }
    let ids: Vec<_> = cart.items.iter().map(|i| i.product_id).collect();
    let catalog = load_catalog(s, &ids).await?;
    let offers = s.store.list_offers().await?;
    let coupon = find_coupon(s, coupon_code).await?;
    let q = quote(&cart.items, &catalog, &offers, coupon.as_ref(), &s.config.pricing_policy(), Utc::now())?;
    for line in &q.lines {
        let in_stock = catalog.get(&line.product_id).is_some_and(|p| p.is_purchasable(line.quantity));
        if !in_stock {
            return Err(EcommerceError::InsufficientInventory(line.product_id));
        }
    }
    Ok(q)
}

/// Prices the cart as checkout would, without placing anything.
pub async fn preview(State(s): State<AppState>, customer: Customer, Json(req): Json<QuoteRequest>) -> Result<Json<Quote>> {
    let cart = s.store.load_cart(customer.id()).await?;
    Ok(Json(quote_cart(&s, &cart, req.coupon_code.as_deref()).await?))
}

pub async fn checkout(
    State(s): State<AppState>,
    customer: Customer,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>)> {
    req.validate()?;
    let cart = s.store.load_cart(customer.id()).await?;
    let q = quote_cart(&s, &cart, req.coupon_code.as_deref()).await?;

    let mut order = Order::from_quote(customer.id(), req.email.trim(), req.shipping_address, &q);
    s.store.place_order(&order).await?;
    tracing::info!(
        order_id = %order.id,
        order_number = %order.order_number,
        customer_id = %customer.id(),
        total = %order.total,
        "order placed"
    );

    s.notify(Notification::order_placed(&order)).await;
    s.publish(order.take_events()).await;
    Ok((StatusCode::CREATED, Json(order)))
}
