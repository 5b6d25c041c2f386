use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::domain::aggregates::{Notification, Order, OrderStatus};
use crate::domain::shipping::ShipmentEvent;
use crate::error::{EcommerceError, Result};
use crate::middleware::Customer;
use crate::store::{OrderQuery, Page, Pagination};

#[derive(Debug, Deserialize)]
pub struct OrderParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
    pub customer_id: Option<String>,
}

fn parse_status(raw: &str) -> Result<OrderStatus> {
    OrderStatus::parse(raw).ok_or_else(|| EcommerceError::Validation(format!("unknown order status {raw:?}")))
}

impl OrderParams {
    fn query(self, customer_id: Option<String>) -> Result<OrderQuery> {
        Ok(OrderQuery {
            pagination: Pagination::new(self.page, self.per_page),
            customer_id,
            status: self.status.as_deref().map(parse_status).transpose()?,
        })
    }
}

/// Another customer's order is reported as missing.
async fn load_owned(s: &AppState, customer: &Customer, id: Uuid) -> Result<Order> {
    s.store
        .get_order(id)
        .await?
        .filter(|o| o.is_owned_by(customer.id()))
        .ok_or(EcommerceError::NotFound("order"))
}

async fn load_order(s: &AppState, id: Uuid) -> Result<Order> {
    s.store.get_order(id).await?.ok_or(EcommerceError::NotFound("order"))
}

/// Persists a changed order, provided nobody moved it off `from` meanwhile,
/// then announces it.
async fn save_status_change(s: &AppState, order: &mut Order, from: OrderStatus) -> Result<()> {
    s.store.update_order(order, from).await?;
    announce(s, order).await;
    Ok(())
}

/// Logs the new state, notifies the customer and publishes the order's events.
pub(crate) async fn announce(s: &AppState, order: &mut Order) {
    tracing::info!(
        order_id = %order.id,
        status = order.status.as_str(),
        payment_status = order.payment_status.as_str(),
        "order updated"
    );
    s.notify(Notification::order_status(order)).await;
    s.publish(order.take_events()).await;
}

/// Cancelled orders give their units back in the same write.
async fn save_cancellation(s: &AppState, order: &mut Order, from: OrderStatus) -> Result<()> {
    s.store.cancel_order(order, from).await?;
    announce(s, order).await;
    Ok(())
}

pub async fn list_my_orders(
    State(s): State<AppState>,
    customer: Customer,
    Query(p): Query<OrderParams>,
) -> Result<Json<Page<Order>>> {
    let query = p.query(Some(customer.id().to_string()))?;
    Ok(Json(s.store.list_orders(&query).await?))
}

pub async fn get_my_order(State(s): State<AppState>, customer: Customer, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(load_owned(&s, &customer, id).await?))
}

pub async fn cancel_my_order(State(s): State<AppState>, customer: Customer, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    let mut order = load_owned(&s, &customer, id).await?;
    let from = order.status;
    order.cancel()?;
    save_cancellation(&s, &mut order, from).await?;
    Ok(Json(order))
}

pub async fn shipment_history(
    State(s): State<AppState>,
    customer: Customer,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ShipmentEvent>>> {
    let order = load_owned(&s, &customer, id).await?;
    Ok(Json(s.store.list_shipment_events(order.id).await?))
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

pub async fn admin_list_orders(State(s): State<AppState>, Query(mut p): Query<OrderParams>) -> Result<Json<Page<Order>>> {
    let customer_id = p.customer_id.take();
    Ok(Json(s.store.list_orders(&p.query(customer_id)?).await?))
}

pub async fn admin_get_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(load_order(&s, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
}

pub async fn admin_update_status(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusUpdate>,
) -> Result<Json<Order>> {
    let next = parse_status(&req.status)?;
    let mut order = load_order(&s, id).await?;
    let from = order.status;
    match next {
        OrderStatus::Confirmed => order.confirm()?,
        OrderStatus::Shipped => {
            let carrier = req.carrier.filter(|c| !c.trim().is_empty());
            let tracking = req.tracking_number.filter(|t| !t.trim().is_empty());
            let (Some(carrier), Some(tracking)) = (carrier, tracking) else {
                return Err(EcommerceError::Validation("shipping requires carrier and tracking_number".into()));
            };
            order.ship(carrier.trim(), tracking.trim())?;
        }
        OrderStatus::Delivered => order.deliver()?,
        OrderStatus::Cancelled => order.cancel()?,
        OrderStatus::Refunded => order.record_return_refund(true)?,
        other => {
            order.transition(other)?;
        }
    }
    if next == OrderStatus::Cancelled {
        save_cancellation(&s, &mut order, from).await?;
    } else {
        save_status_change(&s, &mut order, from).await?;
    }
    Ok(Json(order))
}

pub async fn admin_mark_paid(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    let mut order = load_order(&s, id).await?;
    let from = order.status;
    order.mark_paid()?;
    save_status_change(&s, &mut order, from).await?;
    Ok(Json(order))
}
