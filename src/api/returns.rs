use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::orders::announce;
use super::AppState;
use crate::domain::aggregates::{fully_returned, Notification, ReturnItem, ReturnRequest, ReturnStatus};
use crate::error::{EcommerceError, Result};
use crate::middleware::Customer;
use crate::store::ReturnFilter;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReturn {
    pub items: Vec<ReturnItem>,
    #[validate(length(min = 1, max = 1000))]
    pub reason: String,
}

pub async fn request_return(
    State(s): State<AppState>,
    customer: Customer,
    Path(order_id): Path<Uuid>,
    Json(req): Json<CreateReturn>,
) -> Result<(StatusCode, Json<ReturnRequest>)> {
    req.validate()?;
    let order = s
        .store
        .get_order(order_id)
        .await?
        .filter(|o| o.is_owned_by(customer.id()))
        .ok_or(EcommerceError::NotFound("order"))?;
    let previous = s.store.list_returns(&ReturnFilter::Order(order_id)).await?;
    let mut request =
        ReturnRequest::open(&order, req.items, req.reason.trim(), &previous, s.config.return_window_days, Utc::now())?;
    s.store.insert_return(&request).await?;
    tracing::info!(return_id = %request.id, order_id = %order_id, "return requested");
    s.notify(Notification::return_update(&request)).await;
    s.publish(request.take_events()).await;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_my_returns(State(s): State<AppState>, customer: Customer) -> Result<Json<Vec<ReturnRequest>>> {
    Ok(Json(s.store.list_returns(&ReturnFilter::Customer(customer.id().to_string())).await?))
}

#[derive(Debug, Deserialize)]
pub struct ReturnParams {
    pub order_id: Option<Uuid>,
    pub customer_id: Option<String>,
}

pub async fn admin_list_returns(State(s): State<AppState>, Query(p): Query<ReturnParams>) -> Result<Json<Vec<ReturnRequest>>> {
    let filter = match (p.order_id, p.customer_id) {
        (Some(order_id), _) => ReturnFilter::Order(order_id),
        (None, Some(customer_id)) => ReturnFilter::Customer(customer_id),
        (None, None) => ReturnFilter::All,
    };
    Ok(Json(s.store.list_returns(&filter).await?))
}

#[derive(Debug, Deserialize)]
pub struct ReturnStatusUpdate {
    pub status: String,
}

/// Moves a return along its workflow. Refunding puts the units back in stock
/// and settles the order's payment.
pub async fn admin_update_return(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReturnStatusUpdate>,
) -> Result<Json<ReturnRequest>> {
    let next = ReturnStatus::parse(&req.status)
        .ok_or_else(|| EcommerceError::Validation(format!("unknown return status {:?}", req.status)))?;
    let mut request = s.store.get_return(id).await?.ok_or(EcommerceError::NotFound("return"))?;
    let from = request.status;
    request.advance(next)?;

    if next == ReturnStatus::Refunded {
        let mut order = s.store.get_order(request.order_id).await?.ok_or(EcommerceError::NotFound("order"))?;
        let order_from = order.status;
        let siblings = s.store.list_returns(&ReturnFilter::Order(order.id)).await?;
        order.record_return_refund(fully_returned(&order, &siblings, &request))?;
        s.store.refund_return(&request, &order, order_from).await?;
        announce(&s, &mut order).await;
    } else {
        s.store.update_return(&request, from).await?;
    }

    tracing::info!(return_id = %id, status = next.as_str(), "return updated");
    s.notify(Notification::return_update(&request)).await;
    s.publish(request.take_events()).await;
    Ok(Json(request))
}
