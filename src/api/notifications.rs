use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::domain::aggregates::Notification;
use crate::error::{EcommerceError, Result};
use crate::middleware::Customer;

#[derive(Debug, Default, Deserialize)]
pub struct NotificationParams {
    #[serde(default)]
    pub unread: bool,
}

pub async fn list(
    State(s): State<AppState>,
    customer: Customer,
    Query(p): Query<NotificationParams>,
) -> Result<Json<Vec<Notification>>> {
    Ok(Json(s.store.list_notifications(customer.id(), p.unread).await?))
}

pub async fn mark_read(State(s): State<AppState>, customer: Customer, Path(id): Path<Uuid>) -> Result<StatusCode> {
    if !s.store.mark_notification_read(customer.id(), id).await? {
        return Err(EcommerceError::NotFound("notification"));
    }
    Ok(StatusCode::NO_CONTENT)
}
