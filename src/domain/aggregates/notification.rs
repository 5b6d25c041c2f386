//! In-app customer notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::{Order, ReturnRequest};
use crate::domain::shipping::CarrierStatus;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub customer_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind { OrderPlaced, OrderStatusChanged, ShipmentUpdate, ReturnUpdated }

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderPlaced => "order_placed",
            Self::OrderStatusChanged => "order_status_changed",
            Self::ShipmentUpdate => "shipment_update",
            Self::ReturnUpdated => "return_updated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "order_placed" => Some(Self::OrderPlaced),
            "order_status_changed" => Some(Self::OrderStatusChanged),
            "shipment_update" => Some(Self::ShipmentUpdate),
            "return_updated" => Some(Self::ReturnUpdated),
            _ => None,
        }
    }
}

impl Notification {
    pub fn new(customer_id: impl Into<String>, kind: NotificationKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(), customer_id: customer_id.into(), kind, title: title.into(), body: body.into(),
            read: false, created_at: Utc::now(),
        }
    }

    pub fn order_placed(order: &Order) -> Self {
        Self::new(
            &order.customer_id,
            NotificationKind::OrderPlaced,
            format!("Order {} received", order.order_number),
            format!("We received your order totalling {}.", order.total),
        )
    }

    pub fn order_status(order: &Order) -> Self {
        Self::new(
            &order.customer_id,
            NotificationKind::OrderStatusChanged,
            format!("Order {} is {}", order.order_number, order.status.as_str()),
            format!("Your order {} is now {}.", order.order_number, order.status.as_str()),
        )
    }

    pub fn shipment(order: &Order, status: CarrierStatus) -> Self {
        Self::new(
            &order.customer_id,
            NotificationKind::ShipmentUpdate,
            format!("Shipping update for {}", order.order_number),
            status.describe(),
        )
    }

    pub fn return_update(request: &ReturnRequest) -> Self {
        Self::new(
            &request.customer_id,
            NotificationKind::ReturnUpdated,
            "Return update",
            format!("Your return request is {}.", request.status.as_str()),
        )
    }
}
