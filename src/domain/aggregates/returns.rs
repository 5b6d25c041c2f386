//! Return request Aggregate

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::aggregates::{Order, OrderStatus};
use crate::domain::events::{DomainEvent, ReturnEvent};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub id: Uuid,
    pub order_id: Uuid,
    pub customer_id: String,
    pub items: Vec<ReturnItem>,
    pub reason: String,
    pub status: ReturnStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnItem { pub product_id: Uuid, pub quantity: u32 }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus { #[default] Requested, Approved, Rejected, Received, Refunded }

impl ReturnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested", Self::Approved => "approved", Self::Rejected => "rejected",
            Self::Received => "received", Self::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(Self::Requested), "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected), "received" => Some(Self::Received),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }

    fn next_allowed(&self, next: ReturnStatus) -> bool {
        matches!(
            (self, next),
            (Self::Requested, Self::Approved | Self::Rejected) | (Self::Approved, Self::Received) | (Self::Received, Self::Refunded)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReturnError {
    #[error("only delivered orders can be returned")]
    NotDelivered,
    #[error("the return window of {0} days has closed")]
    WindowClosed(i64),
    #[error("a return needs at least one item")]
    NoItems,
    #[error("product {0} was not part of the order")]
    UnknownItem(Uuid),
    #[error("cannot return more units of {0} than were ordered")]
    TooMany(Uuid),
    #[error("cannot move return from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
}

impl ReturnRequest {
    /// Opens a return against a delivered order. `previous` are earlier returns for
    /// the same order; rejected ones do not count against the ordered quantity.
    pub fn open(
        order: &Order,
        items: Vec<ReturnItem>,
        reason: impl Into<String>,
        previous: &[ReturnRequest],
        window_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, ReturnError> {
        if order.status != OrderStatus::Delivered { return Err(ReturnError::NotDelivered); }
        let delivered_at = order.delivered_at.unwrap_or(order.updated_at);
        if now - delivered_at > Duration::days(window_days) { return Err(ReturnError::WindowClosed(window_days)); }
        let items = merge_lines(items)?;
        if items.is_empty() { return Err(ReturnError::NoItems); }
        for item in &items {
            let ordered = u64::from(order.quantity_of(item.product_id));
            if ordered == 0 { return Err(ReturnError::UnknownItem(item.product_id)); }
            let already: u64 = previous
                .iter()
                .filter(|r| r.status != ReturnStatus::Rejected)
                .map(|r| u64::from(r.quantity_of(item.product_id)))
                .sum();
            if already + u64::from(item.quantity) > ordered { return Err(ReturnError::TooMany(item.product_id)); }
        }
        let id = Uuid::now_v7();
        Ok(Self {
            id, order_id: order.id, customer_id: order.customer_id.clone(), items, reason: reason.into(),
            status: ReturnStatus::Requested, created_at: now, updated_at: now,
            events: vec![DomainEvent::Return(ReturnEvent::Requested { return_id: id, order_id: order.id })],
        })
    }

    pub fn quantity_of(&self, product_id: Uuid) -> u32 {
        self.items.iter().filter(|i| i.product_id == product_id).map(|i| i.quantity).sum()
    }

    pub fn advance(&mut self, next: ReturnStatus) -> Result<(), ReturnError> {
        if !self.status.next_allowed(next) {
            return Err(ReturnError::InvalidTransition { from: self.status.as_str(), to: next.as_str() });
        }
        self.status = next;
        self.updated_at = Utc::now();
        self.events.push(DomainEvent::Return(ReturnEvent::StatusChanged { return_id: self.id, status: next }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
}

/// One line per product, zero quantities dropped.
fn merge_lines(items: Vec<ReturnItem>) -> Result<Vec<ReturnItem>, ReturnError> {
    let mut merged: Vec<ReturnItem> = Vec::with_capacity(items.len());
    for item in items.into_iter().filter(|i| i.quantity > 0) {
        match merged.iter_mut().find(|m| m.product_id == item.product_id) {
            Some(line) => {
                line.quantity = line.quantity.checked_add(item.quantity).ok_or(ReturnError::TooMany(item.product_id))?;
            }
            None => merged.push(item),
        }
    }
    Ok(merged)
}

/// Whether `returns` (refunded ones, plus `current`) cover every unit of the order.
pub fn fully_returned(order: &Order, returns: &[ReturnRequest], current: &ReturnRequest) -> bool {
    order.items.iter().all(|line| {
        let returned: u32 = returns
            .iter()
            .filter(|r| r.id != current.id && r.status == ReturnStatus::Refunded)
            .chain(std::iter::once(current))
            .map(|r| r.quantity_of(line.product_id))
            .sum();
        returned >= order.quantity_of(line.product_id)
    })
}
