//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;
use crate::domain::value_objects::Money;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::pricing::Quote;
use crate::domain::shipping::CarrierStatus;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: String,
    pub email: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub items: Vec<LineItem>,
    pub subtotal: Money,
    pub discount: Money,
    pub shipping: Money,
    pub tax: Money,
    pub total: Money,
    pub coupon_code: Option<String>,
    pub shipping_address: Address,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem { pub product_id: Uuid, pub sku: String, pub name: String, pub quantity: u32, pub unit_price: Money, pub total: Money }

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Address {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 1, max = 200))]
    pub street1: String,
    pub street2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    pub state: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub zip: String,
    #[validate(length(min = 2, max = 56))]
    pub country: String,
    pub phone: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] Pending, Confirmed, Processing, Shipped, Delivered, Cancelled, Refunded }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus { #[default] Unfulfilled, Partial, Fulfilled }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus { #[default] Pending, Paid, PartiallyRefunded, Refunded, Voided }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending", Self::Confirmed => "confirmed", Self::Processing => "processing",
            Self::Shipped => "shipped", Self::Delivered => "delivered", Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending), "confirmed" => Some(Self::Confirmed),
            "processing" => Some(Self::Processing), "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered), "cancelled" => Some(Self::Cancelled),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }

    /// Position along the fulfilment path; `None` for cancelled/refunded.
    fn progress(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0), Self::Confirmed => Some(1), Self::Processing => Some(2),
            Self::Shipped => Some(3), Self::Delivered => Some(4),
            Self::Cancelled | Self::Refunded => None,
        }
    }

    pub fn is_cancellable(&self) -> bool { matches!(self, Self::Pending | Self::Confirmed | Self::Processing) }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match (self, next) {
            (Self::Cancelled | Self::Refunded, _) => false,
            (Self::Delivered, to) => to == Self::Refunded,
            (from, Self::Cancelled) => from.is_cancellable(),
            (from, Self::Refunded) => matches!(from, Self::Confirmed | Self::Processing),
            (from, to) => match (from.progress(), to.progress()) {
                (Some(a), Some(b)) => b > a,
                _ => false,
            },
        }
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending", Self::Paid => "paid", Self::PartiallyRefunded => "partially_refunded",
            Self::Refunded => "refunded", Self::Voided => "voided",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending), "paid" => Some(Self::Paid),
            "partially_refunded" => Some(Self::PartiallyRefunded), "refunded" => Some(Self::Refunded),
            "voided" => Some(Self::Voided),
            _ => None,
        }
    }
}

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Unfulfilled => "unfulfilled", Self::Partial => "partial", Self::Fulfilled => "fulfilled" }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s { "unfulfilled" => Some(Self::Unfulfilled), "partial" => Some(Self::Partial), "fulfilled" => Some(Self::Fulfilled), _ => None }
    }
}

/// What a carrier update did to an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ShipmentOutcome {
    Applied { from: OrderStatus, to: OrderStatus },
    Recorded,
    Ignored,
}

pub fn generate_order_number() -> String { format!("ORD-{:08}", rand::random::<u32>() % 100_000_000) }

impl Order {
    /// Builds a pending order from a checkout quote.
    pub fn from_quote(customer_id: impl Into<String>, email: impl Into<String>, shipping_address: Address, quote: &Quote) -> Self {
        let now = Utc::now();
        let items = quote.lines.iter().map(|l| LineItem {
            product_id: l.product_id, sku: l.sku.clone(), name: l.name.clone(), quantity: l.quantity,
            unit_price: l.unit_price.clone(), total: l.total.clone(),
        }).collect();
        let mut order = Self {
            id: Uuid::now_v7(), order_number: generate_order_number(), customer_id: customer_id.into(), email: email.into(),
            status: OrderStatus::Pending, payment_status: PaymentStatus::Pending, fulfillment_status: FulfillmentStatus::Unfulfilled,
            items, subtotal: quote.subtotal.clone(), discount: quote.discount.clone(), shipping: quote.shipping.clone(),
            tax: quote.tax.clone(), total: quote.total.clone(), coupon_code: quote.coupon_code.clone(),
            shipping_address, carrier: None, tracking_number: None, delivered_at: None, created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed { order_id: order.id, customer_id: order.customer_id.clone(), total: order.total.amount() }));
        order
    }

    pub fn is_owned_by(&self, customer_id: &str) -> bool { self.customer_id == customer_id }
    pub fn quantity_of(&self, product_id: Uuid) -> u32 {
        self.items.iter().filter(|i| i.product_id == product_id).map(|i| i.quantity).sum()
    }

    /// Moves to `next` if the status machine allows it. Returns the previous status.
    pub fn transition(&mut self, next: OrderStatus) -> Result<OrderStatus, OrderError> {
        let from = self.status;
        if !from.can_transition_to(next) { return Err(OrderError::InvalidTransition { from, to: next }); }
        self.status = next;
        if matches!(next, OrderStatus::Shipped | OrderStatus::Delivered) {
            self.fulfillment_status = FulfillmentStatus::Fulfilled;
        }
        self.touch();
        if next == OrderStatus::Delivered { self.delivered_at = Some(self.updated_at); }
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from, to: next }));
        match next {
            OrderStatus::Delivered => self.raise_event(DomainEvent::Order(OrderEvent::Delivered { order_id: self.id })),
            OrderStatus::Cancelled => self.raise_event(DomainEvent::Order(OrderEvent::Cancelled { order_id: self.id })),
            _ => {}
        }
        Ok(from)
    }

    pub fn confirm(&mut self) -> Result<(), OrderError> {
        if self.items.is_empty() { return Err(OrderError::NoItems); }
        self.transition(OrderStatus::Confirmed).map(|_| ())
    }

    pub fn mark_paid(&mut self) -> Result<(), OrderError> {
        if self.payment_status != PaymentStatus::Pending { return Err(OrderError::AlreadyPaid); }
        if matches!(self.status, OrderStatus::Cancelled | OrderStatus::Refunded) {
            return Err(OrderError::InvalidTransition { from: self.status, to: OrderStatus::Processing });
        }
        self.payment_status = PaymentStatus::Paid;
        if matches!(self.status, OrderStatus::Pending | OrderStatus::Confirmed) { self.transition(OrderStatus::Processing)?; }
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Paid { order_id: self.id }));
        Ok(())
    }

    pub fn ship(&mut self, carrier: impl Into<String>, tracking: impl Into<String>) -> Result<(), OrderError> {
        let (carrier, tracking) = (carrier.into(), tracking.into());
        self.transition(OrderStatus::Shipped)?;
        self.carrier = Some(carrier.clone());
        self.tracking_number = Some(tracking.clone());
        self.raise_event(DomainEvent::Order(OrderEvent::Shipped { order_id: self.id, carrier, tracking }));
        Ok(())
    }

    pub fn deliver(&mut self) -> Result<(), OrderError> { self.transition(OrderStatus::Delivered).map(|_| ()) }

    /// Cancels the order; a captured payment is marked refunded, otherwise voided.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        if !self.status.is_cancellable() { return Err(OrderError::CannotCancel); }
        self.transition(OrderStatus::Cancelled)?;
        self.payment_status = match self.payment_status {
            PaymentStatus::Paid => PaymentStatus::Refunded,
            _ => PaymentStatus::Voided,
        };
        Ok(())
    }

    /// Applies a carrier update using the status machine. Late or out-of-order
    /// updates are ignored rather than rejected.
    pub fn apply_carrier_status(&mut self, status: CarrierStatus, carrier: &str, tracking: Option<&str>) -> ShipmentOutcome {
        let Some(target) = status.order_status() else { return ShipmentOutcome::Recorded };
        if !self.status.can_transition_to(target) { return ShipmentOutcome::Ignored; }
        if target == OrderStatus::Shipped {
            self.carrier.get_or_insert_with(|| carrier.to_string());
            if let Some(t) = tracking { self.tracking_number.get_or_insert_with(|| t.to_string()); }
        }
        match self.transition(target) {
            Ok(from) => ShipmentOutcome::Applied { from, to: target },
            Err(_) => ShipmentOutcome::Ignored,
        }
    }

    /// Records a completed return refund. Fully returned orders become refunded.
    pub fn record_return_refund(&mut self, fully_returned: bool) -> Result<(), OrderError> {
        if self.status != OrderStatus::Delivered { return Err(OrderError::InvalidTransition { from: self.status, to: OrderStatus::Refunded }); }
        if fully_returned {
            self.transition(OrderStatus::Refunded)?;
            self.payment_status = PaymentStatus::Refunded;
        } else {
            self.payment_status = PaymentStatus::PartiallyRefunded;
            self.touch();
        }
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError { NoItems, CannotCancel, AlreadyPaid, InvalidTransition { from: OrderStatus, to: OrderStatus } }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoItems => write!(f, "No items"),
            Self::CannotCancel => write!(f, "Cannot cancel"),
            Self::AlreadyPaid => write!(f, "Payment already captured"),
            Self::InvalidTransition { from, to } => write!(f, "cannot move order from {} to {}", from.as_str(), to.as_str()),
        }
    }
}
