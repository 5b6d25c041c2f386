//! Carrier statuses reported by the shipping partner and their effect on orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::OrderStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarrierStatus {
    LabelCreated,
    PickedUp,
    InTransit,
    OutForDelivery,
    Delivered,
    FailedAttempt,
    Exception,
    ReturnedToSender,
}

impl CarrierStatus {
    pub const ALL: [CarrierStatus; 8] = [
        Self::LabelCreated, Self::PickedUp, Self::InTransit, Self::OutForDelivery,
        Self::Delivered, Self::FailedAttempt, Self::Exception, Self::ReturnedToSender,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LabelCreated => "label_created",
            Self::PickedUp => "picked_up",
            Self::InTransit => "in_transit",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::FailedAttempt => "failed_attempt",
            Self::Exception => "exception",
            Self::ReturnedToSender => "returned_to_sender",
        }
    }

    /// Accepts carrier spellings such as `IN-TRANSIT` or `Out For Delivery`.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c.to_ascii_lowercase() })
            .collect();
        Self::ALL.into_iter().find(|s| s.as_str() == normalized)
    }

    /// Order status this carrier status drives the order towards, if any.
    pub fn order_status(&self) -> Option<OrderStatus> {
        match self {
            Self::LabelCreated => Some(OrderStatus::Processing),
            Self::PickedUp | Self::InTransit | Self::OutForDelivery => Some(OrderStatus::Shipped),
            Self::Delivered => Some(OrderStatus::Delivered),
            Self::FailedAttempt | Self::Exception | Self::ReturnedToSender => None,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::LabelCreated => "Your shipping label has been created",
            Self::PickedUp => "Your parcel was picked up by the carrier",
            Self::InTransit => "Your parcel is in transit",
            Self::OutForDelivery => "Your parcel is out for delivery",
            Self::Delivered => "Your parcel was delivered",
            Self::FailedAttempt => "Delivery was attempted but not completed",
            Self::Exception => "The carrier reported a delivery exception",
            Self::ReturnedToSender => "Your parcel is being returned to us",
        }
    }
}

/// One carrier update in an order's shipment history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShipmentEvent {
    pub id: Uuid,
    pub event_id: String,
    pub order_id: Uuid,
    pub carrier: String,
    pub status: CarrierStatus,
    pub note: Option<String>,
    pub outcome: String,
    pub occurred_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_spelling() {
        assert_eq!(CarrierStatus::parse("IN-TRANSIT"), Some(CarrierStatus::InTransit));
        assert_eq!(CarrierStatus::parse(" Out For Delivery "), Some(CarrierStatus::OutForDelivery));
        assert_eq!(CarrierStatus::parse("teleported"), None);
    }

    #[test]
    fn mapping_table() {
        assert_eq!(CarrierStatus::LabelCreated.order_status(), Some(OrderStatus::Processing));
        assert_eq!(CarrierStatus::OutForDelivery.order_status(), Some(OrderStatus::Shipped));
        assert_eq!(CarrierStatus::Delivered.order_status(), Some(OrderStatus::Delivered));
        assert_eq!(CarrierStatus::ReturnedToSender.order_status(), None);
    }
}
