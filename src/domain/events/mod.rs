//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{OrderStatus, ReturnStatus};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
    Return(ReturnEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProductEvent {
    Created { product_id: Uuid, sku: String },
    Published { product_id: Uuid },
    InventoryAdded { product_id: Uuid, quantity: u32 },
    InventoryRemoved { product_id: Uuid, quantity: u32 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, customer_id: String, total: Decimal },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    Paid { order_id: Uuid },
    Shipped { order_id: Uuid, carrier: String, tracking: String },
    Delivered { order_id: Uuid },
    Cancelled { order_id: Uuid },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReturnEvent {
    Requested { return_id: Uuid, order_id: Uuid },
    StatusChanged { return_id: Uuid, status: ReturnStatus },
}

impl DomainEvent {
    /// Subject suffix used when publishing, e.g. `order.shipped`.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Product(ProductEvent::Created { .. }) => "product.created",
            Self::Product(ProductEvent::Published { .. }) => "product.published",
            Self::Product(ProductEvent::InventoryAdded { .. }) => "product.inventory_added",
            Self::Product(ProductEvent::InventoryRemoved { .. }) => "product.inventory_removed",
            Self::Order(OrderEvent::Placed { .. }) => "order.placed",
            Self::Order(OrderEvent::StatusChanged { .. }) => "order.status_changed",
            Self::Order(OrderEvent::Paid { .. }) => "order.paid",
            Self::Order(OrderEvent::Shipped { .. }) => "order.shipped",
            Self::Order(OrderEvent::Delivered { .. }) => "order.delivered",
            Self::Order(OrderEvent::Cancelled { .. }) => "order.cancelled",
            Self::Return(ReturnEvent::Requested { .. }) => "return.requested",
            Self::Return(ReturnEvent::StatusChanged { .. }) => "return.status_changed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_event_serializes_with_type_tag() {
        let id = Uuid::new_v4();
        let e = DomainEvent::Order(OrderEvent::Delivered { order_id: id });
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "delivered");
        assert_eq!(json["order_id"], id.to_string());
        assert_eq!(e.subject(), "order.delivered");
    }
}
