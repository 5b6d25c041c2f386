use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use super::AppState;
use crate::domain::aggregates::{Notification, Order, OrderStatus, ShipmentOutcome};
use crate::domain::shipping::{CarrierStatus, ShipmentEvent};
use crate::error::{EcommerceError, Result};
use crate::webhook::{verify_signature, ShippingWebhook, SIGNATURE_HEADER};

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub result: &'static str,
    pub order_id: Uuid,
    pub order_status: OrderStatus,
}

fn authenticate(s: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<()> {
    let Some(secret) = s.config.shipping_webhook_secret.as_deref() else {
        if s.config.is_development() {
            tracing::warn!("SHIPPING_WEBHOOK_SECRET not set; accepting unsigned shipping webhook");
            return Ok(());
        }
        return Err(EcommerceError::InvalidSignature);
    };
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(EcommerceError::InvalidSignature)?;
    verify_signature(secret, header, body, Utc::now())
}

async fn find_order(s: &AppState, payload: &ShippingWebhook) -> Result<Order> {
    let order = match (payload.order_id, payload.tracking_number.as_deref()) {
        (Some(id), _) => s.store.get_order(id).await?,
        (None, Some(tracking)) => s.store.find_order_by_tracking(tracking.trim()).await?,
        (None, None) => {
            return Err(EcommerceError::Validation("webhook needs order_id or tracking_number".into()));
        }
    };
    order.ok_or(EcommerceError::NotFound("order"))
}

/// Carrier status updates. Replays of an `event_id` are acknowledged without
/// effect; updates the order status machine refuses are stored and ignored.
pub async fn shipping(State(s): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<WebhookAck>> {
    if let Err(e) = authenticate(&s, &headers, &body) {
        tracing::warn!("shipping webhook rejected: bad signature");
        return Err(e);
    }
    let payload: ShippingWebhook =
        serde_json::from_slice(&body).map_err(|e| EcommerceError::Validation(format!("invalid webhook payload: {e}")))?;
    payload.validate()?;
    let status = CarrierStatus::parse(&payload.status)
        .ok_or_else(|| EcommerceError::Validation(format!("unknown carrier status {:?}", payload.status)))?;

    let mut order = find_order(&s, &payload).await?;
    let from = order.status;
    let outcome = order.apply_carrier_status(status, payload.carrier.trim(), payload.tracking_number.as_deref());
    let label = match outcome {
        ShipmentOutcome::Applied { .. } => "applied",
        ShipmentOutcome::Recorded => "recorded",
        ShipmentOutcome::Ignored => "ignored",
    };
    let now = Utc::now();
    let event = ShipmentEvent {
        id: Uuid::now_v7(),
        event_id: payload.event_id.clone(),
        order_id: order.id,
        carrier: payload.carrier.trim().to_string(),
        status,
        note: payload.note.clone(),
        outcome: label.to_string(),
        occurred_at: payload.occurred_at.unwrap_or(now),
        received_at: now,
    };

    // Event id and order change commit together.
    let moved = matches!(outcome, ShipmentOutcome::Applied { .. }).then_some((&order, from));
    if !s.store.record_shipment(&event, moved).await? {
        tracing::info!(event_id = %payload.event_id, "duplicate shipping webhook");
        let current = s.store.get_order(order.id).await?.map_or(from, |o| o.status);
        return Ok(Json(WebhookAck { result: "duplicate", order_id: order.id, order_status: current }));
    }

    match outcome {
        ShipmentOutcome::Applied { from, to } => {
            tracing::info!(order_id = %order.id, from = from.as_str(), to = to.as_str(), carrier_status = status.as_str(), "shipment advanced order");
            s.notify(Notification::shipment(&order, status)).await;
            s.notify(Notification::order_status(&order)).await;
            s.publish(order.take_events()).await;
        }
        ShipmentOutcome::Recorded => {
            tracing::info!(order_id = %order.id, carrier_status = status.as_str(), "shipment event recorded");
            s.notify(Notification::shipment(&order, status)).await;
        }
        ShipmentOutcome::Ignored => {
            tracing::warn!(
                order_id = %order.id,
                order_status = order.status.as_str(),
                carrier_status = status.as_str(),
                "out-of-order shipment event ignored"
            );
        }
    }
    Ok(Json(WebhookAck { result: label, order_id: order.id, order_status: order.status }))
}
