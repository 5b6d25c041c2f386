use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::AppState;
use crate::domain::aggregates::{coupon::normalize_code, Coupon, Discount, Offer};
use crate::error::{EcommerceError, Result};

/// Offers running right now.
pub async fn live_offers(State(s): State<AppState>) -> Result<Json<Vec<Offer>>> {
    let now = Utc::now();
    let offers = s.store.list_offers().await?.into_iter().filter(|o| o.is_live(now)).collect();
    Ok(Json(offers))
}

pub async fn list_offers(State(s): State<AppState>) -> Result<Json<Vec<Offer>>> {
    Ok(Json(s.store.list_offers().await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOffer {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    pub percent_off: Decimal,
    #[serde(default)]
    pub product_ids: Vec<Uuid>,
    pub category_id: Option<Uuid>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

pub async fn create_offer(State(s): State<AppState>, Json(req): Json<CreateOffer>) -> Result<(StatusCode, Json<Offer>)> {
    req.validate()?;
    let mut offer = Offer::new(req.title.trim(), req.percent_off, req.product_ids, req.category_id, req.starts_at, req.ends_at)?;
    offer.description = req.description;
    s.store.insert_offer(&offer).await?;
    tracing::info!(offer_id = %offer.id, percent_off = %offer.percent_off, "offer created");
    Ok((StatusCode::CREATED, Json(offer)))
}

pub async fn list_coupons(State(s): State<AppState>) -> Result<Json<Vec<Coupon>>> {
    Ok(Json(s.store.list_coupons().await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCoupon {
    #[validate(length(min = 1, max = 40))]
    pub code: String,
    pub discount: Discount,
    pub min_subtotal: Option<Decimal>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
}

pub async fn create_coupon(State(s): State<AppState>, Json(req): Json<CreateCoupon>) -> Result<(StatusCode, Json<Coupon>)> {
    req.validate()?;
    if let (Some(start), Some(end)) = (req.starts_at, req.expires_at) {
        if end <= start {
            return Err(EcommerceError::Validation("coupon must expire after it starts".into()));
        }
    }
    if req.usage_limit == Some(0) {
        return Err(EcommerceError::Validation("usage_limit must be at least 1".into()));
    }
    let mut coupon = Coupon::new(&req.code, req.discount)?;
    coupon.min_subtotal = req.min_subtotal;
    coupon.starts_at = req.starts_at;
    coupon.expires_at = req.expires_at;
    coupon.usage_limit = req.usage_limit;
    s.store.insert_coupon(&coupon).await?;
    tracing::info!(code = %coupon.code, "coupon created");
    Ok((StatusCode::CREATED, Json(coupon)))
}

#[derive(Debug, Deserialize)]
pub struct CouponToggle {
    pub active: bool,
}

pub async fn set_coupon_active(
    State(s): State<AppState>,
    Path(code): Path<String>,
    Json(req): Json<CouponToggle>,
) -> Result<Json<Coupon>> {
    let coupon = s.store.set_coupon_active(&normalize_code(&code), req.active).await?;
    tracing::info!(code = %coupon.code, active = coupon.active, "coupon updated");
    Ok(Json(coupon))
}
