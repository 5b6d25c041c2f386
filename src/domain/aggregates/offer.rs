//! Offer Aggregate: time-boxed percentage discounts on products or a category.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::Product;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub percent_off: Decimal,
    pub product_ids: Vec<Uuid>,
    pub category_id: Option<Uuid>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum OfferError { InvalidPercent, InvalidWindow, NoTarget }
impl std::error::Error for OfferError {}
impl std::fmt::Display for OfferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPercent => write!(f, "percent_off must be between 1 and 90"),
            Self::InvalidWindow => write!(f, "offer must end after it starts"),
            Self::NoTarget => write!(f, "offer needs products or a category"),
        }
    }
}

impl Offer {
    pub fn new(
        title: impl Into<String>,
        percent_off: Decimal,
        product_ids: Vec<Uuid>,
        category_id: Option<Uuid>,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<Self, OfferError> {
        if percent_off < Decimal::ONE || percent_off > Decimal::from(90) { return Err(OfferError::InvalidPercent); }
        if ends_at <= starts_at { return Err(OfferError::InvalidWindow); }
        if product_ids.is_empty() && category_id.is_none() { return Err(OfferError::NoTarget); }
        Ok(Self {
            id: Uuid::now_v7(), title: title.into(), description: None, percent_off, product_ids, category_id,
            starts_at, ends_at, active: true, created_at: Utc::now(),
        })
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool { self.active && self.starts_at <= now && now < self.ends_at }

    pub fn applies_to(&self, product: &Product) -> bool {
        self.product_ids.contains(&product.id) || (self.category_id.is_some() && self.category_id == product.category_id)
    }
}

/// Largest live offer covering `product`.
pub fn best_offer<'a>(offers: &'a [Offer], product: &Product, now: DateTime<Utc>) -> Option<&'a Offer> {
    offers
        .iter()
        .filter(|o| o.is_live(now) && o.applies_to(product))
        .max_by(|a, b| a.percent_off.cmp(&b.percent_off))
}
