//! Coupon Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::Money;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Discount {
    /// Percent off the subtotal, 1 to 100.
    Percentage(Decimal),
    /// Fixed amount in the store currency.
    FixedAmount(Decimal),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub discount: Discount,
    pub min_subtotal: Option<Decimal>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
    pub times_used: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("coupon code is empty")]
    EmptyCode,
    #[error("discount value out of range")]
    InvalidDiscount,
    #[error("coupon is not active")]
    Inactive,
    #[error("coupon is not valid yet")]
    NotStarted,
    #[error("coupon has expired")]
    Expired,
    #[error("coupon usage limit reached")]
    Exhausted,
    #[error("order subtotal must be at least {0}")]
    BelowMinimum(Decimal),
}

pub fn normalize_code(code: &str) -> String { code.trim().to_uppercase() }

impl Coupon {
    pub fn new(code: &str, discount: Discount) -> Result<Self, CouponError> {
        let code = normalize_code(code);
        if code.is_empty() { return Err(CouponError::EmptyCode); }
        let valid = match discount {
            Discount::Percentage(p) => p > Decimal::ZERO && p <= Decimal::ONE_HUNDRED,
            Discount::FixedAmount(a) => a > Decimal::ZERO,
        };
        if !valid { return Err(CouponError::InvalidDiscount); }
        Ok(Self {
            id: Uuid::now_v7(), code, discount, min_subtotal: None, starts_at: None, expires_at: None,
            usage_limit: None, times_used: 0, active: true, created_at: Utc::now(),
        })
    }

    pub fn is_exhausted(&self) -> bool { self.usage_limit.is_some_and(|limit| self.times_used >= limit) }

    /// Discount this coupon grants on `subtotal` at `now`. Never exceeds the subtotal.
    pub fn evaluate(&self, subtotal: &Money, now: DateTime<Utc>) -> Result<Money, CouponError> {
        if !self.active { return Err(CouponError::Inactive); }
        if self.starts_at.is_some_and(|s| now < s) { return Err(CouponError::NotStarted); }
        if self.expires_at.is_some_and(|e| now >= e) { return Err(CouponError::Expired); }
        if self.is_exhausted() { return Err(CouponError::Exhausted); }
        if let Some(min) = self.min_subtotal {
            if subtotal.amount() < min { return Err(CouponError::BelowMinimum(min)); }
        }
        let discount = match self.discount {
            Discount::Percentage(p) => subtotal.percent(p),
            Discount::FixedAmount(a) => Money::new(a, subtotal.currency()),
        };
        Ok(discount.min(subtotal.clone()))
    }

    pub fn redeem(&mut self) -> Result<(), CouponError> {
        if self.is_exhausted() { return Err(CouponError::Exhausted); }
        self.times_used += 1;
        Ok(())
    }
}
