//! Cart pricing: offers per line, then coupon, shipping and tax on the order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{best_offer, CartItem, Coupon, CouponError, Offer, Product};
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq)]
pub struct PricingPolicy {
    pub currency: String,
    pub tax_rate_percent: Decimal,
    pub flat_shipping: Decimal,
    pub free_shipping_threshold: Option<Decimal>,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            tax_rate_percent: Decimal::ZERO,
            flat_shipping: Decimal::new(500, 2),
            free_shipping_threshold: Some(Decimal::new(5000, 2)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuoteLine {
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity: u32,
    pub list_price: Money,
    pub unit_price: Money,
    pub total: Money,
    pub offer_id: Option<Uuid>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Quote {
    pub lines: Vec<QuoteLine>,
    pub subtotal: Money,
    pub discount: Money,
    pub shipping: Money,
    pub tax: Money,
    pub total: Money,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("product {0} is not available")]
    ProductUnavailable(Uuid),
    #[error(transparent)]
    Coupon(#[from] CouponError),
}

/// Prices `items` against the catalog. Every item must reference an active product.
pub fn quote(
    items: &[CartItem],
    catalog: &HashMap<Uuid, Product>,
    offers: &[Offer],
    coupon: Option<&Coupon>,
    policy: &PricingPolicy,
    now: DateTime<Utc>,
) -> Result<Quote, PricingError> {
    let currency = policy.currency.as_str();
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let product = catalog
            .get(&item.product_id)
            .filter(|p| p.is_active())
            .ok_or(PricingError::ProductUnavailable(item.product_id))?;
        let list_price = Money::new(product.price.amount(), currency);
        let offer = best_offer(offers, product, now);
        let unit_price = match offer {
            Some(o) => list_price.subtract(&list_price.percent(o.percent_off)).unwrap_or_else(|_| list_price.clone()),
            None => list_price.clone(),
        };
        lines.push(QuoteLine {
            product_id: product.id,
            sku: product.sku.to_string(),
            name: product.name.clone(),
            quantity: item.quantity,
            total: unit_price.multiply(item.quantity),
            list_price,
            unit_price,
            offer_id: offer.map(|o| o.id),
        });
    }

    let zero = Money::zero(currency);
    let subtotal = lines.iter().fold(zero.clone(), |acc, l| acc.add(&l.total).unwrap_or(acc));
    let discount = match coupon {
        Some(c) => c.evaluate(&subtotal, now)?,
        None => zero.clone(),
    };
    let discounted = subtotal.subtract(&discount).unwrap_or_else(|_| zero.clone());
    let free = policy.free_shipping_threshold.is_some_and(|t| discounted.amount() >= t);
    let shipping = if lines.is_empty() || free { zero.clone() } else { Money::new(policy.flat_shipping, currency) };
    let tax = discounted.percent(policy.tax_rate_percent);
    let total = discounted.add(&shipping).and_then(|t| t.add(&tax)).unwrap_or_else(|_| discounted.clone());

    Ok(Quote { lines, subtotal, discount, shipping, tax, total, coupon_code: coupon.map(|c| c.code.clone()) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Discount;
    use crate::domain::value_objects::Sku;
    use chrono::Duration;

    fn active(name: &str, cents: i64) -> Product {
        let mut p = Product::create(Sku::new(name).unwrap(), name, Money::usd(Decimal::new(cents, 2)));
        p.publish().unwrap();
        p
    }

    fn catalog(products: &[&Product]) -> HashMap<Uuid, Product> {
        products.iter().map(|p| (p.id, (*p).clone())).collect()
    }

    #[test]
    fn small_order_pays_flat_shipping_and_tax() {
        let mug = active("MUG", 1250);
        let policy = PricingPolicy { tax_rate_percent: Decimal::new(8, 0), ..PricingPolicy::default() };
        let items = [CartItem { product_id: mug.id, quantity: 2 }];
        let q = quote(&items, &catalog(&[&mug]), &[], None, &policy, Utc::now()).unwrap();
        assert_eq!(q.subtotal.amount(), Decimal::new(2500, 2));
        assert_eq!(q.shipping.amount(), Decimal::new(500, 2));
        assert_eq!(q.tax.amount(), Decimal::new(200, 2));
        assert_eq!(q.total.amount(), Decimal::new(3200, 2));
    }

    #[test]
    fn offer_and_coupon_stack_and_unlock_free_shipping() {
        let now = Utc::now();
        let lamp = active("LAMP", 8000);
        let offer = Offer::new("spring", Decimal::from(25), vec![lamp.id], None, now - Duration::hours(1), now + Duration::hours(1)).unwrap();
        let coupon = Coupon::new("TEN", Discount::Percentage(Decimal::TEN)).unwrap();
        let items = [CartItem { product_id: lamp.id, quantity: 1 }];
        let q = quote(&items, &catalog(&[&lamp]), &[offer.clone()], Some(&coupon), &PricingPolicy::default(), now).unwrap();
        assert_eq!(q.lines[0].unit_price.amount(), Decimal::new(6000, 2));
        assert_eq!(q.lines[0].offer_id, Some(offer.id));
        assert_eq!(q.discount.amount(), Decimal::new(600, 2));
        assert!(q.shipping.is_zero());
        assert_eq!(q.total.amount(), Decimal::new(5400, 2));
        assert_eq!(q.coupon_code.as_deref(), Some("TEN"));
    }

    #[test]
    fn inactive_product_is_unavailable() {
        let draft = Product::create(Sku::new("DRAFT").unwrap(), "Draft", Money::usd(Decimal::ONE));
        let items = [CartItem { product_id: draft.id, quantity: 1 }];
        let err = quote(&items, &catalog(&[&draft]), &[], None, &PricingPolicy::default(), Utc::now()).unwrap_err();
        assert_eq!(err, PricingError::ProductUnavailable(draft.id));
    }

    #[test]
    fn empty_cart_costs_nothing() {
        let q = quote(&[], &HashMap::new(), &[], None, &PricingPolicy::default(), Utc::now()).unwrap();
        assert!(q.total.is_zero());
    }
}
