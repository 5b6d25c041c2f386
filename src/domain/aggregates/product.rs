//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Sku, Money, Quantity, Rating};
use crate::domain::events::{DomainEvent, ProductEvent};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub sku: Sku,
    pub name: String,
    pub description: Option<String>,
    pub price: Money,
    pub compare_at_price: Option<Money>,
    pub category_id: Option<Uuid>,
    pub inventory: Quantity,
    pub status: ProductStatus,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus { #[default] Draft, Active, Archived }

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Draft => "draft", Self::Active => "active", Self::Archived => "archived" }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

impl Product {
    pub fn create(sku: Sku, name: impl Into<String>, price: Money) -> Self {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let mut product = Self {
            id, sku: sku.clone(), name: name.into(), description: None,
            price, compare_at_price: None, category_id: None, inventory: Quantity::default(),
            status: ProductStatus::Draft, images: vec![], tags: vec![],
            created_at: now, updated_at: now, events: vec![],
        };
        product.raise_event(DomainEvent::Product(ProductEvent::Created { product_id: id, sku: sku.to_string() }));
        product
    }

    pub fn is_active(&self) -> bool { self.status == ProductStatus::Active }
    pub fn is_in_stock(&self) -> bool { !self.inventory.is_zero() }

    /// Active and holding at least `qty` units.
    pub fn is_purchasable(&self, qty: u32) -> bool { self.is_active() && self.inventory.value() >= qty }

    pub fn publish(&mut self) -> Result<(), ProductError> {
        if self.name.trim().is_empty() { return Err(ProductError::MissingName); }
        self.status = ProductStatus::Active;
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::Published { product_id: self.id }));
        Ok(())
    }

    pub fn archive(&mut self) { self.status = ProductStatus::Archived; self.touch(); }

    pub fn update_price(&mut self, new_price: Money) {
        self.price = new_price;
        self.touch();
    }

    pub fn set_inventory(&mut self, qty: u32) { self.inventory = Quantity::new(qty); self.touch(); }

    pub fn add_inventory(&mut self, qty: u32) {
        self.inventory = self.inventory.add(qty);
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::InventoryAdded { product_id: self.id, quantity: qty }));
    }

    pub fn remove_inventory(&mut self, qty: u32) -> Result<(), ProductError> {
        self.inventory = self.inventory.subtract(qty).ok_or(ProductError::InsufficientInventory)?;
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::InventoryRemoved { product_id: self.id, quantity: qty }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    pub(crate) fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ProductError { MissingName, InsufficientInventory }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::MissingName => write!(f, "Missing name"), Self::InsufficientInventory => write!(f, "Insufficient inventory") }
    }
}

/// A customer's review of a product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub product_id: Uuid,
    pub customer_id: String,
    pub rating: Rating,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Review {
    pub fn new(product_id: Uuid, customer_id: impl Into<String>, rating: Rating, comment: Option<String>) -> Self {
        Self { id: Uuid::now_v7(), product_id, customer_id: customer_id.into(), rating, comment, created_at: Utc::now() }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct RatingSummary {
    pub average: f64,
    pub count: usize,
}

impl RatingSummary {
    /// Mean rating rounded to one decimal; zero when there are no reviews.
    pub fn from_reviews(reviews: &[Review]) -> Self {
        if reviews.is_empty() { return Self::default(); }
        let sum: u32 = reviews.iter().map(|r| u32::from(r.rating.value())).sum();
        let average = f64::from(sum) / reviews.len() as f64;
        Self { average: (average * 10.0).round() / 10.0, count: reviews.len() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_product_create() {
        let mut p = Product::create(Sku::new("TEST-001").unwrap(), "Test Product", Money::usd(Decimal::new(1999, 2)));
        assert_eq!(p.name, "Test Product");
        assert_eq!(p.status, ProductStatus::Draft);
        assert!(matches!(p.take_events().as_slice(), [DomainEvent::Product(ProductEvent::Created { .. })]));
    }

    #[test]
    fn test_inventory() {
        let mut p = Product::create(Sku::new("TEST").unwrap(), "P", Money::usd(Decimal::new(10, 0)));
        p.add_inventory(10);
        assert!(p.is_in_stock());
        p.remove_inventory(5).unwrap();
        assert_eq!(p.inventory.value(), 5);
        assert_eq!(p.remove_inventory(6), Err(ProductError::InsufficientInventory));
    }

    #[test]
    fn test_purchasable_requires_active() {
        let mut p = Product::create(Sku::new("TEST").unwrap(), "P", Money::usd(Decimal::new(10, 0)));
        p.add_inventory(3);
        assert!(!p.is_purchasable(1));
        p.publish().unwrap();
        assert!(p.is_purchasable(3));
        assert!(!p.is_purchasable(4));
    }

    #[test]
    fn test_publish_requires_name() {
        let mut p = Product::create(Sku::new("TEST").unwrap(), "  ", Money::usd(Decimal::ONE));
        assert_eq!(p.publish(), Err(ProductError::MissingName));
    }

    #[test]
    fn test_rating_summary() {
        let pid = Uuid::new_v4();
        let reviews: Vec<Review> = [5, 4, 4]
            .into_iter()
            .map(|r| Review::new(pid, "c", Rating::new(r).unwrap(), None))
            .collect();
        let summary = RatingSummary::from_reviews(&reviews);
        assert_eq!(summary.count, 3);
        assert!((summary.average - 4.3).abs() < f64::EPSILON);
        assert_eq!(RatingSummary::from_reviews(&[]), RatingSummary::default());
    }
}
