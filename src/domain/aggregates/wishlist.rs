//! Wishlist Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Wishlist {
    pub customer_id: String,
    pub product_ids: Vec<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl Wishlist {
    pub fn for_customer(customer_id: impl Into<String>) -> Self {
        Self { customer_id: customer_id.into(), product_ids: vec![], updated_at: Utc::now() }
    }

    pub fn contains(&self, product_id: Uuid) -> bool { self.product_ids.contains(&product_id) }

    /// Returns `false` when the product was already listed.
    pub fn add(&mut self, product_id: Uuid) -> bool {
        if self.contains(product_id) { return false; }
        self.product_ids.push(product_id);
        self.updated_at = Utc::now();
        true
    }

    pub fn remove(&mut self, product_id: Uuid) -> Result<(), WishlistError> {
        let before = self.product_ids.len();
        self.product_ids.retain(|id| *id != product_id);
        if self.product_ids.len() == before { return Err(WishlistError::NotListed); }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Adds or removes; returns whether the product is listed afterwards.
    pub fn toggle(&mut self, product_id: Uuid) -> bool {
        if self.remove(product_id).is_ok() { false } else { self.add(product_id) }
    }

    /// Server ids first, then local ids not yet listed, in local order.
    pub fn merge_local(&mut self, local: &[Uuid]) -> Vec<Uuid> {
        local.iter().copied().filter(|id| self.add(*id)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum WishlistError { NotListed }
impl std::error::Error for WishlistError {}
impl std::fmt::Display for WishlistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "Product not in wishlist") }
}
