//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub customer_id: String,
    pub items: Vec<CartItem>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub quantity: u32,
}

impl Cart {
    pub fn for_customer(customer_id: impl Into<String>) -> Self {
        Self { customer_id: customer_id.into(), items: vec![], updated_at: Utc::now() }
    }

    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn quantity_of(&self, product_id: Uuid) -> Option<u32> {
        self.items.iter().find(|i| i.product_id == product_id).map(|i| i.quantity)
    }

    pub fn add_item(&mut self, product_id: Uuid, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 { return Err(CartError::InvalidQuantity); }
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == product_id) {
            existing.quantity = existing.quantity.saturating_add(quantity);
        } else {
            self.items.push(CartItem { product_id, quantity });
        }
        self.touch();
        Ok(())
    }

    pub fn update_quantity(&mut self, product_id: Uuid, quantity: u32) -> Result<(), CartError> {
        let item = self.items.iter_mut().find(|i| i.product_id == product_id).ok_or(CartError::ItemNotFound)?;
        if quantity == 0 { self.items.retain(|i| i.product_id != product_id); }
        else { item.quantity = quantity; }
        self.touch();
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: Uuid) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        self.touch();
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); self.touch(); }

    /// Inserts locally held lines the server cart does not have yet.
    /// Lines already present keep the server quantity. Returns the ids inserted.
    pub fn merge_local(&mut self, local: &[CartItem]) -> Vec<Uuid> {
        let mut inserted = Vec::new();
        for item in local {
            if item.quantity == 0 || self.quantity_of(item.product_id).is_some() { continue; }
            self.items.push(*item);
            inserted.push(item.product_id);
        }
        if !inserted.is_empty() { self.touch(); }
        inserted
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { ItemNotFound, InvalidQuantity }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::ItemNotFound => write!(f, "Item not found"), Self::InvalidQuantity => write!(f, "Invalid quantity") }
    }
}
