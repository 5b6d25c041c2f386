use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::domain::aggregates::{Cart, CartItem, Product};
use crate::domain::pricing::{quote, QuoteLine};
use crate::domain::value_objects::Money;
use crate::error::{EcommerceError, Result};
use crate::middleware::Customer;

/// One cart line priced at the current catalog price and best live offer.
/// Lines whose product was archived stay in the cart, marked unavailable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub quantity: u32,
    pub available: bool,
    pub in_stock: bool,
    pub name: Option<String>,
    pub sku: Option<String>,
    pub list_price: Option<Money>,
    pub unit_price: Option<Money>,
    pub total: Option<Money>,
    pub offer_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedCart {
    pub customer_id: String,
    pub items: Vec<PricedLine>,
    pub item_count: u32,
    pub subtotal: Money,
    pub updated_at: DateTime<Utc>,
}

impl PricedLine {
    fn priced(line: QuoteLine, product: &Product) -> Self {
        Self {
            product_id: line.product_id,
            quantity: line.quantity,
            available: true,
            in_stock: product.is_purchasable(line.quantity),
            name: Some(line.name),
            sku: Some(line.sku),
            list_price: Some(line.list_price),
            unit_price: Some(line.unit_price),
            total: Some(line.total),
            offer_id: line.offer_id,
        }
    }

    fn unavailable(item: &CartItem, product: Option<&Product>) -> Self {
        Self {
            product_id: item.product_id,
            quantity: item.quantity,
            available: false,
            in_stock: false,
            name: product.map(|p| p.name.clone()),
            sku: product.map(|p| p.sku.to_string()),
            list_price: None,
            unit_price: None,
            total: None,
            offer_id: None,
        }
    }
}

pub(crate) async fn load_catalog(s: &AppState, ids: &[Uuid]) -> Result<HashMap<Uuid, Product>> {
    Ok(s.store.get_products(ids).await?.into_iter().map(|p| (p.id, p)).collect())
}

pub(crate) async fn price_cart(s: &AppState, cart: &Cart) -> Result<PricedCart> {
    let ids: Vec<Uuid> = cart.items.iter().map(|i| i.product_id).collect();
    let catalog = load_catalog(s, &ids).await?;
    let offers = s.store.list_offers().await?;
    let sellable: Vec<CartItem> = cart
        .items
        .iter()
        .filter(|i| catalog.get(&i.product_id).is_some_and(Product::is_active))
        .copied()
        .collect();
    let q = quote(&sellable, &catalog, &offers, None, &s.config.pricing_policy(), Utc::now())?;

    let mut priced: HashMap<Uuid, QuoteLine> = q.lines.into_iter().map(|l| (l.product_id, l)).collect();
    let items = cart
        .items
        .iter()
        .map(|item| {
            let product = catalog.get(&item.product_id);
            match (priced.remove(&item.product_id), product) {
                (Some(line), Some(p)) => PricedLine::priced(line, p),
                _ => PricedLine::unavailable(item, product),
            }
        })
        .collect();
    Ok(PricedCart {
        customer_id: cart.customer_id.clone(),
        items,
        item_count: cart.items.iter().map(|i| i.quantity).sum(),
        subtotal: q.subtotal,
        updated_at: cart.updated_at,
    })
}

async fn sellable_product(s: &AppState, product_id: Uuid, quantity: u32) -> Result<Product> {
    let product = s
        .store
        .get_product(product_id)
        .await?
        .filter(Product::is_active)
        .ok_or(EcommerceError::NotFound("product"))?;
    if !product.is_purchasable(quantity) {
        return Err(EcommerceError::InsufficientInventory(product_id));
    }
    Ok(product)
}

pub async fn get_cart(State(s): State<AppState>, customer: Customer) -> Result<Json<PricedCart>> {
    let cart = s.store.load_cart(customer.id()).await?;
    Ok(Json(price_cart(&s, &cart).await?))
}

#[derive(Debug, Deserialize)]
pub struct AddItem {
    pub product_id: Uuid,
    pub quantity: u32,
}

pub async fn add_item(State(s): State<AppState>, customer: Customer, Json(req): Json<AddItem>) -> Result<Json<PricedCart>> {
    let mut cart = s.store.load_cart(customer.id()).await?;
    cart.add_item(req.product_id, req.quantity)?;
    let wanted = cart.quantity_of(req.product_id).unwrap_or(req.quantity);
    sellable_product(&s, req.product_id, wanted).await?;
    s.store.save_cart(&cart).await?;
    tracing::debug!(customer_id = %customer.id(), product_id = %req.product_id, quantity = wanted, "cart item added");
    Ok(Json(price_cart(&s, &cart).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateItem {
    pub quantity: u32,
}

/// Sets a line's quantity; zero removes the line.
pub async fn update_item(
    State(s): State<AppState>,
    customer: Customer,
    Path(product_id): Path<Uuid>,
    Json(req): Json<UpdateItem>,
) -> Result<Json<PricedCart>> {
    let mut cart = s.store.load_cart(customer.id()).await?;
    cart.update_quantity(product_id, req.quantity)?;
    if req.quantity > 0 {
        sellable_product(&s, product_id, req.quantity).await?;
    }
    s.store.save_cart(&cart).await?;
    Ok(Json(price_cart(&s, &cart).await?))
}

pub async fn remove_item(
    State(s): State<AppState>,
    customer: Customer,
    Path(product_id): Path<Uuid>,
) -> Result<Json<PricedCart>> {
    let mut cart = s.store.load_cart(customer.id()).await?;
    cart.remove_item(product_id)?;
    s.store.save_cart(&cart).await?;
    Ok(Json(price_cart(&s, &cart).await?))
}

pub async fn clear_cart(State(s): State<AppState>, customer: Customer) -> Result<Json<PricedCart>> {
    let mut cart = s.store.load_cart(customer.id()).await?;
    cart.clear();
    s.store.save_cart(&cart).await?;
    Ok(Json(price_cart(&s, &cart).await?))
}

#[derive(Debug, Deserialize)]
pub struct SyncCart {
    #[serde(default)]
    pub items: Vec<CartItem>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CartSyncResult {
    pub cart: PricedCart,
    pub inserted: Vec<Uuid>,
    pub skipped: Vec<Uuid>,
}

/// Pushes locally held lines into the server cart. Lines for products the
/// server cart already has keep the server quantity; unknown or inactive
/// products and zero quantities are skipped.
pub async fn sync_cart(State(s): State<AppState>, customer: Customer, Json(req): Json<SyncCart>) -> Result<Json<CartSyncResult>> {
    let mut cart = s.store.load_cart(customer.id()).await?;
    let ids: Vec<Uuid> = req.items.iter().map(|i| i.product_id).collect();
    let catalog = load_catalog(&s, &ids).await?;
    let (known, unknown): (Vec<CartItem>, Vec<CartItem>) = req
        .items
        .into_iter()
        .partition(|i| i.quantity > 0 && catalog.get(&i.product_id).is_some_and(Product::is_active));

    let inserted = cart.merge_local(&known);
    if !inserted.is_empty() {
        s.store.save_cart(&cart).await?;
    }
    let skipped: Vec<Uuid> = unknown.iter().map(|i| i.product_id).collect();
    tracing::info!(
        customer_id = %customer.id(),
        inserted = inserted.len(),
        skipped = skipped.len(),
        "cart synced"
    );
    Ok(Json(CartSyncResult { cart: price_cart(&s, &cart).await?, inserted, skipped }))
}
