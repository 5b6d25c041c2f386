use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cart::load_catalog;
use super::AppState;
use crate::domain::aggregates::{Product, Wishlist};
use crate::error::{EcommerceError, Result};
use crate::middleware::Customer;

async fn require_product(s: &AppState, product_id: Uuid) -> Result<()> {
    s.store
        .get_product(product_id)
        .await?
        .filter(Product::is_active)
        .ok_or(EcommerceError::NotFound("product"))?;
    Ok(())
}

pub async fn get_wishlist(State(s): State<AppState>, customer: Customer) -> Result<Json<Wishlist>> {
    Ok(Json(s.store.load_wishlist(customer.id()).await?))
}

#[derive(Debug, Deserialize)]
pub struct AddItem {
    pub product_id: Uuid,
}

/// Adding a listed product again is a no-op answered with 200.
pub async fn add_item(
    State(s): State<AppState>,
    customer: Customer,
    Json(req): Json<AddItem>,
) -> Result<(StatusCode, Json<Wishlist>)> {
    require_product(&s, req.product_id).await?;
    let mut wishlist = s.store.load_wishlist(customer.id()).await?;
    if !wishlist.add(req.product_id) {
        return Ok((StatusCode::OK, Json(wishlist)));
    }
    s.store.save_wishlist(&wishlist).await?;
    Ok((StatusCode::CREATED, Json(wishlist)))
}

pub async fn remove_item(
    State(s): State<AppState>,
    customer: Customer,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Wishlist>> {
    let mut wishlist = s.store.load_wishlist(customer.id()).await?;
    wishlist.remove(product_id)?;
    s.store.save_wishlist(&wishlist).await?;
    Ok(Json(wishlist))
}

#[derive(Debug, Serialize)]
pub struct ToggleResult {
    pub listed: bool,
    pub wishlist: Wishlist,
}

pub async fn toggle_item(
    State(s): State<AppState>,
    customer: Customer,
    Path(product_id): Path<Uuid>,
) -> Result<Json<ToggleResult>> {
    let mut wishlist = s.store.load_wishlist(customer.id()).await?;
    if !wishlist.contains(product_id) {
        require_product(&s, product_id).await?;
    }
    let listed = wishlist.toggle(product_id);
    s.store.save_wishlist(&wishlist).await?;
    Ok(Json(ToggleResult { listed, wishlist }))
}

#[derive(Debug, Deserialize)]
pub struct SyncWishlist {
    #[serde(default)]
    pub product_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WishlistSyncResult {
    pub wishlist: Wishlist,
    pub inserted: Vec<Uuid>,
    pub skipped: Vec<Uuid>,
}

/// Union of server and local ids: server order first, then new local ids.
pub async fn sync_wishlist(
    State(s): State<AppState>,
    customer: Customer,
    Json(req): Json<SyncWishlist>,
) -> Result<Json<WishlistSyncResult>> {
    let mut wishlist = s.store.load_wishlist(customer.id()).await?;
    let catalog = load_catalog(&s, &req.product_ids).await?;
    let (known, skipped): (Vec<Uuid>, Vec<Uuid>) = req
        .product_ids
        .into_iter()
        .partition(|id| catalog.get(id).is_some_and(Product::is_active));

    let inserted = wishlist.merge_local(&known);
    if !inserted.is_empty() {
        s.store.save_wishlist(&wishlist).await?;
    }
    tracing::info!(
        customer_id = %customer.id(),
        inserted = inserted.len(),
        skipped = skipped.len(),
        "wishlist synced"
    );
    Ok(Json(WishlistSyncResult { wishlist, inserted, skipped }))
}
