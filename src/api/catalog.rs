use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::AppState;
use crate::domain::aggregates::{best_offer, Category, Offer, Product, ProductStatus, RatingSummary, Review};
use crate::domain::events::{DomainEvent, ProductEvent};
use crate::domain::value_objects::{Money, Rating, Sku};
use crate::error::{EcommerceError, Result};
use crate::middleware::Customer;
use crate::store::{Page, Pagination, ProductQuery};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub category: Option<Uuid>,
    pub search: Option<String>,
    pub status: Option<String>,
}

impl ListParams {
    fn query(self, status: Option<ProductStatus>) -> ProductQuery {
        ProductQuery {
            pagination: Pagination::new(self.page, self.per_page),
            category_id: self.category,
            search: self.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            status,
        }
    }
}

/// A product as shoppers see it: list price plus the best live offer.
#[derive(Debug, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub sale_price: Option<Money>,
    pub offer_id: Option<Uuid>,
    pub in_stock: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<RatingSummary>,
}

impl ProductView {
    fn new(product: Product, offers: &[Offer]) -> Self {
        let offer = best_offer(offers, &product, Utc::now());
        let sale_price = offer.and_then(|o| product.price.subtract(&product.price.percent(o.percent_off)).ok());
        Self { in_stock: product.is_in_stock(), offer_id: offer.map(|o| o.id), sale_price, product, rating: None }
    }
}

async fn load_active(state: &AppState, id: Uuid) -> Result<Product> {
    state
        .store
        .get_product(id)
        .await?
        .filter(Product::is_active)
        .ok_or(EcommerceError::NotFound("product"))
}

pub async fn list_products(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<Page<ProductView>>> {
    let page = s.store.list_products(&p.query(Some(ProductStatus::Active))).await?;
    let offers = s.store.list_offers().await?;
    Ok(Json(Page {
        data: page.data.into_iter().map(|product| ProductView::new(product, &offers)).collect(),
        total: page.total,
        page: page.page,
    }))
}

pub async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ProductView>> {
    let product = load_active(&s, id).await?;
    let offers = s.store.list_offers().await?;
    let reviews = s.store.list_reviews(id).await?;
    let mut view = ProductView::new(product, &offers);
    view.rating = Some(RatingSummary::from_reviews(&reviews));
    Ok(Json(view))
}

#[derive(Debug, Serialize)]
pub struct ReviewList {
    pub summary: RatingSummary,
    pub reviews: Vec<Review>,
}

pub async fn list_reviews(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ReviewList>> {
    load_active(&s, id).await?;
    let reviews = s.store.list_reviews(id).await?;
    Ok(Json(ReviewList { summary: RatingSummary::from_reviews(&reviews), reviews }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReview {
    pub rating: u8,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

pub async fn create_review(
    State(s): State<AppState>,
    customer: Customer,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateReview>,
) -> Result<(StatusCode, Json<Review>)> {
    req.validate()?;
    let rating = Rating::new(req.rating)?;
    load_active(&s, id).await?;
    let review = Review::new(id, customer.id(), rating, req.comment.filter(|c| !c.trim().is_empty()));
    s.store.insert_review(&review).await?;
    tracing::info!(product_id = %id, rating = req.rating, "review added");
    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn list_categories(State(s): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(s.store.list_categories().await?))
}

pub async fn get_category(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Category>> {
    s.store.get_category(id).await?.map(Json).ok_or(EcommerceError::NotFound("category"))
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

pub async fn admin_list_products(State(s): State<AppState>, Query(p): Query<ListParams>) -> Result<Json<Page<Product>>> {
    let status = match p.status.as_deref() {
        None | Some("all") => None,
        Some(raw) => Some(
            ProductStatus::parse(raw).ok_or_else(|| EcommerceError::Validation(format!("unknown product status {raw:?}")))?,
        ),
    };
    Ok(Json(s.store.list_products(&p.query(status)).await?))
}

pub async fn admin_get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Product>> {
    s.store.get_product(id).await?.map(Json).ok_or(EcommerceError::NotFound("product"))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProduct {
    #[validate(length(min = 1, max = 50))]
    pub sku: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub inventory: u32,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn check_price(price: Decimal) -> Result<()> {
    if price.is_sign_negative() {
        return Err(EcommerceError::Validation("price must not be negative".into()));
    }
    Ok(())
}

async fn check_category(s: &AppState, category_id: Option<Uuid>) -> Result<()> {
    if let Some(id) = category_id {
        s.store.get_category(id).await?.ok_or(EcommerceError::NotFound("category"))?;
    }
    Ok(())
}

pub async fn create_product(State(s): State<AppState>, Json(req): Json<CreateProduct>) -> Result<(StatusCode, Json<Product>)> {
    req.validate()?;
    check_price(req.price)?;
    check_category(&s, req.category_id).await?;
    let currency = s.config.currency.as_str();
    let sku = req.sku.map(Sku::new).transpose()?.unwrap_or_else(Sku::generate);
    let mut product = Product::create(sku, req.name.trim(), Money::new(req.price, currency));
    product.description = req.description;
    product.compare_at_price = req.compare_at_price.map(|p| Money::new(p, currency));
    product.category_id = req.category_id;
    product.images = req.images;
    product.tags = req.tags;
    if req.inventory > 0 {
        product.add_inventory(req.inventory);
    }
    s.store.insert_product(&product).await?;
    tracing::info!(product_id = %product.id, sku = %product.sku, "product created");
    s.publish(product.take_events()).await;
    Ok((StatusCode::CREATED, Json(product)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProduct {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub compare_at_price: Option<Decimal>,
    pub category_id: Option<Uuid>,
    pub images: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

pub async fn update_product(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProduct>,
) -> Result<Json<Product>> {
    req.validate()?;
    let mut product = s.store.get_product(id).await?.ok_or(EcommerceError::NotFound("product"))?;
    let currency = s.config.currency.clone();
    if let Some(name) = req.name { product.name = name.trim().to_string(); }
    if let Some(description) = req.description { product.description = Some(description); }
    if let Some(price) = req.price {
        check_price(price)?;
        product.update_price(Money::new(price, &currency));
    }
    if let Some(compare) = req.compare_at_price { product.compare_at_price = Some(Money::new(compare, &currency)); }
    if req.category_id.is_some() {
        check_category(&s, req.category_id).await?;
        product.category_id = req.category_id;
    }
    if let Some(images) = req.images { product.images = images; }
    if let Some(tags) = req.tags { product.tags = tags; }
    product.touch();
    s.store.update_product(&product).await?;
    Ok(Json(product))
}

/// Products are never removed; deleting archives them.
pub async fn archive_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Product>> {
    let mut product = s.store.get_product(id).await?.ok_or(EcommerceError::NotFound("product"))?;
    product.archive();
    s.store.update_product(&product).await?;
    tracing::info!(product_id = %id, "product archived");
    Ok(Json(product))
}

pub async fn publish_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Product>> {
    let mut product = s.store.get_product(id).await?.ok_or(EcommerceError::NotFound("product"))?;
    product.publish()?;
    s.store.update_product(&product).await?;
    tracing::info!(product_id = %id, "product published");
    s.publish(product.take_events()).await;
    Ok(Json(product))
}

#[derive(Debug, Deserialize)]
pub struct InventoryAdjustment {
    /// Positive receives stock, negative removes it.
    pub delta: i64,
}

/// Applied to the stored stock in place, so concurrent checkouts are never undone.
pub async fn adjust_inventory(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<InventoryAdjustment>,
) -> Result<Json<Product>> {
    let quantity = u32::try_from(req.delta.unsigned_abs()).map_err(|_| EcommerceError::InvalidQuantity)?;
    let event = match req.delta {
        0 => return Err(EcommerceError::InvalidQuantity),
        d if d > 0 => ProductEvent::InventoryAdded { product_id: id, quantity },
        _ => ProductEvent::InventoryRemoved { product_id: id, quantity },
    };
    let product = s.store.adjust_inventory(id, req.delta).await?;
    tracing::info!(product_id = %id, delta = req.delta, inventory = product.inventory.value(), "inventory adjusted");
    s.publish(vec![DomainEvent::Product(event)]).await;
    Ok(Json(product))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategory {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
}

pub async fn create_category(State(s): State<AppState>, Json(req): Json<CreateCategory>) -> Result<(StatusCode, Json<Category>)> {
    req.validate()?;
    check_category(&s, req.parent_id).await?;
    let category = Category::new(req.name.trim(), req.description, req.parent_id);
    if category.slug.is_empty() {
        return Err(EcommerceError::Validation("category name needs at least one letter or digit".into()));
    }
    s.store.insert_category(&category).await?;
    tracing::info!(category_id = %category.id, slug = %category.slug, "category created");
    Ok((StatusCode::CREATED, Json(category)))
}
