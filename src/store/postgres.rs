use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{changed_concurrently, OrderQuery, Page, ProductQuery, ReturnFilter, Store};
use crate::domain::aggregates::{
    Address, Cart, CartItem, Category, Coupon, CouponError, Discount, FulfillmentStatus, LineItem, Notification,
    NotificationKind, Offer, Order, OrderStatus, PaymentStatus, Product, ProductStatus, ReturnItem, ReturnRequest,
    ReturnStatus, Review, Wishlist,
};
use crate::domain::shipping::{CarrierStatus, ShipmentEvent};
use crate::domain::value_objects::{Money, Quantity, Rating, Sku};
use crate::error::{EcommerceError, Result};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> std::result::Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self { Self { pool } }

    pub async fn migrate(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        MIGRATOR.run(&self.pool).await
    }

    async fn load_items(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItemRow>>> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            "SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position",
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;
        let mut grouped: HashMap<Uuid, Vec<OrderItemRow>> = HashMap::new();
        for row in rows {
            grouped.entry(row.order_id).or_default().push(row);
        }
        Ok(grouped)
    }

    async fn hydrate_orders(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = self.load_items(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let lines = items.remove(&row.id).unwrap_or_default();
                row.into_order(lines)
            })
            .collect()
    }
}

fn corrupt(what: &str, value: impl Debug) -> EcommerceError {
    EcommerceError::Storage(format!("unexpected {what} in database: {value:?}"))
}

fn to_i32(value: u32) -> Result<i32> { i32::try_from(value).map_err(|_| EcommerceError::InvalidQuantity) }
fn to_u32(value: i32, what: &str) -> Result<u32> { u32::try_from(value).map_err(|_| corrupt(what, value)) }

fn conflict_on_unique(e: sqlx::Error, message: impl FnOnce() -> String) -> EcommerceError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => EcommerceError::Conflict(message()),
        _ => EcommerceError::Database(e),
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct CategoryRow { id: Uuid, name: String, slug: String, description: Option<String>, parent_id: Option<Uuid>, created_at: DateTime<Utc> }

impl From<CategoryRow> for Category {
    fn from(r: CategoryRow) -> Self {
        Category { id: r.id, name: r.name, slug: r.slug, description: r.description, parent_id: r.parent_id, created_at: r.created_at }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, sku: String, name: String, description: Option<String>, price: Decimal, compare_at_price: Option<Decimal>,
    currency: String, category_id: Option<Uuid>, inventory_quantity: i32, status: String, images: Vec<String>,
    tags: Vec<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = EcommerceError;
    fn try_from(r: ProductRow) -> Result<Self> {
        Ok(Product {
            id: r.id,
            sku: Sku::new(&r.sku).map_err(|_| corrupt("sku", &r.sku))?,
            name: r.name,
            description: r.description,
            price: Money::new(r.price, &r.currency),
            compare_at_price: r.compare_at_price.map(|p| Money::new(p, &r.currency)),
            category_id: r.category_id,
            inventory: Quantity::new(to_u32(r.inventory_quantity, "inventory")?),
            status: ProductStatus::parse(&r.status).ok_or_else(|| corrupt("product status", &r.status))?,
            images: r.images,
            tags: r.tags,
            created_at: r.created_at,
            updated_at: r.updated_at,
            events: Vec::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReviewRow { id: Uuid, product_id: Uuid, customer_id: String, rating: i16, comment: Option<String>, created_at: DateTime<Utc> }

impl TryFrom<ReviewRow> for Review {
    type Error = EcommerceError;
    fn try_from(r: ReviewRow) -> Result<Self> {
        let rating = u8::try_from(r.rating).ok().and_then(|v| Rating::new(v).ok()).ok_or_else(|| corrupt("rating", r.rating))?;
        Ok(Review { id: r.id, product_id: r.product_id, customer_id: r.customer_id, rating, comment: r.comment, created_at: r.created_at })
    }
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    id: Uuid, code: String, discount_type: String, discount_value: Decimal, min_subtotal: Option<Decimal>,
    starts_at: Option<DateTime<Utc>>, expires_at: Option<DateTime<Utc>>, usage_limit: Option<i32>, times_used: i32,
    active: bool, created_at: DateTime<Utc>,
}

fn discount_columns(d: &Discount) -> (&'static str, Decimal) {
    match d {
        Discount::Percentage(p) => ("percentage", *p),
        Discount::FixedAmount(a) => ("fixed_amount", *a),
    }
}

impl TryFrom<CouponRow> for Coupon {
    type Error = EcommerceError;
    fn try_from(r: CouponRow) -> Result<Self> {
        let discount = match r.discount_type.as_str() {
            "percentage" => Discount::Percentage(r.discount_value),
            "fixed_amount" => Discount::FixedAmount(r.discount_value),
            other => return Err(corrupt("discount type", other)),
        };
        Ok(Coupon {
            id: r.id, code: r.code, discount, min_subtotal: r.min_subtotal, starts_at: r.starts_at, expires_at: r.expires_at,
            usage_limit: r.usage_limit.map(|l| to_u32(l, "usage limit")).transpose()?,
            times_used: to_u32(r.times_used, "times used")?, active: r.active, created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OfferRow {
    id: Uuid, title: String, description: Option<String>, percent_off: Decimal, product_ids: Vec<Uuid>,
    category_id: Option<Uuid>, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>, active: bool, created_at: DateTime<Utc>,
}

impl From<OfferRow> for Offer {
    fn from(r: OfferRow) -> Self {
        Offer {
            id: r.id, title: r.title, description: r.description, percent_off: r.percent_off, product_ids: r.product_ids,
            category_id: r.category_id, starts_at: r.starts_at, ends_at: r.ends_at, active: r.active, created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, order_number: String, customer_id: String, email: String, status: String, payment_status: String,
    fulfillment_status: String, subtotal: Decimal, discount: Decimal, shipping: Decimal, tax: Decimal, total: Decimal,
    currency: String, coupon_code: Option<String>, shipping_address: Json<Address>, carrier: Option<String>,
    tracking_number: Option<String>, delivered_at: Option<DateTime<Utc>>, created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, item_rows: Vec<OrderItemRow>) -> Result<Order> {
        let c = self.currency.as_str();
        let items = item_rows.into_iter().map(|row| row.into_line(c)).collect::<Result<Vec<_>>>()?;
        Ok(Order {
            id: self.id,
            order_number: self.order_number,
            customer_id: self.customer_id,
            email: self.email,
            status: OrderStatus::parse(&self.status).ok_or_else(|| corrupt("order status", &self.status))?,
            payment_status: PaymentStatus::parse(&self.payment_status).ok_or_else(|| corrupt("payment status", &self.payment_status))?,
            fulfillment_status: FulfillmentStatus::parse(&self.fulfillment_status)
                .ok_or_else(|| corrupt("fulfillment status", &self.fulfillment_status))?,
            items,
            subtotal: Money::new(self.subtotal, c),
            discount: Money::new(self.discount, c),
            shipping: Money::new(self.shipping, c),
            tax: Money::new(self.tax, c),
            total: Money::new(self.total, c),
            coupon_code: self.coupon_code,
            shipping_address: self.shipping_address.0,
            carrier: self.carrier,
            tracking_number: self.tracking_number,
            delivered_at: self.delivered_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            events: Vec::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow { order_id: Uuid, product_id: Uuid, sku: String, name: String, quantity: i32, unit_price: Decimal, total: Decimal }

impl OrderItemRow {
    fn into_line(self, currency: &str) -> Result<LineItem> {
        Ok(LineItem {
            product_id: self.product_id, sku: self.sku, name: self.name, quantity: to_u32(self.quantity, "quantity")?,
            unit_price: Money::new(self.unit_price, currency), total: Money::new(self.total, currency),
        })
    }
}

#[derive(sqlx::FromRow)]
struct ShipmentEventRow {
    id: Uuid, event_id: String, order_id: Uuid, carrier: String, status: String, note: Option<String>, outcome: String,
    occurred_at: DateTime<Utc>, received_at: DateTime<Utc>,
}

impl TryFrom<ShipmentEventRow> for ShipmentEvent {
    type Error = EcommerceError;
    fn try_from(r: ShipmentEventRow) -> Result<Self> {
        Ok(ShipmentEvent {
            id: r.id, event_id: r.event_id, order_id: r.order_id, carrier: r.carrier,
            status: CarrierStatus::parse(&r.status).ok_or_else(|| corrupt("carrier status", &r.status))?,
            note: r.note, outcome: r.outcome, occurred_at: r.occurred_at, received_at: r.received_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReturnRow {
    id: Uuid, order_id: Uuid, customer_id: String, items: Json<Vec<ReturnItem>>, reason: String, status: String,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<ReturnRow> for ReturnRequest {
    type Error = EcommerceError;
    fn try_from(r: ReturnRow) -> Result<Self> {
        Ok(ReturnRequest {
            id: r.id, order_id: r.order_id, customer_id: r.customer_id, items: r.items.0, reason: r.reason,
            status: ReturnStatus::parse(&r.status).ok_or_else(|| corrupt("return status", &r.status))?,
            created_at: r.created_at, updated_at: r.updated_at, events: Vec::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow { id: Uuid, customer_id: String, kind: String, title: String, body: String, read: bool, created_at: DateTime<Utc> }

impl TryFrom<NotificationRow> for Notification {
    type Error = EcommerceError;
    fn try_from(r: NotificationRow) -> Result<Self> {
        Ok(Notification {
            id: r.id, customer_id: r.customer_id,
            kind: NotificationKind::parse(&r.kind).ok_or_else(|| corrupt("notification kind", &r.kind))?,
            title: r.title, body: r.body, read: r.read, created_at: r.created_at,
        })
    }
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = EcommerceError>,
{
    rows.into_iter().map(T::try_from).collect()
}

async fn take_stock(tx: &mut Transaction<'_, Postgres>, product_id: Uuid, quantity: u32) -> Result<()> {
    let taken = sqlx::query(
        "UPDATE products SET inventory_quantity = inventory_quantity - $2, updated_at = NOW() \
         WHERE id = $1 AND inventory_quantity >= $2",
    )
    .bind(product_id)
    .bind(to_i32(quantity)?)
    .execute(&mut **tx)
    .await?
    .rows_affected();
    if taken == 0 { return Err(EcommerceError::InsufficientInventory(product_id)); }
    Ok(())
}

async fn redeem_coupon(tx: &mut Transaction<'_, Postgres>, code: &str) -> Result<()> {
    let redeemed = sqlx::query(
        "UPDATE coupons SET times_used = times_used + 1 \
         WHERE code = $1 AND (usage_limit IS NULL OR times_used < usage_limit)",
    )
    .bind(code)
    .execute(&mut **tx)
    .await?
    .rows_affected();
    if redeemed == 1 { return Ok(()); }
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM coupons WHERE code = $1)")
        .bind(code)
        .fetch_one(&mut **tx)
        .await?;
    if exists { Err(CouponError::Exhausted.into()) } else { Err(EcommerceError::NotFound("coupon")) }
}

/// Compare-and-set on `status`. Zero rows means the order is gone or moved on.
async fn write_order(tx: &mut Transaction<'_, Postgres>, o: &Order, expected: OrderStatus) -> Result<()> {
    let updated = sqlx::query(
        "UPDATE orders SET status = $2, payment_status = $3, fulfillment_status = $4, carrier = $5, \
         tracking_number = $6, delivered_at = $7, updated_at = $8 WHERE id = $1 AND status = $9",
    )
    .bind(o.id).bind(o.status.as_str()).bind(o.payment_status.as_str()).bind(o.fulfillment_status.as_str())
    .bind(&o.carrier).bind(&o.tracking_number).bind(o.delivered_at).bind(o.updated_at).bind(expected.as_str())
    .execute(&mut **tx)
    .await?
    .rows_affected();
    if updated == 1 { return Ok(()); }
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE id = $1)")
        .bind(o.id)
        .fetch_one(&mut **tx)
        .await?;
    if exists { Err(changed_concurrently("order")) } else { Err(EcommerceError::NotFound("order")) }
}

async fn write_return(tx: &mut Transaction<'_, Postgres>, r: &ReturnRequest, expected: ReturnStatus) -> Result<()> {
    let updated = sqlx::query("UPDATE return_requests SET status = $2, updated_at = $3 WHERE id = $1 AND status = $4")
        .bind(r.id)
        .bind(r.status.as_str())
        .bind(r.updated_at)
        .bind(expected.as_str())
        .execute(&mut **tx)
        .await?
        .rows_affected();
    if updated == 1 { return Ok(()); }
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM return_requests WHERE id = $1)")
        .bind(r.id)
        .fetch_one(&mut **tx)
        .await?;
    if exists { Err(changed_concurrently("return")) } else { Err(EcommerceError::NotFound("return")) }
}

async fn put_back(tx: &mut Transaction<'_, Postgres>, items: impl Iterator<Item = (Uuid, u32)>) -> Result<()> {
    for (product_id, qty) in items {
        sqlx::query("UPDATE products SET inventory_quantity = inventory_quantity + $2, updated_at = NOW() WHERE id = $1")
            .bind(product_id)
            .bind(to_i32(qty)?)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories ORDER BY name").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn get_category(&self, id: Uuid) -> Result<Option<Category>> {
        let row = sqlx::query_as::<_, CategoryRow>("SELECT * FROM categories WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(Category::from))
    }

    async fn insert_category(&self, c: &Category) -> Result<()> {
        sqlx::query("INSERT INTO categories (id, name, slug, description, parent_id, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(c.id).bind(&c.name).bind(&c.slug).bind(&c.description).bind(c.parent_id).bind(c.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, || format!("category slug {} already exists", c.slug)))?;
        Ok(())
    }

    async fn list_products(&self, q: &ProductQuery) -> Result<Page<Product>> {
        const FILTER: &str = "($1::uuid IS NULL OR category_id = $1) \
             AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%') \
             AND ($3::text IS NULL OR status = $3)";
        let status = q.status.as_ref().map(ProductStatus::as_str);
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT * FROM products WHERE {FILTER} ORDER BY created_at DESC, id DESC LIMIT $4 OFFSET $5"
        ))
        .bind(q.category_id).bind(&q.search).bind(status)
        .bind(q.pagination.limit() as i64).bind(q.pagination.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM products WHERE {FILTER}"))
            .bind(q.category_id).bind(&q.search).bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(Page { data: collect(rows)?, total, page: q.pagination.page })
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        row.map(Product::try_from).transpose()
    }

    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = ANY($1)").bind(ids).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn insert_product(&self, p: &Product) -> Result<()> {
        sqlx::query(
            "INSERT INTO products (id, sku, name, description, price, compare_at_price, currency, category_id, \
             inventory_quantity, status, images, tags, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(p.id).bind(p.sku.as_str()).bind(&p.name).bind(&p.description).bind(p.price.amount())
        .bind(p.compare_at_price.as_ref().map(Money::amount)).bind(p.price.currency()).bind(p.category_id)
        .bind(to_i32(p.inventory.value())?).bind(p.status.as_str()).bind(&p.images).bind(&p.tags)
        .bind(p.created_at).bind(p.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, || format!("SKU {} already exists", p.sku)))?;
        Ok(())
    }

    async fn update_product(&self, p: &Product) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE products SET sku = $2, name = $3, description = $4, price = $5, compare_at_price = $6, currency = $7, \
             category_id = $8, status = $9, images = $10, tags = $11, updated_at = $12 WHERE id = $1",
        )
        .bind(p.id).bind(p.sku.as_str()).bind(&p.name).bind(&p.description).bind(p.price.amount())
        .bind(p.compare_at_price.as_ref().map(Money::amount)).bind(p.price.currency()).bind(p.category_id)
        .bind(p.status.as_str()).bind(&p.images).bind(&p.tags).bind(p.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, || format!("SKU {} already exists", p.sku)))?
        .rows_affected();
        if updated == 0 { return Err(EcommerceError::NotFound("product")); }
        Ok(())
    }

    async fn adjust_inventory(&self, id: Uuid, delta: i64) -> Result<Product> {
        let row = sqlx::query_as::<_, ProductRow>(
            "UPDATE products SET inventory_quantity = (inventory_quantity + $2::bigint)::integer, updated_at = NOW() \
             WHERE id = $1 AND inventory_quantity + $2::bigint BETWEEN 0 AND 2147483647 RETURNING *",
        )
        .bind(id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = row { return Product::try_from(row); }
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        match (exists, delta < 0) {
            (false, _) => Err(EcommerceError::NotFound("product")),
            (true, true) => Err(EcommerceError::InsufficientInventory(id)),
            (true, false) => Err(EcommerceError::InvalidQuantity),
        }
    }

    async fn list_reviews(&self, product_id: Uuid) -> Result<Vec<Review>> {
        let rows = sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE product_id = $1 ORDER BY created_at DESC")
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn insert_review(&self, r: &Review) -> Result<()> {
        sqlx::query("INSERT INTO reviews (id, product_id, customer_id, rating, comment, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(r.id).bind(r.product_id).bind(&r.customer_id).bind(i16::from(r.rating.value())).bind(&r.comment).bind(r.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, || "product already reviewed by this customer".to_string()))?;
        Ok(())
    }

    async fn load_cart(&self, customer_id: &str) -> Result<Cart> {
        let rows: Vec<(Uuid, i32, DateTime<Utc>)> = sqlx::query_as(
            "SELECT product_id, quantity, updated_at FROM cart_items WHERE customer_id = $1 ORDER BY position",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        let mut cart = Cart::for_customer(customer_id);
        if let Some(latest) = rows.iter().map(|r| r.2).max() { cart.updated_at = latest; }
        cart.items = rows
            .into_iter()
            .map(|(product_id, quantity, _)| Ok(CartItem { product_id, quantity: to_u32(quantity, "cart quantity")? }))
            .collect::<Result<_>>()?;
        Ok(cart)
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cart_items WHERE customer_id = $1").bind(&cart.customer_id).execute(&mut *tx).await?;
        for (position, item) in cart.items.iter().enumerate() {
            sqlx::query("INSERT INTO cart_items (customer_id, product_id, quantity, position, updated_at) VALUES ($1, $2, $3, $4, $5)")
                .bind(&cart.customer_id).bind(item.product_id).bind(to_i32(item.quantity)?).bind(position as i32).bind(cart.updated_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_wishlist(&self, customer_id: &str) -> Result<Wishlist> {
        let rows: Vec<(Uuid, DateTime<Utc>)> = sqlx::query_as(
            "SELECT product_id, updated_at FROM wishlist_items WHERE customer_id = $1 ORDER BY position",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        let mut wishlist = Wishlist::for_customer(customer_id);
        if let Some(latest) = rows.iter().map(|r| r.1).max() { wishlist.updated_at = latest; }
        wishlist.product_ids = rows.into_iter().map(|r| r.0).collect();
        Ok(wishlist)
    }

    async fn save_wishlist(&self, wishlist: &Wishlist) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM wishlist_items WHERE customer_id = $1").bind(&wishlist.customer_id).execute(&mut *tx).await?;
        for (position, product_id) in wishlist.product_ids.iter().enumerate() {
            sqlx::query("INSERT INTO wishlist_items (customer_id, product_id, position, updated_at) VALUES ($1, $2, $3, $4)")
                .bind(&wishlist.customer_id).bind(product_id).bind(position as i32).bind(wishlist.updated_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        let rows = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons ORDER BY code").fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn get_coupon(&self, code: &str) -> Result<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>("SELECT * FROM coupons WHERE code = $1").bind(code).fetch_optional(&self.pool).await?;
        row.map(Coupon::try_from).transpose()
    }

    async fn insert_coupon(&self, c: &Coupon) -> Result<()> {
        let (kind, value) = discount_columns(&c.discount);
        sqlx::query(
            "INSERT INTO coupons (id, code, discount_type, discount_value, min_subtotal, starts_at, expires_at, usage_limit, \
             times_used, active, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(c.id).bind(&c.code).bind(kind).bind(value).bind(c.min_subtotal).bind(c.starts_at).bind(c.expires_at)
        .bind(c.usage_limit.map(to_i32).transpose()?).bind(to_i32(c.times_used)?).bind(c.active).bind(c.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, || format!("coupon {} already exists", c.code)))?;
        Ok(())
    }

    async fn set_coupon_active(&self, code: &str, active: bool) -> Result<Coupon> {
        let row = sqlx::query_as::<_, CouponRow>("UPDATE coupons SET active = $2 WHERE code = $1 RETURNING *")
            .bind(code)
            .bind(active)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(EcommerceError::NotFound("coupon"))?;
        Coupon::try_from(row)
    }

    async fn list_offers(&self) -> Result<Vec<Offer>> {
        let rows = sqlx::query_as::<_, OfferRow>("SELECT * FROM offers ORDER BY starts_at").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Offer::from).collect())
    }

    async fn insert_offer(&self, o: &Offer) -> Result<()> {
        sqlx::query(
            "INSERT INTO offers (id, title, description, percent_off, product_ids, category_id, starts_at, ends_at, active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(o.id).bind(&o.title).bind(&o.description).bind(o.percent_off).bind(&o.product_ids).bind(o.category_id)
        .bind(o.starts_at).bind(o.ends_at).bind(o.active).bind(o.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn place_order(&self, o: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for line in &o.items {
            take_stock(&mut tx, line.product_id, line.quantity).await?;
        }
        if let Some(code) = &o.coupon_code {
            redeem_coupon(&mut tx, code).await?;
        }
        sqlx::query(
            "INSERT INTO orders (id, order_number, customer_id, email, status, payment_status, fulfillment_status, subtotal, \
             discount, shipping, tax, total, currency, coupon_code, shipping_address, carrier, tracking_number, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
        )
        .bind(o.id).bind(&o.order_number).bind(&o.customer_id).bind(&o.email).bind(o.status.as_str())
        .bind(o.payment_status.as_str()).bind(o.fulfillment_status.as_str()).bind(o.subtotal.amount())
        .bind(o.discount.amount()).bind(o.shipping.amount()).bind(o.tax.amount()).bind(o.total.amount())
        .bind(o.total.currency()).bind(&o.coupon_code).bind(Json(&o.shipping_address)).bind(&o.carrier)
        .bind(&o.tracking_number).bind(o.created_at).bind(o.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, || format!("order number {} already exists", o.order_number)))?;
        for (position, line) in o.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items (order_id, position, product_id, sku, name, quantity, unit_price, total) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(o.id).bind(position as i32).bind(line.product_id).bind(&line.sku).bind(&line.name)
            .bind(to_i32(line.quantity)?).bind(line.unit_price.amount()).bind(line.total.amount())
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("DELETE FROM cart_items WHERE customer_id = $1").bind(&o.customer_id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(self.hydrate_orders(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_order_by_tracking(&self, tracking_number: &str) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE tracking_number = $1 ORDER BY created_at DESC LIMIT 1")
            .bind(tracking_number)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(self.hydrate_orders(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, q: &OrderQuery) -> Result<Page<Order>> {
        const FILTER: &str = "($1::text IS NULL OR customer_id = $1) AND ($2::text IS NULL OR status = $2)";
        let status = q.status.as_ref().map(OrderStatus::as_str);
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT * FROM orders WHERE {FILTER} ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4"
        ))
        .bind(&q.customer_id).bind(status)
        .bind(q.pagination.limit() as i64).bind(q.pagination.offset() as i64)
        .fetch_all(&self.pool)
        .await?;
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM orders WHERE {FILTER}"))
            .bind(&q.customer_id).bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(Page { data: self.hydrate_orders(rows).await?, total, page: q.pagination.page })
    }

    async fn update_order(&self, o: &Order, expected: OrderStatus) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_order(&mut tx, o, expected).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn cancel_order(&self, o: &Order, expected: OrderStatus) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_order(&mut tx, o, expected).await?;
        put_back(&mut tx, o.items.iter().map(|i| (i.product_id, i.quantity))).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn record_shipment(&self, e: &ShipmentEvent, order: Option<(&Order, OrderStatus)>) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO shipment_events (id, event_id, order_id, carrier, status, note, outcome, occurred_at, received_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(e.id).bind(&e.event_id).bind(e.order_id).bind(&e.carrier).bind(e.status.as_str()).bind(&e.note)
        .bind(&e.outcome).bind(e.occurred_at).bind(e.received_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if inserted == 0 { return Ok(false); }
        if let Some((o, expected)) = order {
            write_order(&mut tx, o, expected).await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn list_shipment_events(&self, order_id: Uuid) -> Result<Vec<ShipmentEvent>> {
        let rows = sqlx::query_as::<_, ShipmentEventRow>("SELECT * FROM shipment_events WHERE order_id = $1 ORDER BY occurred_at")
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn insert_return(&self, r: &ReturnRequest) -> Result<()> {
        sqlx::query(
            "INSERT INTO return_requests (id, order_id, customer_id, items, reason, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(r.id).bind(r.order_id).bind(&r.customer_id).bind(Json(&r.items)).bind(&r.reason).bind(r.status.as_str())
        .bind(r.created_at).bind(r.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_return(&self, id: Uuid) -> Result<Option<ReturnRequest>> {
        let row = sqlx::query_as::<_, ReturnRow>("SELECT * FROM return_requests WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        row.map(ReturnRequest::try_from).transpose()
    }

    async fn list_returns(&self, filter: &ReturnFilter) -> Result<Vec<ReturnRequest>> {
        let (customer, order) = match filter {
            ReturnFilter::All => (None, None),
            ReturnFilter::Customer(c) => (Some(c.as_str()), None),
            ReturnFilter::Order(o) => (None, Some(*o)),
        };
        let rows = sqlx::query_as::<_, ReturnRow>(
            "SELECT * FROM return_requests WHERE ($1::text IS NULL OR customer_id = $1) \
             AND ($2::uuid IS NULL OR order_id = $2) ORDER BY created_at DESC",
        )
        .bind(customer)
        .bind(order)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn update_return(&self, r: &ReturnRequest, expected: ReturnStatus) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_return(&mut tx, r, expected).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn refund_return(&self, r: &ReturnRequest, o: &Order, order_expected: OrderStatus) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_return(&mut tx, r, ReturnStatus::Received).await?;
        write_order(&mut tx, o, order_expected).await?;
        put_back(&mut tx, r.items.iter().map(|i| (i.product_id, i.quantity))).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_notification(&self, n: &Notification) -> Result<()> {
        sqlx::query("INSERT INTO notifications (id, customer_id, kind, title, body, read, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(n.id).bind(&n.customer_id).bind(n.kind.as_str()).bind(&n.title).bind(&n.body).bind(n.read).bind(n.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_notifications(&self, customer_id: &str, unread_only: bool) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT * FROM notifications WHERE customer_id = $1 AND (NOT $2 OR read = FALSE) ORDER BY created_at DESC, id DESC",
        )
        .bind(customer_id)
        .bind(unread_only)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn mark_notification_read(&self, customer_id: &str, id: Uuid) -> Result<bool> {
        let updated = sqlx::query("UPDATE notifications SET read = TRUE WHERE id = $1 AND customer_id = $2")
            .bind(id)
            .bind(customer_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(updated == 1)
    }
}
