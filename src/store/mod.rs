//! Persistence seam. Handlers talk to [`Store`]; `PgStore` backs production and
//! `MemoryStore` backs development without a database and the test suite.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{
    Cart, Category, Coupon, Notification, Offer, Order, OrderStatus, Product, ProductStatus, ReturnRequest, ReturnStatus,
    Review, Wishlist,
};
use crate::domain::shipping::ShipmentEvent;
use crate::error::{EcommerceError, Result};

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// A compare-and-set write lost to another writer.
pub(crate) fn changed_concurrently(what: &str) -> EcommerceError {
    EcommerceError::Conflict(format!("{what} was changed by another request; reload and retry"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    /// Page starts at 1; `per_page` defaults to 20 and is capped at 100.
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> usize { ((self.page - 1) * self.per_page) as usize }
    pub fn limit(&self) -> usize { self.per_page as usize }
}

impl Default for Pagination {
    fn default() -> Self { Self::new(None, None) }
}

#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    pub pagination: Pagination,
    pub category_id: Option<Uuid>,
    pub search: Option<String>,
    /// `None` lists every status (admin views).
    pub status: Option<ProductStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    pub pagination: Pagination,
    pub customer_id: Option<String>,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Clone)]
pub enum ReturnFilter {
    All,
    Customer(String),
    Order(Uuid),
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn list_categories(&self) -> Result<Vec<Category>>;
    async fn get_category(&self, id: Uuid) -> Result<Option<Category>>;
    /// Fails with a conflict when the slug is taken.
    async fn insert_category(&self, category: &Category) -> Result<()>;

    async fn list_products(&self, query: &ProductQuery) -> Result<Page<Product>>;
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>>;
    /// Fails with a conflict when the SKU is taken.
    async fn insert_product(&self, product: &Product) -> Result<()>;
    /// Writes everything except stock, which only moves through
    /// [`Store::adjust_inventory`], checkout and restocking.
    async fn update_product(&self, product: &Product) -> Result<()>;
    /// Adds `delta` to the stored stock in place. Fails with insufficient
    /// inventory when the result would go below zero.
    async fn adjust_inventory(&self, id: Uuid, delta: i64) -> Result<Product>;

    async fn list_reviews(&self, product_id: Uuid) -> Result<Vec<Review>>;
    /// One review per customer and product.
    async fn insert_review(&self, review: &Review) -> Result<()>;

    /// Empty cart when the customer has none yet.
    async fn load_cart(&self, customer_id: &str) -> Result<Cart>;
    async fn save_cart(&self, cart: &Cart) -> Result<()>;
    async fn load_wishlist(&self, customer_id: &str) -> Result<Wishlist>;
    async fn save_wishlist(&self, wishlist: &Wishlist) -> Result<()>;

    async fn list_coupons(&self) -> Result<Vec<Coupon>>;
    async fn get_coupon(&self, code: &str) -> Result<Option<Coupon>>;
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()>;
    async fn set_coupon_active(&self, code: &str, active: bool) -> Result<Coupon>;
    async fn list_offers(&self) -> Result<Vec<Offer>>;
    async fn insert_offer(&self, offer: &Offer) -> Result<()>;

    /// Atomically: takes stock for every line, redeems the order's coupon,
    /// stores the order and empties the customer's cart. Nothing is applied
    /// when any step fails.
    async fn place_order(&self, order: &Order) -> Result<()>;
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn find_order_by_tracking(&self, tracking_number: &str) -> Result<Option<Order>>;
    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>>;
    /// Stores `order` only if its stored status is still `expected`; a
    /// concurrent change surfaces as a conflict.
    async fn update_order(&self, order: &Order, expected: OrderStatus) -> Result<()>;
    /// Stores the cancelled `order` (checked against `expected` like
    /// [`Store::update_order`]) and puts its units back on the shelf, together.
    async fn cancel_order(&self, order: &Order, expected: OrderStatus) -> Result<()>;

    /// Stores the event and, when given, the order it moved, in one step.
    /// Returns `false` without touching the order when an event with the same
    /// `event_id` was already stored. Nothing is stored when the order write fails.
    async fn record_shipment(&self, event: &ShipmentEvent, order: Option<(&Order, OrderStatus)>) -> Result<bool>;
    async fn list_shipment_events(&self, order_id: Uuid) -> Result<Vec<ShipmentEvent>>;

    async fn insert_return(&self, request: &ReturnRequest) -> Result<()>;
    async fn get_return(&self, id: Uuid) -> Result<Option<ReturnRequest>>;
    async fn list_returns(&self, filter: &ReturnFilter) -> Result<Vec<ReturnRequest>>;
    /// Stores `request` only if its stored status is still `expected`.
    async fn update_return(&self, request: &ReturnRequest, expected: ReturnStatus) -> Result<()>;
    /// Settles a refunded return: the request (stored status must be
    /// `received`), the order payment (checked against `order_expected`) and
    /// the returned units going back to stock, all or nothing.
    async fn refund_return(&self, request: &ReturnRequest, order: &Order, order_expected: OrderStatus) -> Result<()>;

    async fn insert_notification(&self, notification: &Notification) -> Result<()>;
    async fn list_notifications(&self, customer_id: &str, unread_only: bool) -> Result<Vec<Notification>>;
    /// Returns `false` when no such notification belongs to the customer.
    async fn mark_notification_read(&self, customer_id: &str, id: Uuid) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_clamps() {
        let p = Pagination::new(Some(0), Some(500));
        assert_eq!(p, Pagination { page: 1, per_page: MAX_PER_PAGE });
        assert_eq!(Pagination::new(Some(3), Some(10)).offset(), 20);
        assert_eq!(Pagination::default().per_page, DEFAULT_PER_PAGE);
    }
}
