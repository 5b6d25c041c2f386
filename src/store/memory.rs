use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{changed_concurrently, OrderQuery, Page, Pagination, ProductQuery, ReturnFilter, Store};
use crate::domain::aggregates::{
    Cart, Category, Coupon, CouponError, Notification, Offer, Order, OrderStatus, Product, ReturnRequest, ReturnStatus,
    Review, Wishlist,
};
use crate::domain::shipping::ShipmentEvent;
use crate::domain::value_objects::Quantity;
use crate::error::{EcommerceError, Result};

#[derive(Default)]
struct State {
    categories: Vec<Category>,
    products: HashMap<Uuid, Product>,
    reviews: Vec<Review>,
    carts: HashMap<String, Cart>,
    wishlists: HashMap<String, Wishlist>,
    coupons: HashMap<String, Coupon>,
    offers: Vec<Offer>,
    orders: HashMap<Uuid, Order>,
    shipment_events: Vec<ShipmentEvent>,
    returns: Vec<ReturnRequest>,
    notifications: Vec<Notification>,
}

impl State {
    fn check_order(&self, id: Uuid, expected: OrderStatus) -> Result<()> {
        let stored = self.orders.get(&id).ok_or(EcommerceError::NotFound("order"))?;
        if stored.status != expected { return Err(changed_concurrently("order")); }
        Ok(())
    }

    fn check_return(&self, id: Uuid, expected: ReturnStatus) -> Result<()> {
        let stored = self.returns.iter().find(|r| r.id == id).ok_or(EcommerceError::NotFound("return"))?;
        if stored.status != expected { return Err(changed_concurrently("return")); }
        Ok(())
    }

    // Callers run the matching check first.
    fn put_order(&mut self, order: &Order) {
        let mut stored = order.clone();
        stored.events.clear();
        self.orders.insert(order.id, stored);
    }

    fn put_return(&mut self, request: &ReturnRequest) {
        if let Some(slot) = self.returns.iter_mut().find(|r| r.id == request.id) {
            *slot = request.clone();
            slot.events.clear();
        }
    }

    fn restock(&mut self, items: impl Iterator<Item = (Uuid, u32)>) {
        let now = Utc::now();
        for (product_id, qty) in items {
            if let Some(product) = self.products.get_mut(&product_id) {
                product.inventory = product.inventory.add(qty);
                product.updated_at = now;
            }
        }
    }
}

/// Process-local store guarded by a single lock, so multi-step writes are atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

fn paginate<T>(items: Vec<T>, pagination: Pagination) -> Page<T> {
    let total = items.len() as i64;
    let data = items.into_iter().skip(pagination.offset()).take(pagination.limit()).collect();
    Page { data, total, page: pagination.page }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> { Ok(()) }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let state = self.state.read().await;
        let mut categories = state.categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn get_category(&self, id: Uuid) -> Result<Option<Category>> {
        Ok(self.state.read().await.categories.iter().find(|c| c.id == id).cloned())
    }

    async fn insert_category(&self, category: &Category) -> Result<()> {
        let mut state = self.state.write().await;
        if state.categories.iter().any(|c| c.slug == category.slug) {
            return Err(EcommerceError::Conflict(format!("category slug {} already exists", category.slug)));
        }
        state.categories.push(category.clone());
        Ok(())
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<Page<Product>> {
        let state = self.state.read().await;
        let needle = query.search.as_deref().map(str::to_lowercase);
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| query.status.map_or(true, |s| p.status == s))
            .filter(|p| query.category_id.map_or(true, |c| p.category_id == Some(c)))
            .filter(|p| needle.as_deref().map_or(true, |n| p.name.to_lowercase().contains(n)))
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(products, query.pagination))
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        Ok(ids.iter().filter_map(|id| state.products.get(id).cloned()).collect())
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut state = self.state.write().await;
        if state.products.values().any(|p| p.sku == product.sku) {
            return Err(EcommerceError::Conflict(format!("SKU {} already exists", product.sku)));
        }
        let mut stored = product.clone();
        stored.events.clear();
        state.products.insert(product.id, stored);
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        let mut state = self.state.write().await;
        if state.products.values().any(|p| p.sku == product.sku && p.id != product.id) {
            return Err(EcommerceError::Conflict(format!("SKU {} already exists", product.sku)));
        }
        let slot = state.products.get_mut(&product.id).ok_or(EcommerceError::NotFound("product"))?;
        let inventory = slot.inventory;
        *slot = product.clone();
        slot.inventory = inventory;
        slot.events.clear();
        Ok(())
    }

    async fn adjust_inventory(&self, id: Uuid, delta: i64) -> Result<Product> {
        let mut state = self.state.write().await;
        let product = state.products.get_mut(&id).ok_or(EcommerceError::NotFound("product"))?;
        let next = i64::from(product.inventory.value()).checked_add(delta).ok_or(EcommerceError::InvalidQuantity)?;
        if next < 0 { return Err(EcommerceError::InsufficientInventory(id)); }
        product.inventory = Quantity::new(u32::try_from(next).map_err(|_| EcommerceError::InvalidQuantity)?);
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn list_reviews(&self, product_id: Uuid) -> Result<Vec<Review>> {
        let state = self.state.read().await;
        let mut reviews: Vec<Review> = state.reviews.iter().filter(|r| r.product_id == product_id).cloned().collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }

    async fn insert_review(&self, review: &Review) -> Result<()> {
        let mut state = self.state.write().await;
        if state.reviews.iter().any(|r| r.product_id == review.product_id && r.customer_id == review.customer_id) {
            return Err(EcommerceError::Conflict("product already reviewed by this customer".into()));
        }
        state.reviews.push(review.clone());
        Ok(())
    }

    async fn load_cart(&self, customer_id: &str) -> Result<Cart> {
        let state = self.state.read().await;
        Ok(state.carts.get(customer_id).cloned().unwrap_or_else(|| Cart::for_customer(customer_id)))
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        self.state.write().await.carts.insert(cart.customer_id.clone(), cart.clone());
        Ok(())
    }

    async fn load_wishlist(&self, customer_id: &str) -> Result<Wishlist> {
        let state = self.state.read().await;
        Ok(state.wishlists.get(customer_id).cloned().unwrap_or_else(|| Wishlist::for_customer(customer_id)))
    }

    async fn save_wishlist(&self, wishlist: &Wishlist) -> Result<()> {
        self.state.write().await.wishlists.insert(wishlist.customer_id.clone(), wishlist.clone());
        Ok(())
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        let state = self.state.read().await;
        let mut coupons: Vec<Coupon> = state.coupons.values().cloned().collect();
        coupons.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(coupons)
    }

    async fn get_coupon(&self, code: &str) -> Result<Option<Coupon>> {
        Ok(self.state.read().await.coupons.get(code).cloned())
    }

    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()> {
        let mut state = self.state.write().await;
        if state.coupons.contains_key(&coupon.code) {
            return Err(EcommerceError::Conflict(format!("coupon {} already exists", coupon.code)));
        }
        state.coupons.insert(coupon.code.clone(), coupon.clone());
        Ok(())
    }

    async fn set_coupon_active(&self, code: &str, active: bool) -> Result<Coupon> {
        let mut state = self.state.write().await;
        let coupon = state.coupons.get_mut(code).ok_or(EcommerceError::NotFound("coupon"))?;
        coupon.active = active;
        Ok(coupon.clone())
    }

    async fn list_offers(&self) -> Result<Vec<Offer>> {
        let state = self.state.read().await;
        let mut offers = state.offers.clone();
        offers.sort_by(|a, b| a.starts_at.cmp(&b.starts_at));
        Ok(offers)
    }

    async fn insert_offer(&self, offer: &Offer) -> Result<()> {
        self.state.write().await.offers.push(offer.clone());
        Ok(())
    }

    async fn place_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;

        // All checks run before the first write.
        for line in &order.items {
            let product = state.products.get(&line.product_id).ok_or(EcommerceError::NotFound("product"))?;
            if product.inventory.value() < line.quantity {
                return Err(EcommerceError::InsufficientInventory(line.product_id));
            }
        }
        if let Some(code) = &order.coupon_code {
            let coupon = state.coupons.get(code).ok_or(EcommerceError::NotFound("coupon"))?;
            if coupon.is_exhausted() {
                return Err(CouponError::Exhausted.into());
            }
        }

        let now = Utc::now();
        for line in &order.items {
            if let Some(product) = state.products.get_mut(&line.product_id) {
                product.inventory = Quantity::new(product.inventory.value() - line.quantity);
                product.updated_at = now;
            }
        }
        if let Some(code) = &order.coupon_code {
            if let Some(coupon) = state.coupons.get_mut(code) {
                coupon.redeem()?;
            }
        }
        let mut stored = order.clone();
        stored.events.clear();
        state.orders.insert(order.id, stored);
        if let Some(cart) = state.carts.get_mut(&order.customer_id) {
            cart.clear();
        }
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn find_order_by_tracking(&self, tracking_number: &str) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.values().find(|o| o.tracking_number.as_deref() == Some(tracking_number)).cloned())
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| query.customer_id.as_deref().map_or(true, |c| o.customer_id == c))
            .filter(|o| query.status.map_or(true, |s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paginate(orders, query.pagination))
    }

    async fn update_order(&self, order: &Order, expected: OrderStatus) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_order(order.id, expected)?;
        state.put_order(order);
        Ok(())
    }

    async fn cancel_order(&self, order: &Order, expected: OrderStatus) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_order(order.id, expected)?;
        state.put_order(order);
        state.restock(order.items.iter().map(|i| (i.product_id, i.quantity)));
        Ok(())
    }

    async fn record_shipment(&self, event: &ShipmentEvent, order: Option<(&Order, OrderStatus)>) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.shipment_events.iter().any(|e| e.event_id == event.event_id) {
            return Ok(false);
        }
        if let Some((order, expected)) = order {
            state.check_order(order.id, expected)?;
            state.put_order(order);
        }
        state.shipment_events.push(event.clone());
        Ok(true)
    }

    async fn list_shipment_events(&self, order_id: Uuid) -> Result<Vec<ShipmentEvent>> {
        let state = self.state.read().await;
        let mut events: Vec<ShipmentEvent> = state.shipment_events.iter().filter(|e| e.order_id == order_id).cloned().collect();
        events.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at));
        Ok(events)
    }

    async fn insert_return(&self, request: &ReturnRequest) -> Result<()> {
        let mut stored = request.clone();
        stored.events.clear();
        self.state.write().await.returns.push(stored);
        Ok(())
    }

    async fn get_return(&self, id: Uuid) -> Result<Option<ReturnRequest>> {
        Ok(self.state.read().await.returns.iter().find(|r| r.id == id).cloned())
    }

    async fn list_returns(&self, filter: &ReturnFilter) -> Result<Vec<ReturnRequest>> {
        let state = self.state.read().await;
        let mut returns: Vec<ReturnRequest> = state
            .returns
            .iter()
            .filter(|r| match filter {
                ReturnFilter::All => true,
                ReturnFilter::Customer(c) => &r.customer_id == c,
                ReturnFilter::Order(o) => r.order_id == *o,
            })
            .cloned()
            .collect();
        returns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(returns)
    }

    async fn update_return(&self, request: &ReturnRequest, expected: ReturnStatus) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_return(request.id, expected)?;
        state.put_return(request);
        Ok(())
    }

    async fn refund_return(&self, request: &ReturnRequest, order: &Order, order_expected: OrderStatus) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_return(request.id, ReturnStatus::Received)?;
        state.check_order(order.id, order_expected)?;
        state.put_return(request);
        state.put_order(order);
        state.restock(request.items.iter().map(|i| (i.product_id, i.quantity)));
        Ok(())
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.state.write().await.notifications.push(notification.clone());
        Ok(())
    }

    async fn list_notifications(&self, customer_id: &str, unread_only: bool) -> Result<Vec<Notification>> {
        let state = self.state.read().await;
        let mut notifications: Vec<Notification> = state
            .notifications
            .iter()
            .filter(|n| n.customer_id == customer_id && (!unread_only || !n.read))
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(notifications)
    }

    async fn mark_notification_read(&self, customer_id: &str, id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.notifications.iter_mut().find(|n| n.id == id && n.customer_id == customer_id) {
            Some(n) => {
                n.read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Address, Discount, ReturnItem};
    use crate::domain::pricing::{quote, PricingPolicy};
    use crate::domain::value_objects::{Money, Sku};
    use rust_decimal::Decimal;

    async fn seeded(store: &MemoryStore, stock: u32) -> Product {
        let mut p = Product::create(Sku::new("MEM-1").unwrap(), "Candle", Money::usd(Decimal::new(900, 2)));
        p.publish().unwrap();
        p.set_inventory(stock);
        store.insert_product(&p).await.unwrap();
        p
    }

    async fn order_for(store: &MemoryStore, product: &Product, qty: u32, coupon: Option<&Coupon>) -> Order {
        let mut cart = Cart::for_customer("C1");
        cart.add_item(product.id, qty).unwrap();
        store.save_cart(&cart).await.unwrap();
        let catalog = HashMap::from([(product.id, product.clone())]);
        let q = quote(&cart.items, &catalog, &[], coupon, &PricingPolicy::default(), Utc::now()).unwrap();
        Order::from_quote("C1", "c1@example.com", Address::default(), &q)
    }

    #[tokio::test]
    async fn place_order_takes_stock_and_clears_cart() {
        let store = MemoryStore::new();
        let product = seeded(&store, 5).await;
        let order = order_for(&store, &product, 2, None).await;
        store.place_order(&order).await.unwrap();

        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.inventory.value(), 3);
        assert!(store.load_cart("C1").await.unwrap().is_empty());
        assert!(store.get_order(order.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn place_order_is_all_or_nothing() {
        let store = MemoryStore::new();
        let product = seeded(&store, 1).await;
        let mut coupon = Coupon::new("ONCE", Discount::Percentage(Decimal::TEN)).unwrap();
        coupon.usage_limit = Some(1);
        store.insert_coupon(&coupon).await.unwrap();
        let order = order_for(&store, &product, 2, Some(&coupon)).await;

        let err = store.place_order(&order).await.unwrap_err();
        assert!(matches!(err, EcommerceError::InsufficientInventory(id) if id == product.id));
        assert_eq!(store.get_product(product.id).await.unwrap().unwrap().inventory.value(), 1);
        assert_eq!(store.get_coupon("ONCE").await.unwrap().unwrap().times_used, 0);
        assert!(!store.load_cart("C1").await.unwrap().is_empty());
    }

    fn shipment(event_id: &str, order_id: Uuid) -> ShipmentEvent {
        ShipmentEvent {
            id: Uuid::new_v4(), event_id: event_id.into(), order_id, carrier: "dhl".into(),
            status: crate::domain::shipping::CarrierStatus::InTransit, note: None, outcome: "applied".into(),
            occurred_at: Utc::now(), received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn shipment_events_deduplicate() {
        let store = MemoryStore::new();
        let event = shipment("evt-1", Uuid::new_v4());
        assert!(store.record_shipment(&event, None).await.unwrap());
        assert!(!store.record_shipment(&event, None).await.unwrap());
    }

    #[tokio::test]
    async fn shipment_is_not_recorded_when_the_order_write_loses() {
        let store = MemoryStore::new();
        let product = seeded(&store, 5).await;
        let order = order_for(&store, &product, 1, None).await;
        store.place_order(&order).await.unwrap();

        let mut cancelled = store.get_order(order.id).await.unwrap().unwrap();
        let mut shipped = cancelled.clone();
        cancelled.cancel().unwrap();
        store.cancel_order(&cancelled, OrderStatus::Pending).await.unwrap();

        shipped.ship("dhl", "TRK-1").unwrap();
        let event = shipment("evt-race", order.id);
        let err = store.record_shipment(&event, Some((&shipped, OrderStatus::Pending))).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Conflict(_)));
        assert!(store.list_shipment_events(order.id).await.unwrap().is_empty());
        assert_eq!(store.get_order(order.id).await.unwrap().unwrap().status, OrderStatus::Cancelled);

        // The retry is evaluated afresh instead of being answered as a duplicate.
        assert!(store.record_shipment(&event, None).await.unwrap());
    }

    #[tokio::test]
    async fn second_cancel_from_a_stale_read_is_rejected() {
        let store = MemoryStore::new();
        let product = seeded(&store, 5).await;
        let order = order_for(&store, &product, 2, None).await;
        store.place_order(&order).await.unwrap();

        let mut first = store.get_order(order.id).await.unwrap().unwrap();
        let mut second = store.get_order(order.id).await.unwrap().unwrap();
        first.cancel().unwrap();
        second.cancel().unwrap();
        store.cancel_order(&first, OrderStatus::Pending).await.unwrap();
        let err = store.cancel_order(&second, OrderStatus::Pending).await.unwrap_err();

        assert!(matches!(err, EcommerceError::Conflict(_)));
        assert_eq!(store.get_product(product.id).await.unwrap().unwrap().inventory.value(), 5);
    }

    #[tokio::test]
    async fn return_is_refunded_and_restocked_once() {
        let store = MemoryStore::new();
        let product = seeded(&store, 5).await;
        let order = order_for(&store, &product, 2, None).await;
        store.place_order(&order).await.unwrap();
        let mut delivered = store.get_order(order.id).await.unwrap().unwrap();
        delivered.deliver().unwrap();
        store.update_order(&delivered, OrderStatus::Pending).await.unwrap();

        let items = vec![ReturnItem { product_id: product.id, quantity: 1 }];
        let mut request = ReturnRequest::open(&delivered, items, "scratched", &[], 30, Utc::now()).unwrap();
        store.insert_return(&request).await.unwrap();
        request.advance(ReturnStatus::Approved).unwrap();
        store.update_return(&request, ReturnStatus::Requested).await.unwrap();
        request.advance(ReturnStatus::Received).unwrap();
        store.update_return(&request, ReturnStatus::Approved).await.unwrap();

        request.advance(ReturnStatus::Refunded).unwrap();
        let mut settled = delivered.clone();
        settled.record_return_refund(false).unwrap();
        store.refund_return(&request, &settled, OrderStatus::Delivered).await.unwrap();
        let err = store.refund_return(&request, &settled, OrderStatus::Delivered).await.unwrap_err();

        assert!(matches!(err, EcommerceError::Conflict(_)));
        assert_eq!(store.get_product(product.id).await.unwrap().unwrap().inventory.value(), 4);
        assert_eq!(store.get_return(request.id).await.unwrap().unwrap().status, ReturnStatus::Refunded);
    }

    #[tokio::test]
    async fn product_edits_leave_stock_alone() {
        let store = MemoryStore::new();
        let product = seeded(&store, 5).await;
        let mut stale = store.get_product(product.id).await.unwrap().unwrap();

        let order = order_for(&store, &product, 2, None).await;
        store.place_order(&order).await.unwrap();
        stale.name = "Beeswax candle".into();
        store.update_product(&stale).await.unwrap();

        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Beeswax candle");
        assert_eq!(stored.inventory.value(), 3);

        assert_eq!(store.adjust_inventory(product.id, -3).await.unwrap().inventory.value(), 0);
        let err = store.adjust_inventory(product.id, -1).await.unwrap_err();
        assert!(matches!(err, EcommerceError::InsufficientInventory(id) if id == product.id));
        assert_eq!(store.adjust_inventory(product.id, 7).await.unwrap().inventory.value(), 7);
    }
}
