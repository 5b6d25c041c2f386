//! Aggregates module
pub mod product;
pub mod category;
pub mod order;
pub mod cart;
pub mod wishlist;
pub mod coupon;
pub mod offer;
pub mod returns;
pub mod notification;

pub use product::{Product, ProductError, ProductStatus, RatingSummary, Review};
pub use category::{slugify, Category};
pub use order::{Address, FulfillmentStatus, LineItem, Order, OrderError, OrderStatus, PaymentStatus, ShipmentOutcome};
pub use cart::{Cart, CartError, CartItem};
pub use wishlist::{Wishlist, WishlistError};
pub use coupon::{Coupon, CouponError, Discount};
pub use offer::{best_offer, Offer, OfferError};
pub use returns::{fully_returned, ReturnError, ReturnItem, ReturnRequest, ReturnStatus};
pub use notification::{Notification, NotificationKind};
