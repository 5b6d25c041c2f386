//! Storefront commerce service
//!
//! Shopper-facing storefront and admin backend over PostgreSQL.
//!
//! ## Features
//! - Product catalog with categories and reviews
//! - Cart and wishlist, synchronised with the signed-out device state on login
//! - Offers, coupons and checkout pricing
//! - Order lifecycle driven by admins and carrier webhooks
//! - Returns and customer notifications

pub mod api;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod middleware;
pub mod publisher;
pub mod store;
pub mod webhook;

pub use api::{build_app, AppState};
pub use config::{AppConfig, ConfigError, Environment};
pub use error::{EcommerceError, Result};
pub use publisher::EventPublisher;
pub use store::{MemoryStore, PgStore, Store};
