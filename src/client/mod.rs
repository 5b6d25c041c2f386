//! Shopper-side helpers: the local (signed-out) cart and wishlist, and the
//! HTTP client that reconciles them with the server on login.

mod http;
mod local;

pub use http::{StorefrontClient, SyncSummary};
pub use local::LocalState;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid base URL {0:?}")]
    InvalidUrl(String),

    #[error("local state I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("local state is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
