use std::path::Path;
use std::time::Duration;

use reqwest::{Client, Response, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use super::{ClientError, LocalState};
use crate::api::PricedCart;
use crate::domain::aggregates::{CartItem, Wishlist};
use crate::middleware::CUSTOMER_HEADER;

/// Client for the storefront API acting as one signed-in customer.
pub struct StorefrontClient {
    client: Client,
    base_url: Url,
    customer_id: String,
}

#[derive(Debug, Deserialize)]
struct SyncAck {
    #[serde(default)]
    inserted: Vec<Uuid>,
    #[serde(default)]
    skipped: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Serialize)]
struct CartPush<'a> {
    items: &'a [CartItem],
}

#[derive(Debug, Serialize)]
struct WishlistPush<'a> {
    product_ids: &'a [Uuid],
}

/// What a login sync changed on the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub cart_inserted: Vec<Uuid>,
    pub cart_skipped: Vec<Uuid>,
    pub wishlist_inserted: Vec<Uuid>,
    pub wishlist_skipped: Vec<Uuid>,
}

impl StorefrontClient {
    pub fn new(base_url: &str, customer_id: impl Into<String>, timeout_secs: u64) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("storefront-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|_| ClientError::InvalidUrl(base_url.to_string()))?;
        Ok(Self { client, base_url, customer_id: customer_id.into() })
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url.join(path).map_err(|_| ClientError::InvalidUrl(path.to_string()))
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&text).map(|e| e.error.message).unwrap_or(text);
        Err(ClientError::Api { status: status.as_u16(), message })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let resp = self.client.get(self.url(path)?).header(CUSTOMER_HEADER, &self.customer_id).send().await?;
        Self::decode(resp).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, ClientError> {
        let resp = self
            .client
            .post(self.url(path)?)
            .header(CUSTOMER_HEADER, &self.customer_id)
            .json(body)
            .send()
            .await?;
        Self::decode(resp).await
    }

    pub async fn fetch_cart(&self) -> Result<PricedCart, ClientError> {
        self.get("api/v1/cart").await
    }

    pub async fn fetch_wishlist(&self) -> Result<Wishlist, ClientError> {
        self.get("api/v1/wishlist").await
    }

    /// Reconciles signed-out state with the account: pushes local lines, pulls
    /// the server's cart and wishlist, then overwrites and persists `local`.
    /// Nothing local changes unless every request succeeds.
    pub async fn sync_on_login(&self, local: &mut LocalState, path: &Path) -> Result<SyncSummary, ClientError> {
        let mut summary = SyncSummary::default();
        if !local.cart.is_empty() {
            let ack: SyncAck = self.post("api/v1/cart/sync", &CartPush { items: &local.cart }).await?;
            summary.cart_inserted = ack.inserted;
            summary.cart_skipped = ack.skipped;
        }
        if !local.wishlist.is_empty() {
            let ack: SyncAck = self.post("api/v1/wishlist/sync", &WishlistPush { product_ids: &local.wishlist }).await?;
            summary.wishlist_inserted = ack.inserted;
            summary.wishlist_skipped = ack.skipped;
        }

        let cart = self.fetch_cart().await?;
        let wishlist = self.fetch_wishlist().await?;

        let fresh = LocalState {
            cart: cart.items.iter().map(|l| CartItem { product_id: l.product_id, quantity: l.quantity }).collect(),
            wishlist: wishlist.product_ids,
        };
        fresh.save(path)?;
        *local = fresh;
        tracing::info!(
            customer_id = %self.customer_id,
            cart_lines = local.cart.len(),
            wishlist = local.wishlist.len(),
            "local state replaced by server state"
        );
        Ok(summary)
    }
}
