use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::EcommerceError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const CUSTOMER_HEADER: &str = "x-customer-id";

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Echoes `x-request-id` or generates one, and stores it as a request extension.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));
    let mut res = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert(REQUEST_ID_HEADER, val);
    }
    res
}

/// Identity of the shopper, set by the upstream auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer(pub String);

impl Customer {
    pub fn id(&self) -> &str { &self.0 }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Customer {
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CUSTOMER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= 128)
            .map(|v| Customer(v.to_string()))
            .ok_or(EcommerceError::Unauthorized("missing customer identity"))
    }
}

/// Bearer keys guarding `/api/v1/admin`. Empty means auth is off, which
/// configuration only allows in development.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    keys: Arc<Vec<String>>,
}

impl AdminAuth {
    pub fn new(keys: Vec<String>) -> Self {
        if keys.is_empty() {
            tracing::warn!("ADMIN_API_KEYS not set; admin auth disabled in development environment");
        }
        Self { keys: Arc::new(keys) }
    }

    pub fn enabled(&self) -> bool { !self.keys.is_empty() }

    fn allows(&self, token: &str) -> bool {
        self.keys.iter().fold(false, |found, key| found | bool::from(key.as_bytes().ct_eq(token.as_bytes())))
    }
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value?.to_str().ok()?.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
}

pub async fn require_admin(State(auth): State<AdminAuth>, req: Request, next: Next) -> Response {
    if !auth.enabled() {
        return next.run(req).await;
    }
    match extract_bearer_token(req.headers().get(AUTHORIZATION)) {
        Some(token) if auth.allows(token) => next.run(req).await,
        Some(_) => EcommerceError::Unauthorized("invalid API key").into_response(),
        None => EcommerceError::Unauthorized("missing bearer token").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_is_extracted() {
        let v = HeaderValue::from_static("Bearer abc123");
        assert_eq!(extract_bearer_token(Some(&v)), Some("abc123"));
        let basic = HeaderValue::from_static("Basic abc123");
        assert_eq!(extract_bearer_token(Some(&basic)), None);
        assert_eq!(extract_bearer_token(None), None);
    }

    #[test]
    fn admin_keys_match_exactly() {
        let auth = AdminAuth::new(vec!["k1".into(), "key-two".into()]);
        assert!(auth.allows("key-two"));
        assert!(!auth.allows("key"));
        assert!(!auth.allows(""));
        assert!(!AdminAuth::new(Vec::new()).enabled());
    }
}
