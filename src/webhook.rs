//! Carrier webhook payload and signature scheme.
//!
//! Partners sign each delivery with `x-shipping-signature: t=<unix>,v1=<hex>`
//! where the digest is HMAC-SHA256 over `"<t>.<raw body>"`.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;
use validator::Validate;

use crate::error::{EcommerceError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-shipping-signature";
pub const TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ShippingWebhook {
    #[validate(length(min = 1, max = 200))]
    pub event_id: String,
    pub tracking_number: Option<String>,
    pub order_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100))]
    pub carrier: String,
    pub status: String,
    pub occurred_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

fn mac_for(secret: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| EcommerceError::InvalidSignature)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Produces a header value for `body`; used by partners and the test suite.
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> Result<String> {
    let t = timestamp.to_string();
    let digest = mac_for(secret, &t, body)?.finalize().into_bytes();
    Ok(format!("t={t},v1={}", hex::encode(digest)))
}

/// Checks the header against `body`. Any `v1` entry may match, which lets
/// partners rotate secrets.
pub fn verify_signature(secret: &str, header: &str, body: &[u8], now: DateTime<Utc>) -> Result<()> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = Some(v),
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }
    let t = timestamp.ok_or(EcommerceError::InvalidSignature)?;
    let issued: i64 = t.parse().map_err(|_| EcommerceError::InvalidSignature)?;
    if (now.timestamp() - issued).abs() > TOLERANCE_SECS {
        return Err(EcommerceError::InvalidSignature);
    }
    let mac = mac_for(secret, t, body)?;
    let valid = signatures
        .into_iter()
        .filter_map(|s| hex::decode(s).ok())
        .any(|sig| mac.clone().verify_slice(&sig).is_ok());
    if valid { Ok(()) } else { Err(EcommerceError::InvalidSignature) }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_ship_test";
    const BODY: &[u8] = br#"{"event_id":"evt_1","carrier":"ups","status":"in_transit"}"#;

    #[test]
    fn valid_signature_is_accepted() {
        let now = Utc::now();
        let header = sign(SECRET, now.timestamp(), BODY).unwrap();
        assert!(verify_signature(SECRET, &header, BODY, now).is_ok());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let header = sign("other", now.timestamp(), BODY).unwrap();
        assert!(verify_signature(SECRET, &header, BODY, now).is_err());
    }

    #[test]
    fn modified_body_is_rejected() {
        let now = Utc::now();
        let header = sign(SECRET, now.timestamp(), BODY).unwrap();
        assert!(verify_signature(SECRET, &header, br#"{"event_id":"evt_2"}"#, now).is_err());
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let now = Utc::now();
        let header = sign(SECRET, now.timestamp() - 600, BODY).unwrap();
        assert!(verify_signature(SECRET, &header, BODY, now).is_err());
    }

    #[test]
    fn malformed_headers_are_rejected() {
        let now = Utc::now();
        let bad_hex = format!("t={},v1=zz", now.timestamp());
        for header in ["", "v1=abcd", "t=notanumber,v1=abcd", bad_hex.as_str()] {
            assert!(verify_signature(SECRET, header, BODY, now).is_err(), "{header}");
        }
    }

    #[test]
    fn any_listed_signature_may_match() {
        let now = Utc::now();
        let good = sign(SECRET, now.timestamp(), BODY).unwrap();
        let header = format!("t={},v1={},{}", now.timestamp(), "00".repeat(32), good.split_once(',').map(|(_, v)| v).unwrap_or_default());
        assert!(verify_signature(SECRET, &header, BODY, now).is_ok());
    }
}
