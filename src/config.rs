//! Runtime configuration read from the environment (after `.env` is loaded).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::pricing::PricingPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::Invalid { key: "APP_ENV", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{0} is required outside development")]
    Missing(&'static str),
}

#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub nats_url: Option<String>,
    pub nats_subject_prefix: String,
    pub admin_api_keys: Vec<String>,
    pub shipping_webhook_secret: Option<String>,
    pub currency: String,
    pub tax_rate_percent: Decimal,
    pub flat_shipping: Decimal,
    pub free_shipping_threshold: Option<Decimal>,
    pub return_window_days: i64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("database_url", &self.database_url.as_ref().map(|_| "[redacted]"))
            .field("db_max_connections", &self.db_max_connections)
            .field("nats_url", &self.nats_url)
            .field("nats_subject_prefix", &self.nats_subject_prefix)
            .field("admin_api_keys", &format!("[{} redacted]", self.admin_api_keys.len()))
            .field("shipping_webhook_secret", &self.shipping_webhook_secret.as_ref().map(|_| "[redacted]"))
            .field("currency", &self.currency)
            .field("tax_rate_percent", &self.tax_rate_percent)
            .field("flat_shipping", &self.flat_shipping)
            .field("free_shipping_threshold", &self.free_shipping_threshold)
            .field("return_window_days", &self.return_window_days)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: Environment::Development,
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8083),
            log_level: "info".to_string(),
            database_url: None,
            db_max_connections: 10,
            nats_url: None,
            nats_subject_prefix: "storefront".to_string(),
            admin_api_keys: Vec::new(),
            shipping_webhook_secret: None,
            currency: "USD".to_string(),
            tax_rate_percent: Decimal::ZERO,
            flat_shipping: Decimal::new(500, 2),
            free_shipping_threshold: Some(Decimal::new(5000, 2)),
            return_window_days: 30,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let env = get("APP_ENV").map(|v| v.parse::<Environment>()).transpose()?.unwrap_or(defaults.env);
        let port: u16 = parse_or(get("PORT"), "PORT", defaults.bind_addr.port())?;
        let admin_api_keys: Vec<String> = get("ADMIN_API_KEYS")
            .map(|raw| raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(ToOwned::to_owned).collect())
            .unwrap_or_default();

        let config = Self {
            env,
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
            log_level: get("LOG_LEVEL").unwrap_or(defaults.log_level),
            database_url: get("DATABASE_URL"),
            db_max_connections: parse_or(get("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            nats_url: get("NATS_URL"),
            nats_subject_prefix: get("NATS_SUBJECT_PREFIX").unwrap_or(defaults.nats_subject_prefix),
            admin_api_keys,
            shipping_webhook_secret: get("SHIPPING_WEBHOOK_SECRET"),
            currency: get("STORE_CURRENCY").map(|c| c.to_uppercase()).unwrap_or(defaults.currency),
            tax_rate_percent: parse_or(get("TAX_RATE_PERCENT"), "TAX_RATE_PERCENT", defaults.tax_rate_percent)?,
            flat_shipping: parse_or(get("FLAT_SHIPPING"), "FLAT_SHIPPING", defaults.flat_shipping)?,
            free_shipping_threshold: match get("FREE_SHIPPING_THRESHOLD").as_deref() {
                Some("none") => None,
                other => Some(parse_or(other.map(str::to_string), "FREE_SHIPPING_THRESHOLD", Decimal::new(5000, 2))?),
            },
            return_window_days: parse_or(get("RETURN_WINDOW_DAYS"), "RETURN_WINDOW_DAYS", defaults.return_window_days)?,
        };
        config.check_required()?;
        Ok(config)
    }

    fn check_required(&self) -> Result<(), ConfigError> {
        if self.is_development() { return Ok(()); }
        if self.database_url.is_none() { return Err(ConfigError::Missing("DATABASE_URL")); }
        if self.admin_api_keys.is_empty() { return Err(ConfigError::Missing("ADMIN_API_KEYS")); }
        if self.shipping_webhook_secret.is_none() { return Err(ConfigError::Missing("SHIPPING_WEBHOOK_SECRET")); }
        Ok(())
    }

    pub fn is_development(&self) -> bool { self.env == Environment::Development }

    pub fn pricing_policy(&self) -> PricingPolicy {
        PricingPolicy {
            currency: self.currency.clone(),
            tax_rate_percent: self.tax_rate_percent,
            flat_shipping: self.flat_shipping,
            free_shipping_threshold: self.free_shipping_threshold,
        }
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
