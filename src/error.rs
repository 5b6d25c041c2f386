use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{CartError, CouponError, OfferError, OrderError, ProductError, ReturnError, WishlistError};
use crate::domain::pricing::PricingError;
use crate::domain::value_objects::{RatingError, SkuError};

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("insufficient inventory for product {0}")]
    InsufficientInventory(Uuid),

    #[error("invalid quantity")]
    InvalidQuantity,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidTransition(String),

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, EcommerceError>;

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl EcommerceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InsufficientInventory(_) => "insufficient_inventory",
            Self::InvalidQuantity | Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::Coupon(_) => "coupon_rejected",
            Self::Unauthorized(_) | Self::InvalidSignature => "unauthorized",
            Self::Database(_) | Self::Storage(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidQuantity | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Coupon(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InsufficientInventory(_) | Self::Conflict(_) | Self::InvalidTransition(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) | Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::Database(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for EcommerceError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorEnvelope { error: ErrorBody { code: self.code(), message } })).into_response()
    }
}

impl From<validator::ValidationErrors> for EcommerceError {
    fn from(e: validator::ValidationErrors) -> Self { Self::Validation(e.to_string()) }
}

impl From<SkuError> for EcommerceError {
    fn from(e: SkuError) -> Self { Self::Validation(e.to_string()) }
}

impl From<RatingError> for EcommerceError {
    fn from(e: RatingError) -> Self { Self::Validation(e.to_string()) }
}

impl From<OfferError> for EcommerceError {
    fn from(e: OfferError) -> Self { Self::Validation(e.to_string()) }
}

impl From<ProductError> for EcommerceError {
    fn from(e: ProductError) -> Self {
        match e {
            ProductError::MissingName => Self::Validation(e.to_string()),
            ProductError::InsufficientInventory => Self::Conflict(e.to_string()),
        }
    }
}

impl From<CartError> for EcommerceError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::ItemNotFound => Self::NotFound("cart item"),
            CartError::InvalidQuantity => Self::InvalidQuantity,
        }
    }
}

impl From<WishlistError> for EcommerceError {
    fn from(_: WishlistError) -> Self { Self::NotFound("wishlist item") }
}

impl From<OrderError> for EcommerceError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NoItems => Self::Validation(e.to_string()),
            _ => Self::InvalidTransition(e.to_string()),
        }
    }
}

impl From<ReturnError> for EcommerceError {
    fn from(e: ReturnError) -> Self {
        match e {
            ReturnError::InvalidTransition { .. } => Self::InvalidTransition(e.to_string()),
            _ => Self::Validation(e.to_string()),
        }
    }
}

impl From<PricingError> for EcommerceError {
    fn from(e: PricingError) -> Self {
        match e {
            PricingError::ProductUnavailable(_) => Self::Conflict(e.to_string()),
            PricingError::Coupon(c) => Self::Coupon(c),
        }
    }
}
