use axum::{
    response::{IntoResponse, Response},
    Json,
};
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::StorageError;
use crate::store::StoreError;
use crate::token::TokenError;
use crate::types::{CouponType, MediaType};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    #[schema(example = "Coupon expired")]
    pub error: String,
    #[schema(example = "COUPON_EXPIRED")]
    pub code: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid coupon")]
    InvalidCoupon,
    #[error("Coupon expired")]
    CouponExpired,
    /// The token was genuine but the coupon behind it no longer grants access.
    #[error("{0}")]
    ExpiredOrInvalid(&'static str),
    #[error("Unauthorized")]
    Unauthorized(TokenError),
    #[error("This coupon only provides access to {coupon} files")]
    TypeMismatch { coupon: CouponType, media: MediaType },
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{message}")]
    Upstream { message: String, transient: bool },
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCoupon | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::CouponExpired | Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::ExpiredOrInvalid(_) | Self::TypeMismatch { .. } => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Upstream { transient: true, .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidCoupon => "INVALID_COUPON",
            Self::CouponExpired => "COUPON_EXPIRED",
            Self::ExpiredOrInvalid(_) => "ACCESS_DENIED",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::TypeMismatch { .. } => "TYPE_MISMATCH",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Upstream { .. } => "UPSTREAM_FAILURE",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            Self::Unauthorized(reason) => {
                tracing::info!(reason = reason.reason(), "rejected credentials")
            }
            Self::TypeMismatch { coupon, media } => {
                tracing::info!(
                    coupon_type = %coupon,
                    media_type = %media,
                    "coupon scope excludes media"
                )
            }
            Self::Upstream { .. } | Self::Internal(_) => {
                tracing::error!(code = self.code(), error = %self, "request failed")
            }
            _ => tracing::debug!(code = self.code(), error = %self, "request rejected"),
        }

        (
            self.status(),
            Json(ErrorBody {
                error: self.to_string(),
                code: self.code().to_string(),
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "database operation failed");
        AppError::Internal("Database error".to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, transient = err.is_transient(), "storage operation failed");
        AppError::Upstream {
            message: "Storage service error".to_string(),
            transient: err.is_transient(),
        }
    }
}
