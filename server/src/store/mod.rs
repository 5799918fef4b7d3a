use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::storage::{ObjectStorage, RetryPolicy};
use crate::token::TokenKeys;
use crate::types::{Coupon, CouponType, MediaItem, MediaType, NewCoupon, NewMedia, UnknownType};

pub use postgres::{PgCouponStore, PgMediaCatalog};

#[cfg(test)]
pub mod memory;
mod postgres;

/// Shared, immutable application state. Durable state lives behind the
/// collaborators; nothing here is mutated after startup.
pub struct Store {
    pub coupons: Arc<dyn CouponStore>,
    pub media: Arc<dyn MediaCatalog>,
    pub storage: Arc<dyn ObjectStorage>,
    pub access_keys: TokenKeys,
    pub admin: AdminAuth,
    pub upload_retry: RetryPolicy,
}

pub struct AdminAuth {
    pub keys: TokenKeys,
    pub password_hash: Option<String>,
    pub cookie_secure: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Corrupt(#[from] UnknownType),
}

#[derive(Debug, Clone, Default)]
pub struct CouponFilter {
    pub coupon_type: Option<CouponType>,
    pub redeemed: Option<bool>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CouponSort {
    #[default]
    CreatedAt,
    ExpiresAt,
    RedeemedAt,
    Code,
    Type,
    Redeemed,
}

impl CouponSort {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created_at" => Some(Self::CreatedAt),
            "expires_at" => Some(Self::ExpiresAt),
            "redeemed_at" => Some(Self::RedeemedAt),
            "code" => Some(Self::Code),
            "type" => Some(Self::Type),
            "redeemed" => Some(Self::Redeemed),
            _ => None,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::ExpiresAt => "expires_at",
            Self::RedeemedAt => "redeemed_at",
            Self::Code => "code",
            Self::Type => "type",
            Self::Redeemed => "redeemed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CouponQuery {
    pub filter: CouponFilter,
    pub sort: CouponSort,
    pub ascending: bool,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug)]
pub struct CouponPage {
    pub coupons: Vec<Coupon>,
    pub total: i64,
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Inserts the whole batch or nothing.
    async fn insert_batch(&self, coupons: &[NewCoupon]) -> Result<Vec<Coupon>, StoreError>;

    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Coupon>, StoreError>;

    /// Flips an unredeemed coupon to redeemed in one conditional write.
    /// Returns `None` when the coupon was already redeemed (or does not exist).
    async fn mark_redeemed(
        &self,
        id: Uuid,
        redeemed_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Coupon>, StoreError>;

    async fn list(&self, query: &CouponQuery) -> Result<CouponPage, StoreError>;

    /// All matching coupons, newest first.
    async fn export(&self, filter: &CouponFilter) -> Result<Vec<Coupon>, StoreError>;
}

#[async_trait]
pub trait MediaCatalog: Send + Sync {
    async fn insert(&self, media: &NewMedia) -> Result<MediaItem, StoreError>;

    async fn find(&self, id: Uuid) -> Result<Option<MediaItem>, StoreError>;

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<MediaItem>, StoreError>;

    /// Newest first, restricted to one media type when `scope` is set.
    async fn list(&self, scope: Option<MediaType>) -> Result<Vec<MediaItem>, StoreError>;

    async fn delete_many(&self, ids: &[Uuid]) -> Result<u64, StoreError>;
}
