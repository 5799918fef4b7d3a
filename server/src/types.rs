use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::storage::StorageDescriptor;

/// Length of the access window opened by the first redemption.
pub const ACCESS_WINDOW_HOURS: i64 = 24;

pub fn access_window() -> Duration {
    Duration::hours(ACCESS_WINDOW_HOURS)
}

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} type: {value}")]
pub struct UnknownType {
    kind: &'static str,
    value: String,
}

/// Media scope unlocked by a coupon.
#[derive(Serialize, Deserialize, ToSchema, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CouponType {
    Image,
    Video,
    Audio,
    All,
}

impl CouponType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::All => "all",
        }
    }

    /// The single media type this coupon is restricted to, `None` for `all`.
    pub fn media_scope(self) -> Option<MediaType> {
        match self {
            Self::Image => Some(MediaType::Image),
            Self::Video => Some(MediaType::Video),
            Self::Audio => Some(MediaType::Audio),
            Self::All => None,
        }
    }

    pub fn covers(self, media: MediaType) -> bool {
        self.media_scope().map_or(true, |scope| scope == media)
    }
}

impl fmt::Display for CouponType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CouponType {
    type Err = UnknownType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "all" => Ok(Self::All),
            other => Err(UnknownType {
                kind: "coupon",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Audio,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = UnknownType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            other => Err(UnknownType {
                kind: "media",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponState {
    Unredeemed,
    Active,
    Expired,
}

#[derive(Serialize, Deserialize, ToSchema, Clone, Debug)]
pub struct Coupon {
    pub id: Uuid,
    #[schema(example = "K7QD-482-ZP1")]
    pub code: String,
    #[serde(rename = "type")]
    pub coupon_type: CouponType,
    pub redeemed: bool,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// Unredeemed coupons never expire: any `expires_at` set at issuance is
    /// informational until the first redemption overwrites it.
    pub fn state(&self, now: DateTime<Utc>) -> CouponState {
        if !self.redeemed {
            return CouponState::Unredeemed;
        }
        match self.expires_at {
            Some(expires_at) if now > expires_at => CouponState::Expired,
            _ => CouponState::Active,
        }
    }
}

#[derive(FromRow)]
pub struct CouponRow {
    pub id: Uuid,
    pub code: String,
    #[sqlx(rename = "type")]
    pub coupon_type: String,
    pub redeemed: bool,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = UnknownType;

    fn try_from(row: CouponRow) -> Result<Self, Self::Error> {
        Ok(Coupon {
            id: row.id,
            code: row.code,
            coupon_type: row.coupon_type.parse()?,
            redeemed: row.redeemed,
            redeemed_at: row.redeemed_at,
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Clone, Debug)]
pub struct NewCoupon {
    pub code: String,
    pub coupon_type: CouponType,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, ToSchema, Clone, Debug)]
pub struct MediaItem {
    pub id: Uuid,
    /// Storage key of the object.
    #[serde(rename = "fileName")]
    #[schema(example = "3f0c5a9e-0d7e-4c1b-9a51-2b8b6f0f6a11-holiday.mp4")]
    pub file_name: String,
    #[schema(example = "holiday.mp4")]
    pub original_filename: Option<String>,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub file_size: i64,
    pub uploaded_at: DateTime<Utc>,
    #[serde(skip)]
    pub storage_file_id: Option<String>,
}

impl MediaItem {
    pub fn display_name(&self) -> &str {
        self.original_filename
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.file_name)
    }

    pub fn storage_descriptor(&self) -> StorageDescriptor {
        StorageDescriptor {
            file_id: self.storage_file_id.clone(),
            file_name: self.file_name.clone(),
        }
    }
}

#[derive(FromRow)]
pub struct MediaRow {
    pub id: Uuid,
    pub file_name: String,
    pub original_filename: Option<String>,
    #[sqlx(rename = "type")]
    pub media_type: String,
    pub file_size: i64,
    pub storage_file_id: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

impl TryFrom<MediaRow> for MediaItem {
    type Error = UnknownType;

    fn try_from(row: MediaRow) -> Result<Self, Self::Error> {
        Ok(MediaItem {
            id: row.id,
            file_name: row.file_name,
            original_filename: row.original_filename,
            media_type: row.media_type.parse()?,
            file_size: row.file_size,
            uploaded_at: row.uploaded_at,
            storage_file_id: row.storage_file_id,
        })
    }
}

#[derive(Clone, Debug)]
pub struct NewMedia {
    pub file_name: String,
    pub original_filename: Option<String>,
    pub media_type: MediaType,
    pub file_size: i64,
    pub storage_file_id: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}
