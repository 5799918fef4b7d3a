//! Coupon-gated media listing and retrieval.
//!
//! A valid access token only names a coupon. Every request looks the coupon up
//! again and checks its live expiry and type scope before touching storage.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Response,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{AppError, AppResult, ErrorBody};
use crate::store::Store;
use crate::token::{self, TokenError};
use crate::types::{Coupon, CouponState, MediaItem};

pub use serve::{deliver, Delivery};

mod serve;

const ACCESS_DENIED: &str = "Coupon expired or invalid";

/// Resolves the coupon behind an access token and requires it to be active.
pub async fn resolve_coupon(
    store: &Store,
    token: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<Coupon> {
    let token = token.ok_or(AppError::Unauthorized(TokenError::Missing))?;
    let coupon_id = token::verify_access_token(&store.access_keys, token)
        .map_err(AppError::Unauthorized)?;

    let coupon = store
        .coupons
        .find_by_id(coupon_id)
        .await?
        .ok_or(AppError::ExpiredOrInvalid(ACCESS_DENIED))?;

    if coupon.state(now) != CouponState::Active {
        tracing::debug!(coupon_id = %coupon.id, "token presented for inactive coupon");
        return Err(AppError::ExpiredOrInvalid(ACCESS_DENIED));
    }

    Ok(coupon)
}

pub fn check_scope(coupon: &Coupon, item: &MediaItem) -> AppResult<()> {
    if coupon.coupon_type.covers(item.media_type) {
        Ok(())
    } else {
        Err(AppError::TypeMismatch {
            coupon: coupon.coupon_type,
            media: item.media_type,
        })
    }
}

pub async fn list_accessible_media(
    store: &Store,
    token: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<Vec<MediaItem>> {
    let coupon = resolve_coupon(store, token, now).await?;
    Ok(store.media.list(coupon.coupon_type.media_scope()).await?)
}

pub async fn authorize_media_op(
    store: &Store,
    token: Option<&str>,
    media_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<MediaItem> {
    let coupon = resolve_coupon(store, token, now).await?;
    let item = store
        .media
        .find(media_id)
        .await?
        .ok_or(AppError::NotFound("Media"))?;
    check_scope(&coupon, &item)?;
    Ok(item)
}

pub fn parse_media_id(id: Option<&str>) -> AppResult<Uuid> {
    let id = id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::InvalidArgument("Media id is required".to_string()))?;
    Uuid::parse_str(id).map_err(|_| AppError::InvalidArgument(format!("Invalid media id: {id}")))
}

#[derive(Serialize, Deserialize, ToSchema)]
pub(super) struct MediaList {
    pub media: Vec<MediaItem>,
}

#[utoipa::path(
    get,
    path = "/media/access",
    tag = "media",
    security(("access_token" = [])),
    responses(
        (status = 200, description = "Media visible through the coupon, newest first", body = MediaList),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 403, description = "Coupon expired or invalid", body = ErrorBody),
    )
)]
pub(super) async fn access_media(
    State(store): State<Arc<Store>>,
    headers: HeaderMap,
) -> AppResult<Json<MediaList>> {
    let token = token::bearer_token(&headers);
    let media = list_accessible_media(&store, token.as_deref(), Utc::now()).await?;
    Ok(Json(MediaList { media }))
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(super) struct MediaParams {
    /// Media id.
    pub id: Option<String>,
    /// Access token; the bearer header is used when absent.
    pub token: Option<String>,
}

async fn gated_delivery(
    store: &Store,
    params: MediaParams,
    headers: &HeaderMap,
    delivery: Delivery,
) -> AppResult<Response> {
    let media_id = parse_media_id(params.id.as_deref())?;
    let token = token::query_or_bearer_token(params.token.as_deref(), headers);
    let item = authorize_media_op(store, token.as_deref(), media_id, Utc::now()).await?;
    deliver(store.storage.as_ref(), &item, delivery).await
}

#[utoipa::path(
    get,
    path = "/media/stream",
    tag = "media",
    params(MediaParams),
    responses(
        (status = 200, description = "Media bytes for inline display", body = Vec<u8>, content_type = "application/octet-stream"),
        (status = 400, description = "Missing or malformed media id", body = ErrorBody),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 403, description = "Coupon inactive or scoped to another media type", body = ErrorBody),
        (status = 404, description = "Media not found", body = ErrorBody),
    )
)]
pub(super) async fn stream_media(
    State(store): State<Arc<Store>>,
    Query(params): Query<MediaParams>,
    headers: HeaderMap,
) -> AppResult<Response> {
    gated_delivery(&store, params, &headers, Delivery::Inline).await
}

#[utoipa::path(
    get,
    path = "/media/download",
    tag = "media",
    params(MediaParams),
    responses(
        (status = 200, description = "Media bytes as an attachment", body = Vec<u8>, content_type = "application/octet-stream"),
        (status = 307, description = "Redirect to a signed storage URL for large video"),
        (status = 400, description = "Missing or malformed media id", body = ErrorBody),
        (status = 401, description = "Missing or invalid access token", body = ErrorBody),
        (status = 403, description = "Coupon inactive or scoped to another media type", body = ErrorBody),
        (status = 404, description = "Media not found", body = ErrorBody),
    )
)]
pub(super) async fn download_media(
    State(store): State<Arc<Store>>,
    Query(params): Query<MediaParams>,
    headers: HeaderMap,
) -> AppResult<Response> {
    gated_delivery(&store, params, &headers, Delivery::Download).await
}
