use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::coupon::normalize_code;
use crate::error::{AppError, AppResult, ErrorBody};
use crate::store::{CouponStore, Store};
use crate::token::{self, MintedToken, TokenKeys};
use crate::types::{access_window, Coupon, CouponState, CouponType};


#[derive(Serialize, Deserialize, ToSchema)]
pub(super) struct RedeemPayload {
    #[schema(example = "K7QD-482-ZP1")]
    pub code: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct RedeemResult {
    pub success: bool,
    pub access_token: String,
    #[serde(rename = "expires_at")]
    pub expires_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub coupon_type: CouponType,
}

pub struct Redemption {
    pub coupon: Coupon,
    pub token: MintedToken,
}

/// Opens the access window on first use and re-issues tokens while it lasts.
/// The window is never extended by a repeated redemption.
pub async fn redeem(
    coupons: &dyn CouponStore,
    keys: &TokenKeys,
    code: &str,
    now: DateTime<Utc>,
) -> AppResult<Redemption> {
    let code = normalize_code(code);
    if code.is_empty() {
        return Err(AppError::InvalidArgument("Coupon code is required".to_string()));
    }

    let coupon = coupons
        .find_by_code(&code)
        .await?
        .ok_or(AppError::InvalidCoupon)?;

    let coupon = match coupon.state(now) {
        CouponState::Unredeemed => {
            match coupons
                .mark_redeemed(coupon.id, now, now + access_window())
                .await?
            {
                Some(activated) => {
                    tracing::info!(coupon_id = %activated.id, "coupon activated");
                    activated
                }
                // Someone else redeemed it between the read and the write.
                None => coupons
                    .find_by_id(coupon.id)
                    .await?
                    .ok_or(AppError::InvalidCoupon)?,
            }
        }
        _ => coupon,
    };

    if coupon.state(now) == CouponState::Expired {
        tracing::debug!(coupon_id = %coupon.id, "redemption of expired coupon");
        return Err(AppError::CouponExpired);
    }

    let token = token::issue_access_token(keys, coupon.id, now)
        .map_err(|err| AppError::Internal(format!("failed to sign access token: {err}")))?;

    Ok(Redemption { coupon, token })
}

#[utoipa::path(
    post,
    path = "/coupons/redeem",
    tag = "redeem",
    request_body = RedeemPayload,
    responses(
        (status = 200, description = "Coupon redeemed, access token issued", body = RedeemResult),
        (status = 400, description = "Missing code, or the coupon's access window has closed", body = ErrorBody),
        (status = 404, description = "No coupon with this code", body = ErrorBody),
    )
)]
pub(super) async fn redeem_coupon(
    State(store): State<Arc<Store>>,
    Json(payload): Json<RedeemPayload>,
) -> AppResult<Json<RedeemResult>> {
    let Redemption { coupon, token } = redeem(
        store.coupons.as_ref(),
        &store.access_keys,
        payload.code.as_deref().unwrap_or_default(),
        Utc::now(),
    )
    .await?;

    Ok(Json(RedeemResult {
        success: true,
        access_token: token.token,
        expires_at: coupon.expires_at.unwrap_or(token.expires_at),
        coupon_type: coupon.coupon_type,
    }))
}
