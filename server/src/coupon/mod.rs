use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::admin::AdminSession;
use crate::error::{AppError, AppResult, ErrorBody};
use crate::store::{CouponFilter, CouponQuery, CouponSort, Store};
use crate::types::{Coupon, CouponType};

pub use code::{generate_code, normalize_code};
use code::BatchRequest;
use export::ExportFormat;

mod code;
mod export;

const DEFAULT_PAGE_SIZE: i64 = 100;
const MAX_PAGE_SIZE: i64 = 1000;

#[derive(Serialize, Deserialize, ToSchema)]
pub(super) struct GenerateCouponsPayload {
    #[serde(rename = "type")]
    #[schema(example = "video")]
    pub coupon_type: Option<String>,
    #[schema(example = 10)]
    pub count: Option<i64>,
    /// Recorded on the coupon until redemption replaces it. Never enforced.
    pub expires_in_days: Option<i64>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub(super) struct GeneratedCoupon {
    #[schema(example = "K7QD-482-ZP1")]
    pub code: String,
    #[serde(rename = "type")]
    pub coupon_type: CouponType,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub(super) struct GenerateCouponsResult {
    pub success: bool,
    pub coupons: Vec<GeneratedCoupon>,
}

#[utoipa::path(
    post,
    path = "/coupons/generate",
    tag = "coupon",
    request_body = GenerateCouponsPayload,
    responses(
        (status = 200, description = "Coupons generated", body = GenerateCouponsResult),
        (status = 400, description = "Invalid type or count", body = ErrorBody),
        (status = 401, description = "No admin session", body = ErrorBody),
    )
)]
pub(super) async fn generate_coupons(
    _session: AdminSession,
    State(store): State<Arc<Store>>,
    Json(payload): Json<GenerateCouponsPayload>,
) -> AppResult<Json<GenerateCouponsResult>> {
    let request = BatchRequest::parse(
        payload.coupon_type.as_deref(),
        payload.count,
        payload.expires_in_days,
    )?;

    let batch = request.build(&mut rand::thread_rng(), Utc::now());
    let created = store.coupons.insert_batch(&batch).await?;

    tracing::info!(
        coupon_type = %request.coupon_type,
        count = created.len(),
        "generated coupons"
    );

    Ok(Json(GenerateCouponsResult {
        success: true,
        coupons: created
            .into_iter()
            .map(|coupon| GeneratedCoupon {
                code: coupon.code,
                coupon_type: coupon.coupon_type,
                expires_at: coupon.expires_at,
            })
            .collect(),
    }))
}

fn parse_type_filter(value: Option<&str>) -> AppResult<Option<CouponType>> {
    match value {
        None | Some("") | Some("all") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| AppError::InvalidArgument(format!("Invalid coupon type: {value}"))),
    }
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub(super) struct ListCouponsParams {
    /// `image`, `video`, `audio`; `all` or absent means no filter.
    #[serde(rename = "type")]
    pub coupon_type: Option<String>,
    /// `true` or `false`; anything else means no filter.
    pub redeemed: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort_by: Option<String>,
    /// `asc` or `desc` (default).
    pub sort_order: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(super) struct CouponListResult {
    pub coupons: Vec<Coupon>,
    pub total: i64,
    pub page: i64,
    pub total_pages: i64,
    pub limit: i64,
    pub offset: i64,
}

impl ListCouponsParams {
    fn into_query(self) -> AppResult<CouponQuery> {
        let sort = match self.sort_by.as_deref() {
            None => CouponSort::default(),
            Some(value) => CouponSort::parse(value)
                .ok_or_else(|| AppError::InvalidArgument(format!("Cannot sort by {value}")))?,
        };

        let ascending = match self.sort_order.as_deref() {
            None | Some("desc") => false,
            Some("asc") => true,
            Some(other) => {
                return Err(AppError::InvalidArgument(format!(
                    "Invalid sort order: {other}"
                )))
            }
        };

        Ok(CouponQuery {
            filter: CouponFilter {
                coupon_type: parse_type_filter(self.coupon_type.as_deref())?,
                redeemed: match self.redeemed.as_deref() {
                    Some("true") => Some(true),
                    Some("false") => Some(false),
                    _ => None,
                },
                ..CouponFilter::default()
            },
            sort,
            ascending,
            limit: self
                .limit
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
            offset: self.offset.unwrap_or(0).max(0),
        })
    }
}

#[utoipa::path(
    get,
    path = "/admin/coupons",
    tag = "coupon",
    params(ListCouponsParams),
    responses(
        (status = 200, description = "One page of coupons", body = CouponListResult),
        (status = 400, description = "Invalid filter or sort", body = ErrorBody),
        (status = 401, description = "No admin session", body = ErrorBody),
    )
)]
pub(super) async fn list_coupons(
    _session: AdminSession,
    State(store): State<Arc<Store>>,
    Query(params): Query<ListCouponsParams>,
) -> AppResult<Json<CouponListResult>> {
    let query = params.into_query()?;
    let page = store.coupons.list(&query).await?;

    Ok(Json(CouponListResult {
        coupons: page.coupons,
        total: page.total,
        page: query.offset / query.limit + 1,
        total_pages: (page.total + query.limit - 1) / query.limit,
        limit: query.limit,
        offset: query.offset,
    }))
}

#[derive(Serialize, Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
pub(super) struct ExportFilters {
    #[serde(rename = "type")]
    pub coupon_type: Option<String>,
    pub redeemed: Option<bool>,
    #[schema(example = "2024-01-01")]
    pub start_date: Option<String>,
    #[schema(example = "2024-01-31")]
    pub end_date: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub(super) struct ExportCouponsPayload {
    /// `csv`, `json` (default), `excel` (served as JSON) or `txt`.
    #[schema(example = "csv")]
    pub format: Option<String>,
    #[serde(default)]
    pub filters: ExportFilters,
}

#[utoipa::path(
    post,
    path = "/admin/coupons/export",
    tag = "coupon",
    request_body = ExportCouponsPayload,
    responses(
        (status = 200, description = "Coupons as a downloadable file", body = String, content_type = "text/csv"),
        (status = 400, description = "Invalid filter", body = ErrorBody),
        (status = 401, description = "No admin session", body = ErrorBody),
        (status = 404, description = "Nothing matches the filters", body = ErrorBody),
    )
)]
pub(super) async fn export_coupons(
    _session: AdminSession,
    State(store): State<Arc<Store>>,
    Json(payload): Json<ExportCouponsPayload>,
) -> AppResult<impl IntoResponse> {
    let filters = payload.filters;
    let filter = CouponFilter {
        coupon_type: parse_type_filter(filters.coupon_type.as_deref())?,
        redeemed: filters.redeemed,
        created_from: filters
            .start_date
            .as_deref()
            .map(|value| export::parse_date_bound(value, false))
            .transpose()?,
        created_to: filters
            .end_date
            .as_deref()
            .map(|value| export::parse_date_bound(value, true))
            .transpose()?,
    };

    let coupons = store.coupons.export(&filter).await?;
    if coupons.is_empty() {
        return Err(AppError::NotFound("Coupons matching the criteria"));
    }

    let format = ExportFormat::parse(payload.format.as_deref());
    let body = format.render(&coupons)?;
    let disposition = format!("attachment; filename=\"{}\"", format.file_name(Utc::now()));

    tracing::info!(count = coupons.len(), format = format.extension(), "exported coupons");

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    ))
}
