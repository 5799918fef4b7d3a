use std::sync::Arc;

use anyhow::Context;
use axum::{extract::DefaultBodyLimit, routing, Json, Router, Server};
use dotenv::dotenv;
use sqlx::postgres::PgPool;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_rapidoc::RapiDoc;
use utoipa_redoc::{Redoc, Servable};

use crate::config::Config;
use crate::error::ErrorBody;
use crate::storage::{B2Client, RetryPolicy};
use crate::store::{AdminAuth, PgCouponStore, PgMediaCatalog, Store};
use crate::token::TokenKeys;
use crate::types::{Coupon, CouponType, MediaItem, MediaType};

use admin::media::{
    AdminMediaItem, AdminMediaList, DeleteDetails, DeleteReport, DeletedFile, SignedUrlPayload,
    SignedUrlResult, UploadReport, UploadResult, MAX_UPLOAD_REQUEST_BYTES,
};
use admin::{AdminMessage, AdminStatus, LoginPayload};
use coupon::{
    CouponListResult, ExportCouponsPayload, ExportFilters, GenerateCouponsPayload,
    GenerateCouponsResult, GeneratedCoupon,
};
use media::MediaList;
use redeem::{RedeemPayload, RedeemResult};

mod admin;
mod coupon;
mod media;
mod redeem;

mod config;
mod error;
mod mime_types;
mod storage;
mod store;
mod token;
mod types;

#[derive(OpenApi)]
#[openapi(
    paths(
        redeem::redeem_coupon,
        coupon::generate_coupons,
        coupon::list_coupons,
        coupon::export_coupons,
        media::access_media,
        media::stream_media,
        media::download_media,
        admin::login,
        admin::logout,
        admin::me,
        admin::media::list_media,
        admin::media::upload_media,
        admin::media::delete_media,
        admin::media::stream_media,
        admin::media::download_media,
        admin::media::signed_url,
    ),
    components(
        schemas(Coupon, CouponType, MediaItem, MediaType, ErrorBody),
        schemas(RedeemPayload, RedeemResult),
        schemas(GenerateCouponsPayload, GenerateCouponsResult, GeneratedCoupon, CouponListResult, ExportCouponsPayload, ExportFilters),
        schemas(MediaList),
        schemas(LoginPayload, AdminMessage, AdminStatus),
        schemas(AdminMediaItem, AdminMediaList, UploadResult, UploadReport, DeletedFile, DeleteDetails, DeleteReport, SignedUrlPayload, SignedUrlResult),
    ),
    modifiers(&SecuritySchemes),
    tags(
        (name = "redeem", description = "Coupon redemption API"),
        (name = "coupon", description = "Coupon management API"),
        (name = "media", description = "Coupon-gated media API"),
        (name = "admin", description = "Admin session and media management API")
    )
)]
struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "access_token",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "admin_session",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("admin_token"))),
            );
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("invalid configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let store = create_store(&config).await?;

    let app = create_app(store)
        .route("/api-docs/openapi.json", routing::get(openapi_json))
        .merge(Redoc::with_url("/redoc", ApiDoc::openapi()))
        .merge(RapiDoc::new("/api-docs/openapi.json").path("/rapidoc"));

    let address = config.bind_address;
    tracing::info!(%address, "listening; API docs at /redoc and /rapidoc");

    Server::bind(&address)
        .serve(app.into_make_service())
        .await
        .context("server error")
}

pub fn create_app(store: Arc<Store>) -> Router {
    Router::new()
        .route("/coupons/redeem", routing::post(redeem::redeem_coupon))
        .route("/coupons/generate", routing::post(coupon::generate_coupons))
        .route("/media/access", routing::get(media::access_media))
        .route("/media/stream", routing::get(media::stream_media))
        .route("/media/download", routing::get(media::download_media))
        .route("/admin/login", routing::post(admin::login))
        .route("/admin/logout", routing::post(admin::logout))
        .route("/admin/me", routing::get(admin::me))
        .route("/admin/coupons", routing::get(coupon::list_coupons))
        .route("/admin/coupons/export", routing::post(coupon::export_coupons))
        .route(
            "/admin/media",
            routing::get(admin::media::list_media).delete(admin::media::delete_media),
        )
        .route(
            "/admin/media/upload",
            routing::post(admin::media::upload_media)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_REQUEST_BYTES)),
        )
        .route("/admin/media/stream", routing::get(admin::media::stream_media))
        .route("/admin/media/download", routing::get(admin::media::download_media))
        .route("/admin/media/signed-url", routing::post(admin::media::signed_url))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

pub async fn create_store(config: &Config) -> anyhow::Result<Arc<Store>> {
    let db_pool = PgPool::connect(&config.database_url)
        .await
        .context("failed to connect to DB")?;

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("failed to migrate DB")?;

    Ok(Arc::new(Store {
        coupons: Arc::new(PgCouponStore::new(db_pool.clone())),
        media: Arc::new(PgMediaCatalog::new(db_pool)),
        storage: Arc::new(B2Client::new(config.b2.clone())),
        access_keys: TokenKeys::access(&config.coupon_secret),
        admin: AdminAuth {
            keys: TokenKeys::admin(&config.admin_jwt_secret),
            password_hash: config.admin_password_hash.clone(),
            cookie_secure: config.cookie_secure,
        },
        upload_retry: RetryPolicy::default(),
    }))
}
