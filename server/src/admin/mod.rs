use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{AppResult, ErrorBody};
use crate::store::Store;

pub use session::AdminSession;

pub(super) mod media;
mod session;
mod test;

#[derive(Serialize, Deserialize, ToSchema)]
pub(super) struct LoginPayload {
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub(super) struct AdminMessage {
    pub success: bool,
    #[schema(example = "Login successful")]
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/admin/login",
    tag = "admin",
    request_body = LoginPayload,
    responses(
        (status = 200, description = "Session cookie set", body = AdminMessage),
        (status = 400, description = "Password missing", body = ErrorBody),
        (status = 401, description = "Wrong password", body = ErrorBody),
        (status = 500, description = "Password hash not configured or unusable", body = ErrorBody),
    )
)]
pub(super) async fn login(
    State(store): State<Arc<Store>>,
    Json(payload): Json<LoginPayload>,
) -> AppResult<impl IntoResponse> {
    let minted = session::login(&store.admin, &payload.password, Utc::now()).await?;

    tracing::info!(expires_at = %minted.expires_at, "admin logged in");

    Ok((
        [(
            header::SET_COOKIE,
            session::session_cookie(&store.admin, &minted.token),
        )],
        Json(AdminMessage {
            success: true,
            message: "Login successful".to_string(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/admin/logout",
    tag = "admin",
    responses(
        (status = 200, description = "Session cookie cleared", body = AdminMessage),
    )
)]
pub(super) async fn logout(State(store): State<Arc<Store>>) -> impl IntoResponse {
    (
        [
            (header::SET_COOKIE, session::cleared_cookie(&store.admin)),
            (
                header::HeaderName::from_static("clear-site-data"),
                "\"cookies\", \"storage\"".to_string(),
            ),
            (
                header::CACHE_CONTROL,
                "no-store, no-cache, must-revalidate".to_string(),
            ),
        ],
        Json(AdminMessage {
            success: true,
            message: "Logged out successfully".to_string(),
        }),
    )
}

#[derive(Serialize, Deserialize, ToSchema)]
pub(super) struct AdminStatus {
    pub authorized: bool,
}

#[utoipa::path(
    get,
    path = "/admin/me",
    tag = "admin",
    responses(
        (status = 200, description = "The admin session is valid", body = AdminStatus),
        (status = 401, description = "No admin session", body = ErrorBody),
    )
)]
pub(super) async fn me(_session: AdminSession) -> Json<AdminStatus> {
    Json(AdminStatus { authorized: true })
}
