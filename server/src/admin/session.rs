use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};

use crate::error::{AppError, AppResult};
use crate::store::{AdminAuth, Store};
use crate::token::{self, MintedToken, TokenError};

pub const ADMIN_COOKIE: &str = "admin_token";

/// Proof that the request carries a valid admin session, from the
/// `admin_token` cookie or a bearer header.
#[derive(Debug, Clone, Copy)]
pub struct AdminSession;

#[axum::async_trait]
impl FromRequestParts<Arc<Store>> for AdminSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        store: &Arc<Store>,
    ) -> Result<Self, Self::Rejection> {
        let token = token::cookie_value(&parts.headers, ADMIN_COOKIE)
            .or_else(|| token::bearer_token(&parts.headers))
            .ok_or(AppError::Unauthorized(TokenError::Missing))?;

        token::verify_admin_token(&store.admin.keys, &token).map_err(AppError::Unauthorized)?;

        Ok(AdminSession)
    }
}

fn decode_password_hash(encoded: &str) -> AppResult<String> {
    let misconfigured = || AppError::Internal("Server misconfiguration".to_string());

    let bytes = STANDARD.decode(encoded.trim()).map_err(|err| {
        tracing::error!(error = %err, "admin password hash is not valid base64");
        misconfigured()
    })?;
    let hash = String::from_utf8(bytes).map_err(|_| {
        tracing::error!("admin password hash is not valid utf-8");
        misconfigured()
    })?;

    if !["$2a$", "$2b$", "$2y$"].iter().any(|prefix| hash.starts_with(prefix)) {
        tracing::error!("admin password hash is not a bcrypt hash");
        return Err(misconfigured());
    }

    Ok(hash)
}

/// Checks `password` against the configured bcrypt hash and mints a session.
pub async fn login(
    admin: &AdminAuth,
    password: &str,
    now: DateTime<Utc>,
) -> AppResult<MintedToken> {
    if password.is_empty() {
        return Err(AppError::InvalidArgument("Password required".to_string()));
    }

    let encoded = admin.password_hash.as_deref().ok_or_else(|| {
        tracing::error!("ADMIN_HASHED_PASSWORD_BASE64 is not configured");
        AppError::Internal("Server misconfiguration".to_string())
    })?;
    let hash = decode_password_hash(encoded)?;

    let password = password.to_string();
    let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|err| AppError::Internal(format!("password check aborted: {err}")))?
        .map_err(|err| {
            tracing::error!(error = %err, "bcrypt verification failed");
            AppError::Internal("Server misconfiguration".to_string())
        })?;

    if !valid {
        tracing::warn!("admin login with wrong password");
        return Err(AppError::Unauthorized(TokenError::InvalidSignature));
    }

    token::issue_admin_token(&admin.keys, now)
        .map_err(|err| AppError::Internal(format!("failed to sign admin token: {err}")))
}

pub fn session_cookie(admin: &AdminAuth, token: &str) -> String {
    let max_age = admin.keys.ttl().num_seconds();
    let mut cookie =
        format!("{ADMIN_COOKIE}={token}; HttpOnly; SameSite=Strict; Path=/; Max-Age={max_age}");
    if admin.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn cleared_cookie(admin: &AdminAuth) -> String {
    let mut cookie = format!("{ADMIN_COOKIE}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0");
    if admin.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}
