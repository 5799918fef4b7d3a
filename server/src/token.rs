//! HS256 bearer tokens for coupon access and admin sessions.

use std::fmt;

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

pub const ACCESS_TOKEN_TTL_HOURS: i64 = 24;
pub const ADMIN_SESSION_TTL_HOURS: i64 = 8;

/// Why a token was refused. Clients only ever see a generic 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token missing")]
    Missing,
    #[error("token malformed")]
    Malformed,
    #[error("token signature invalid")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
}

impl TokenError {
    pub fn reason(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Malformed => "malformed",
            Self::InvalidSignature => "invalid_signature",
            Self::Expired => "expired",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            _ => Self::Malformed,
        }
    }
}

/// Signing material plus the lifetime of the tokens it mints.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenKeys")
            .field("secret", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenKeys {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn access(secret: &str) -> Self {
        Self::new(secret, Duration::hours(ACCESS_TOKEN_TTL_HOURS))
    }

    pub fn admin(secret: &str) -> Self {
        Self::new(secret, Duration::hours(ADMIN_SESSION_TTL_HOURS))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn encode<C: Serialize>(&self, claims: &C) -> Result<String, jsonwebtoken::errors::Error> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
    }

    fn decode<C: DeserializeOwned>(&self, token: &str) -> Result<C, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = jsonwebtoken::decode::<C>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    pub coupon_id: Uuid,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminClaims {
    pub admin: bool,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct MintedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Binds a client to one coupon for the key's lifetime, independent of the
/// coupon record's own `expires_at`.
pub fn issue_access_token(
    keys: &TokenKeys,
    coupon_id: Uuid,
    now: DateTime<Utc>,
) -> Result<MintedToken, jsonwebtoken::errors::Error> {
    let expires_at = now + keys.ttl;
    let claims = AccessClaims {
        coupon_id,
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
    };
    Ok(MintedToken {
        token: keys.encode(&claims)?,
        expires_at,
    })
}

pub fn verify_access_token(keys: &TokenKeys, token: &str) -> Result<Uuid, TokenError> {
    keys.decode::<AccessClaims>(token)
        .map(|claims| claims.coupon_id)
}

pub fn issue_admin_token(
    keys: &TokenKeys,
    now: DateTime<Utc>,
) -> Result<MintedToken, jsonwebtoken::errors::Error> {
    let expires_at = now + keys.ttl;
    let claims = AdminClaims {
        admin: true,
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
    };
    Ok(MintedToken {
        token: keys.encode(&claims)?,
        expires_at,
    })
}

pub fn verify_admin_token(keys: &TokenKeys, token: &str) -> Result<(), TokenError> {
    let claims = keys.decode::<AdminClaims>(token)?;
    if claims.admin {
        Ok(())
    } else {
        Err(TokenError::Malformed)
    }
}

/// Clients that lost their token tend to send these literals instead.
fn usable(token: &str) -> Option<String> {
    let token = token.trim();
    match token {
        "" | "null" | "undefined" => None,
        _ => Some(token.to_string()),
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .and_then(usable)
}

/// Prefers an explicit `?token=` value and falls back to the bearer header.
pub fn query_or_bearer_token(query: Option<&str>, headers: &HeaderMap) -> Option<String> {
    query.and_then(usable).or_else(|| bearer_token(headers))
}

pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .find_map(|cookie| {
            let (key, value) = cookie.trim().split_once('=')?;
            (key == name).then(|| value.to_string())
        })
        .and_then(|value| usable(&value))
}
