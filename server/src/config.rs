use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} missing in environment")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Clone)]
pub struct B2Config {
    pub key_id: String,
    pub application_key: String,
    pub bucket_id: String,
    pub bucket_name: String,
    /// Overrides the download host returned by account authorization.
    pub download_url: Option<String>,
}

impl fmt::Debug for B2Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("B2Config")
            .field("key_id", &self.key_id)
            .field("application_key", &"[REDACTED]")
            .field("bucket_id", &self.bucket_id)
            .field("bucket_name", &self.bucket_name)
            .field("download_url", &self.download_url)
            .finish()
    }
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub coupon_secret: String,
    pub admin_jwt_secret: String,
    /// Base64 of a bcrypt hash. Login answers 500 while it is unset.
    pub admin_password_hash: Option<String>,
    pub b2: B2Config,
    pub bind_address: SocketAddr,
    pub cookie_secure: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("coupon_secret", &"[REDACTED]")
            .field("admin_jwt_secret", &"[REDACTED]")
            .field("admin_password_hash", &self.admin_password_hash.as_ref().map(|_| "[REDACTED]"))
            .field("b2", &self.b2)
            .field("bind_address", &self.bind_address)
            .field("cookie_secure", &self.cookie_secure)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let optional = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let required = |name: &'static str| optional(name).ok_or(ConfigError::Missing(name));

        let bind_address = match optional("BIND_ADDRESS") {
            Some(value) => value.parse().map_err(|err: std::net::AddrParseError| {
                ConfigError::Invalid {
                    name: "BIND_ADDRESS",
                    reason: err.to_string(),
                }
            })?,
            None => SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
        };

        let cookie_secure = match optional("COOKIE_SECURE").as_deref() {
            None | Some("false") | Some("0") => false,
            Some("true") | Some("1") => true,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "COOKIE_SECURE",
                    reason: format!("expected true or false, got {other}"),
                })
            }
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            coupon_secret: required("COUPON_SECRET")?,
            admin_jwt_secret: required("ADMIN_JWT_SECRET")?,
            admin_password_hash: optional("ADMIN_HASHED_PASSWORD_BASE64"),
            b2: B2Config {
                key_id: required("B2_KEY_ID")?,
                application_key: required("B2_APPLICATION_KEY")?,
                bucket_id: required("B2_BUCKET_ID")?,
                bucket_name: required("B2_BUCKET_NAME")?,
                download_url: optional("B2_DOWNLOAD_URL")
                    .map(|url| url.trim_end_matches('/').to_string()),
            },
            bind_address,
            cookie_secure,
        })
    }
}
