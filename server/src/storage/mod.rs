//! Object storage collaborator.
//!
//! Every operation takes the [`StorageSession`] returned by
//! [`ObjectStorage::authorize`], so no call depends on an earlier one having
//! happened somewhere else in the process.

use std::error::Error as _;
use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

pub use b2::B2Client;
pub use retry::{upload_with_retry, RetryPolicy, UploadError, UploadOutcome};

mod b2;
#[cfg(test)]
pub mod fake;
mod retry;

/// Validity of URLs used for inline previews and small downloads.
pub const PREVIEW_URL_TTL: Duration = Duration::from_secs(300);
/// Validity of URLs handed out for video downloads.
pub const VIDEO_DOWNLOAD_URL_TTL: Duration = Duration::from_secs(3600);

pub type ByteStream = BoxStream<'static, Result<Bytes, StorageError>>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("storage returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("no storage file id recorded for {0}")]
    MissingFileId(String),
    #[error("unexpected storage response: {0}")]
    InvalidResponse(String),
}

impl StorageError {
    /// Network level failures and 5xx answers are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(err) => {
                err.is_connect() || err.is_timeout() || err.is_request() || connection_dropped(err)
            }
            Self::Status { status, .. } => *status >= 500,
            Self::MissingFileId(_) | Self::InvalidResponse(_) => false,
        }
    }
}

/// A reset or aborted connection, wherever reqwest surfaced it.
fn connection_dropped(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<io::Error>() {
            return matches!(
                io.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            );
        }
        source = cause.source();
    }
    false
}

/// Credentials obtained from one authorization round trip.
#[derive(Clone)]
pub struct StorageSession {
    pub api_url: String,
    pub download_url: String,
    auth_token: String,
}

impl StorageSession {
    pub fn new(
        api_url: impl Into<String>,
        download_url: impl Into<String>,
        auth_token: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            download_url: download_url.into(),
            auth_token: auth_token.into(),
        }
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }
}

impl fmt::Debug for StorageSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSession")
            .field("api_url", &self.api_url)
            .field("download_url", &self.download_url)
            .field("auth_token", &"[REDACTED]")
            .finish()
    }
}

/// Locates one stored object: provider file id when known, bucket-relative name always.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageDescriptor {
    pub file_id: Option<String>,
    pub file_name: String,
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_id: String,
    pub file_name: String,
    pub content_length: u64,
}

/// A time-boxed download location plus the token that unlocks it.
#[derive(Debug, Clone)]
pub struct SignedUrl {
    pub url: String,
    pub authorization: String,
}

impl SignedUrl {
    /// URL usable without headers, e.g. as a redirect target.
    pub fn redirect_url(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}Authorization={}",
            self.url,
            separator,
            urlencoding::encode(&self.authorization)
        )
    }
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn authorize(&self) -> Result<StorageSession, StorageError>;

    async fn upload(
        &self,
        session: &StorageSession,
        file_name: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<UploadedFile, StorageError>;

    async fn delete(
        &self,
        session: &StorageSession,
        descriptor: &StorageDescriptor,
    ) -> Result<(), StorageError>;

    async fn signed_url(
        &self,
        session: &StorageSession,
        descriptor: &StorageDescriptor,
        valid_for: Duration,
    ) -> Result<SignedUrl, StorageError>;

    async fn open(&self, signed: &SignedUrl) -> Result<ByteStream, StorageError>;
}
