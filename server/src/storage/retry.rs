use std::time::Duration;

use bytes::Bytes;

use super::{ObjectStorage, StorageError, StorageSession, UploadedFile};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following `attempt` (1-based): base, 2x, 4x, ...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

#[derive(Debug)]
pub struct UploadOutcome {
    pub file: UploadedFile,
    pub attempts: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload failed after {attempts} attempts due to persistent network issues: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: StorageError,
    },
    #[error(transparent)]
    Rejected(StorageError),
}

/// Uploads one object, retrying transient failures with exponential backoff.
/// Any other failure is returned right away without using the remaining budget.
pub async fn upload_with_retry(
    storage: &dyn ObjectStorage,
    session: &StorageSession,
    policy: RetryPolicy,
    file_name: &str,
    content_type: &str,
    data: Bytes,
) -> Result<UploadOutcome, UploadError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match storage
            .upload(session, file_name, content_type, data.clone())
            .await
        {
            Ok(file) => {
                return Ok(UploadOutcome {
                    file,
                    attempts: attempt,
                })
            }
            Err(err) if !err.is_transient() => return Err(UploadError::Rejected(err)),
            Err(err) if attempt >= max_attempts => {
                return Err(UploadError::Exhausted {
                    attempts: attempt,
                    source: err,
                })
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    file_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "upload attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fake::FakeStorage;

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
        }
    }

    fn unavailable() -> StorageError {
        StorageError::Status {
            status: 503,
            message: "service_unavailable".to_string(),
        }
    }

    #[test]
    fn backoff_doubles_from_one_second() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (1..=5).map(|a| policy.delay_after(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let storage = FakeStorage::default();
        storage.fail_next_uploads(vec![unavailable(), unavailable()]);
        let session = storage.authorize().await.unwrap();

        let outcome = upload_with_retry(
            &storage,
            &session,
            quick(),
            "a.png",
            "image/png",
            Bytes::from_static(b"png"),
        )
        .await
        .unwrap();

        assert_eq!(outcome.attempts, 3);
        assert_eq!(storage.upload_attempts(), 3);
        assert!(storage.contains("a.png"));
    }

    #[tokio::test]
    async fn aborts_immediately_on_non_transient_failure() {
        let storage = FakeStorage::default();
        storage.fail_next_uploads(vec![StorageError::Status {
            status: 400,
            message: "bad_request".to_string(),
        }]);
        let session = storage.authorize().await.unwrap();

        let err = upload_with_retry(
            &storage,
            &session,
            quick(),
            "a.png",
            "image/png",
            Bytes::from_static(b"png"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, UploadError::Rejected(_)));
        assert_eq!(storage.upload_attempts(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let storage = FakeStorage::default();
        storage.fail_next_uploads((0..6).map(|_| unavailable()).collect());
        let session = storage.authorize().await.unwrap();

        let err = upload_with_retry(
            &storage,
            &session,
            quick(),
            "a.png",
            "image/png",
            Bytes::from_static(b"png"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, UploadError::Exhausted { attempts: 5, .. }));
        assert_eq!(storage.upload_attempts(), 5);
    }
}
