//! Backblaze B2 native API (v2) client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;

use super::{
    ByteStream, ObjectStorage, SignedUrl, StorageDescriptor, StorageError, StorageSession,
    UploadedFile,
};
use crate::config::B2Config;

const AUTHORIZE_ACCOUNT_URL: &str = "https://api.backblazeb2.com/b2api/v2/b2_authorize_account";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeAccountResponse {
    authorization_token: String,
    api_url: String,
    download_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetUploadUrlResponse {
    upload_url: String,
    authorization_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadFileResponse {
    file_id: String,
    file_name: String,
    #[serde(default)]
    content_length: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadAuthorizationResponse {
    authorization_token: String,
}

pub struct B2Client {
    http: reqwest::Client,
    config: B2Config,
}

impl B2Client {
    pub fn new(config: B2Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn api(&self, session: &StorageSession, call: &str) -> String {
        format!("{}/b2api/v2/{}", session.api_url, call)
    }

    fn download_base<'a>(&'a self, session: &'a StorageSession) -> &'a str {
        self.config
            .download_url
            .as_deref()
            .unwrap_or(&session.download_url)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(StorageError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ObjectStorage for B2Client {
    async fn authorize(&self) -> Result<StorageSession, StorageError> {
        let response = self
            .http
            .get(AUTHORIZE_ACCOUNT_URL)
            .basic_auth(&self.config.key_id, Some(&self.config.application_key))
            .send()
            .await?;
        let account: AuthorizeAccountResponse = ensure_success(response).await?.json().await?;

        tracing::debug!(api_url = %account.api_url, "storage authorization succeeded");

        Ok(StorageSession::new(
            account.api_url,
            account.download_url,
            account.authorization_token,
        ))
    }

    async fn upload(
        &self,
        session: &StorageSession,
        file_name: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<UploadedFile, StorageError> {
        // B2 hands out a fresh upload URL per attempt; they are not reusable after a failure.
        let response = self
            .http
            .post(self.api(session, "b2_get_upload_url"))
            .header(AUTHORIZATION, session.auth_token())
            .json(&json!({ "bucketId": self.config.bucket_id }))
            .send()
            .await?;
        let target: GetUploadUrlResponse = ensure_success(response).await?.json().await?;

        let size = data.len() as u64;
        let encoded_name = urlencoding::encode(file_name).into_owned();
        let response = self
            .http
            .post(&target.upload_url)
            .header(AUTHORIZATION, &target.authorization_token)
            .header("X-Bz-File-Name", encoded_name)
            .header(CONTENT_TYPE, content_type)
            .header("X-Bz-Content-Sha1", "do_not_verify")
            .body(data)
            .send()
            .await?;
        let uploaded: UploadFileResponse = ensure_success(response).await?.json().await?;

        tracing::info!(file_name = %uploaded.file_name, size, "stored object");

        Ok(UploadedFile {
            file_id: uploaded.file_id,
            file_name: uploaded.file_name,
            content_length: if uploaded.content_length > 0 {
                uploaded.content_length
            } else {
                size
            },
        })
    }

    async fn delete(
        &self,
        session: &StorageSession,
        descriptor: &StorageDescriptor,
    ) -> Result<(), StorageError> {
        let file_id = descriptor
            .file_id
            .as_deref()
            .ok_or_else(|| StorageError::MissingFileId(descriptor.file_name.clone()))?;

        let response = self
            .http
            .post(self.api(session, "b2_delete_file_version"))
            .header(AUTHORIZATION, session.auth_token())
            .json(&json!({ "fileName": descriptor.file_name, "fileId": file_id }))
            .send()
            .await?;
        ensure_success(response).await?;

        tracing::info!(file_name = %descriptor.file_name, "deleted object");
        Ok(())
    }

    async fn signed_url(
        &self,
        session: &StorageSession,
        descriptor: &StorageDescriptor,
        valid_for: Duration,
    ) -> Result<SignedUrl, StorageError> {
        let response = self
            .http
            .post(self.api(session, "b2_get_download_authorization"))
            .header(AUTHORIZATION, session.auth_token())
            .json(&json!({
                "bucketId": self.config.bucket_id,
                "fileNamePrefix": descriptor.file_name,
                "validDurationInSeconds": valid_for.as_secs(),
            }))
            .send()
            .await?;
        let grant: DownloadAuthorizationResponse = ensure_success(response).await?.json().await?;

        if grant.authorization_token.is_empty() {
            return Err(StorageError::InvalidResponse(
                "empty download authorization token".to_string(),
            ));
        }

        // Download authorizations are only honored by download-by-name.
        let url = format!(
            "{}/file/{}/{}",
            self.download_base(session),
            self.config.bucket_name,
            urlencoding::encode(&descriptor.file_name)
        );

        Ok(SignedUrl {
            url,
            authorization: grant.authorization_token,
        })
    }

    async fn open(&self, signed: &SignedUrl) -> Result<ByteStream, StorageError> {
        let response = self
            .http
            .get(&signed.url)
            .header(AUTHORIZATION, &signed.authorization)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        Ok(response
            .bytes_stream()
            .map_err(StorageError::from)
            .boxed())
    }
}
