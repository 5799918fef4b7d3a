//! Admin media management: catalog listing, batch upload and delete, and
//! ungated retrieval.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Multipart, Query, State},
    response::Response,
    Json,
};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::AdminSession;
use crate::error::{AppError, AppResult, ErrorBody};
use crate::media::{deliver, parse_media_id, Delivery};
use crate::mime_types;
use crate::storage::{self, StorageDescriptor, StorageSession, UploadError};
use crate::store::Store;
use crate::types::{MediaItem, MediaType, NewMedia};

pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;
/// Cap on a whole multipart request, which may carry several files.
pub const MAX_UPLOAD_REQUEST_BYTES: usize = 1024 * 1024 * 1024;

const DEFAULT_SIGNED_URL_SECS: u64 = 3600;
/// Longest validity the storage provider accepts for a download authorization.
const MAX_SIGNED_URL_SECS: u64 = 7 * 24 * 3600;

/// Keeps `[A-Za-z0-9.-]` and replaces everything else with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub fn storage_key(original_name: &str) -> String {
    format!("{}-{}", Uuid::new_v4(), sanitize_file_name(original_name))
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AdminMediaItem {
    pub id: Uuid,
    pub file_name: String,
    pub display_name: String,
    #[serde(rename = "original_filename")]
    pub original_filename: Option<String>,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    #[serde(rename = "file_size")]
    pub file_size: i64,
    #[serde(rename = "uploaded_at")]
    pub uploaded_at: DateTime<Utc>,
}

impl From<MediaItem> for AdminMediaItem {
    fn from(item: MediaItem) -> Self {
        Self {
            id: item.id,
            display_name: item.display_name().to_string(),
            file_name: item.file_name,
            original_filename: item.original_filename,
            media_type: item.media_type,
            file_size: item.file_size,
            uploaded_at: item.uploaded_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub(crate) struct AdminMediaList {
    pub media: Vec<AdminMediaItem>,
}

#[utoipa::path(
    get,
    path = "/admin/media",
    tag = "admin",
    responses(
        (status = 200, description = "Whole catalog, newest first", body = AdminMediaList),
        (status = 401, description = "No admin session", body = ErrorBody),
    )
)]
pub(crate) async fn list_media(
    _session: AdminSession,
    State(store): State<Arc<Store>>,
) -> AppResult<Json<AdminMediaList>> {
    let media = store.media.list(None).await?;
    Ok(Json(AdminMediaList {
        media: media.into_iter().map(AdminMediaItem::from).collect(),
    }))
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UploadResult {
    pub original_file_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<MediaType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_used: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResult {
    fn failed(original_file_name: String, error: impl Into<String>) -> Self {
        Self {
            original_file_name,
            success: false,
            media_id: None,
            file_name: None,
            file_size: None,
            file_type: None,
            attempts_used: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub(crate) struct UploadReport {
    pub results: Vec<UploadResult>,
    pub uploaded: usize,
    pub failed: usize,
}

fn validate_upload(original_name: &str, size: usize) -> Result<MediaType, String> {
    if size == 0 {
        return Err("Invalid file size".to_string());
    }
    if size > MAX_UPLOAD_BYTES {
        return Err("File size exceeds 100MB limit".to_string());
    }
    mime_types::classify_upload(original_name).ok_or_else(|| "File type not allowed".to_string())
}

/// Stores one validated file and records it in the catalog. A blob whose
/// catalog insert fails is removed again.
async fn store_upload(
    store: &Store,
    session: &StorageSession,
    original_name: String,
    media_type: MediaType,
    data: Bytes,
) -> UploadResult {
    let key = storage_key(&original_name);
    let content_type = mime_types::content_type_for(&key, media_type);

    let outcome = match storage::upload_with_retry(
        store.storage.as_ref(),
        session,
        store.upload_retry,
        &key,
        content_type,
        data,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(file_name = %key, error = %err, "upload failed");
            let message = match err {
                UploadError::Exhausted { .. } => {
                    "Storage service temporarily unavailable. Please try again.".to_string()
                }
                UploadError::Rejected(err) => format!("Storage rejected the upload: {err}"),
            };
            return UploadResult::failed(original_name, message);
        }
    };

    let record = NewMedia {
        file_name: outcome.file.file_name.clone(),
        original_filename: Some(original_name.clone()),
        media_type,
        file_size: outcome.file.content_length as i64,
        storage_file_id: Some(outcome.file.file_id.clone()),
        uploaded_at: Utc::now(),
    };

    match store.media.insert(&record).await {
        Ok(item) => {
            tracing::info!(
                media_id = %item.id,
                file_name = %key,
                attempts = outcome.attempts,
                "media uploaded"
            );
            UploadResult {
                original_file_name: original_name,
                success: true,
                media_id: Some(item.id),
                file_name: Some(item.file_name),
                file_size: Some(item.file_size),
                file_type: Some(item.media_type),
                attempts_used: Some(outcome.attempts),
                error: None,
            }
        }
        Err(err) => {
            tracing::error!(
                file_name = %key,
                error = %err,
                "failed to record upload, removing blob"
            );
            let descriptor = StorageDescriptor {
                file_id: Some(outcome.file.file_id),
                file_name: key,
            };
            if let Err(cleanup) = store.storage.delete(session, &descriptor).await {
                tracing::error!(
                    file_name = %descriptor.file_name,
                    error = %cleanup,
                    "failed to remove orphaned blob"
                );
            }
            UploadResult::failed(original_name, "Failed to record upload")
        }
    }
}

enum FieldBody {
    Complete(Bytes),
    TooLarge,
}

async fn read_field(
    field: &mut axum::extract::multipart::Field<'_>,
) -> Result<FieldBody, AppError> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|err| AppError::InvalidArgument(format!("Malformed upload: {err}")))?
    {
        if buffer.len() + chunk.len() > MAX_UPLOAD_BYTES {
            return Ok(FieldBody::TooLarge);
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(FieldBody::Complete(buffer.freeze()))
}

#[utoipa::path(
    post,
    path = "/admin/media/upload",
    tag = "admin",
    request_body(content = String, description = "One or more `file` parts", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Per-file outcome", body = UploadReport),
        (status = 400, description = "No file in the request", body = ErrorBody),
        (status = 401, description = "No admin session", body = ErrorBody),
        (status = 502, description = "Storage authorization failed", body = ErrorBody),
        (status = 503, description = "Storage unreachable", body = ErrorBody),
    )
)]
pub(crate) async fn upload_media(
    _session: AdminSession,
    State(store): State<Arc<Store>>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadReport>> {
    let mut results = Vec::new();
    let mut session: Option<StorageSession> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::InvalidArgument(format!("Malformed upload: {err}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field.file_name().unwrap_or_default().to_string();

        let data = match read_field(&mut field).await? {
            FieldBody::Complete(data) => data,
            FieldBody::TooLarge => {
                results.push(UploadResult::failed(original_name, "File size exceeds 100MB limit"));
                continue;
            }
        };
        drop(field);

        let media_type = match validate_upload(&original_name, data.len()) {
            Ok(media_type) => media_type,
            Err(reason) => {
                tracing::info!(file_name = %original_name, reason = %reason, "upload rejected");
                results.push(UploadResult::failed(original_name, reason));
                continue;
            }
        };

        if session.is_none() {
            session = Some(store.storage.authorize().await?);
        }
        if let Some(session) = &session {
            results.push(store_upload(&store, session, original_name, media_type, data).await);
        }
    }

    if results.is_empty() {
        return Err(AppError::InvalidArgument("No file uploaded".to_string()));
    }

    let uploaded = results.iter().filter(|r| r.success).count();
    let failed = results.len() - uploaded;
    Ok(Json(UploadReport {
        results,
        uploaded,
        failed,
    }))
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct DeleteParams {
    /// A single media id.
    pub id: Option<String>,
    /// Comma separated media ids.
    pub ids: Option<String>,
}

impl DeleteParams {
    fn media_ids(&self) -> AppResult<Vec<Uuid>> {
        let raw: Vec<&str> = match (&self.ids, &self.id) {
            (Some(ids), _) => ids.split(',').map(str::trim).filter(|id| !id.is_empty()).collect(),
            (None, Some(id)) => vec![id.trim()],
            (None, None) => Vec::new(),
        };
        if raw.is_empty() {
            return Err(AppError::InvalidArgument("No media ID(s) provided".to_string()));
        }
        raw.into_iter().map(|id| parse_media_id(Some(id))).collect()
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeletedFile {
    pub id: Uuid,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub(crate) struct DeleteDetails {
    pub successful: Vec<DeletedFile>,
    pub failed: Vec<DeletedFile>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub(crate) struct DeleteReport {
    pub success: bool,
    #[schema(example = "Deleted 2 file(s)")]
    pub message: String,
    pub details: DeleteDetails,
}

#[utoipa::path(
    delete,
    path = "/admin/media",
    tag = "admin",
    params(DeleteParams),
    responses(
        (status = 200, description = "Per-file outcome; catalog rows go only with their blobs", body = DeleteReport),
        (status = 400, description = "No or malformed ids", body = ErrorBody),
        (status = 401, description = "No admin session", body = ErrorBody),
        (status = 404, description = "None of the ids exist", body = ErrorBody),
    )
)]
pub(crate) async fn delete_media(
    _session: AdminSession,
    State(store): State<Arc<Store>>,
    Query(params): Query<DeleteParams>,
) -> AppResult<Json<DeleteReport>> {
    let ids = params.media_ids()?;
    let records = store.media.find_many(&ids).await?;
    if records.is_empty() {
        return Err(AppError::NotFound("Media to delete"));
    }

    let session = store.storage.authorize().await?;
    let mut details = DeleteDetails {
        successful: Vec::new(),
        failed: Vec::new(),
    };

    for record in records {
        match store
            .storage
            .delete(&session, &record.storage_descriptor())
            .await
        {
            Ok(()) => details.successful.push(DeletedFile {
                id: record.id,
                file_name: record.file_name,
                error: None,
            }),
            Err(err) => {
                tracing::error!(media_id = %record.id, error = %err, "failed to delete blob");
                details.failed.push(DeletedFile {
                    id: record.id,
                    file_name: record.file_name,
                    error: Some(err.to_string()),
                });
            }
        }
    }

    let removed: Vec<Uuid> = details.successful.iter().map(|file| file.id).collect();
    if !removed.is_empty() {
        // Blobs are already gone; a leftover row is reported in the log only.
        if let Err(err) = store.media.delete_many(&removed).await {
            tracing::error!(error = %err, count = removed.len(), "failed to delete catalog rows");
        }
    }

    tracing::info!(
        deleted = details.successful.len(),
        failed = details.failed.len(),
        "media delete finished"
    );

    Ok(Json(DeleteReport {
        success: true,
        message: format!("Deleted {} file(s)", details.successful.len()),
        details,
    }))
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub(crate) struct AdminMediaParams {
    pub id: Option<String>,
}

async fn find_media(store: &Store, params: &AdminMediaParams) -> AppResult<MediaItem> {
    let id = parse_media_id(params.id.as_deref())?;
    store
        .media
        .find(id)
        .await?
        .ok_or(AppError::NotFound("Media"))
}

#[utoipa::path(
    get,
    path = "/admin/media/stream",
    tag = "admin",
    params(AdminMediaParams),
    responses(
        (status = 200, description = "Media bytes for inline display", body = Vec<u8>, content_type = "application/octet-stream"),
        (status = 400, description = "Missing or malformed media id", body = ErrorBody),
        (status = 401, description = "No admin session", body = ErrorBody),
        (status = 404, description = "Media not found", body = ErrorBody),
    )
)]
pub(crate) async fn stream_media(
    _session: AdminSession,
    State(store): State<Arc<Store>>,
    Query(params): Query<AdminMediaParams>,
) -> AppResult<Response> {
    let item = find_media(&store, &params).await?;
    deliver(store.storage.as_ref(), &item, Delivery::Inline).await
}

#[utoipa::path(
    get,
    path = "/admin/media/download",
    tag = "admin",
    params(AdminMediaParams),
    responses(
        (status = 200, description = "Media bytes as an attachment", body = Vec<u8>, content_type = "application/octet-stream"),
        (status = 400, description = "Missing or malformed media id", body = ErrorBody),
        (status = 401, description = "No admin session", body = ErrorBody),
        (status = 404, description = "Media not found", body = ErrorBody),
    )
)]
pub(crate) async fn download_media(
    _session: AdminSession,
    State(store): State<Arc<Store>>,
    Query(params): Query<AdminMediaParams>,
) -> AppResult<Response> {
    let item = find_media(&store, &params).await?;
    deliver(store.storage.as_ref(), &item, Delivery::Attachment).await
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignedUrlPayload {
    #[schema(example = "3f0c5a9e-0d7e-4c1b-9a51-2b8b6f0f6a11-holiday.mp4")]
    pub file_name: Option<String>,
    /// Seconds, defaults to one hour.
    #[schema(example = 3600)]
    pub expires_in: Option<u64>,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignedUrlResult {
    pub signed_url: String,
}

#[utoipa::path(
    post,
    path = "/admin/media/signed-url",
    tag = "admin",
    request_body = SignedUrlPayload,
    responses(
        (status = 200, description = "Time-boxed storage URL", body = SignedUrlResult),
        (status = 400, description = "Missing file name or invalid validity", body = ErrorBody),
        (status = 401, description = "No admin session", body = ErrorBody),
    )
)]
pub(crate) async fn signed_url(
    _session: AdminSession,
    State(store): State<Arc<Store>>,
    Json(payload): Json<SignedUrlPayload>,
) -> AppResult<Json<SignedUrlResult>> {
    let file_name = payload
        .file_name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::InvalidArgument("Missing file name".to_string()))?;

    let expires_in = payload.expires_in.unwrap_or(DEFAULT_SIGNED_URL_SECS);
    if !(1..=MAX_SIGNED_URL_SECS).contains(&expires_in) {
        return Err(AppError::InvalidArgument(format!(
            "expiresIn must be between 1 and {MAX_SIGNED_URL_SECS} seconds"
        )));
    }

    let session = store.storage.authorize().await?;
    let signed = store
        .storage
        .signed_url(
            &session,
            &StorageDescriptor {
                file_id: None,
                file_name,
            },
            Duration::from_secs(expires_in),
        )
        .await?;

    Ok(Json(SignedUrlResult {
        signed_url: signed.redirect_url(),
    }))
}
