use std::time::Duration;

use axum::{
    body::StreamBody,
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Redirect, Response},
};

use crate::error::{AppError, AppResult};
use crate::mime_types;
use crate::storage::{ObjectStorage, PREVIEW_URL_TTL, VIDEO_DOWNLOAD_URL_TTL};
use crate::types::{MediaItem, MediaType};

const INLINE_CACHE: &str = "public, max-age=3600";
const VIDEO_ATTACHMENT_CACHE: &str = "public, max-age=31536000";
const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Proxied for in-page playback or display.
    Inline,
    /// Proxied as a file download under the display name.
    Attachment,
    /// Like `Attachment`, but large video containers are redirected to storage.
    Download,
}

pub fn content_disposition(item: &MediaItem) -> String {
    format!(
        "attachment; filename=\"{}\"",
        urlencoding::encode(item.display_name())
    )
}

fn attachment_ttl(item: &MediaItem) -> Duration {
    if item.media_type == MediaType::Video {
        VIDEO_DOWNLOAD_URL_TTL
    } else {
        PREVIEW_URL_TTL
    }
}

pub async fn deliver(
    storage: &dyn ObjectStorage,
    item: &MediaItem,
    delivery: Delivery,
) -> AppResult<Response> {
    let session = storage.authorize().await?;
    let descriptor = item.storage_descriptor();
    let is_video = item.media_type == MediaType::Video;

    if delivery == Delivery::Download
        && is_video
        && mime_types::is_redirected_video(&item.file_name)
    {
        let signed = storage
            .signed_url(&session, &descriptor, VIDEO_DOWNLOAD_URL_TTL)
            .await?;
        tracing::info!(media_id = %item.id, "redirecting video download to storage");
        return Ok(Redirect::temporary(&signed.redirect_url()).into_response());
    }

    let ttl = match delivery {
        Delivery::Inline => PREVIEW_URL_TTL,
        Delivery::Attachment | Delivery::Download => attachment_ttl(item),
    };
    let signed = storage.signed_url(&session, &descriptor, ttl).await?;
    let stream = storage.open(&signed).await?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(mime_types::content_type_for(&item.file_name, item.media_type)),
    );

    match delivery {
        Delivery::Inline => {
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(INLINE_CACHE));
            if is_video {
                headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
            }
        }
        Delivery::Attachment | Delivery::Download => {
            let disposition = HeaderValue::from_str(&content_disposition(item))
                .map_err(|err| AppError::Internal(format!("invalid content disposition: {err}")))?;
            headers.insert(header::CONTENT_DISPOSITION, disposition);
            headers.insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static(if is_video {
                    VIDEO_ATTACHMENT_CACHE
                } else {
                    NO_CACHE
                }),
            );
        }
    }

    Ok((headers, StreamBody::new(stream)).into_response())
}
