//! Extension based content types, shared by every media serving path.

use crate::types::MediaType;

pub const OCTET_STREAM: &str = "application/octet-stream";

const VIDEO_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("mkv", "video/x-matroska"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
    ("avi", "video/x-msvideo"),
    ("mpg", "video/mpeg"),
    ("mpeg", "video/mpeg"),
    ("wmv", "video/x-ms-wmv"),
    ("flv", "video/x-flv"),
    ("3gp", "video/3gpp"),
    ("ts", "video/mp2t"),
];

const IMAGE_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("svg", "image/svg+xml"),
];

const AUDIO_TYPES: &[(&str, &str)] = &[
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("flac", "audio/flac"),
    ("m4a", "audio/mp4"),
    ("aac", "audio/aac"),
];

const UPLOADABLE_VIDEO: &[&str] = &["mp4", "mkv", "mov", "webm", "avi", "mpg", "mpeg"];

/// Large containers are handed to the storage provider instead of proxied.
const REDIRECTED_VIDEO: &[&str] = &["mp4", "mkv", "mov"];

fn table(media_type: MediaType) -> &'static [(&'static str, &'static str)] {
    match media_type {
        MediaType::Video => VIDEO_TYPES,
        MediaType::Image => IMAGE_TYPES,
        MediaType::Audio => AUDIO_TYPES,
    }
}

pub fn extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// Only the table of the item's own media type is consulted.
pub fn content_type_for(file_name: &str, media_type: MediaType) -> &'static str {
    extension(file_name)
        .and_then(|ext| {
            table(media_type)
                .iter()
                .find(|(known, _)| *known == ext)
                .map(|(_, mime)| *mime)
        })
        .unwrap_or(OCTET_STREAM)
}

/// Media type for an accepted upload, `None` when the extension is not allowed.
pub fn classify_upload(file_name: &str) -> Option<MediaType> {
    let ext = extension(file_name)?;
    if UPLOADABLE_VIDEO.contains(&ext.as_str()) {
        Some(MediaType::Video)
    } else if AUDIO_TYPES.iter().any(|(known, _)| *known == ext) {
        Some(MediaType::Audio)
    } else if IMAGE_TYPES.iter().any(|(known, _)| *known == ext) {
        Some(MediaType::Image)
    } else {
        None
    }
}

pub fn is_redirected_video(file_name: &str) -> bool {
    extension(file_name).map_or(false, |ext| REDIRECTED_VIDEO.contains(&ext.as_str()))
}
