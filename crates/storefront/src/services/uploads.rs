//! Store photo uploads.
//!
//! Accepts `image/*` uploads only, scales them to a fixed width and writes
//! them to the upload directory under a random name.

use std::io::Cursor;
use std::path::Path;

use axum::body::Bytes;
use image::imageops::FilterType;
use thiserror::Error;
use uuid::Uuid;

/// Width of stored photos; height keeps the aspect ratio.
pub const PHOTO_WIDTH: u32 = 800;

/// Message returned for non-image uploads.
pub const NOT_ALLOWED_MESSAGE: &str = "That type is not allowed!";

/// Errors from photo uploads.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The upload's MIME type is not `image/*`.
    #[error("{NOT_ALLOWED_MESSAGE}")]
    NotAllowed,

    /// The bytes could not be decoded or re-encoded as an image.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Writing the file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The resize task panicked or was cancelled.
    #[error("resize task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// File extension for an accepted MIME type (`image/jpeg` -> `jpeg`).
///
/// # Errors
///
/// Returns `UploadError::NotAllowed` unless the type is `image/<subtype>`.
pub fn photo_extension(content_type: &str) -> Result<String, UploadError> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.split_once('/') {
        Some(("image", subtype))
            if !subtype.is_empty()
                && subtype.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') =>
        {
            Ok(subtype.to_owned())
        }
        _ => Err(UploadError::NotAllowed),
    }
}

/// Height that keeps the aspect ratio of a `width` x `height` image scaled to
/// [`PHOTO_WIDTH`] wide.
fn scaled_height(width: u32, height: u32) -> u32 {
    if width == 0 {
        return 1;
    }
    let scaled = (u64::from(height) * u64::from(PHOTO_WIDTH) + u64::from(width) / 2)
        / u64::from(width);
    u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
}

/// Decode, resize and re-encode an image in its original format.
fn resize_photo(bytes: &[u8]) -> Result<Vec<u8>, UploadError> {
    let format = image::guess_format(bytes)?;
    let img = image::load_from_memory_with_format(bytes, format)?;
    let resized = img.resize_exact(
        PHOTO_WIDTH,
        scaled_height(img.width(), img.height()),
        FilterType::Lanczos3,
    );

    let mut buffer = Vec::new();
    resized.write_to(&mut Cursor::new(&mut buffer), format)?;
    Ok(buffer)
}

/// Validate, resize and store an uploaded photo.
///
/// Returns the stored file name (`<uuid>.<subtype>`).
///
/// # Errors
///
/// Returns `UploadError::NotAllowed` for non-image types, or an image or I/O
/// error if the photo cannot be processed or written.
pub async fn save_photo(
    upload_dir: &Path,
    content_type: &str,
    bytes: Bytes,
) -> Result<String, UploadError> {
    let extension = photo_extension(content_type)?;

    let resized = tokio::task::spawn_blocking(move || resize_photo(&bytes)).await??;

    let file_name = format!("{}.{extension}", Uuid::new_v4());
    tokio::fs::create_dir_all(upload_dir).await?;
    tokio::fs::write(upload_dir.join(&file_name), resized).await?;

    tracing::info!(file_name = %file_name, "Photo stored");
    Ok(file_name)
}

/// Delete a stored photo. Failures are logged, not returned.
pub async fn discard_photo(upload_dir: &Path, file_name: &str) {
    match tokio::fs::remove_file(upload_dir.join(file_name)).await {
        Ok(()) => tracing::info!(file_name = %file_name, "Photo discarded"),
        Err(e) => tracing::warn!(file_name = %file_name, error = %e, "Failed to discard photo"),
    }
}
