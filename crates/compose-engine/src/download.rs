//! Fetching remote image backgrounds into the temp arena.
//!
//! Looping a remote image through ffmpeg's own HTTP reader re-fetches it
//! for every frame, so image URLs are always downloaded first.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use vbr_common::error::{VbrError, VbrResult};
use vbr_media_model::lowercase_extension;

use crate::context::MediaContext;

/// Prefix of downloaded image files inside the arena.
pub const DOWNLOAD_PREFIX: &str = "downloaded_image_";

const DEFAULT_IMAGE_EXTENSION: &str = ".png";

const KNOWN_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp", "tiff", "tif"];

/// File extension (with dot) for a downloaded image.
///
/// The `Content-Type` header wins, then the URL path, then `.png`.
pub fn extension_for_content_type(content_type: Option<&str>, url_path: &str) -> String {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase());

    let from_header = match mime.as_deref() {
        Some("image/png") => Some(".png"),
        Some("image/jpeg") | Some("image/jpg") => Some(".jpg"),
        Some("image/webp") => Some(".webp"),
        Some("image/gif") => Some(".gif"),
        Some("image/bmp") => Some(".bmp"),
        Some("image/tiff") => Some(".tiff"),
        _ => None,
    };
    if let Some(ext) = from_header {
        return ext.to_string();
    }

    match lowercase_extension(url_path) {
        Some(ext) if KNOWN_IMAGE_EXTENSIONS.contains(&ext.as_str()) => format!(".{ext}"),
        _ => DEFAULT_IMAGE_EXTENSION.to_string(),
    }
}

/// Blocking HTTP(S) fetch of `url` into `output`.
///
/// Returns the response `Content-Type`, if any.
pub fn download_file_blocking(url: &str, output: &Path, timeout: Duration) -> VbrResult<Option<String>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| VbrError::acquisition(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| VbrError::acquisition(format!("Request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(VbrError::acquisition(format!(
            "HTTP {}: {}",
            response.status(),
            url
        )));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = response
        .bytes()
        .map_err(|e| VbrError::acquisition(format!("Failed to read response: {e}")))?;

    let mut file = File::create(output)
        .map_err(|e| VbrError::acquisition(format!("Failed to create {}: {e}", output.display())))?;
    file.write_all(&bytes)
        .map_err(|e| VbrError::acquisition(format!("Failed to write {}: {e}", output.display())))?;

    Ok(content_type)
}

impl MediaContext {
    /// Download a remote image into the arena and return its local path.
    ///
    /// The extension is only known after the response headers arrive, so
    /// the body lands in a scratch file first and is renamed afterwards.
    pub fn download_image(&self, url: &str) -> VbrResult<PathBuf> {
        let timeout = Duration::from_secs(self.config().download_timeout_secs);
        let staging = self.temp_path(".part", DOWNLOAD_PREFIX)?;

        tracing::info!(url, "Downloading image background");
        let content_type = match download_file_blocking(url, &staging, timeout) {
            Ok(ct) => ct,
            Err(err) => {
                std::fs::remove_file(&staging).ok();
                return Err(err);
            }
        };

        let url_path = url::Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_default();
        let extension = extension_for_content_type(content_type.as_deref(), &url_path);
        let target = self.temp_path(&extension, DOWNLOAD_PREFIX)?;
        std::fs::rename(&staging, &target)
            .map_err(|e| VbrError::acquisition(format!("Failed to store download: {e}")))?;

        tracing::debug!(
            url,
            path = %target.display(),
            content_type = content_type.as_deref().unwrap_or("-"),
            "Image downloaded"
        );
        Ok(target)
    }
}
