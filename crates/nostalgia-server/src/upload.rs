//! Uploaded images: validation, staging on disk and decoding.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbImage;
use nostalgia_replicate::{mime_for_path, EncodedImage};
use nostalgia_warp::codec;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, ServerError};

/// Extensions accepted by the smile endpoint, lowercase.
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "jfif"];

/// Returns the lowercased extension of `filename` if it is accepted.
///
/// # Errors
///
/// Returns `ServerError::UnsupportedFileType` otherwise.
pub fn validate_extension(filename: &str) -> Result<String> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else if ext.is_empty() {
        Err(ServerError::unsupported_file_type(""))
    } else {
        Err(ServerError::unsupported_file_type(format!(".{ext}")))
    }
}

/// The file name without directories or extension, safe to embed in output names.
#[must_use]
pub fn safe_stem(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let stem = Path::new(base)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Short random suffix for output file names.
#[must_use]
pub fn unique_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// An upload staged in the temp directory, deleted when dropped.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
}

impl TempUpload {
    /// Writes `bytes` under a unique name in `dir`, creating `dir` if needed.
    pub async fn write(dir: &Path, extension: &str, bytes: &[u8]) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("upload_{}.{extension}", Uuid::new_v4().simple()));
        let guard = Self { path };
        tokio::fs::write(&guard.path, bytes).await?;
        debug!(path = %guard.path.display(), size = bytes.len(), "Staged upload");
        Ok(guard)
    }

    /// Where the upload is staged.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed staged upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove staged upload"),
        }
    }
}

/// A decoded upload: the original bytes for the remote tier, pixels for the local one.
#[derive(Debug, Clone)]
pub struct SourceImage {
    filename: String,
    encoded: Arc<EncodedImage>,
    pixels: Arc<RgbImage>,
}

impl SourceImage {
    /// Decodes uploaded bytes.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::UnreadableImage` if the bytes are not a supported image.
    pub fn decode(filename: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let filename = filename.into();
        let pixels = codec::decode_rgb(&bytes)
            .map_err(|e| ServerError::unreadable_image(&filename, e.to_string()))?;
        let encoded = EncodedImage::new(bytes, mime_for_path(&filename));
        Ok(Self {
            filename,
            encoded: Arc::new(encoded),
            pixels: Arc::new(pixels),
        })
    }

    /// Wraps already decoded pixels, encoding them as PNG for the remote tier.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Warp` if PNG encoding fails.
    pub fn from_rgb(filename: impl Into<String>, pixels: RgbImage) -> Result<Self> {
        let bytes = codec::encode_png(&pixels)?;
        Ok(Self {
            filename: filename.into(),
            encoded: Arc::new(EncodedImage::new(bytes, "image/png")),
            pixels: Arc::new(pixels),
        })
    }

    /// The uploaded file name.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Sanitized file stem for output names.
    #[must_use]
    pub fn stem(&self) -> String {
        safe_stem(&self.filename)
    }

    /// The original encoded bytes and their MIME type.
    #[must_use]
    pub fn encoded(&self) -> &EncodedImage {
        &self.encoded
    }

    /// The decoded pixels.
    #[must_use]
    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// A shared handle to the pixels, for moving onto a blocking worker.
    #[must_use]
    pub fn shared_pixels(&self) -> Arc<RgbImage> {
        Arc::clone(&self.pixels)
    }

    /// Image dimensions.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}
