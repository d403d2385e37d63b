use std::path::Path;

use image::ImageFormat;
use serde::{Deserialize, Serialize};

/// Uploads larger than this are rejected before decoding.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Supported upload extensions, lowercase.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    Jpeg,
    Png,
    Gif,
}

impl SourceFormat {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Gif => Some(Self::Gif),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
        }
    }
}

/// Check type and size of an upload.
///
/// A declared MIME type wins. Without one the extension of `name` is used,
/// then the content signature.
pub fn validate_upload(
    name: &str,
    declared_mime: Option<&str>,
    bytes: &[u8],
    max_bytes: u64,
) -> Result<SourceFormat, ValidationError> {
    let format = match declared_mime {
        Some(mime) => {
            SourceFormat::from_mime(mime).ok_or_else(|| ValidationError::UnsupportedType(mime.to_string()))?
        }
        None => detect_format(name, bytes)?,
    };

    let size = bytes.len() as u64;
    if size > max_bytes {
        return Err(ValidationError::TooLarge {
            size,
            limit: max_bytes,
        });
    }

    Ok(format)
}

fn detect_format(name: &str, bytes: &[u8]) -> Result<SourceFormat, ValidationError> {
    let ext = Path::new(name)
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase());

    if let Some(format) = ext.as_deref().and_then(SourceFormat::from_extension) {
        return Ok(format);
    }

    image::guess_format(bytes)
        .ok()
        .and_then(SourceFormat::from_image_format)
        .ok_or_else(|| ValidationError::UnsupportedType(ext.unwrap_or_else(|| name.to_string())))
}
