use core_types::Bitmap;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{EngineError, Result};

/// Quality hint handed to the encoder, on a 0..=1 scale.
pub const DEFAULT_QUALITY: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossless; the quality hint does not apply.
    Png,
    /// Alpha is dropped, JPEG has no alpha channel.
    Jpeg { quality: f32 },
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Png
    }
}

impl OutputFormat {
    pub fn jpeg() -> Self {
        Self::Jpeg {
            quality: DEFAULT_QUALITY,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg { .. } => "jpg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg { .. } => "image/jpeg",
        }
    }
}

/// Decode any supported raster format into an RGBA8 bitmap.
pub fn decode(bytes: &[u8]) -> Result<Bitmap> {
    let dyn_img = image::load_from_memory(bytes).map_err(|e| EngineError::Decode(e.to_string()))?;
    let rgba = dyn_img.to_rgba8();
    let (w, h) = rgba.dimensions();
    debug!(width = w, height = h, "decoded source image");
    Bitmap::from_rgba(w, h, rgba.into_raw())
        .ok_or_else(|| EngineError::Decode(format!("invalid image dimensions {w}x{h}")))
}

pub fn encode(bitmap: &Bitmap, format: OutputFormat) -> Result<Vec<u8>> {
    let (w, h) = bitmap.dimensions();
    let mut buffer = Vec::new();
    match format {
        OutputFormat::Png => {
            PngEncoder::new(&mut buffer)
                .write_image(bitmap.as_bytes(), w, h, ExtendedColorType::Rgba8)
                .map_err(|e| EngineError::Encode(e.to_string()))?;
        }
        OutputFormat::Jpeg { quality } => {
            let rgba = RgbaImage::from_raw(w, h, bitmap.as_bytes().to_vec())
                .ok_or_else(|| EngineError::Encode("bitmap buffer does not match dimensions".into()))?;
            let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut buffer, jpeg_quality(quality));
            encoder
                .encode_image(&rgb)
                .map_err(|e| EngineError::Encode(e.to_string()))?;
        }
    }
    Ok(buffer)
}

fn jpeg_quality(quality: f32) -> u8 {
    if !quality.is_finite() {
        return (DEFAULT_QUALITY * 100.0).round() as u8;
    }
    (quality.clamp(0.01, 1.0) * 100.0).round() as u8
}
