pub mod codec;
pub mod invert;
pub mod validate;

use core_types::Bitmap;
use futures::channel::oneshot;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, info};

pub use codec::{decode, encode, OutputFormat};
pub use invert::invert;
pub use validate::{
    validate_upload, SourceFormat, ValidationError, DEFAULT_MAX_UPLOAD_BYTES, SUPPORTED_EXTENSIONS,
};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Inversion worker stopped before reporting a result")]
    WorkerLost,
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Output of one run of the transform.
#[derive(Debug, Clone)]
pub struct InvertedImage {
    pub source: Bitmap,
    pub inverted: Bitmap,
    /// Encoded `inverted`, ready to be saved or shared.
    pub encoded: Vec<u8>,
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageEngine {
    format: OutputFormat,
}

impl ImageEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn output_format(&self) -> OutputFormat {
        self.format
    }

    /// Decode, invert and re-encode an image file.
    pub fn invert_image(&self, bytes: &[u8]) -> Result<InvertedImage> {
        let started = Instant::now();
        let source = decode(bytes)?;
        let inverted = invert(&source);
        let encoded = encode(&inverted, self.format)?;
        info!(
            width = source.width(),
            height = source.height(),
            encoded_len = encoded.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "inverted image"
        );
        Ok(InvertedImage {
            source,
            inverted,
            encoded,
            format: self.format,
        })
    }

    /// Run [`ImageEngine::invert_image`] on a worker thread.
    ///
    /// The work starts immediately and cannot be cancelled; dropping the
    /// returned future only discards the result.
    pub fn invert_in_background(
        &self,
        bytes: Vec<u8>,
    ) -> Result<impl Future<Output = Result<InvertedImage>> + Send + 'static> {
        let (tx, rx) = oneshot::channel();
        let engine = *self;
        std::thread::Builder::new()
            .name("invert".into())
            .spawn(move || {
                let result = engine.invert_image(&bytes);
                if tx.send(result).is_err() {
                    debug!("inversion result dropped, receiver went away");
                }
            })?;

        Ok(async move { rx.await.unwrap_or(Err(EngineError::WorkerLost)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32, px: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba(px));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn red_image_becomes_cyan() {
        let engine = ImageEngine::new();
        let out = engine.invert_image(&png_bytes(100, 100, [255, 0, 0, 255])).unwrap();

        assert_eq!(out.inverted.dimensions(), (100, 100));
        assert!(out.inverted.pixels().all(|px| px == [0, 255, 255, 255]));

        let reloaded = decode(&out.encoded).unwrap();
        assert_eq!(reloaded, out.inverted);
    }

    #[test]
    fn gif_input_inverts() {
        let img = RgbaImage::from_pixel(6, 6, Rgba([255, 0, 0, 255]));
        let mut gif = Vec::new();
        img.write_to(&mut Cursor::new(&mut gif), ImageFormat::Gif)
            .unwrap();

        let out = ImageEngine::new().invert_image(&gif).unwrap();
        assert_eq!(out.source.pixel(0, 0), Some([255, 0, 0, 255]));
        assert!(out.inverted.pixels().all(|px| px == [0, 255, 255, 255]));
        assert_eq!(out.format, OutputFormat::Png);
    }

    #[test]
    fn corrupt_input_reports_decode_error() {
        let engine = ImageEngine::new();
        let err = engine.invert_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, EngineError::Decode(_)));
    }

    #[test]
    fn background_inversion_resolves() {
        let engine = ImageEngine::new();
        let fut = engine
            .invert_in_background(png_bytes(4, 3, [10, 20, 30, 40]))
            .unwrap();
        let out = block_on(fut).unwrap();
        assert_eq!(out.inverted.pixel(3, 2), Some([245, 235, 225, 40]));
        assert_eq!(out.format, OutputFormat::Png);
    }

    #[test]
    fn background_inversion_propagates_failure() {
        let engine = ImageEngine::new();
        let fut = engine.invert_in_background(vec![0u8; 16]).unwrap();
        assert!(matches!(block_on(fut), Err(EngineError::Decode(_))));
    }
}
