//! Lifecycle of the currently loaded image: validation, the inversion hand-off,
//! owned resources and delivery of the result.

pub mod delivery;
pub mod resource;

use std::fs;
use std::io;
use std::path::Path;

use core_types::Bitmap;
use engine::{EngineError, InvertedImage, OutputFormat, ValidationError};
use tracing::{debug, info, warn};

pub use delivery::{
    select_delivery, DeliveryError, DeliveryKind, DeliveryPayload, DeliveryReceipt,
    DeliveryStrategy, DownloadDelivery, ShareDelivery, ShareRequest, ShareTarget,
};
pub use resource::{ImageResource, ResourceId, ResourcePool};

pub const MSG_UNSUPPORTED_TYPE: &str = "Please select a JPG, PNG, or GIF image";
pub const MSG_DECODE_FAILED: &str = "Failed to load image. Please try a different file.";
pub const MSG_PROCESSING_FAILED: &str = "Error processing image. Please try again.";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("No inverted image is ready")]
    NotReady,
}

impl SessionError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Engine(err) => engine_message(err),
            Self::Delivery(err) => format!("Could not save the image: {err}"),
            Self::NotReady => "Load an image first.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Message shown to the user for a failed load.
pub fn engine_message(err: &EngineError) -> String {
    match err {
        EngineError::Validation(ValidationError::UnsupportedType(_)) => {
            MSG_UNSUPPORTED_TYPE.to_string()
        }
        EngineError::Validation(ValidationError::TooLarge { limit, .. }) => {
            format!("Image size must be less than {}MB", limit / (1024 * 1024))
        }
        EngineError::Decode(_) => MSG_DECODE_FAILED.to_string(),
        _ => MSG_PROCESSING_FAILED.to_string(),
    }
}

/// `<base>_inverted.<ext>`, where base is the name up to its last dot.
pub fn output_file_name(original: &str, format: OutputFormat) -> String {
    let base = match original.rsplit_once('.') {
        Some((base, _)) if !base.is_empty() => base,
        _ => original,
    };
    format!("{base}_inverted.{}", format.extension())
}

/// A user-selected file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, mime_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type,
            bytes,
        }
    }

    pub fn read(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, None, bytes))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub max_upload_bytes: u64,
    pub output_format: OutputFormat,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: engine::DEFAULT_MAX_UPLOAD_BYTES,
            output_format: OutputFormat::default(),
        }
    }
}

/// Identifies one load; results carrying an older generation are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadToken {
    generation: u64,
}

/// Work order for the transform, returned by [`ImageSession::begin_load`].
#[derive(Debug)]
pub struct LoadTicket {
    pub token: LoadToken,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Ready,
    Failed(String),
    /// A newer load replaced this one; the result was dropped.
    Stale,
}

#[derive(Debug, Clone)]
pub struct ReadyImage {
    pub original: ImageResource,
    pub original_bitmap: Bitmap,
    pub inverted: ImageResource,
}

impl ReadyImage {
    pub fn inverted_bitmap(&self) -> Option<&Bitmap> {
        self.inverted.bitmap()
    }
}

#[derive(Debug)]
enum SessionState {
    Empty,
    Processing {
        original: ImageResource,
    },
    Ready(ReadyImage),
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus<'a> {
    Empty,
    Processing,
    Ready,
    Failed(&'a str),
}

/// Owns every image resource for the current selection.
///
/// Choosing a new file, [`ImageSession::reset`] and dropping the session all
/// release the previous resources.
pub struct ImageSession {
    pool: ResourcePool,
    config: SessionConfig,
    state: SessionState,
    source_name: Option<String>,
    generation: u64,
}

impl ImageSession {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_pool(config, ResourcePool::new())
    }

    pub fn with_pool(config: SessionConfig, pool: ResourcePool) -> Self {
        Self {
            pool,
            config,
            state: SessionState::Empty,
            source_name: None,
            generation: 0,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn status(&self) -> SessionStatus<'_> {
        match &self.state {
            SessionState::Empty => SessionStatus::Empty,
            SessionState::Processing { .. } => SessionStatus::Processing,
            SessionState::Ready(_) => SessionStatus::Ready,
            SessionState::Failed { message } => SessionStatus::Failed(message),
        }
    }

    pub fn is_processing(&self) -> bool {
        matches!(self.state, SessionState::Processing { .. })
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    pub fn original(&self) -> Option<&ImageResource> {
        match &self.state {
            SessionState::Processing { original } => Some(original),
            SessionState::Ready(ready) => Some(&ready.original),
            _ => None,
        }
    }

    pub fn ready(&self) -> Option<&ReadyImage> {
        match &self.state {
            SessionState::Ready(ready) => Some(ready),
            _ => None,
        }
    }

    /// Validate `file` and start a new load, superseding any earlier one.
    ///
    /// On a validation error nothing changes and the current image stays.
    pub fn begin_load(&mut self, file: SourceFile) -> Result<LoadTicket> {
        let format = engine::validate_upload(
            &file.name,
            file.mime_type.as_deref(),
            &file.bytes,
            self.config.max_upload_bytes,
        )
        .map_err(EngineError::from)?;

        if self.is_processing() {
            debug!(generation = self.generation, "superseding in-flight load");
        }
        self.release();
        self.generation += 1;

        let original = self
            .pool
            .create(file.name.clone(), format.mime_type(), file.bytes.clone(), None);
        info!(name = %file.name, generation = self.generation, "loading image");
        self.source_name = Some(file.name);
        self.state = SessionState::Processing { original };

        Ok(LoadTicket {
            token: LoadToken {
                generation: self.generation,
            },
            bytes: file.bytes,
        })
    }

    /// Hand the transform result back.
    pub fn finish_load(
        &mut self,
        token: LoadToken,
        result: std::result::Result<InvertedImage, EngineError>,
    ) -> LoadOutcome {
        if token.generation != self.generation || !self.is_processing() {
            debug!(token = token.generation, current = self.generation, "dropping stale result");
            return LoadOutcome::Stale;
        }

        let state = std::mem::replace(&mut self.state, SessionState::Empty);
        let SessionState::Processing { original } = state else {
            self.state = state;
            return LoadOutcome::Stale;
        };

        match result {
            Ok(output) => {
                let name = output_file_name(original.label(), output.format);
                let inverted = self.pool.create(
                    name,
                    output.format.mime_type(),
                    output.encoded,
                    Some(output.inverted),
                );
                self.state = SessionState::Ready(ReadyImage {
                    original,
                    original_bitmap: output.source,
                    inverted,
                });
                LoadOutcome::Ready
            }
            Err(err) => {
                warn!("image load failed: {err}");
                drop(original);
                let message = engine_message(&err);
                self.state = SessionState::Failed {
                    message: message.clone(),
                };
                LoadOutcome::Failed(message)
            }
        }
    }

    /// Drop the current image and return to the empty state.
    pub fn reset(&mut self) {
        self.release();
        self.generation += 1;
        self.source_name = None;
    }

    pub fn output_file_name(&self) -> Option<String> {
        self.source_name
            .as_deref()
            .map(|name| output_file_name(name, self.config.output_format))
    }

    pub fn deliver(&self, strategy: &dyn DeliveryStrategy) -> Result<DeliveryReceipt> {
        let ready = self.ready().ok_or(SessionError::NotReady)?;
        let payload = DeliveryPayload {
            file_name: ready.inverted.label(),
            mime_type: ready.inverted.mime_type(),
            bytes: ready.inverted.bytes(),
        };
        Ok(strategy.deliver(&payload)?)
    }

    fn release(&mut self) {
        self.state = SessionState::Empty;
    }
}
