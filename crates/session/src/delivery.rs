use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use core_types::DeviceCapabilities;
use tracing::{info, warn};

pub const SHARE_TITLE: &str = "Inverted Image from Invertify";
pub const SHARE_TEXT: &str = "Check out this color-inverted image!";

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Share failed: {0}")]
    Share(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    Download,
    Share,
}

/// The file handed to a delivery strategy.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryPayload<'a> {
    pub file_name: &'a str,
    pub mime_type: &'a str,
    pub bytes: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReceipt {
    Saved { path: PathBuf },
    Shared { file_name: String },
}

impl DeliveryReceipt {
    /// Confirmation shown to the user.
    pub fn message(&self) -> String {
        match self {
            Self::Saved { path } => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match path.parent() {
                    Some(dir) => format!("Image saved as \"{name}\" to {}", dir.display()),
                    None => format!("Image saved as \"{name}\""),
                }
            }
            Self::Shared { file_name } => format!("Shared \"{file_name}\""),
        }
    }
}

pub trait DeliveryStrategy {
    fn kind(&self) -> DeliveryKind;

    fn deliver(&self, payload: &DeliveryPayload<'_>) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Writes the file into a folder, never overwriting an existing file.
#[derive(Debug, Clone)]
pub struct DownloadDelivery {
    dir: PathBuf,
}

impl DownloadDelivery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The user's download folder, falling back to the current directory.
    pub fn to_default_folder() -> Self {
        Self::new(default_download_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DeliveryStrategy for DownloadDelivery {
    fn kind(&self) -> DeliveryKind {
        DeliveryKind::Download
    }

    fn deliver(&self, payload: &DeliveryPayload<'_>) -> Result<DeliveryReceipt, DeliveryError> {
        fs::create_dir_all(&self.dir)?;
        let (path, mut file) = create_unique(&self.dir, payload.file_name)?;
        file.write_all(payload.bytes)?;
        info!(path = %path.display(), len = payload.bytes.len(), "saved inverted image");
        Ok(DeliveryReceipt::Saved { path })
    }
}

/// What a platform share sheet receives.
#[derive(Debug, Clone, Copy)]
pub struct ShareRequest<'a> {
    pub title: &'a str,
    pub text: &'a str,
    pub file_name: &'a str,
    pub mime_type: &'a str,
    pub bytes: &'a [u8],
}

/// Platform share integration.
pub trait ShareTarget {
    /// Whether this particular file can be shared.
    fn can_share(&self, request: &ShareRequest<'_>) -> bool;

    fn share(&self, request: &ShareRequest<'_>) -> Result<(), DeliveryError>;
}

/// Offers the file to a share sheet, downloading instead when that is not
/// possible or the share fails.
pub struct ShareDelivery {
    target: Box<dyn ShareTarget>,
    fallback: DownloadDelivery,
}

impl ShareDelivery {
    pub fn new(target: Box<dyn ShareTarget>, fallback: DownloadDelivery) -> Self {
        Self { target, fallback }
    }
}

impl DeliveryStrategy for ShareDelivery {
    fn kind(&self) -> DeliveryKind {
        DeliveryKind::Share
    }

    fn deliver(&self, payload: &DeliveryPayload<'_>) -> Result<DeliveryReceipt, DeliveryError> {
        let request = ShareRequest {
            title: SHARE_TITLE,
            text: SHARE_TEXT,
            file_name: payload.file_name,
            mime_type: payload.mime_type,
            bytes: payload.bytes,
        };
        if self.target.can_share(&request) {
            match self.target.share(&request) {
                Ok(()) => {
                    info!(file_name = payload.file_name, "shared inverted image");
                    return Ok(DeliveryReceipt::Shared {
                        file_name: payload.file_name.to_string(),
                    });
                }
                Err(err) => warn!("share failed, falling back to download: {err}"),
            }
        }
        self.fallback.deliver(payload)
    }
}

/// Pick the delivery strategy once from the device capabilities.
///
/// Sharing needs a mobile, touch-capable device that can share files, and a
/// share target to hand the file to.
pub fn select_delivery(
    caps: DeviceCapabilities,
    download: DownloadDelivery,
    share_target: Option<Box<dyn ShareTarget>>,
) -> Box<dyn DeliveryStrategy> {
    let wants_share = caps.contains(
        DeviceCapabilities::MOBILE | DeviceCapabilities::TOUCH | DeviceCapabilities::SHARE_FILES,
    );
    match share_target {
        Some(target) if wants_share => Box::new(ShareDelivery::new(target, download)),
        _ => Box::new(download),
    }
}

pub fn default_download_dir() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Create `file_name` in `dir`, or the first free "name (n).ext" after it.
///
/// Files are opened with `create_new`, so an existing file is never truncated
/// even if it appears between two attempts.
fn create_unique(dir: &Path, file_name: &str) -> io::Result<(PathBuf, File)> {
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    };
    let candidates = std::iter::once(dir.join(file_name)).chain((1u32..).map(|n| match ext {
        Some(ext) => dir.join(format!("{stem} ({n}).{ext}")),
        None => dir.join(format!("{stem} ({n})")),
    }));

    for path in candidates {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for {file_name}"),
    ))
}
