use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

const MAX_RECENT: usize = 5;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config data: {0}")]
    Json(#[from] serde_json::Error),
    #[cfg(not(target_os = "windows"))]
    #[error("Unable to locate configuration directory")]
    MissingConfigPath,
}

/// Per-user UI state that is not a tunable: recently opened images.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub recent_images: Vec<PathBuf>,
    #[serde(default)]
    pub last_open_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn record_image(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.last_open_dir = path.parent().map(Path::to_path_buf);
        self.recent_images.retain(|existing| existing != &path);
        self.recent_images.insert(0, path);
        if self.recent_images.len() > MAX_RECENT {
            self.recent_images.truncate(MAX_RECENT);
        }
    }

    /// File names of the recent images, newest first.
    pub fn recent_labels(&self) -> Vec<String> {
        self.recent_images
            .iter()
            .map(|path| {
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string())
            })
            .collect()
    }

    pub fn recent_image(&self, index: usize) -> Option<&Path> {
        self.recent_images.get(index).map(PathBuf::as_path)
    }
}

#[derive(Debug, Clone)]
enum Backing {
    Platform,
    File(PathBuf),
}

#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<Mutex<AppConfig>>,
    backing: Backing,
}

impl ConfigStore {
    pub fn load() -> Result<Self> {
        let cfg = load_impl()?;
        Ok(Self::from_config(cfg))
    }

    /// Store kept in an explicit file instead of the platform location.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cfg = load_file(&path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(cfg)),
            backing: Backing::File(path),
        })
    }

    pub fn new_default() -> Self {
        Self::from_config(AppConfig::default())
    }

    pub fn from_config(cfg: AppConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(cfg)),
            backing: Backing::Platform,
        }
    }

    pub fn snapshot(&self) -> AppConfig {
        self.inner.lock().expect("config poisoned").clone()
    }

    pub fn last_open_dir(&self) -> Option<PathBuf> {
        self.inner
            .lock()
            .expect("config poisoned")
            .last_open_dir
            .clone()
    }

    pub fn record_image(&self, path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref().to_path_buf();
        self.update(|cfg| {
            if cfg.recent_images.first() == Some(&path) {
                return false;
            }
            cfg.record_image(&path);
            true
        })
    }

    fn update<F>(&self, mut fun: F) -> Result<AppConfig>
    where
        F: FnMut(&mut AppConfig) -> bool,
    {
        let mut guard = self.inner.lock().expect("config poisoned");
        let changed = fun(&mut guard);
        if changed {
            match &self.backing {
                Backing::Platform => save_impl(&guard)?,
                Backing::File(path) => save_file(path, &guard)?,
            }
        }
        Ok(guard.clone())
    }
}

fn load_file(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        let payload = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&payload)?)
    } else {
        Ok(AppConfig::default())
    }
}

fn save_file(path: &Path, cfg: &AppConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let payload = serde_json::to_string_pretty(cfg)?;
    std::fs::write(path, payload)?;
    Ok(())
}

#[cfg(target_os = "windows")]
fn load_impl() -> Result<AppConfig> {
    use winreg::enums::{HKEY_CURRENT_USER, KEY_READ};
    use winreg::RegKey;

    let hkcu = RegKey::predef(HKEY_CURRENT_USER);
    let key = hkcu
        .open_subkey_with_flags("Software\\Invertify", KEY_READ)
        .ok();

    if let Some(key) = key {
        if let Ok(payload) = key.get_value::<String, _>("AppConfig") {
            return Ok(serde_json::from_str(&payload)?);
        }
    }

    Ok(AppConfig::default())
}

#[cfg(target_os = "windows")]
fn save_impl(cfg: &AppConfig) -> Result<()> {
    use winreg::enums::{HKEY_CURRENT_USER, KEY_WRITE};
    use winreg::RegKey;

    let hkcu = RegKey::predef(HKEY_CURRENT_USER);
    let (key, _) = hkcu.create_subkey_with_flags("Software\\Invertify", KEY_WRITE)?;
    let payload = serde_json::to_string(cfg)?;
    key.set_value("AppConfig", &payload)?;
    Ok(())
}

#[cfg(not(target_os = "windows"))]
fn load_impl() -> Result<AppConfig> {
    load_file(&config_file_path()?)
}

#[cfg(not(target_os = "windows"))]
fn save_impl(cfg: &AppConfig) -> Result<()> {
    save_file(&config_file_path()?, cfg)
}

#[cfg(not(target_os = "windows"))]
fn config_file_path() -> Result<PathBuf> {
    use directories::ProjectDirs;

    let proj_dirs =
        ProjectDirs::from("com", "Invertify", "Invertify").ok_or(ConfigError::MissingConfigPath)?;
    let mut path = proj_dirs.config_dir().to_path_buf();
    path.push("app_config.json");
    Ok(path)
}
