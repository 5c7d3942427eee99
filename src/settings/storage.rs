//! Where the settings document lives.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use directories::ProjectDirs;
use parking_lot::Mutex;

use crate::SettingsError;

/// Single-key storage for the serialized settings document.
///
/// The whole table is read once when the store is opened and written back in
/// full after every change.
pub trait SettingsStorage: Send + Sync {
    /// Returns the stored document, or `None` if nothing was stored yet.
    fn load(&self) -> Result<Option<String>, SettingsError>;

    /// Replaces the stored document.
    fn save(&self, contents: &str) -> Result<(), SettingsError>;
}

/// Settings kept in a file on disk.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Storage at an explicit path. Parent directories are created on save.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Storage in the per-user config directory (`bridge-audio/devices.toml`).
    ///
    /// # Errors
    ///
    /// Returns `NoConfigDir` if the platform has no config directory for the
    /// current user.
    pub fn default_location() -> Result<Self, SettingsError> {
        let dirs = ProjectDirs::from("", "", "bridge-audio").ok_or(SettingsError::NoConfigDir)?;
        Ok(Self::new(dirs.config_dir().join("devices.toml")))
    }

    /// Path of the settings file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStorage for FileStorage {
    fn load(&self) -> Result<Option<String>, SettingsError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, contents: &str) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

/// Settings kept in memory.
///
/// Clones share the same slot, so a test can hand one clone to a store and
/// reopen another store from the same contents later.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemoryStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-filled with a document.
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(contents.into()))),
        }
    }

    /// Current stored document.
    pub fn contents(&self) -> Option<String> {
        self.slot.lock().clone()
    }
}

impl SettingsStorage for MemoryStorage {
    fn load(&self) -> Result<Option<String>, SettingsError> {
        Ok(self.slot.lock().clone())
    }

    fn save(&self, contents: &str) -> Result<(), SettingsError> {
        *self.slot.lock() = Some(contents.to_string());
        Ok(())
    }
}
