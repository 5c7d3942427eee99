//! Persistent per-device settings.
//!
//! The store maps a device id to its [`DeviceSettings`]. The only value the
//! bridge acts on is `auto_connect`; volume and balance are carried through
//! untouched for the UI.
//!
//! The table is read once when the store is opened and written back in full
//! after every change. A missing or unreadable document starts an empty
//! table rather than failing the bridge.

mod format;
mod storage;

pub use storage::{FileStorage, MemoryStorage, SettingsStorage};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::device::{DeviceId, DeviceRecord};
use crate::SettingsError;

/// Volume a device gets when it is first seen.
pub const DEFAULT_VOLUME: i32 = 100;

/// Balance a device gets when it is first seen (centered).
pub const DEFAULT_BALANCE: i32 = 50;

/// Stored settings for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Device name when the entry was last written.
    pub name: String,

    /// Whether the device is selected automatically when it appears.
    #[serde(default)]
    pub auto_connect: bool,

    /// Volume in percent.
    #[serde(default = "default_volume")]
    pub volume: i32,

    /// Left/right balance in percent, 50 is centered.
    #[serde(default = "default_balance")]
    pub balance: i32,
}

fn default_volume() -> i32 {
    DEFAULT_VOLUME
}

fn default_balance() -> i32 {
    DEFAULT_BALANCE
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            auto_connect: false,
            volume: DEFAULT_VOLUME,
            balance: DEFAULT_BALANCE,
        }
    }
}

impl DeviceSettings {
    /// Default settings for a device seen for the first time.
    pub fn for_device(device: &DeviceRecord) -> Self {
        Self {
            name: device.name().to_string(),
            ..Self::default()
        }
    }
}

/// Device id to settings table, backed by a [`SettingsStorage`].
///
/// # Example
///
/// ```
/// use bridge_audio::{DeviceInfo, DeviceRecord, MemoryStorage, SettingsStore};
///
/// let storage = MemoryStorage::new();
/// let mut store = SettingsStore::load(storage.clone());
///
/// let mic = DeviceRecord::from(DeviceInfo::capture("mic-1", "USB Mic"));
/// assert!(!store.is_auto_connect(&mic));
///
/// store.set_auto_connect(&mic, true).unwrap();
/// assert!(SettingsStore::load(storage).is_auto_connect(&mic));
/// ```
pub struct SettingsStore {
    storage: Box<dyn SettingsStorage>,
    devices: BTreeMap<DeviceId, DeviceSettings>,
    writable: bool,
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("devices", &self.devices)
            .field("writable", &self.writable)
            .finish_non_exhaustive()
    }
}

impl SettingsStore {
    /// Opens the store, reading the current table from `storage`.
    ///
    /// This never fails. A document with broken sections keeps every
    /// section that still parses; the broken ones are logged and dropped
    /// from the next save. If nothing in the document can be read, the
    /// store starts empty and the document is replaced on the next save. A
    /// document written by a newer version is left alone: the store then
    /// keeps its changes in memory only.
    pub fn load(storage: impl SettingsStorage + 'static) -> Self {
        let mut writable = true;
        let devices = match storage.load().and_then(|text| match text {
            Some(text) => format::decode(&text),
            None => Ok(BTreeMap::new()),
        }) {
            Ok(devices) => devices,
            Err(e @ SettingsError::UnsupportedVersion { .. }) => {
                tracing::warn!(error = %e, "device settings not loaded, changes will not be saved");
                writable = false;
                BTreeMap::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "device settings not loaded, starting empty");
                BTreeMap::new()
            }
        };

        tracing::debug!(devices = devices.len(), "device settings loaded");
        Self {
            storage: Box::new(storage),
            devices,
            writable,
        }
    }

    /// Opens the store in the per-user config directory.
    ///
    /// # Errors
    ///
    /// Returns `NoConfigDir` if the platform has no config directory.
    pub fn open_default() -> Result<Self, SettingsError> {
        Ok(Self::load(FileStorage::default_location()?))
    }

    /// A store that is never written anywhere.
    pub fn in_memory() -> Self {
        Self::load(MemoryStorage::new())
    }

    /// Whether `device` is marked for auto-connect.
    ///
    /// A device seen for the first time gets a default entry (not
    /// auto-connect, volume 100, balance 50), which is persisted.
    pub fn is_auto_connect(&mut self, device: &DeviceRecord) -> bool {
        if let Some(settings) = self.devices.get(device.id()) {
            return settings.auto_connect;
        }

        self.devices
            .insert(device.id().clone(), DeviceSettings::for_device(device));
        if let Err(e) = self.save() {
            tracing::warn!(
                device = %device.id(),
                error = %e,
                "failed to save default device settings"
            );
        }
        false
    }

    /// Sets the auto-connect flag for `device`, creating its entry if needed.
    ///
    /// Volume and balance of an existing entry are kept; the stored name is
    /// refreshed. The change is kept in memory even if saving fails.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the table could not be saved.
    pub fn set_auto_connect(
        &mut self,
        device: &DeviceRecord,
        value: bool,
    ) -> Result<(), SettingsError> {
        let settings = self
            .devices
            .entry(device.id().clone())
            .or_insert_with(|| DeviceSettings::for_device(device));
        settings.auto_connect = value;
        settings.name = device.name().to_string();

        tracing::debug!(device = %device.id(), auto_connect = value, "device settings changed");
        self.save()
    }

    /// Stored settings for a device, if it has an entry.
    pub fn get(&self, id: &DeviceId) -> Option<&DeviceSettings> {
        self.devices.get(id)
    }

    /// Number of devices with an entry.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns `true` if no device has an entry.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// All entries, ordered by device id.
    pub fn iter(&self) -> impl Iterator<Item = (&DeviceId, &DeviceSettings)> {
        self.devices.iter()
    }

    fn save(&self) -> Result<(), SettingsError> {
        if !self.writable {
            return Ok(());
        }
        let text = format::encode(&self.devices)?;
        self.storage.save(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceInfo;
    use tempfile::tempdir;

    fn mic() -> DeviceRecord {
        DeviceRecord::from(DeviceInfo::capture("mic-1", "USB Mic"))
    }

    struct FailingStorage;

    impl SettingsStorage for FailingStorage {
        fn load(&self) -> Result<Option<String>, SettingsError> {
            Ok(None)
        }

        fn save(&self, _contents: &str) -> Result<(), SettingsError> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }
    }

    #[test]
    fn test_unknown_device_gets_persisted_default() {
        let storage = MemoryStorage::new();
        let mut store = SettingsStore::load(storage.clone());

        assert!(!store.is_auto_connect(&mic()));

        let saved = storage.contents().unwrap();
        assert!(saved.contains("mic-1"));
        let entry = store.get(mic().id()).unwrap();
        assert_eq!(entry.name, "USB Mic");
        assert_eq!((entry.volume, entry.balance), (100, 50));
    }

    #[test]
    fn test_set_keeps_volume_and_balance() {
        let storage = MemoryStorage::with_contents(
            "version = 1\n[devices.mic-1]\nname = \"Old Name\"\nvolume = 30\nbalance = 70\n",
        );
        let mut store = SettingsStore::load(storage);

        store.set_auto_connect(&mic(), true).unwrap();

        let entry = store.get(mic().id()).unwrap();
        assert!(entry.auto_connect);
        assert_eq!(entry.name, "USB Mic");
        assert_eq!((entry.volume, entry.balance), (30, 70));
    }

    #[test]
    fn test_file_round_trip_across_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("devices.toml");

        let mut store = SettingsStore::load(FileStorage::new(&path));
        store.set_auto_connect(&mic(), true).unwrap();
        drop(store);

        let mut reopened = SettingsStore::load(FileStorage::new(&path));
        assert!(reopened.is_auto_connect(&mic()));
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_legacy_table_is_migrated_on_save() {
        let storage =
            MemoryStorage::with_contents("mic-1@USB Mic,True,100,50\nspk-1@Speakers,False,80,50");
        let mut store = SettingsStore::load(storage.clone());
        assert!(store.is_auto_connect(&mic()));

        let spk = DeviceRecord::from(DeviceInfo::render("spk-1", "Speakers"));
        store.set_auto_connect(&spk, true).unwrap();

        let saved = storage.contents().unwrap();
        assert!(saved.starts_with("version = 1"));
        let mut reopened = SettingsStore::load(storage);
        assert!(reopened.is_auto_connect(&spk));
        assert_eq!(reopened.get(spk.id()).unwrap().volume, 80);
    }

    #[test]
    fn test_corrupt_document_starts_empty() {
        let storage = MemoryStorage::with_contents("[[[ not toml");
        let mut store = SettingsStore::load(storage.clone());
        assert!(store.is_empty());

        store.set_auto_connect(&mic(), true).unwrap();
        assert!(storage.contents().unwrap().starts_with("version = 1"));
    }

    #[test]
    fn test_broken_entry_does_not_cost_the_others() {
        let storage = MemoryStorage::with_contents(
            "version = 1\n\n[devices.mic-1]\nname = \"USB Mic\"\nauto_connect = true\n\n\
             [devices.spk-1]\nname = \"Broken\n",
        );
        let mut store = SettingsStore::load(storage.clone());

        assert!(store.is_auto_connect(&mic()));
        assert_eq!(store.len(), 1);

        let spk = DeviceRecord::from(DeviceInfo::render("spk-1", "Speakers"));
        assert!(!store.is_auto_connect(&spk));
        let mut reopened = SettingsStore::load(storage);
        assert!(reopened.is_auto_connect(&mic()));
        assert_eq!(reopened.len(), 2);
    }

    #[test]
    fn test_newer_document_is_not_overwritten() {
        let newer = "version = 2\n[devices.mic-1]\nname = \"USB Mic\"\n";
        let storage = MemoryStorage::with_contents(newer);
        let mut store = SettingsStore::load(storage.clone());

        store.set_auto_connect(&mic(), true).unwrap();

        assert!(store.is_auto_connect(&mic()));
        assert_eq!(storage.contents().as_deref(), Some(newer));
    }

    #[test]
    fn test_failed_save_keeps_change_in_memory() {
        let mut store = SettingsStore::load(FailingStorage);

        assert!(store.set_auto_connect(&mic(), true).is_err());
        assert!(store.is_auto_connect(&mic()));
    }
}
