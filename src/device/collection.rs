//! Ordered device list for one device class.

use super::{DeviceClass, DeviceId, DeviceRecord, DeviceUpdate, Thumbnail};
use crate::BridgeError;

/// Ordered collection of the devices currently present for one class.
///
/// Devices keep the order in which they were added. An id appears at most
/// once: adding a record whose id is already present replaces its metadata
/// in place instead of appending a second entry.
#[derive(Debug, Clone)]
pub struct DeviceCollection {
    class: DeviceClass,
    devices: Vec<DeviceRecord>,
}

impl DeviceCollection {
    /// Creates an empty collection.
    pub fn new(class: DeviceClass) -> Self {
        Self {
            class,
            devices: Vec::new(),
        }
    }

    /// Class of the devices in this collection.
    pub fn class(&self) -> DeviceClass {
        self.class
    }

    /// Adds a record. Returns `false` if a record with the same id was
    /// already present and has been replaced.
    pub fn insert(&mut self, record: DeviceRecord) -> bool {
        if let Some(existing) = self.devices.iter_mut().find(|d| d.id() == record.id()) {
            *existing = record;
            false
        } else {
            self.devices.push(record);
            true
        }
    }

    /// Applies a metadata update to an existing record.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if no record has the update's id.
    pub fn update(
        &mut self,
        update: &DeviceUpdate,
        glyph: Option<Thumbnail>,
    ) -> Result<&DeviceRecord, BridgeError> {
        let class = self.class;
        let record = self
            .devices
            .iter_mut()
            .find(|d| d.id() == &update.id)
            .ok_or_else(|| BridgeError::DeviceNotFound {
                class,
                id: update.id.clone(),
            })?;

        if let Some(name) = &update.name {
            record.set_name(name.clone());
        }
        if let Some(glyph) = glyph {
            record.set_glyph(glyph);
        }
        Ok(record)
    }

    /// Removes and returns the record with the given id.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if no record has this id.
    pub fn remove(&mut self, id: &DeviceId) -> Result<DeviceRecord, BridgeError> {
        let index = self
            .devices
            .iter()
            .position(|d| d.id() == id)
            .ok_or_else(|| BridgeError::DeviceNotFound {
                class: self.class,
                id: id.clone(),
            })?;
        Ok(self.devices.remove(index))
    }

    /// Looks up a record by id.
    pub fn get(&self, id: &DeviceId) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| d.id() == id)
    }

    /// Returns `true` if a record with this id is present.
    pub fn contains(&self, id: &DeviceId) -> bool {
        self.get(id).is_some()
    }

    /// 1-based position of the device, as a list view would show it.
    pub fn position(&self, id: &DeviceId) -> Option<usize> {
        self.devices.iter().position(|d| d.id() == id).map(|i| i + 1)
    }

    /// Number of devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns `true` if there are no devices.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Iterates over the devices in order.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.iter()
    }

    /// Copies the current device list.
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        self.devices.clone()
    }
}
