//! Device identity, metadata and the ordered collections the bridge exposes.
//!
//! The device subsystem reports devices as [`DeviceInfo`] values. Once the
//! bridge has fetched a thumbnail for one, it becomes a [`DeviceRecord`] and
//! is published in the [`DeviceCollection`] for its [`DeviceClass`].

mod collection;
mod id;

pub use collection::DeviceCollection;
pub use id::DeviceId;

use std::sync::Arc;

/// The two device classes the bridge watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    /// Audio input devices (microphones, line-in, loopback sources).
    Capture,
    /// Audio output devices (speakers, headphones, virtual sinks).
    Render,
}

impl DeviceClass {
    /// Both classes, capture first.
    pub const ALL: [DeviceClass; 2] = [DeviceClass::Capture, DeviceClass::Render];

    /// Capitalized label used in activity log lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::Capture => "Capture",
            Self::Render => "Render",
        }
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Capture => f.write_str("capture"),
            Self::Render => f.write_str("render"),
        }
    }
}

/// Identity and metadata of a device as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Stable device id.
    pub id: DeviceId,
    /// Human-readable name.
    pub name: String,
    /// Class the device belongs to.
    pub class: DeviceClass,
}

impl DeviceInfo {
    /// Creates device info.
    pub fn new(id: impl Into<DeviceId>, name: impl Into<String>, class: DeviceClass) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            class,
        }
    }

    /// Shorthand for a capture device.
    pub fn capture(id: impl Into<DeviceId>, name: impl Into<String>) -> Self {
        Self::new(id, name, DeviceClass::Capture)
    }

    /// Shorthand for a render device.
    pub fn render(id: impl Into<DeviceId>, name: impl Into<String>) -> Self {
        Self::new(id, name, DeviceClass::Render)
    }
}

/// A metadata change (or removal) reported for an existing device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceUpdate {
    /// Device the update applies to.
    pub id: DeviceId,
    /// New name, if it changed.
    pub name: Option<String>,
}

impl DeviceUpdate {
    /// An update carrying only the id (what removals look like).
    pub fn id_only(id: impl Into<DeviceId>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    /// An update renaming the device.
    pub fn renamed(id: impl Into<DeviceId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }
}

/// Opaque device glyph image, as returned by the enumerator.
///
/// The bytes are shared, so cloning a thumbnail is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail(Arc<[u8]>);

impl Thumbnail {
    /// Wraps raw image bytes.
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// Returns the image bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A device as tracked by the bridge: identity plus cached metadata.
///
/// The id never changes. Name and glyph are refreshed in place when the
/// watcher reports an update. Whether the device is auto-selected is not
/// stored here; it lives in the settings store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    id: DeviceId,
    name: String,
    class: DeviceClass,
    glyph: Option<Thumbnail>,
}

impl DeviceRecord {
    /// Creates a record from host info and an optional glyph.
    pub fn new(info: DeviceInfo, glyph: Option<Thumbnail>) -> Self {
        Self {
            id: info.id,
            name: info.name,
            class: info.class,
            glyph,
        }
    }

    /// Device id.
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// Current name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device class.
    pub fn class(&self) -> DeviceClass {
        self.class
    }

    /// Cached glyph, if one could be fetched.
    pub fn glyph(&self) -> Option<&Thumbnail> {
        self.glyph.as_ref()
    }

    /// Host info for this record.
    pub fn info(&self) -> DeviceInfo {
        DeviceInfo::new(self.id.clone(), self.name.clone(), self.class)
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_glyph(&mut self, glyph: Thumbnail) {
        self.glyph = Some(glyph);
    }
}

impl From<DeviceInfo> for DeviceRecord {
    fn from(info: DeviceInfo) -> Self {
        Self::new(info, None)
    }
}
