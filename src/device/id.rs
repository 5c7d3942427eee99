//! Host-assigned device ids.

use std::sync::Arc;

/// The string a host's device subsystem uses to name one endpoint, e.g.
/// `\\?\SWD#MMDEVAPI#{0.0.1.00000000}` on Windows.
///
/// The bridge never parses or builds these; it only compares them. The same
/// id keys a device in its class collection, names both ends of a route,
/// and becomes the table name under `[devices]` in the settings file, so a
/// preference written for a device is found again when it is plugged back
/// in. A record's id is fixed; a rename arrives as an update to the same id.
///
/// Clones share one allocation. Maps keyed by `DeviceId` can be queried
/// with a plain `&str`.
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use bridge_audio::DeviceId;
///
/// let mut volumes = BTreeMap::new();
/// volumes.insert(DeviceId::new("usb-mic"), 80u8);
///
/// assert_eq!(volumes.get("usb-mic"), Some(&80));
/// assert_eq!(DeviceId::from("usb-mic").to_string(), "usb-mic");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    /// Wraps a host-assigned id.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// The raw id, as the host reported it.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for DeviceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}
