//! Error types for bridge-audio.
//!
//! Errors are split into three categories:
//! - **Bridge errors** ([`BridgeError`]): returned to whoever submitted the
//!   failing operation; the bridge itself keeps running
//! - **Backend errors** ([`BackendError`]): raised by injected platform
//!   services (audio graphs, device enumeration)
//! - **Settings errors** ([`SettingsError`]): persistence of the per-device
//!   auto-connect table. Only opening a store returns these; failed saves
//!   during bridge operations are logged and never fail the operation

use crate::device::{DeviceClass, DeviceId};
use crate::route::GraphStage;

/// Errors surfaced by bridge operations.
///
/// None of these are fatal to the bridge. A failed operation is reported to
/// its caller only; other queued work and live routes are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// An update or removal referenced a device the bridge does not track.
    #[error("{class} device not found: {id}")]
    DeviceNotFound {
        /// Collection that was searched.
        class: DeviceClass,
        /// Id that was not present.
        id: DeviceId,
    },

    /// The audio backend failed while building a route.
    #[error("route to {output} failed at {stage}: {reason}")]
    RouteCreationFailed {
        /// Step of graph construction that failed.
        stage: GraphStage,
        /// Render device the route was meant for.
        output: DeviceId,
        /// Backend-provided reason.
        reason: String,
    },

    /// A unit of work panicked on the executor.
    #[error("task panicked: {message}")]
    TaskPanicked {
        /// Panic payload, if it was a string.
        message: String,
    },

    /// A unit of work returned an error of its own.
    #[error("task failed: {reason}")]
    TaskFailed {
        /// Description of the failure.
        reason: String,
    },

    /// The executor is gone (the bridge was shut down).
    #[error("bridge executor is closed")]
    QueueClosed,

    /// No audio backend was configured before starting.
    #[error("no audio backend configured - call backend() before start()")]
    NoBackend,

    /// No device enumerator was configured before starting.
    #[error("no device enumerator configured - call enumerator() before start()")]
    NoEnumerator,

    /// The enumerator refused to watch a device class.
    #[error("failed to watch {class} devices: {reason}")]
    WatchFailed {
        /// Device class that could not be watched.
        class: DeviceClass,
        /// Enumerator-provided reason.
        reason: String,
    },

    /// `start_watchers()` was called while the watcher was still running.
    #[error("{class} watcher is already running")]
    WatcherAlreadyRunning {
        /// Watcher that was already running.
        class: DeviceClass,
    },
}

impl BridgeError {
    /// Creates a task failure with the given reason.
    pub fn task_failed(reason: impl Into<String>) -> Self {
        Self::TaskFailed {
            reason: reason.into(),
        }
    }
}

/// Errors returned by injected platform services.
///
/// These are recoverable: a backend error while building a route means the
/// route is not created, nothing more.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// The device is known but cannot be used right now.
    #[error("device unavailable: {id} - {reason}")]
    DeviceUnavailable {
        /// Id of the device.
        id: DeviceId,
        /// Why it is unavailable.
        reason: String,
    },

    /// The service does not support this operation.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Custom error for user-implemented services.
    #[error("{0}")]
    Custom(String),
}

impl BackendError {
    /// Creates a custom backend error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Creates a device unavailable error.
    pub fn unavailable(id: impl Into<DeviceId>, reason: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from the device settings store.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// No per-user configuration directory could be determined.
    #[error("failed to determine config directory")]
    NoConfigDir,

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored document is not valid TOML.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// The table could not be serialized.
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// The stored document was written by a newer format.
    #[error("unsupported settings version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found in the document.
        found: i64,
        /// Version this build reads.
        expected: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_not_found_display() {
        let err = BridgeError::DeviceNotFound {
            class: DeviceClass::Render,
            id: DeviceId::new("spk-1"),
        };
        assert_eq!(err.to_string(), "render device not found: spk-1");
    }

    #[test]
    fn test_route_creation_failed_display() {
        let err = BridgeError::RouteCreationFailed {
            stage: GraphStage::InputNode,
            output: DeviceId::new("spk-1"),
            reason: "busy".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "route to spk-1 failed at input node creation: busy"
        );
    }

    #[test]
    fn test_backend_error_custom() {
        let err = BackendError::custom("something went wrong");
        assert_eq!(err.to_string(), "something went wrong");
    }

    #[test]
    fn test_backend_error_unavailable() {
        let err = BackendError::unavailable("mic-1", "in use");
        assert_eq!(err.to_string(), "device unavailable: mic-1 - in use");
    }

    #[test]
    fn test_unsupported_version_display() {
        let err = SettingsError::UnsupportedVersion {
            found: 3,
            expected: 1,
        };
        assert_eq!(err.to_string(), "unsupported settings version 3 (expected 1)");
    }
}
