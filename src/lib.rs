//! # bridge-audio
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Routes one capture device to any number of render devices, and keeps the
//! routing correct while devices come and go.
//!
//! `bridge-audio` tracks the capture and render devices reported by a
//! [`DeviceEnumerator`], builds one audio graph per selected output through
//! an [`AudioBackend`], and remembers which devices should be selected
//! automatically when they reappear.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bridge_audio::{AudioBridge, BridgeEvent, SettingsStore};
//!
//! let bridge = AudioBridge::builder()
//!     .backend(my_backend)
//!     .enumerator(my_enumerator)
//!     .settings(SettingsStore::open_default()?)
//!     .on_event(|e| tracing::debug!(?e, "bridge event"))
//!     .start()
//!     .await?;
//!
//! let mut events = bridge.subscribe();
//! while let Ok(event) = events.recv().await {
//!     if let BridgeEvent::RequestAutoSelectCapture { device } = event {
//!         let outputs = bridge.renders().await?;
//!         bridge.select_input(None, Some(&device), &outputs).await?;
//!     }
//! }
//!
//! bridge.shutdown().await?;
//! ```
//!
//! ## Architecture
//!
//! Every change goes through one serialized executor:
//!
//! - **Watchers**: one pump task per device class forwards enumerator
//!   notifications to the executor
//! - **Bridge handle**: selection calls from the UI are enqueued when made
//! - **Executor**: a single worker owns the device collections, the live
//!   routes and the settings table, and applies one unit of work at a time
//!   in submission order
//!
//! Device changes and selection changes therefore never race, and no state
//! needs a lock.

#![warn(missing_docs)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod backend;
mod bridge;
mod builder;
mod config;
mod coordinator;
mod device;
mod error;
mod event;
mod log;
mod queue;
mod route;
mod settings;
mod watcher;

#[cfg(feature = "cpal")]
pub use backend::CpalEnumerator;
pub use backend::{
    AudioBackend, AudioGraph, DeviceEnumerator, InputNode, MockBackend, MockEnumerator,
    MockGraphInfo, OutputNode, WatcherEvent,
};
pub use bridge::Bridge;
pub use builder::{AudioBridge, AudioBridgeBuilder};
pub use config::BridgeConfig;
pub use device::{
    DeviceClass, DeviceCollection, DeviceId, DeviceInfo, DeviceRecord, DeviceUpdate, Thumbnail,
};
pub use error::{BackendError, BridgeError, SettingsError};
pub use event::{event_callback, BridgeEvent, EventCallback};
pub use queue::{IdleScheduler, TaskHandle, TaskQueue};
pub use route::{GraphSettings, GraphStage, RenderCategory, RouteInfo};
pub use settings::{
    DeviceSettings, FileStorage, MemoryStorage, SettingsStorage, SettingsStore, DEFAULT_BALANCE,
    DEFAULT_VOLUME,
};
pub use watcher::WatcherState;
