//! Lifecycle events published by the bridge.
//!
//! Events are notifications about state that has already changed. They are
//! delivered two ways: to every [`subscribe()`](crate::Bridge::subscribe)
//! receiver through a broadcast channel, and to the optional
//! [`EventCallback`] registered on the builder.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::device::{DeviceClass, DeviceRecord};
use crate::route::GraphStage;

/// Events emitted by the bridge.
///
/// # Example
///
/// ```
/// use bridge_audio::BridgeEvent;
///
/// fn handle_event(event: BridgeEvent) {
///     match event {
///         BridgeEvent::RouteCreated { input, output } => {
///             println!("routing {} -> {}", input.name(), output.name());
///         }
///         BridgeEvent::RouteRemoved { input, output } => {
///             println!("stopped {} -> {}", input.name(), output.name());
///         }
///         BridgeEvent::RouteFailed { output, stage, reason, .. } => {
///             eprintln!("no route to {}: {} ({})", output.name(), stage, reason);
///         }
///         BridgeEvent::RequestAutoSelectCapture { device } => {
///             println!("select capture {}", device.name());
///         }
///         BridgeEvent::RequestAutoSelectRender { device } => {
///             println!("select render {}", device.name());
///         }
///         BridgeEvent::DevicesChanged { class, devices } => {
///             println!("{} {} devices", devices.len(), class);
///         }
///         BridgeEvent::WatcherStopped { class } => {
///             println!("{} watcher stopped", class);
///         }
///         BridgeEvent::Log { message } => println!("{message}"),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// A route was created and started.
    RouteCreated {
        /// Capture device feeding the route.
        input: DeviceRecord,
        /// Render device the route plays to.
        output: DeviceRecord,
    },

    /// A route was stopped and discarded.
    RouteRemoved {
        /// Capture device that fed the route.
        input: DeviceRecord,
        /// Render device the route played to.
        output: DeviceRecord,
    },

    /// The backend could not build a requested route.
    ///
    /// The route was not registered; other routes are unaffected.
    RouteFailed {
        /// Capture device of the attempted route.
        input: DeviceRecord,
        /// Render device of the attempted route.
        output: DeviceRecord,
        /// Step of graph construction that failed.
        stage: GraphStage,
        /// Backend-provided reason.
        reason: String,
    },

    /// A capture device marked for auto-connect appeared; the UI should
    /// select it.
    RequestAutoSelectCapture {
        /// Device to select.
        device: DeviceRecord,
    },

    /// A render device marked for auto-connect appeared; the UI should add
    /// it to the selection.
    RequestAutoSelectRender {
        /// Device to select.
        device: DeviceRecord,
    },

    /// A device collection changed (add, update or removal).
    DevicesChanged {
        /// Which collection changed.
        class: DeviceClass,
        /// The collection after the change.
        devices: Vec<DeviceRecord>,
    },

    /// A device watcher stopped reporting.
    WatcherStopped {
        /// Which watcher stopped.
        class: DeviceClass,
    },

    /// A line was added to the activity log.
    Log {
        /// The new line.
        message: String,
    },
}

impl BridgeEvent {
    /// The matching auto-select request for a device class.
    pub fn auto_select(device: DeviceRecord) -> Self {
        match device.class() {
            DeviceClass::Capture => Self::RequestAutoSelectCapture { device },
            DeviceClass::Render => Self::RequestAutoSelectRender { device },
        }
    }
}

/// Callback type for receiving bridge events.
///
/// Register one via [`AudioBridgeBuilder::on_event()`]. The callback runs on
/// the bridge's executor, so it should return quickly.
///
/// [`AudioBridgeBuilder::on_event()`]: crate::AudioBridgeBuilder::on_event
pub type EventCallback = Arc<dyn Fn(BridgeEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use bridge_audio::{event_callback, BridgeEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(BridgeEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Fan-out point for events: broadcast subscribers plus the callback.
#[derive(Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<BridgeEvent>,
    callback: Option<EventCallback>,
}

impl EventBus {
    pub fn new(capacity: usize, callback: Option<EventCallback>) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, callback }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: BridgeEvent) {
        if let Some(ref callback) = self.callback {
            callback(event.clone());
        }
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }
}
