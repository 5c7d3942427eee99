//! Injected platform services.
//!
//! The bridge does not talk to an audio API directly. It drives two narrow
//! service traits instead:
//!
//! - [`AudioBackend`] / [`AudioGraph`]: builds, starts and stops the graphs
//!   that move samples from a capture device to a render device
//! - [`DeviceEnumerator`]: reports device presence and metadata per
//!   [`DeviceClass`], and fetches device thumbnails
//!
//! [`MockBackend`] and [`MockEnumerator`] implement both without hardware.

mod mock;

#[cfg(feature = "cpal")]
mod cpal;

#[cfg(feature = "cpal")]
pub use self::cpal::CpalEnumerator;
pub use mock::{MockBackend, MockEnumerator, MockGraphInfo};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::device::{DeviceClass, DeviceInfo, DeviceUpdate, Thumbnail};
use crate::route::GraphSettings;
use crate::BackendError;

/// Opaque handle to an input node inside one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputNode(u64);

impl InputNode {
    /// Wraps a backend-specific node id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Backend-specific node id.
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Opaque handle to the output node of one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputNode(u64);

impl OutputNode {
    /// Wraps a backend-specific node id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Backend-specific node id.
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Factory for audio graphs.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use bridge_audio::{AudioBackend, AudioGraph, BackendError, GraphSettings};
///
/// struct NoAudio;
///
/// #[async_trait]
/// impl AudioBackend for NoAudio {
///     fn name(&self) -> &str {
///         "none"
///     }
///
///     async fn create_graph(
///         &self,
///         settings: GraphSettings,
///     ) -> Result<Box<dyn AudioGraph>, BackendError> {
///         Err(BackendError::unavailable(
///             settings.primary_render_device.id,
///             "no audio on this host",
///         ))
///     }
/// }
/// ```
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Creates a graph rendering to `settings.primary_render_device`.
    ///
    /// The graph is created stopped.
    async fn create_graph(
        &self,
        settings: GraphSettings,
    ) -> Result<Box<dyn AudioGraph>, BackendError>;
}

/// One audio graph: input nodes connected to the render device's output node.
///
/// Dropping a graph releases it. The bridge stops a graph before dropping
/// it, but a graph dropped after a failed construction step was never
/// started.
#[async_trait]
pub trait AudioGraph: Send + Sync {
    /// Creates an input node reading from a capture device.
    async fn create_input_node(&mut self, device: &DeviceInfo) -> Result<InputNode, BackendError>;

    /// Creates the node writing to the graph's primary render device.
    async fn create_output_node(&mut self) -> Result<OutputNode, BackendError>;

    /// Routes an input node into an output node.
    fn connect(&mut self, input: InputNode, output: OutputNode) -> Result<(), BackendError>;

    /// Starts moving samples.
    async fn start(&mut self) -> Result<(), BackendError>;

    /// Stops moving samples. The graph can be started again.
    async fn stop(&mut self) -> Result<(), BackendError>;
}

/// Notification from a device watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherEvent {
    /// A device appeared (or was found during the initial enumeration).
    Added(DeviceInfo),
    /// A known device's metadata changed.
    Updated(DeviceUpdate),
    /// A known device disappeared.
    Removed(DeviceUpdate),
    /// The initial enumeration is complete; later events are live changes.
    EnumerationCompleted,
    /// The watcher stopped on its own. No more events follow.
    Stopped,
}

/// Source of device presence and metadata.
#[async_trait]
pub trait DeviceEnumerator: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Starts watching one device class.
    ///
    /// The returned channel first reports every present device as
    /// [`WatcherEvent::Added`], then [`WatcherEvent::EnumerationCompleted`],
    /// then live changes. Dropping the receiver stops the watch.
    async fn watch(&self, class: DeviceClass) -> Result<mpsc::Receiver<WatcherEvent>, BackendError>;

    /// Fetches a device's thumbnail.
    ///
    /// Failure is not fatal; the device is published without a glyph.
    /// Default implementation reports no thumbnail support.
    async fn fetch_thumbnail(&self, device: &DeviceInfo) -> Result<Thumbnail, BackendError> {
        Err(BackendError::Unsupported(format!(
            "{} has no thumbnail for {}",
            self.name(),
            device.id
        )))
    }
}
