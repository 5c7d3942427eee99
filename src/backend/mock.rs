//! Mock platform services for testing without hardware.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{AudioBackend, AudioGraph, DeviceEnumerator, InputNode, OutputNode, WatcherEvent};
use crate::device::{DeviceClass, DeviceId, DeviceInfo, DeviceUpdate, Thumbnail};
use crate::route::{GraphSettings, GraphStage, RenderCategory};
use crate::BackendError;

/// What a [`MockBackend`] knows about one graph it created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockGraphInfo {
    /// Primary render device of the graph.
    pub output: DeviceId,
    /// Capture device of the graph's input node, once created.
    pub input: Option<DeviceId>,
    /// Category the graph was created with.
    pub category: RenderCategory,
    /// Whether the input node was connected to the output node.
    pub connected: bool,
    /// Whether the graph is started.
    pub running: bool,
    /// Whether the graph has been dropped.
    pub released: bool,
}

#[derive(Default)]
struct BackendState {
    graphs: Vec<MockGraphInfo>,
    failures: HashMap<DeviceId, GraphStage>,
    next_node: u64,
}

impl BackendState {
    fn check(&self, output: &DeviceId, stage: GraphStage) -> Result<(), BackendError> {
        match self.failures.get(output) {
            Some(failing) if *failing == stage => {
                Err(BackendError::unavailable(output.clone(), format!("injected {stage} failure")))
            }
            _ => Ok(()),
        }
    }

    fn next_node(&mut self) -> u64 {
        self.next_node += 1;
        self.next_node
    }
}

/// An audio backend that records graphs instead of playing audio.
///
/// Clones share state, so a test can keep one clone for inspection and
/// hand another to the bridge.
///
/// # Example
///
/// ```
/// use bridge_audio::{GraphStage, MockBackend};
///
/// let backend = MockBackend::new();
///
/// // Every route to "spk-2" will fail while creating its output node.
/// backend.fail_at("spk-2", GraphStage::OutputNode);
///
/// assert!(backend.live_routes().is_empty());
/// ```
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<BackendState>>,
}

impl MockBackend {
    /// Creates a backend on which every step succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later route to `output` fail at `stage`.
    pub fn fail_at(&self, output: impl Into<DeviceId>, stage: GraphStage) {
        self.state.lock().failures.insert(output.into(), stage);
    }

    /// Removes every injected failure.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Every graph created so far, in creation order.
    pub fn graphs(&self) -> Vec<MockGraphInfo> {
        self.state.lock().graphs.clone()
    }

    /// `(input, output)` pairs of graphs that are connected, started and
    /// not yet dropped.
    pub fn live_routes(&self) -> Vec<(DeviceId, DeviceId)> {
        self.state
            .lock()
            .graphs
            .iter()
            .filter(|g| g.connected && g.running && !g.released)
            .filter_map(|g| g.input.clone().map(|input| (input, g.output.clone())))
            .collect()
    }

    /// `(input, output)` pairs of graphs that exist but are stopped.
    pub fn stopped_routes(&self) -> Vec<(DeviceId, DeviceId)> {
        self.state
            .lock()
            .graphs
            .iter()
            .filter(|g| g.connected && !g.running && !g.released)
            .filter_map(|g| g.input.clone().map(|input| (input, g.output.clone())))
            .collect()
    }
}

#[async_trait]
impl AudioBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create_graph(
        &self,
        settings: GraphSettings,
    ) -> Result<Box<dyn AudioGraph>, BackendError> {
        let output = settings.primary_render_device.id;
        let mut state = self.state.lock();
        state.check(&output, GraphStage::Graph)?;

        let index = state.graphs.len();
        state.graphs.push(MockGraphInfo {
            output: output.clone(),
            input: None,
            category: settings.category,
            connected: false,
            running: false,
            released: false,
        });

        Ok(Box::new(MockGraph {
            state: Arc::clone(&self.state),
            index,
            output,
        }))
    }
}

struct MockGraph {
    state: Arc<Mutex<BackendState>>,
    index: usize,
    output: DeviceId,
}

impl MockGraph {
    fn update<T>(
        &self,
        stage: GraphStage,
        f: impl FnOnce(&mut BackendState, usize) -> T,
    ) -> Result<T, BackendError> {
        let mut state = self.state.lock();
        state.check(&self.output, stage)?;
        Ok(f(&mut state, self.index))
    }
}

#[async_trait]
impl AudioGraph for MockGraph {
    async fn create_input_node(&mut self, device: &DeviceInfo) -> Result<InputNode, BackendError> {
        self.update(GraphStage::InputNode, |state, index| {
            state.graphs[index].input = Some(device.id.clone());
            InputNode::new(state.next_node())
        })
    }

    async fn create_output_node(&mut self) -> Result<OutputNode, BackendError> {
        self.update(GraphStage::OutputNode, |state, _| OutputNode::new(state.next_node()))
    }

    fn connect(&mut self, _input: InputNode, _output: OutputNode) -> Result<(), BackendError> {
        self.update(GraphStage::Connect, |state, index| {
            state.graphs[index].connected = true;
        })
    }

    async fn start(&mut self) -> Result<(), BackendError> {
        self.update(GraphStage::Start, |state, index| {
            state.graphs[index].running = true;
        })
    }

    async fn stop(&mut self) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.graphs[self.index].running = false;
        Ok(())
    }
}

impl Drop for MockGraph {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        let graph = &mut state.graphs[self.index];
        graph.released = true;
        graph.running = false;
    }
}

#[derive(Default)]
struct EnumeratorState {
    initial: HashMap<DeviceClass, Vec<DeviceInfo>>,
    watchers: HashMap<DeviceClass, mpsc::Sender<WatcherEvent>>,
    thumbnails: HashMap<DeviceId, Thumbnail>,
    failing_thumbnails: HashSet<DeviceId>,
}

/// A device enumerator driven by the test.
///
/// Devices registered with [`with_device`](Self::with_device) are reported
/// during the initial enumeration of every watch. Later changes are pushed
/// with [`add`](Self::add), [`update`](Self::update),
/// [`remove`](Self::remove) and [`stop`](Self::stop).
///
/// # Example
///
/// ```
/// use bridge_audio::{DeviceInfo, MockEnumerator};
///
/// let enumerator = MockEnumerator::new()
///     .with_device(DeviceInfo::capture("mic-1", "USB Mic"))
///     .with_device(DeviceInfo::render("spk-1", "Speakers"));
/// ```
#[derive(Clone, Default)]
pub struct MockEnumerator {
    state: Arc<Mutex<EnumeratorState>>,
}

impl MockEnumerator {
    /// Creates an enumerator with no devices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a device present from the start.
    #[must_use]
    pub fn with_device(self, device: DeviceInfo) -> Self {
        self.state
            .lock()
            .initial
            .entry(device.class)
            .or_default()
            .push(device);
        self
    }

    /// Sets the thumbnail returned for a device.
    pub fn set_thumbnail(&self, id: impl Into<DeviceId>, thumbnail: Thumbnail) {
        self.state.lock().thumbnails.insert(id.into(), thumbnail);
    }

    /// Makes thumbnail fetches for a device fail.
    pub fn fail_thumbnail(&self, id: impl Into<DeviceId>) {
        self.state.lock().failing_thumbnails.insert(id.into());
    }

    /// Returns `true` if a watch for `class` is active.
    pub fn is_watching(&self, class: DeviceClass) -> bool {
        self.state
            .lock()
            .watchers
            .get(&class)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Reports a new device. Returns `false` if nobody is watching its class.
    pub async fn add(&self, device: DeviceInfo) -> bool {
        self.emit(device.class, WatcherEvent::Added(device)).await
    }

    /// Reports a metadata change.
    pub async fn update(&self, class: DeviceClass, update: DeviceUpdate) -> bool {
        self.emit(class, WatcherEvent::Updated(update)).await
    }

    /// Reports a removal.
    pub async fn remove(&self, class: DeviceClass, id: impl Into<DeviceId>) -> bool {
        self.emit(class, WatcherEvent::Removed(DeviceUpdate::id_only(id)))
            .await
    }

    /// Reports that the watcher for `class` stopped on its own.
    pub async fn stop(&self, class: DeviceClass) -> bool {
        self.emit(class, WatcherEvent::Stopped).await
    }

    /// Sends any event to the watcher for `class`.
    pub async fn emit(&self, class: DeviceClass, event: WatcherEvent) -> bool {
        let tx = self.state.lock().watchers.get(&class).cloned();
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl DeviceEnumerator for MockEnumerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn watch(
        &self,
        class: DeviceClass,
    ) -> Result<mpsc::Receiver<WatcherEvent>, BackendError> {
        let mut state = self.state.lock();
        let initial = state.initial.get(&class).cloned().unwrap_or_default();
        let (tx, rx) = mpsc::channel(initial.len() + 64);

        for device in initial {
            tx.try_send(WatcherEvent::Added(device))
                .map_err(|e| BackendError::custom(e.to_string()))?;
        }
        tx.try_send(WatcherEvent::EnumerationCompleted)
            .map_err(|e| BackendError::custom(e.to_string()))?;

        state.watchers.insert(class, tx);
        Ok(rx)
    }

    async fn fetch_thumbnail(&self, device: &DeviceInfo) -> Result<Thumbnail, BackendError> {
        let state = self.state.lock();
        if state.failing_thumbnails.contains(&device.id) {
            return Err(BackendError::unavailable(device.id.clone(), "thumbnail fetch failed"));
        }
        Ok(state
            .thumbnails
            .get(&device.id)
            .cloned()
            .unwrap_or_else(|| Thumbnail::new(device.name.as_bytes().to_vec())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_settings(id: &str) -> GraphSettings {
        GraphSettings {
            primary_render_device: DeviceInfo::render(id, id),
            category: RenderCategory::Other,
        }
    }

    #[tokio::test]
    async fn test_mock_backend_records_graph_lifecycle() {
        let backend = MockBackend::new();
        let mut graph = backend.create_graph(render_settings("spk")).await.unwrap();

        let input = graph
            .create_input_node(&DeviceInfo::capture("mic", "Mic"))
            .await
            .unwrap();
        let output = graph.create_output_node().await.unwrap();
        assert_ne!(input.id(), output.id());

        graph.connect(input, output).unwrap();
        graph.start().await.unwrap();
        assert_eq!(
            backend.live_routes(),
            vec![(DeviceId::new("mic"), DeviceId::new("spk"))]
        );

        graph.stop().await.unwrap();
        assert_eq!(backend.stopped_routes().len(), 1);

        drop(graph);
        assert!(backend.graphs()[0].released);
        assert!(backend.stopped_routes().is_empty());
    }

    #[tokio::test]
    async fn test_mock_backend_injected_failure() {
        let backend = MockBackend::new();
        backend.fail_at("spk", GraphStage::Graph);

        assert!(backend.create_graph(render_settings("spk")).await.is_err());
        assert!(backend.create_graph(render_settings("other")).await.is_ok());

        backend.clear_failures();
        assert!(backend.create_graph(render_settings("spk")).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_enumerator_initial_devices() {
        let enumerator = MockEnumerator::new()
            .with_device(DeviceInfo::capture("mic", "Mic"))
            .with_device(DeviceInfo::render("spk", "Speakers"));

        let mut rx = enumerator.watch(DeviceClass::Capture).await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(WatcherEvent::Added(DeviceInfo::capture("mic", "Mic")))
        );
        assert_eq!(rx.recv().await, Some(WatcherEvent::EnumerationCompleted));

        assert!(enumerator.remove(DeviceClass::Capture, "mic").await);
        assert_eq!(
            rx.recv().await,
            Some(WatcherEvent::Removed(DeviceUpdate::id_only("mic")))
        );
    }

    #[tokio::test]
    async fn test_mock_enumerator_without_watch() {
        let enumerator = MockEnumerator::new();
        assert!(!enumerator.is_watching(DeviceClass::Render));
        assert!(!enumerator.add(DeviceInfo::render("spk", "Speakers")).await);
    }

    #[tokio::test]
    async fn test_mock_enumerator_thumbnails() {
        let enumerator = MockEnumerator::new();
        let mic = DeviceInfo::capture("mic", "Mic");

        assert_eq!(
            enumerator.fetch_thumbnail(&mic).await.unwrap().as_bytes(),
            b"Mic"
        );

        enumerator.set_thumbnail("mic", Thumbnail::new(vec![1u8, 2, 3]));
        assert_eq!(
            enumerator.fetch_thumbnail(&mic).await.unwrap().as_bytes(),
            &[1, 2, 3]
        );

        enumerator.fail_thumbnail("mic");
        assert!(enumerator.fetch_thumbnail(&mic).await.is_err());
    }
}
