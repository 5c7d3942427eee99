//! Live input → output routes.
//!
//! A route is one audio graph whose primary render device is the output,
//! with a single input node (the capture device) connected to the graph's
//! output node. Routes are owned by the coordinator only.

use crate::backend::{AudioBackend, AudioGraph};
use crate::device::{DeviceId, DeviceInfo, DeviceRecord};
use crate::{BackendError, BridgeError};

/// Step of route construction, reported when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphStage {
    /// Creating the graph for the output device.
    Graph,
    /// Creating the input node for the capture device.
    InputNode,
    /// Creating the output node for the render device.
    OutputNode,
    /// Connecting the input node to the output node.
    Connect,
    /// Starting the graph.
    Start,
}

impl std::fmt::Display for GraphStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self {
            Self::Graph => "graph creation",
            Self::InputNode => "input node creation",
            Self::OutputNode => "output node creation",
            Self::Connect => "node connection",
            Self::Start => "graph start",
        };
        f.write_str(stage)
    }
}

/// Kind of audio a graph renders, passed through to the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderCategory {
    /// Uncategorized audio.
    #[default]
    Other,
    /// Music or video playback.
    Media,
    /// Voice communication.
    Communications,
    /// In-game voice chat.
    GameChat,
}

/// Settings for creating a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphSettings {
    /// Render device the graph plays to.
    pub primary_render_device: DeviceInfo,
    /// Kind of audio the graph renders.
    pub category: RenderCategory,
}

/// Snapshot of a live route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    /// Capture device feeding the route.
    pub input: DeviceRecord,
    /// Render device the route plays to.
    pub output: DeviceRecord,
    /// Whether the graph is currently started.
    pub running: bool,
}

pub(crate) struct Route {
    input: DeviceRecord,
    output: DeviceRecord,
    graph: Box<dyn AudioGraph>,
    running: bool,
}

impl Route {
    /// Builds and starts a route from `input` to `output`.
    ///
    /// If any step fails the partially built graph is dropped; nothing is
    /// left running.
    pub async fn open(
        backend: &dyn AudioBackend,
        input: &DeviceRecord,
        output: &DeviceRecord,
        category: RenderCategory,
    ) -> Result<Self, BridgeError> {
        let failed = |stage: GraphStage| {
            let output = output.id().clone();
            move |e: BackendError| BridgeError::RouteCreationFailed {
                stage,
                output,
                reason: e.to_string(),
            }
        };

        let settings = GraphSettings {
            primary_render_device: output.info(),
            category,
        };
        let mut graph = backend
            .create_graph(settings)
            .await
            .map_err(failed(GraphStage::Graph))?;
        let input_node = graph
            .create_input_node(&input.info())
            .await
            .map_err(failed(GraphStage::InputNode))?;
        let output_node = graph
            .create_output_node()
            .await
            .map_err(failed(GraphStage::OutputNode))?;
        graph
            .connect(input_node, output_node)
            .map_err(failed(GraphStage::Connect))?;
        graph.start().await.map_err(failed(GraphStage::Start))?;

        Ok(Self {
            input: input.clone(),
            output: output.clone(),
            graph,
            running: true,
        })
    }

    pub fn input(&self) -> &DeviceRecord {
        &self.input
    }

    pub fn output(&self) -> &DeviceRecord {
        &self.output
    }

    /// Replaces the cached record of a device this route uses.
    pub fn refresh_device(&mut self, record: &DeviceRecord) {
        if self.input.id() == record.id() {
            self.input = record.clone();
        }
        if self.output.id() == record.id() {
            self.output = record.clone();
        }
    }

    pub fn uses(&self, device: &DeviceId) -> bool {
        self.input.id() == device || self.output.id() == device
    }

    pub async fn start(&mut self) -> Result<(), BackendError> {
        if !self.running {
            self.graph.start().await?;
            self.running = true;
        }
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), BackendError> {
        if self.running {
            self.graph.stop().await?;
            self.running = false;
        }
        Ok(())
    }

    pub fn info(&self) -> RouteInfo {
        RouteInfo {
            input: self.input.clone(),
            output: self.output.clone(),
            running: self.running,
        }
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("input", self.input.id())
            .field("output", self.output.id())
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}
