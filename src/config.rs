//! Configuration for the bridge.

use std::time::Duration;

use crate::route::RenderCategory;

/// Configuration for bridge behavior.
///
/// Use [`BridgeConfig::default()`] for sensible defaults, or customize as needed.
///
/// # Example
///
/// ```
/// use bridge_audio::BridgeConfig;
/// use std::time::Duration;
///
/// let config = BridgeConfig {
///     auto_select_delay: Duration::from_millis(250),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Maximum number of lines kept in the activity log.
    ///
    /// Oldest lines are dropped first.
    /// Default: 500
    pub log_capacity: usize,

    /// Buffer size of the event broadcast channel.
    ///
    /// Subscribers that fall further behind than this miss events and
    /// receive a `Lagged` error instead.
    /// Default: 256
    pub event_capacity: usize,

    /// Extra delay before an auto-select request is scheduled.
    ///
    /// Auto-select requests always run at idle priority, after any pending
    /// device or selection work. This delay is added on top, which helps
    /// when a UI needs time to render a newly added device.
    /// Default: 0
    pub auto_select_delay: Duration,

    /// Stop every live route when the bridge shuts down.
    ///
    /// With `true`, shutdown stops each graph and reports it like any other
    /// teardown: a `RouteRemoved` event and a "Graph stopped" log line per
    /// route. With `false`, none of that happens, but the graphs are still
    /// released when the executor drops its state, so audio does not keep
    /// flowing past shutdown either way.
    ///
    /// Default: true
    pub stop_routes_on_shutdown: bool,

    /// Category passed to the backend for every graph.
    ///
    /// Default: [`RenderCategory::Other`]
    pub render_category: RenderCategory,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_capacity: 500,
            event_capacity: 256,
            auto_select_delay: Duration::ZERO,
            stop_routes_on_shutdown: true,
            render_category: RenderCategory::Other,
        }
    }
}
