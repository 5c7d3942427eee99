//! State owned by the executor: device collections, live routes and
//! auto-connect preferences.
//!
//! Every method here runs inside a unit of work on the bridge's
//! [`TaskQueue`](crate::TaskQueue), one at a time. Nothing outside the
//! worker touches this state, so none of it is locked.

use std::collections::HashSet;
use std::sync::Arc;

use crate::backend::{AudioBackend, DeviceEnumerator, WatcherEvent};
use crate::device::{
    DeviceClass, DeviceCollection, DeviceId, DeviceInfo, DeviceRecord, DeviceUpdate, Thumbnail,
};
use crate::event::{BridgeEvent, EventBus};
use crate::log::ActivityLog;
use crate::queue::IdleScheduler;
use crate::route::{GraphStage, RenderCategory, Route, RouteInfo};
use crate::settings::{DeviceSettings, SettingsStore};
use crate::{BridgeConfig, BridgeError};

/// Injected services the state works with.
pub(crate) struct Services {
    pub backend: Arc<dyn AudioBackend>,
    pub enumerator: Arc<dyn DeviceEnumerator>,
    pub settings: SettingsStore,
}

pub(crate) struct BridgeState {
    captures: DeviceCollection,
    renders: DeviceCollection,
    routes: Vec<Route>,
    /// Devices removed from the host whose preference must survive the
    /// deselection that follows.
    removed: HashSet<DeviceId>,
    settings: SettingsStore,
    backend: Arc<dyn AudioBackend>,
    enumerator: Arc<dyn DeviceEnumerator>,
    log: ActivityLog,
    events: EventBus,
    idle: IdleScheduler<BridgeState>,
    category: RenderCategory,
}

impl BridgeState {
    pub fn new(
        services: Services,
        config: &BridgeConfig,
        events: EventBus,
        idle: IdleScheduler<BridgeState>,
    ) -> Self {
        Self {
            captures: DeviceCollection::new(DeviceClass::Capture),
            renders: DeviceCollection::new(DeviceClass::Render),
            routes: Vec::new(),
            removed: HashSet::new(),
            settings: services.settings,
            backend: services.backend,
            enumerator: services.enumerator,
            log: ActivityLog::new(config.log_capacity),
            events,
            idle: idle.with_delay(config.auto_select_delay),
            category: config.render_category,
        }
    }

    // ---- selection ----

    /// Switches the route set to a new input.
    ///
    /// Every live route is torn down first. With a new input, one route per
    /// selected output is then created and started.
    pub async fn select_input(
        &mut self,
        previous: Option<DeviceRecord>,
        new: Option<DeviceRecord>,
        outputs: Vec<DeviceRecord>,
    ) {
        tracing::debug!(
            previous = previous.as_ref().map(|d| d.id().as_str()),
            new = new.as_ref().map(|d| d.id().as_str()),
            outputs = outputs.len(),
            "selecting input"
        );

        let torn_down = std::mem::take(&mut self.routes);
        let had_routes = !torn_down.is_empty();
        for route in torn_down {
            self.close_route(route).await;
        }
        if had_routes {
            if let Some(previous) = &previous {
                self.release_auto_connect(previous);
            }
        }

        let Some(input) = new else {
            return;
        };
        for output in outputs {
            if self.has_route_to(output.id()) {
                tracing::debug!(output = %output.id(), "output listed twice, skipping");
                continue;
            }
            if self.open_route(&input, &output).await {
                self.persist_auto_connect(&input, true);
            }
        }
    }

    /// Applies a change to the output selection.
    ///
    /// Routes to `removed` outputs are torn down; routes from `input` to
    /// `added` outputs are created. Without an input only removals apply.
    pub async fn select_outputs(
        &mut self,
        input: Option<DeviceRecord>,
        added: Vec<DeviceRecord>,
        removed: Vec<DeviceRecord>,
    ) {
        tracing::debug!(
            input = input.as_ref().map(|d| d.id().as_str()),
            added = added.len(),
            removed = removed.len(),
            "selecting outputs"
        );

        for output in removed {
            let Some(index) = self.routes.iter().position(|r| r.output().id() == output.id()) else {
                continue;
            };
            let route = self.routes.remove(index);
            self.close_route(route).await;
            self.release_auto_connect(&output);
        }

        let Some(input) = input else {
            return;
        };
        for output in added {
            if self.has_route_to(output.id()) {
                tracing::debug!(output = %output.id(), "route already live, skipping");
                continue;
            }
            if self.open_route(&input, &output).await {
                self.persist_auto_connect(&output, true);
            }
        }
    }

    /// Starts every live route.
    pub async fn play(&mut self) {
        for route in &mut self.routes {
            if let Err(e) = route.start().await {
                tracing::warn!(
                    input = %route.input().id(),
                    output = %route.output().id(),
                    error = %e,
                    "failed to start route"
                );
            }
        }
    }

    /// Stops every live route. Routes stay registered and can be restarted.
    pub async fn pause(&mut self) {
        for route in &mut self.routes {
            if let Err(e) = route.stop().await {
                tracing::warn!(
                    input = %route.input().id(),
                    output = %route.output().id(),
                    error = %e,
                    "failed to stop route"
                );
            }
        }
    }

    /// Stops and discards every live route without touching preferences.
    pub async fn close_all_routes(&mut self) {
        for route in std::mem::take(&mut self.routes) {
            self.close_route(route).await;
        }
    }

    // ---- device watchers ----

    /// Applies one watcher notification for `class`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if an update or removal names a device that
    /// is not in the collection.
    pub async fn apply_watcher_event(
        &mut self,
        class: DeviceClass,
        event: WatcherEvent,
    ) -> Result<(), BridgeError> {
        match event {
            WatcherEvent::Added(info) => {
                self.device_added(DeviceInfo { class, ..info }).await;
                Ok(())
            }
            WatcherEvent::Updated(update) => self.device_updated(class, &update).await,
            WatcherEvent::Removed(update) => self.device_removed(class, &update).await,
            WatcherEvent::EnumerationCompleted => {
                tracing::debug!(
                    %class,
                    devices = self.collection(class).len(),
                    "enumeration completed"
                );
                Ok(())
            }
            WatcherEvent::Stopped => {
                self.watcher_stopped(class);
                Ok(())
            }
        }
    }

    async fn device_added(&mut self, info: DeviceInfo) {
        let glyph = fetch_glyph(self.enumerator.as_ref(), &info).await;
        let record = DeviceRecord::new(info, glyph);
        let class = record.class();

        if !self.collection_mut(class).insert(record.clone()) {
            tracing::warn!(%class, device = %record.id(), "device added twice, metadata replaced");
        }
        // A device that came back is no longer pending removal.
        self.removed.remove(record.id());

        tracing::info!(%class, device = %record.id(), name = record.name(), "device added");
        self.record_activity(format!("{} Device {} has been added", class.label(), record.name()));
        self.publish_devices(class);

        if self.settings.is_auto_connect(&record) {
            let id = record.id().clone();
            let _ = self.idle.submit(move |state: &mut BridgeState| {
                Box::pin(async move {
                    state.request_auto_select(class, &id);
                    Ok(())
                })
            });
        }
    }

    async fn device_updated(
        &mut self,
        class: DeviceClass,
        update: &DeviceUpdate,
    ) -> Result<(), BridgeError> {
        let Some(current) = self.collection(class).get(&update.id) else {
            tracing::warn!(%class, device = %update.id, "update for unknown device");
            return Err(BridgeError::DeviceNotFound {
                class,
                id: update.id.clone(),
            });
        };

        let mut info = current.info();
        if let Some(name) = &update.name {
            info.name.clone_from(name);
        }
        let glyph = fetch_glyph(self.enumerator.as_ref(), &info).await;
        let record = self.collection_mut(class).update(update, glyph)?.clone();
        for route in &mut self.routes {
            route.refresh_device(&record);
        }

        tracing::info!(%class, device = %record.id(), name = record.name(), "device updated");
        self.record_activity(format!(
            "{} Device {} has been updated",
            class.label(),
            record.name()
        ));
        self.publish_devices(class);
        Ok(())
    }

    async fn device_removed(
        &mut self,
        class: DeviceClass,
        update: &DeviceUpdate,
    ) -> Result<(), BridgeError> {
        let record = match self.collection_mut(class).remove(&update.id) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(%class, device = %update.id, "removal of unknown device");
                return Err(e);
            }
        };
        self.removed.insert(record.id().clone());

        tracing::info!(%class, device = %record.id(), name = record.name(), "device removed");
        self.record_activity(format!(
            "{} Device {} has been removed",
            class.label(),
            record.name()
        ));
        self.publish_devices(class);

        let (gone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.routes)
            .into_iter()
            .partition(|route| route.uses(record.id()));
        self.routes = kept;
        for route in gone {
            self.close_route(route).await;
        }
        Ok(())
    }

    fn watcher_stopped(&mut self, class: DeviceClass) {
        tracing::info!(%class, "device watcher stopped");
        self.record_activity(format!("{} device watcher stopped", class.label()));
        self.events.emit(BridgeEvent::WatcherStopped { class });
    }

    /// Asks the UI to select a device, if it is still present.
    fn request_auto_select(&mut self, class: DeviceClass, id: &DeviceId) {
        let Some(device) = self.collection(class).get(id).cloned() else {
            tracing::debug!(%class, device = %id, "auto-select skipped, device is gone");
            return;
        };

        tracing::info!(%class, device = %id, "requesting auto-select");
        self.record_activity(format!("Notify to select {class} {}", device.name()));
        self.events.emit(BridgeEvent::auto_select(device));
    }

    // ---- snapshots ----

    pub fn devices(&self, class: DeviceClass) -> Vec<DeviceRecord> {
        self.collection(class).snapshot()
    }

    pub fn routes(&self) -> Vec<RouteInfo> {
        self.routes.iter().map(Route::info).collect()
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.log.lines()
    }

    pub fn log_text(&self) -> String {
        self.log.text()
    }

    pub fn is_auto_connect(&mut self, device: &DeviceRecord) -> bool {
        self.settings.is_auto_connect(device)
    }

    pub fn device_settings(&self, id: &DeviceId) -> Option<DeviceSettings> {
        self.settings.get(id).cloned()
    }

    /// Appends a line to the activity log and publishes it.
    pub fn record_activity(&mut self, message: String) {
        self.log.push(message.clone());
        self.events.emit(BridgeEvent::Log { message });
    }

    // ---- helpers ----

    fn collection(&self, class: DeviceClass) -> &DeviceCollection {
        match class {
            DeviceClass::Capture => &self.captures,
            DeviceClass::Render => &self.renders,
        }
    }

    fn collection_mut(&mut self, class: DeviceClass) -> &mut DeviceCollection {
        match class {
            DeviceClass::Capture => &mut self.captures,
            DeviceClass::Render => &mut self.renders,
        }
    }

    fn publish_devices(&self, class: DeviceClass) {
        self.events.emit(BridgeEvent::DevicesChanged {
            class,
            devices: self.collection(class).snapshot(),
        });
    }

    fn has_route_to(&self, output: &DeviceId) -> bool {
        self.routes.iter().any(|r| r.output().id() == output)
    }

    /// Builds and starts a route, registering it on success.
    async fn open_route(&mut self, input: &DeviceRecord, output: &DeviceRecord) -> bool {
        let backend = Arc::clone(&self.backend);
        match Route::open(backend.as_ref(), input, output, self.category).await {
            Ok(route) => {
                tracing::info!(input = %input.id(), output = %output.id(), "route created");
                self.record_activity(format!(
                    "Graph created: {} -> {}",
                    input.name(),
                    output.name()
                ));
                self.routes.push(route);
                self.events.emit(BridgeEvent::RouteCreated {
                    input: input.clone(),
                    output: output.clone(),
                });
                true
            }
            Err(e) => {
                let (stage, reason) = match e {
                    BridgeError::RouteCreationFailed { stage, reason, .. } => (stage, reason),
                    other => (GraphStage::Graph, other.to_string()),
                };
                tracing::warn!(
                    input = %input.id(),
                    output = %output.id(),
                    %stage,
                    %reason,
                    "route creation failed"
                );
                self.record_activity(format!(
                    "Audio graph creation failed: {} -> {} ({stage}: {reason})",
                    input.name(),
                    output.name()
                ));
                self.events.emit(BridgeEvent::RouteFailed {
                    input: input.clone(),
                    output: output.clone(),
                    stage,
                    reason,
                });
                false
            }
        }
    }

    /// Stops a route that has already been taken out of the live set.
    async fn close_route(&mut self, mut route: Route) {
        if let Err(e) = route.stop().await {
            tracing::warn!(
                input = %route.input().id(),
                output = %route.output().id(),
                error = %e,
                "failed to stop route, discarding it anyway"
            );
        }

        let input = route.input().clone();
        let output = route.output().clone();
        drop(route);

        tracing::info!(input = %input.id(), output = %output.id(), "route removed");
        self.record_activity(format!("Graph stopped: {} -> {}", input.name(), output.name()));
        self.events.emit(BridgeEvent::RouteRemoved { input, output });
    }

    /// Revokes auto-connect for a device that left routing, unless it left
    /// because it was removed from the host.
    fn release_auto_connect(&mut self, device: &DeviceRecord) {
        if self.removed.remove(device.id()) {
            tracing::debug!(device = %device.id(), "device was removed, keeping auto-connect");
            return;
        }
        self.persist_auto_connect(device, false);
    }

    fn persist_auto_connect(&mut self, device: &DeviceRecord, value: bool) {
        if let Err(e) = self.settings.set_auto_connect(device, value) {
            tracing::warn!(device = %device.id(), error = %e, "failed to save auto-connect");
            self.record_activity(format!("Failed to save settings for {}: {e}", device.name()));
        }
    }
}

async fn fetch_glyph(enumerator: &dyn DeviceEnumerator, info: &DeviceInfo) -> Option<Thumbnail> {
    match enumerator.fetch_thumbnail(info).await {
        Ok(glyph) => Some(glyph),
        Err(e) => {
            tracing::debug!(device = %info.id, error = %e, "no thumbnail");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockEnumerator};
    use crate::queue::TaskQueue;
    use futures::future::BoxFuture;
    use tokio::sync::broadcast;

    struct Harness {
        queue: TaskQueue<BridgeState>,
        backend: MockBackend,
        enumerator: MockEnumerator,
        events: broadcast::Receiver<BridgeEvent>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_settings(SettingsStore::in_memory())
        }

        fn with_settings(settings: SettingsStore) -> Self {
            let backend = MockBackend::new();
            let enumerator = MockEnumerator::new();
            let bus = EventBus::new(256, None);
            let events = bus.subscribe();
            let services = Services {
                backend: Arc::new(backend.clone()),
                enumerator: Arc::new(enumerator.clone()),
                settings,
            };
            let (queue, _worker) = TaskQueue::spawn_with(|idle| {
                BridgeState::new(services, &BridgeConfig::default(), bus, idle)
            });
            Self {
                queue,
                backend,
                enumerator,
                events,
            }
        }

        async fn run<T, F>(&self, f: F) -> T
        where
            T: Send + 'static,
            F: for<'a> FnOnce(&'a mut BridgeState) -> BoxFuture<'a, T> + Send + 'static,
        {
            self.queue
                .submit(move |state| {
                    let unit = f(state);
                    Box::pin(async move { Ok(unit.await) })
                })
                .await
                .unwrap()
        }

        async fn add(&self, info: DeviceInfo) {
            let class = info.class;
            self.run(move |s| {
                Box::pin(async move {
                    s.apply_watcher_event(class, WatcherEvent::Added(info))
                        .await
                })
            })
            .await
            .unwrap();
        }

        async fn auto_connect(&self, device: &DeviceRecord) -> bool {
            let device = device.clone();
            self.run(move |s| Box::pin(async move { s.is_auto_connect(&device) }))
                .await
        }

        fn drain(&mut self) -> Vec<BridgeEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                events.push(event);
            }
            events
        }
    }

    fn capture(id: &str) -> DeviceRecord {
        DeviceRecord::from(DeviceInfo::capture(id, format!("Capture {id}")))
    }

    fn render(id: &str) -> DeviceRecord {
        DeviceRecord::from(DeviceInfo::render(id, format!("Render {id}")))
    }

    fn route_events(events: &[BridgeEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                BridgeEvent::RouteCreated { input, output } => {
                    Some(format!("created {}->{}", input.id(), output.id()))
                }
                BridgeEvent::RouteRemoved { input, output } => {
                    Some(format!("removed {}->{}", input.id(), output.id()))
                }
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_two_outputs_then_deselect_one() {
        let mut h = Harness::new();
        let (c, r1, r2) = (capture("c"), render("r1"), render("r2"));

        let c2 = c.clone();
        h.run(move |s| Box::pin(s.select_input(None, Some(c2), vec![]))).await;
        assert!(h.backend.live_routes().is_empty());

        let (r1c, r2c, cc) = (r1.clone(), r2.clone(), c.clone());
        h.run(move |s| Box::pin(s.select_outputs(Some(cc), vec![r1c, r2c], vec![])))
            .await;
        assert_eq!(h.backend.live_routes().len(), 2);
        assert_eq!(
            route_events(&h.drain()),
            vec!["created c->r1", "created c->r2"]
        );
        assert!(h.auto_connect(&r1).await);
        assert!(h.auto_connect(&r2).await);

        let (r1c, cc) = (r1.clone(), c.clone());
        h.run(move |s| Box::pin(s.select_outputs(Some(cc), vec![], vec![r1c])))
            .await;
        assert_eq!(
            h.backend.live_routes(),
            vec![(DeviceId::new("c"), DeviceId::new("r2"))]
        );
        assert_eq!(route_events(&h.drain()), vec!["removed c->r1"]);
        assert!(!h.auto_connect(&r1).await);
        assert!(h.auto_connect(&r2).await);
    }

    #[tokio::test]
    async fn test_select_input_replaces_routes() {
        let mut h = Harness::new();
        let (a, b, r1, r2) = (capture("a"), capture("b"), render("r1"), render("r2"));

        let (ac, outs) = (a.clone(), vec![r1.clone(), r2.clone()]);
        h.run(move |s| Box::pin(s.select_input(None, Some(ac), outs))).await;
        assert!(h.auto_connect(&a).await);
        h.drain();

        let (ac, bc, outs) = (a.clone(), b.clone(), vec![r1.clone(), r2.clone()]);
        h.run(move |s| Box::pin(s.select_input(Some(ac), Some(bc), outs))).await;

        let mut live = h.backend.live_routes();
        live.sort();
        assert_eq!(
            live,
            vec![
                (DeviceId::new("b"), DeviceId::new("r1")),
                (DeviceId::new("b"), DeviceId::new("r2")),
            ]
        );
        assert_eq!(
            route_events(&h.drain()),
            vec!["removed a->r1", "removed a->r2", "created b->r1", "created b->r2"]
        );
        assert!(!h.auto_connect(&a).await);
        assert!(h.auto_connect(&b).await);
    }

    #[tokio::test]
    async fn test_select_input_none_only_tears_down() {
        let h = Harness::new();
        let (a, r1) = (capture("a"), render("r1"));

        let (ac, outs) = (a.clone(), vec![r1.clone()]);
        h.run(move |s| Box::pin(s.select_input(None, Some(ac), outs))).await;
        let (ac, outs) = (a.clone(), vec![r1.clone()]);
        h.run(move |s| Box::pin(s.select_input(Some(ac), None, outs))).await;

        assert!(h.backend.live_routes().is_empty());
        let routes = h.run(|s| Box::pin(async move { s.routes() })).await;
        assert!(routes.is_empty());
    }

    async fn remove(h: &Harness, class: DeviceClass, id: &'static str) {
        h.run(move |s| {
            Box::pin(async move {
                s.apply_watcher_event(class, WatcherEvent::Removed(DeviceUpdate::id_only(id)))
                    .await
            })
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_removed_device_keeps_preference() {
        let mut h = Harness::new();
        let (c, r1) = (capture("c"), render("r1"));
        h.add(DeviceInfo::render("r1", "Render r1")).await;

        let (cc, outs) = (c.clone(), vec![r1.clone()]);
        h.run(move |s| Box::pin(s.select_outputs(Some(cc), outs, vec![]))).await;
        assert!(h.auto_connect(&r1).await);
        h.drain();

        remove(&h, DeviceClass::Render, "r1").await;
        assert!(h.backend.live_routes().is_empty());
        assert_eq!(route_events(&h.drain()), vec!["removed c->r1"]);

        // The UI drops the vanished device from its selection.
        let (cc, r1c) = (c.clone(), r1.clone());
        h.run(move |s| Box::pin(s.select_outputs(Some(cc), vec![], vec![r1c])))
            .await;
        assert!(h.auto_connect(&r1).await);
    }

    #[tokio::test]
    async fn test_removed_input_keeps_preference() {
        let h = Harness::new();
        let (c, r1) = (capture("c"), render("r1"));
        h.add(DeviceInfo::capture("c", "Capture c")).await;

        let (cc, outs) = (c.clone(), vec![r1.clone()]);
        h.run(move |s| Box::pin(s.select_input(None, Some(cc), outs))).await;
        assert!(h.auto_connect(&c).await);

        remove(&h, DeviceClass::Capture, "c").await;
        assert!(h.backend.live_routes().is_empty());

        let cc = c.clone();
        h.run(move |s| Box::pin(s.select_input(Some(cc), None, vec![]))).await;
        assert!(h.auto_connect(&c).await);
    }

    #[tokio::test]
    async fn test_returning_device_can_be_deselected() {
        let h = Harness::new();
        let (c, r1) = (capture("c"), render("r1"));
        h.add(DeviceInfo::render("r1", "Render r1")).await;

        let (cc, outs) = (c.clone(), vec![r1.clone()]);
        h.run(move |s| Box::pin(s.select_outputs(Some(cc), outs, vec![]))).await;
        remove(&h, DeviceClass::Render, "r1").await;
        h.add(DeviceInfo::render("r1", "Render r1")).await;

        let (cc, outs) = (c.clone(), vec![r1.clone()]);
        h.run(move |s| Box::pin(s.select_outputs(Some(cc), outs, vec![]))).await;
        let (cc, r1c) = (c.clone(), r1.clone());
        h.run(move |s| Box::pin(s.select_outputs(Some(cc), vec![], vec![r1c])))
            .await;

        assert!(!h.auto_connect(&r1).await);
    }

    #[tokio::test]
    async fn test_failed_route_is_not_registered() {
        let mut h = Harness::new();
        let (c, r1, r2) = (capture("c"), render("r1"), render("r2"));
        h.backend.fail_at("r2", GraphStage::InputNode);

        let (cc, outs) = (c.clone(), vec![r1.clone(), r2.clone()]);
        h.run(move |s| Box::pin(s.select_outputs(Some(cc), outs, vec![]))).await;

        let routes = h.run(|s| Box::pin(async move { s.routes() })).await;
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].output.id().as_str(), "r1");
        assert!(!h.auto_connect(&r2).await);

        let events = h.drain();
        assert!(events.iter().any(|e| matches!(
            e,
            BridgeEvent::RouteFailed { output, stage: GraphStage::InputNode, .. }
                if output.id().as_str() == "r2"
        )));
        let log = h.run(|s| Box::pin(async move { s.log_lines() })).await;
        assert!(log[0].starts_with("Audio graph creation failed: Capture c -> Render r2"));
    }

    #[tokio::test]
    async fn test_added_output_with_live_route_is_ignored() {
        let h = Harness::new();
        let (c, r1) = (capture("c"), render("r1"));

        for _ in 0..2 {
            let (cc, outs) = (c.clone(), vec![r1.clone()]);
            h.run(move |s| Box::pin(s.select_outputs(Some(cc), outs, vec![]))).await;
        }
        assert_eq!(h.backend.graphs().len(), 1);
    }

    #[tokio::test]
    async fn test_outputs_without_input_are_skipped() {
        let h = Harness::new();
        let r1 = render("r1");

        h.run(move |s| Box::pin(s.select_outputs(None, vec![r1], vec![]))).await;
        assert!(h.backend.graphs().is_empty());
    }

    #[tokio::test]
    async fn test_pause_and_play() {
        let h = Harness::new();
        let (c, r1) = (capture("c"), render("r1"));

        h.run(move |s| Box::pin(s.select_input(None, Some(c), vec![r1]))).await;
        h.run(|s| Box::pin(s.pause())).await;
        assert!(h.backend.live_routes().is_empty());
        assert_eq!(h.backend.stopped_routes().len(), 1);
        let routes = h.run(|s| Box::pin(async move { s.routes() })).await;
        assert!(!routes[0].running);

        h.run(|s| Box::pin(s.play())).await;
        assert_eq!(h.backend.live_routes().len(), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_device_fails_only_that_unit() {
        let h = Harness::new();

        let result = h
            .run(|s| {
                Box::pin(async move {
                    s.apply_watcher_event(
                        DeviceClass::Capture,
                        WatcherEvent::Updated(DeviceUpdate::renamed("ghost", "Ghost")),
                    )
                    .await
                })
            })
            .await;
        assert!(matches!(result, Err(BridgeError::DeviceNotFound { .. })));

        h.add(DeviceInfo::capture("mic", "Mic")).await;
        let captures = h
            .run(|s| Box::pin(async move { s.devices(DeviceClass::Capture) }))
            .await;
        assert_eq!(captures.len(), 1);
    }

    #[tokio::test]
    async fn test_update_renames_in_place() {
        let mut h = Harness::new();
        h.add(DeviceInfo::capture("a", "A")).await;
        h.add(DeviceInfo::capture("b", "B")).await;
        h.drain();

        h.run(|s| {
            Box::pin(async move {
                s.apply_watcher_event(
                    DeviceClass::Capture,
                    WatcherEvent::Updated(DeviceUpdate::renamed("a", "A2")),
                )
                .await
            })
        })
        .await
        .unwrap();

        let captures = h
            .run(|s| Box::pin(async move { s.devices(DeviceClass::Capture) }))
            .await;
        let names: Vec<_> = captures.iter().map(DeviceRecord::name).collect();
        assert_eq!(names, vec!["A2", "B"]);
        assert_eq!(captures[0].glyph().map(Thumbnail::as_bytes), Some(&b"A2"[..]));
        assert!(h
            .drain()
            .iter()
            .any(|e| matches!(e, BridgeEvent::DevicesChanged { class: DeviceClass::Capture, .. })));
    }

    #[tokio::test]
    async fn test_device_without_thumbnail_is_still_added() {
        let h = Harness::new();
        h.enumerator.fail_thumbnail("mic");
        h.add(DeviceInfo::capture("mic", "Mic")).await;

        let captures = h
            .run(|s| Box::pin(async move { s.devices(DeviceClass::Capture) }))
            .await;
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].name(), "Mic");
        assert!(captures[0].glyph().is_none());
    }

    #[tokio::test]
    async fn test_failed_thumbnail_refresh_keeps_old_glyph() {
        let h = Harness::new();
        h.enumerator.set_thumbnail("mic", Thumbnail::new(vec![7u8, 7]));
        h.add(DeviceInfo::capture("mic", "Mic")).await;

        h.enumerator.fail_thumbnail("mic");
        h.run(|s| {
            Box::pin(async move {
                s.apply_watcher_event(
                    DeviceClass::Capture,
                    WatcherEvent::Updated(DeviceUpdate::renamed("mic", "Mic (USB)")),
                )
                .await
            })
        })
        .await
        .unwrap();

        let captures = h
            .run(|s| Box::pin(async move { s.devices(DeviceClass::Capture) }))
            .await;
        assert_eq!(captures[0].name(), "Mic (USB)");
        assert_eq!(captures[0].glyph().map(Thumbnail::as_bytes), Some(&[7u8, 7][..]));
    }

    #[tokio::test]
    async fn test_deselect_all_outputs_then_reselect() {
        let h = Harness::new();
        let c = capture("c");
        let outputs = vec![render("r1"), render("r2"), render("r3")];

        let (cc, all) = (c.clone(), outputs.clone());
        h.run(move |s| Box::pin(s.select_outputs(Some(cc), all, vec![]))).await;
        let mut before = h.backend.live_routes();
        before.sort();
        assert_eq!(before.len(), 3);

        let (cc, all) = (c.clone(), outputs.clone());
        h.run(move |s| Box::pin(s.select_outputs(Some(cc), vec![], all))).await;
        assert!(h.backend.live_routes().is_empty());
        let routes = h.run(|s| Box::pin(async move { s.routes() })).await;
        assert!(routes.is_empty());

        let (cc, all) = (c.clone(), outputs.clone());
        h.run(move |s| Box::pin(s.select_outputs(Some(cc), all, vec![]))).await;
        let mut after = h.backend.live_routes();
        after.sort();
        assert_eq!(after, before);
        for output in &outputs {
            assert!(h.auto_connect(output).await);
        }
    }

    #[tokio::test]
    async fn test_duplicate_add_replaces() {
        let h = Harness::new();
        h.add(DeviceInfo::render("r1", "Old")).await;
        h.add(DeviceInfo::render("r1", "New")).await;

        let renders = h
            .run(|s| Box::pin(async move { s.devices(DeviceClass::Render) }))
            .await;
        assert_eq!(renders.len(), 1);
        assert_eq!(renders[0].name(), "New");
    }

    #[tokio::test]
    async fn test_auto_select_runs_after_following_work() {
        let storage = crate::settings::MemoryStorage::new();
        let mut settings = SettingsStore::load(storage);
        settings.set_auto_connect(&capture("c"), true).unwrap();
        let mut h = Harness::with_settings(settings);

        let added = h.queue.submit(|s| {
            Box::pin(async move {
                s.apply_watcher_event(
                    DeviceClass::Capture,
                    WatcherEvent::Added(DeviceInfo::capture("c", "Capture c")),
                )
                .await
            })
        });
        let next = h.queue.submit(|s| {
            Box::pin(async move {
                s.record_activity("next event".to_string());
                Ok(())
            })
        });
        added.await.unwrap();
        next.await.unwrap();
        // Let the idle lane run.
        h.run(|_| Box::pin(async {})).await;
        tokio::task::yield_now().await;
        h.run(|_| Box::pin(async {})).await;

        let order: Vec<String> = h
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                BridgeEvent::Log { message } => Some(message),
                _ => None,
            })
            .collect();
        assert_eq!(
            order,
            vec![
                "Capture Device Capture c has been added",
                "next event",
                "Notify to select capture Capture c",
            ]
        );
    }

    #[tokio::test]
    async fn test_watcher_stopped_is_logged() {
        let mut h = Harness::new();
        h.run(|s| {
            Box::pin(async move {
                s.apply_watcher_event(DeviceClass::Render, WatcherEvent::Stopped)
                    .await
            })
        })
        .await
        .unwrap();

        let events = h.drain();
        assert!(events
            .iter()
            .any(|e| matches!(e, BridgeEvent::WatcherStopped { class: DeviceClass::Render })));
        let text = h.run(|s| Box::pin(async move { s.log_text() })).await;
        assert_eq!(text, "Render device watcher stopped\r\n");
    }
}
