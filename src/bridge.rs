//! Handle to a running audio bridge.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::backend::DeviceEnumerator;
use crate::coordinator::BridgeState;
use crate::device::{DeviceClass, DeviceId, DeviceRecord};
use crate::event::{BridgeEvent, EventBus};
use crate::queue::{TaskHandle, TaskQueue};
use crate::route::RouteInfo;
use crate::settings::DeviceSettings;
use crate::watcher::{DeviceWatcher, WatcherState};
use crate::{BridgeConfig, BridgeError};

struct Watchers {
    capture: DeviceWatcher,
    render: DeviceWatcher,
}

impl Watchers {
    fn get(&self, class: DeviceClass) -> &DeviceWatcher {
        match class {
            DeviceClass::Capture => &self.capture,
            DeviceClass::Render => &self.render,
        }
    }

    fn get_mut(&mut self, class: DeviceClass) -> &mut DeviceWatcher {
        match class {
            DeviceClass::Capture => &mut self.capture,
            DeviceClass::Render => &mut self.render,
        }
    }
}

/// Handle to a running audio bridge.
///
/// Returned by [`AudioBridgeBuilder::start()`]. Every mutating call is
/// queued on the bridge's executor when it is made and returns a
/// [`TaskHandle`] that resolves once the call has been applied. Calls made
/// one after another are applied in that order, interleaved with device
/// changes reported by the watchers.
///
/// # Lifecycle
///
/// 1. Created by [`AudioBridgeBuilder::start()`]
/// 2. Device watchers populate the capture and render collections
/// 3. The UI drives [`select_input()`](Bridge::select_input) and
///    [`select_outputs()`](Bridge::select_outputs)
/// 4. Call [`shutdown()`](Bridge::shutdown) to stop watchers and routes
///
/// # Example
///
/// ```
/// use bridge_audio::{AudioBridge, DeviceInfo, MockBackend, MockEnumerator, SettingsStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), bridge_audio::BridgeError> {
/// let bridge = AudioBridge::builder()
///     .backend(MockBackend::new())
///     .enumerator(
///         MockEnumerator::new()
///             .with_device(DeviceInfo::capture("mic", "Microphone"))
///             .with_device(DeviceInfo::render("spk", "Speakers")),
///     )
///     .settings(SettingsStore::in_memory())
///     .start()
///     .await?;
///
/// # tokio::time::sleep(std::time::Duration::from_millis(20)).await;
/// let mic = bridge.captures().await?.remove(0);
/// let speakers = bridge.renders().await?;
///
/// bridge.select_input(None, Some(&mic), &speakers).await?;
/// assert_eq!(bridge.routes().await?.len(), 1);
///
/// bridge.shutdown().await?;
/// # Ok(())
/// # }
/// ```
///
/// [`AudioBridgeBuilder::start()`]: crate::AudioBridgeBuilder::start
pub struct Bridge {
    queue: TaskQueue<BridgeState>,
    worker: JoinHandle<()>,
    events: EventBus,
    enumerator: Arc<dyn DeviceEnumerator>,
    watchers: Mutex<Watchers>,
    config: BridgeConfig,
}

impl Bridge {
    pub(crate) fn new(
        queue: TaskQueue<BridgeState>,
        worker: JoinHandle<()>,
        events: EventBus,
        enumerator: Arc<dyn DeviceEnumerator>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            queue,
            worker,
            events,
            enumerator,
            watchers: Mutex::new(Watchers {
                capture: DeviceWatcher::new(DeviceClass::Capture),
                render: DeviceWatcher::new(DeviceClass::Render),
            }),
            config,
        }
    }

    /// Subscribes to bridge events.
    ///
    /// Only events emitted after this call are received.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    // ---- selection ----

    /// Switches routing to a new input device.
    ///
    /// Every live route is stopped. With `new` set, one route per device in
    /// `outputs` is created and started, and `new` is marked for
    /// auto-connect. `previous` loses its auto-connect preference unless it
    /// was removed from the host.
    pub fn select_input(
        &self,
        previous: Option<&DeviceRecord>,
        new: Option<&DeviceRecord>,
        outputs: &[DeviceRecord],
    ) -> TaskHandle<()> {
        let previous = previous.cloned();
        let new = new.cloned();
        let outputs = outputs.to_vec();
        self.queue.submit(move |state| {
            Box::pin(async move {
                state.select_input(previous, new, outputs).await;
                Ok(())
            })
        })
    }

    /// Applies a change to the selected outputs.
    ///
    /// Routes to `removed` devices are stopped; routes from `input` to
    /// `added` devices are created and the added devices are marked for
    /// auto-connect. Without an input, only removals apply.
    pub fn select_outputs(
        &self,
        input: Option<&DeviceRecord>,
        added: &[DeviceRecord],
        removed: &[DeviceRecord],
    ) -> TaskHandle<()> {
        let input = input.cloned();
        let added = added.to_vec();
        let removed = removed.to_vec();
        self.queue.submit(move |state| {
            Box::pin(async move {
                state.select_outputs(input, added, removed).await;
                Ok(())
            })
        })
    }

    /// Starts every live route.
    pub fn play(&self) -> TaskHandle<()> {
        self.queue.submit(|state| {
            Box::pin(async move {
                state.play().await;
                Ok(())
            })
        })
    }

    /// Stops every live route without discarding it.
    pub fn pause(&self) -> TaskHandle<()> {
        self.queue.submit(|state| {
            Box::pin(async move {
                state.pause().await;
                Ok(())
            })
        })
    }

    // ---- snapshots ----

    /// Current capture devices, in the order they appeared.
    pub fn captures(&self) -> TaskHandle<Vec<DeviceRecord>> {
        self.devices(DeviceClass::Capture)
    }

    /// Current render devices, in the order they appeared.
    pub fn renders(&self) -> TaskHandle<Vec<DeviceRecord>> {
        self.devices(DeviceClass::Render)
    }

    /// Current devices of one class.
    pub fn devices(&self, class: DeviceClass) -> TaskHandle<Vec<DeviceRecord>> {
        self.queue
            .submit(move |state| Box::pin(async move { Ok(state.devices(class)) }))
    }

    /// Live routes.
    pub fn routes(&self) -> TaskHandle<Vec<RouteInfo>> {
        self.queue
            .submit(|state| Box::pin(async move { Ok(state.routes()) }))
    }

    /// Activity log lines, newest first.
    pub fn log_messages(&self) -> TaskHandle<Vec<String>> {
        self.queue
            .submit(|state| Box::pin(async move { Ok(state.log_lines()) }))
    }

    /// Activity log as one block of text, newest line first, each line
    /// terminated by `\r\n`.
    pub fn log_text(&self) -> TaskHandle<String> {
        self.queue
            .submit(|state| Box::pin(async move { Ok(state.log_text()) }))
    }

    /// Appends a line to the activity log.
    pub fn add_log_message(&self, message: impl Into<String>) -> TaskHandle<()> {
        let message = message.into();
        self.queue.submit(move |state| {
            Box::pin(async move {
                state.record_activity(message);
                Ok(())
            })
        })
    }

    /// Whether a device is marked for auto-connect.
    ///
    /// A device without an entry gets a default one (not auto-connect).
    pub fn is_auto_connect(&self, device: &DeviceRecord) -> TaskHandle<bool> {
        let device = device.clone();
        self.queue
            .submit(move |state| Box::pin(async move { Ok(state.is_auto_connect(&device)) }))
    }

    /// Stored settings for a device, if it has an entry.
    pub fn device_settings(&self, id: &DeviceId) -> TaskHandle<Option<DeviceSettings>> {
        let id = id.clone();
        self.queue
            .submit(move |state| Box::pin(async move { Ok(state.device_settings(&id)) }))
    }

    // ---- watchers ----

    /// Starts both device watchers.
    ///
    /// Called by [`AudioBridgeBuilder::start()`] unless
    /// [`watch_devices(false)`](crate::AudioBridgeBuilder::watch_devices)
    /// was set. A watcher that stopped can be started again.
    ///
    /// # Errors
    ///
    /// Returns `WatcherAlreadyRunning` if a watcher is running, or
    /// `WatchFailed` if the enumerator refuses a watch. Either way, watchers
    /// this call already started are stopped again before it returns.
    ///
    /// [`AudioBridgeBuilder::start()`]: crate::AudioBridgeBuilder::start
    pub async fn start_watchers(&self) -> Result<(), BridgeError> {
        let mut watchers = self.watchers.lock().await;
        let mut started = Vec::with_capacity(DeviceClass::ALL.len());
        for class in DeviceClass::ALL {
            let result = watchers
                .get_mut(class)
                .start(self.enumerator.as_ref(), self.queue.clone())
                .await;
            if let Err(e) = result {
                tracing::debug!(%class, "watch failed, stopping watchers started so far");
                for class in started {
                    watchers.get_mut(class).stop().await;
                }
                return Err(e);
            }
            started.push(class);
        }
        Ok(())
    }

    /// Stops both device watchers.
    ///
    /// Returns once each watcher's final `Stopped` notification has been
    /// applied. Device collections keep their contents.
    pub async fn stop_watchers(&self) {
        let mut watchers = self.watchers.lock().await;
        for class in DeviceClass::ALL {
            watchers.get_mut(class).stop().await;
        }
    }

    /// Current state of one device watcher.
    pub async fn watcher_state(&self, class: DeviceClass) -> WatcherState {
        self.watchers.lock().await.get(class).state()
    }

    /// Stops the bridge.
    ///
    /// Stops the watchers, then (unless disabled in [`BridgeConfig`]) every
    /// live route, and waits for already queued work to finish. Graphs
    /// still live at that point are released without further events when
    /// the executor exits.
    ///
    /// # Errors
    ///
    /// Returns an error if the executor had already stopped.
    pub async fn shutdown(self) -> Result<(), BridgeError> {
        self.stop_watchers().await;

        let Self {
            queue,
            worker,
            config,
            ..
        } = self;

        if config.stop_routes_on_shutdown {
            queue
                .submit(|state| {
                    Box::pin(async move {
                        state.close_all_routes().await;
                        Ok(())
                    })
                })
                .await?;
        }

        drop(queue);
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "bridge executor task failed");
        }
        tracing::info!("audio bridge stopped");
        Ok(())
    }
}
