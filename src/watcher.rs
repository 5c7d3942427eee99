//! Device watchers: one per device class, feeding the executor.
//!
//! A watcher moves through `Stopped → Started → Enumerating → Live →
//! Stopped`. While running, a pump task reads the enumerator's channel and
//! submits every notification to the task queue, so device changes
//! interleave with selection changes in submission order.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::{DeviceEnumerator, WatcherEvent};
use crate::coordinator::BridgeState;
use crate::device::DeviceClass;
use crate::queue::TaskQueue;
use crate::BridgeError;

/// Lifecycle state of a device watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    /// Not watching. The initial state, and the state after a stop.
    Stopped,
    /// Start requested, waiting for the enumerator.
    Started,
    /// Reporting the devices that were already present.
    Enumerating,
    /// Initial enumeration done, reporting live changes.
    Live,
}

/// Command sent to a watcher's pump task.
pub(crate) enum WatcherCommand {
    /// Stop watching.
    Stop,
}

pub(crate) struct DeviceWatcher {
    class: DeviceClass,
    state: Arc<Mutex<WatcherState>>,
    cmd_tx: Option<mpsc::Sender<WatcherCommand>>,
    handle: Option<JoinHandle<()>>,
}

impl DeviceWatcher {
    pub fn new(class: DeviceClass) -> Self {
        Self {
            class,
            state: Arc::new(Mutex::new(WatcherState::Stopped)),
            cmd_tx: None,
            handle: None,
        }
    }

    pub fn state(&self) -> WatcherState {
        *self.state.lock()
    }

    /// Starts watching. A watcher that stopped (on request or on its own)
    /// can be started again.
    pub async fn start(
        &mut self,
        enumerator: &dyn DeviceEnumerator,
        queue: TaskQueue<BridgeState>,
    ) -> Result<(), BridgeError> {
        let class = self.class;
        {
            let mut state = self.state.lock();
            if *state != WatcherState::Stopped {
                return Err(BridgeError::WatcherAlreadyRunning { class });
            }
            *state = WatcherState::Started;
        }
        // Leftovers from a watcher that stopped on its own.
        self.cmd_tx = None;
        self.handle = None;

        let events = match enumerator.watch(class).await {
            Ok(events) => events,
            Err(e) => {
                *self.state.lock() = WatcherState::Stopped;
                tracing::warn!(%class, error = %e, "failed to start device watcher");
                return Err(BridgeError::WatchFailed {
                    class,
                    reason: e.to_string(),
                });
            }
        };

        *self.state.lock() = WatcherState::Enumerating;
        tracing::info!(%class, enumerator = enumerator.name(), "device watcher started");

        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        let pump = Pump {
            class,
            queue,
            state: Arc::clone(&self.state),
        };
        self.handle = Some(tokio::spawn(pump.run(events, cmd_rx)));
        self.cmd_tx = Some(cmd_tx);
        Ok(())
    }

    /// Stops watching and waits for the pump to apply its final `Stopped`.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            // The pump may already be gone if the enumerator stopped it.
            let _ = tx.send(WatcherCommand::Stop).await;
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!(class = %self.class, error = %e, "device watcher task failed");
            }
        }
        *self.state.lock() = WatcherState::Stopped;
    }
}

impl Drop for DeviceWatcher {
    fn drop(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.try_send(WatcherCommand::Stop);
        }
    }
}

struct Pump {
    class: DeviceClass,
    queue: TaskQueue<BridgeState>,
    state: Arc<Mutex<WatcherState>>,
}

impl Pump {
    async fn run(
        self,
        mut events: mpsc::Receiver<WatcherEvent>,
        mut commands: mpsc::Receiver<WatcherCommand>,
    ) {
        let class = self.class;
        loop {
            let event = tokio::select! {
                biased;
                // A stop command and a dropped watcher both end the watch.
                _ = commands.recv() => WatcherEvent::Stopped,
                event = events.recv() => event.unwrap_or(WatcherEvent::Stopped),
            };
            let stopping = event == WatcherEvent::Stopped;
            let enumerated = event == WatcherEvent::EnumerationCompleted;

            let unit = self
                .queue
                .submit(move |state| Box::pin(state.apply_watcher_event(class, event)));
            match unit.await {
                Ok(()) => {}
                Err(BridgeError::QueueClosed) => {
                    tracing::debug!(%class, "executor closed, device watcher exiting");
                    break;
                }
                Err(e) => tracing::warn!(%class, error = %e, "device event not applied"),
            }

            if stopping {
                break;
            }
            if enumerated {
                *self.state.lock() = WatcherState::Live;
            }
        }
        *self.state.lock() = WatcherState::Stopped;
    }
}
