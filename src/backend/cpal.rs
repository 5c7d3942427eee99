//! Device enumeration through CPAL.
//!
//! CPAL has no device change notifications and no stable device ids, so
//! this enumerator polls the default host and uses device names as ids.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait};
use tokio::sync::mpsc;

use super::{DeviceEnumerator, WatcherEvent};
use crate::device::{DeviceClass, DeviceInfo, DeviceUpdate};
use crate::BackendError;

/// Polls the default CPAL host for input and output devices.
#[derive(Debug, Clone)]
pub struct CpalEnumerator {
    poll_interval: Duration,
}

impl Default for CpalEnumerator {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
        }
    }
}

impl CpalEnumerator {
    /// Creates an enumerator polling every two seconds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how often the host is polled.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl DeviceEnumerator for CpalEnumerator {
    fn name(&self) -> &str {
        "cpal"
    }

    async fn watch(
        &self,
        class: DeviceClass,
    ) -> Result<mpsc::Receiver<WatcherEvent>, BackendError> {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(poll_devices(class, self.poll_interval, tx));
        Ok(rx)
    }
}

fn device_names(class: DeviceClass) -> Result<BTreeSet<String>, BackendError> {
    let host = cpal::default_host();
    let names = match class {
        DeviceClass::Capture => host
            .input_devices()
            .map_err(|e| BackendError::custom(e.to_string()))?
            .filter_map(|d| d.name().ok())
            .collect(),
        DeviceClass::Render => host
            .output_devices()
            .map_err(|e| BackendError::custom(e.to_string()))?
            .filter_map(|d| d.name().ok())
            .collect(),
    };
    Ok(names)
}

async fn poll_devices(class: DeviceClass, interval: Duration, tx: mpsc::Sender<WatcherEvent>) {
    let mut known = BTreeSet::new();
    let mut enumerated = false;
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        if tx.is_closed() {
            break;
        }

        let current = match tokio::task::spawn_blocking(move || device_names(class)).await {
            Ok(Ok(names)) => names,
            Ok(Err(e)) => {
                tracing::warn!(%class, error = %e, "failed to list devices");
                continue;
            }
            Err(e) => {
                tracing::error!(%class, error = %e, "device listing task failed");
                break;
            }
        };

        let mut events = Vec::new();
        for name in current.difference(&known) {
            events.push(WatcherEvent::Added(DeviceInfo::new(name.as_str(), name.as_str(), class)));
        }
        for name in known.difference(&current) {
            events.push(WatcherEvent::Removed(DeviceUpdate::id_only(name.as_str())));
        }
        if !enumerated {
            events.push(WatcherEvent::EnumerationCompleted);
            enumerated = true;
        }

        for event in events {
            if tx.send(event).await.is_err() {
                return;
            }
        }
        known = current;
    }
}
