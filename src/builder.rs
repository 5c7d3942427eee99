//! Builder pattern for `AudioBridge`.

use std::sync::Arc;

use crate::backend::{AudioBackend, DeviceEnumerator};
use crate::bridge::Bridge;
use crate::coordinator::{BridgeState, Services};
use crate::event::EventBus;
use crate::queue::TaskQueue;
use crate::settings::SettingsStore;
use crate::{event_callback, BridgeConfig, BridgeError, BridgeEvent, EventCallback};

/// Builder for configuring and starting an audio bridge.
///
/// Use [`AudioBridge::builder()`] to create a new builder.
///
/// # Example
///
/// ```
/// use bridge_audio::{AudioBridge, MockBackend, MockEnumerator, SettingsStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), bridge_audio::BridgeError> {
/// let bridge = AudioBridge::builder()
///     .backend(MockBackend::new())
///     .enumerator(MockEnumerator::new())
///     .settings(SettingsStore::in_memory())
///     .on_event(|e| tracing::debug!(?e, "bridge event"))
///     .start()
///     .await?;
///
/// bridge.shutdown().await?;
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct AudioBridgeBuilder {
    /// Audio graph factory.
    backend: Option<Arc<dyn AudioBackend>>,
    /// Device presence source.
    enumerator: Option<Arc<dyn DeviceEnumerator>>,
    /// Auto-connect preferences. Opened from the user config dir if unset.
    settings: Option<SettingsStore>,
    /// Event callback.
    event_callback: Option<EventCallback>,
    /// Bridge configuration.
    config: BridgeConfig,
    /// Whether `start()` also starts the device watchers.
    watch_devices: bool,
}

impl Default for AudioBridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBridgeBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            backend: None,
            enumerator: None,
            settings: None,
            event_callback: None,
            config: BridgeConfig::default(),
            watch_devices: true,
        }
    }

    /// Set the audio backend that builds routes.
    pub fn backend<B: AudioBackend + 'static>(mut self, backend: B) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }

    /// Set the device enumerator that feeds the watchers.
    pub fn enumerator<E: DeviceEnumerator + 'static>(mut self, enumerator: E) -> Self {
        self.enumerator = Some(Arc::new(enumerator));
        self
    }

    /// Set the auto-connect settings store.
    ///
    /// Default: [`SettingsStore::open_default()`], or an in-memory store if
    /// the platform has no config directory.
    pub fn settings(mut self, settings: SettingsStore) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Set a callback to receive bridge events.
    ///
    /// Events include route changes, device collection changes,
    /// auto-select requests and activity log lines. The same events are
    /// also available through [`Bridge::subscribe()`].
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(BridgeEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Set custom bridge configuration.
    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether `start()` starts the device watchers.
    ///
    /// When disabled, call [`Bridge::start_watchers()`] yourself.
    /// Default: true
    pub fn watch_devices(mut self, watch: bool) -> Self {
        self.watch_devices = watch;
        self
    }

    /// Validates the builder configuration.
    fn validate(&self) -> Result<(), BridgeError> {
        if self.backend.is_none() {
            return Err(BridgeError::NoBackend);
        }
        if self.enumerator.is_none() {
            return Err(BridgeError::NoEnumerator);
        }
        Ok(())
    }

    /// Start the bridge.
    ///
    /// Returns a [`Bridge`] handle for selection changes and snapshots.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No backend or no enumerator is configured
    /// - A device watcher cannot be started
    pub async fn start(self) -> Result<Bridge, BridgeError> {
        self.validate()?;
        let backend = self.backend.ok_or(BridgeError::NoBackend)?;
        let enumerator = self.enumerator.ok_or(BridgeError::NoEnumerator)?;
        let settings = match self.settings {
            Some(settings) => settings,
            None => SettingsStore::open_default().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "no settings location, preferences will not persist");
                SettingsStore::in_memory()
            }),
        };

        let events = EventBus::new(self.config.event_capacity, self.event_callback);
        let services = Services {
            backend: Arc::clone(&backend),
            enumerator: Arc::clone(&enumerator),
            settings,
        };
        let config = self.config;
        let (queue, worker) = TaskQueue::spawn_with(|idle| {
            BridgeState::new(services, &config, events.clone(), idle)
        });

        tracing::info!(
            backend = backend.name(),
            enumerator = enumerator.name(),
            "audio bridge started"
        );
        let bridge = Bridge::new(queue, worker, events, enumerator, config);
        if self.watch_devices {
            bridge.start_watchers().await?;
        }
        Ok(bridge)
    }
}

/// Entry point for creating an audio bridge.
///
/// # Example
///
/// ```
/// use bridge_audio::AudioBridge;
///
/// let builder = AudioBridge::builder();
/// ```
pub struct AudioBridge;

impl AudioBridge {
    /// Creates a new builder.
    pub fn builder() -> AudioBridgeBuilder {
        AudioBridgeBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockEnumerator};

    #[test]
    fn test_builder_default() {
        let builder = AudioBridgeBuilder::new();
        assert!(builder.backend.is_none());
        assert!(builder.enumerator.is_none());
        assert!(builder.watch_devices);
    }

    #[tokio::test]
    async fn test_builder_requires_backend() {
        let result = AudioBridge::builder()
            .enumerator(MockEnumerator::new())
            .settings(SettingsStore::in_memory())
            .start()
            .await;
        assert!(matches!(result, Err(BridgeError::NoBackend)));
    }

    #[tokio::test]
    async fn test_builder_requires_enumerator() {
        let result = AudioBridge::builder()
            .backend(MockBackend::new())
            .settings(SettingsStore::in_memory())
            .start()
            .await;
        assert!(matches!(result, Err(BridgeError::NoEnumerator)));
    }

    #[test]
    fn test_builder_with_config() {
        let builder = AudioBridge::builder().with_config(BridgeConfig {
            log_capacity: 10,
            ..Default::default()
        });
        assert_eq!(builder.config.log_capacity, 10);
    }
}
