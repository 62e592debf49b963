//! Device provider lifecycle.
//!
//! A provider owns one vendor backend session, the update trigger shared by all of its devices,
//! and the device list built during [`DeviceProvider::initialize`].

use std::collections::HashMap;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{info, warn};

use crate::device::{Device, DeviceDescriptor};
use crate::error::{Error, Result};
use crate::led::DeviceKind;
use crate::queue::LedWriter;
use crate::trigger::{TriggerConfig, UpdateTrigger};

/// Vendor backend: handshake, enumeration and per-device writers.
pub trait DeviceBackend {
    /// Vendor name, unique per process.
    fn vendor(&self) -> &'static str;

    /// Establish the vendor session.
    fn connect(&mut self) -> Result<()>;

    /// List the devices available in the current session.
    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>>;

    /// Open the native handle of one device.
    fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<Box<dyn LedWriter>>;

    /// Release the vendor session.
    fn disconnect(&mut self) -> Result<()>;
}

/// Provider lifecycle state.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum ProviderState {
    Uninitialized,
    Initializing,
    Ready,
    Disposed,
}

/// Device kinds a provider should load.
#[derive(Default, Debug, Clone)]
pub struct DeviceFilter {
    kinds: Option<Vec<DeviceKind>>,
}

impl DeviceFilter {
    /// Accept every device.
    pub fn all() -> Self {
        Self::default()
    }

    /// Accept only the listed kinds.
    pub fn only(kinds: impl IntoIterator<Item = DeviceKind>) -> Self {
        Self { kinds: Some(kinds.into_iter().collect()) }
    }

    pub fn allows(&self, kind: DeviceKind) -> bool {
        self.kinds.as_ref().map_or(true, |kinds| kinds.contains(&kind))
    }
}

/// Device list change.
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum DeviceEvent {
    Added(String),
    Removed(String),
}

/// Object-safe provider interface used by the registry.
pub trait RgbDeviceProvider {
    fn vendor(&self) -> &'static str;

    fn state(&self) -> ProviderState;

    /// Connect to the vendor and rebuild the device list.
    ///
    /// Returns `Ok(false)` on failure unless `throw_on_error` is set.
    fn initialize(&mut self, filter: &DeviceFilter, throw_on_error: bool) -> Result<bool>;

    fn devices(&self) -> &[Device];

    fn trigger(&self) -> &UpdateTrigger;

    /// Release every device and the vendor session.
    fn dispose(&mut self) -> Result<()>;
}

/// Generic provider over a vendor backend.
pub struct DeviceProvider<B: DeviceBackend> {
    backend: B,
    trigger: UpdateTrigger,
    state: ProviderState,
    connected: bool,
    devices: Vec<Device>,
    listeners: Vec<Sender<DeviceEvent>>,
}

impl<B: DeviceBackend> DeviceProvider<B> {
    pub fn new(backend: B, config: TriggerConfig) -> Self {
        Self {
            backend,
            trigger: UpdateTrigger::new(config),
            state: ProviderState::Uninitialized,
            connected: false,
            devices: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Receive device added/removed notifications.
    pub fn subscribe(&mut self) -> Receiver<DeviceEvent> {
        let (sender, receiver) = unbounded();
        self.listeners.push(sender);
        receiver
    }

    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|device| device.name() == name)
    }

    fn try_initialize(&mut self, filter: &DeviceFilter, throw_on_error: bool) -> Result<()> {
        self.backend.connect().map_err(|err| match err {
            err @ Error::Initialization(_) => err,
            err => Error::Initialization(err.to_string()),
        })?;
        self.connected = true;

        let descriptors = self.backend.enumerate()?;

        let mut names: HashMap<String, usize> = HashMap::new();
        for descriptor in descriptors {
            if !filter.allows(descriptor.kind) {
                continue;
            }

            let writer = match self.backend.open(&descriptor) {
                Ok(writer) => writer,
                Err(err) => {
                    let err = match err {
                        err @ Error::DeviceDiscovery { .. } => err,
                        err => Error::DeviceDiscovery {
                            device: descriptor.id.clone(),
                            reason: err.to_string(),
                        },
                    };

                    if throw_on_error {
                        return Err(err);
                    }

                    warn!("Skipping device: {}", err);
                    continue;
                },
            };

            let name = unique_name(&mut names, &descriptor);
            let device = Device::new(name, descriptor, writer, &self.trigger);
            info!("Found {}", device.info());

            self.notify(DeviceEvent::Added(device.name().into()));
            self.devices.push(device);
        }

        self.trigger.start();

        Ok(())
    }

    /// Stop the trigger, dispose all devices and disconnect, collecting every failure.
    fn teardown(&mut self) -> Vec<Error> {
        let mut errors = Vec::new();

        self.trigger.stop();

        for mut device in self.devices.drain(..).collect::<Vec<_>>() {
            if let Err(err) = device.dispose() {
                warn!("Unable to dispose {}: {}", device.name(), err);
                errors.push(err);
            }
            self.notify(DeviceEvent::Removed(device.name().into()));
        }

        if self.connected {
            self.connected = false;
            if let Err(err) = self.backend.disconnect() {
                warn!("Unable to disconnect from {}: {}", self.backend.vendor(), err);
                errors.push(err);
            }
        }

        errors
    }

    fn notify(&mut self, event: DeviceEvent) {
        self.listeners.retain(|listener| listener.send(event.clone()).is_ok());
    }
}

impl<B: DeviceBackend> RgbDeviceProvider for DeviceProvider<B> {
    fn vendor(&self) -> &'static str {
        self.backend.vendor()
    }

    fn state(&self) -> ProviderState {
        self.state
    }

    fn initialize(&mut self, filter: &DeviceFilter, throw_on_error: bool) -> Result<bool> {
        if self.state == ProviderState::Disposed {
            let err = Error::Initialization(format!("{} provider is disposed", self.vendor()));
            return if throw_on_error { Err(err) } else { Ok(false) };
        }

        self.state = ProviderState::Initializing;

        // Previous session is released regardless of its own failures.
        for err in self.teardown() {
            warn!("Reinitializing {}: {}", self.backend.vendor(), err);
        }

        match self.try_initialize(filter, throw_on_error) {
            Ok(()) => {
                info!("{} ready with {} device(s)", self.backend.vendor(), self.devices.len());
                self.state = ProviderState::Ready;
                Ok(true)
            },
            Err(err) => {
                warn!("Unable to initialize {}: {}", self.backend.vendor(), err);
                for cleanup in self.teardown() {
                    warn!("Cleaning up {}: {}", self.backend.vendor(), cleanup);
                }
                self.state = ProviderState::Uninitialized;

                if throw_on_error {
                    Err(err)
                } else {
                    Ok(false)
                }
            },
        }
    }

    fn devices(&self) -> &[Device] {
        &self.devices
    }

    fn trigger(&self) -> &UpdateTrigger {
        &self.trigger
    }

    fn dispose(&mut self) -> Result<()> {
        if self.state == ProviderState::Disposed {
            return Ok(());
        }

        let errors = self.teardown();
        self.state = ProviderState::Disposed;
        info!("{} disposed", self.backend.vendor());

        Error::from_disposal(errors)
    }
}

impl<B: DeviceBackend> Drop for DeviceProvider<B> {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            warn!("{}", err);
        }
    }
}

/// Create a provider-unique device name, suffixing duplicates with a counter.
fn unique_name(names: &mut HashMap<String, usize>, descriptor: &DeviceDescriptor) -> String {
    let name = format!("{} {}", descriptor.manufacturer, descriptor.model);

    let count = names.entry(name.clone()).or_insert(0);
    *count += 1;

    if *count == 1 {
        name
    } else {
        format!("{} ({})", name, count)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::color::Color;
    use crate::led::LedKey;

    struct Writer {
        writes: Arc<AtomicUsize>,
        fail_release: bool,
    }

    impl LedWriter for Writer {
        fn write(&mut self, _snapshot: &[(LedKey, Color)]) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn release(&mut self) -> Result<()> {
            if self.fail_release {
                Err(Error::Unsupported("release".into()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct Backend {
        devices: Vec<(DeviceKind, &'static str)>,
        refuse_connect: bool,
        broken: Vec<&'static str>,
        fail_release: Vec<&'static str>,
        connects: usize,
        disconnects: usize,
        writes: Arc<AtomicUsize>,
    }

    impl DeviceBackend for Backend {
        fn vendor(&self) -> &'static str {
            "Test"
        }

        fn connect(&mut self) -> Result<()> {
            if self.refuse_connect {
                return Err(Error::Unsupported("SDK version".into()));
            }
            self.connects += 1;
            Ok(())
        }

        fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>> {
            let descriptors = self.devices.iter().enumerate().map(|(index, (kind, model))| {
                DeviceDescriptor {
                    id: index.to_string(),
                    kind: *kind,
                    manufacturer: "Test".into(),
                    model: model.to_string(),
                    leds: vec![LedKey::Index(0)],
                    honors_alpha: false,
                }
            });
            Ok(descriptors.collect())
        }

        fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<Box<dyn LedWriter>> {
            if self.broken.contains(&descriptor.model.as_str()) {
                return Err(Error::Unsupported("device".into()));
            }

            let fail_release = self.fail_release.contains(&descriptor.model.as_str());
            Ok(Box::new(Writer { writes: self.writes.clone(), fail_release }))
        }

        fn disconnect(&mut self) -> Result<()> {
            self.disconnects += 1;
            Ok(())
        }
    }

    fn provider(backend: Backend) -> DeviceProvider<Backend> {
        DeviceProvider::new(backend, TriggerConfig::manual())
    }

    fn names(provider: &DeviceProvider<Backend>) -> Vec<&str> {
        provider.devices().iter().map(|device| device.name()).collect()
    }

    #[test]
    fn initialize_builds_unique_devices() {
        let backend = Backend {
            devices: vec![(DeviceKind::Keyboard, "Keys"), (DeviceKind::Keyboard, "Keys")],
            ..Default::default()
        };
        let mut provider = provider(backend);

        assert_eq!(provider.state(), ProviderState::Uninitialized);
        assert!(provider.initialize(&DeviceFilter::all(), false).unwrap());
        assert_eq!(provider.state(), ProviderState::Ready);
        assert_eq!(names(&provider), ["Test Keys", "Test Keys (2)"]);
        assert!(provider.trigger().is_running());
    }

    #[test]
    fn filter_limits_device_kinds() {
        let backend = Backend {
            devices: vec![(DeviceKind::Keyboard, "Keys"), (DeviceKind::Mouse, "Rodent")],
            ..Default::default()
        };
        let mut provider = provider(backend);

        provider.initialize(&DeviceFilter::only([DeviceKind::Mouse]), false).unwrap();
        assert_eq!(names(&provider), ["Test Rodent"]);
    }

    #[test]
    fn broken_device_is_skipped_unless_strict() {
        let backend = Backend {
            devices: vec![(DeviceKind::Keyboard, "Keys"), (DeviceKind::Mouse, "Rodent")],
            broken: vec!["Keys"],
            ..Default::default()
        };
        let mut provider = provider(backend);

        assert!(provider.initialize(&DeviceFilter::all(), false).unwrap());
        assert_eq!(names(&provider), ["Test Rodent"]);

        let err = provider.initialize(&DeviceFilter::all(), true).unwrap_err();
        assert!(matches!(err, Error::DeviceDiscovery { ref device, .. } if device == "0"));
        assert_eq!(provider.state(), ProviderState::Uninitialized);
        assert!(provider.devices().is_empty());
        assert!(!provider.trigger().is_running());
    }

    #[test]
    fn strict_failure_releases_opened_devices() {
        let backend = Backend {
            devices: vec![(DeviceKind::Mouse, "Rodent"), (DeviceKind::Keyboard, "Keys")],
            broken: vec!["Keys"],
            fail_release: vec!["Rodent"],
            ..Default::default()
        };
        let mut provider = provider(backend);
        let events = provider.subscribe();

        // The discovery failure wins over the release failure of the cleanup.
        let err = provider.initialize(&DeviceFilter::all(), true).unwrap_err();
        assert!(matches!(err, Error::DeviceDiscovery { ref device, .. } if device == "1"));

        assert_eq!(provider.backend().disconnects, 1);
        assert_eq!(provider.trigger().subscriber_count(), 0);
        let events: Vec<_> = events.try_iter().collect();
        assert_eq!(events, [
            DeviceEvent::Added("Test Rodent".into()),
            DeviceEvent::Removed("Test Rodent".into()),
        ]);
    }

    #[test]
    fn failed_handshake_resets_provider() {
        let backend = Backend { refuse_connect: true, ..Default::default() };
        let mut provider = provider(backend);

        assert!(!provider.initialize(&DeviceFilter::all(), false).unwrap());
        assert_eq!(provider.state(), ProviderState::Uninitialized);

        let err = provider.initialize(&DeviceFilter::all(), true).unwrap_err();
        assert!(matches!(err, Error::Initialization(_)));
    }

    #[test]
    fn reinitialize_rebuilds_session() {
        let backend = Backend { devices: vec![(DeviceKind::Mouse, "Rodent")], ..Default::default() };
        let mut provider = provider(backend);
        let events = provider.subscribe();

        provider.initialize(&DeviceFilter::all(), false).unwrap();
        provider.devices()[0].set_color(LedKey::Index(0), Color::RED).unwrap();
        provider.initialize(&DeviceFilter::all(), false).unwrap();

        // Pending colors of the old session are discarded with its devices.
        provider.trigger().pump();
        assert_eq!(provider.backend().writes.load(Ordering::SeqCst), 0);

        assert_eq!(provider.backend().connects, 2);
        assert_eq!(provider.backend().disconnects, 1);
        assert_eq!(provider.trigger().subscriber_count(), 1);

        let events: Vec<_> = events.try_iter().collect();
        assert_eq!(events, [
            DeviceEvent::Added("Test Rodent".into()),
            DeviceEvent::Removed("Test Rodent".into()),
            DeviceEvent::Added("Test Rodent".into()),
        ]);
    }

    #[test]
    fn devices_flush_through_shared_trigger() {
        let backend = Backend {
            devices: vec![(DeviceKind::Mouse, "Rodent"), (DeviceKind::Keyboard, "Keys")],
            ..Default::default()
        };
        let mut provider = provider(backend);
        provider.initialize(&DeviceFilter::all(), false).unwrap();

        for device in provider.devices() {
            device.fill(Color::GREEN).unwrap();
        }
        assert_eq!(provider.trigger().pump(), 2);
        assert_eq!(provider.backend().writes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dispose_releases_everything_and_aggregates_failures() {
        let backend = Backend {
            devices: vec![
                (DeviceKind::Mouse, "Rodent"),
                (DeviceKind::Keyboard, "Keys"),
                (DeviceKind::Mousepad, "Pad"),
            ],
            fail_release: vec!["Rodent", "Pad"],
            ..Default::default()
        };
        let mut provider = provider(backend);
        provider.initialize(&DeviceFilter::all(), false).unwrap();

        let err = provider.dispose().unwrap_err();
        assert!(matches!(err, Error::Disposal(ref errors) if errors.len() == 2));
        assert_eq!(provider.state(), ProviderState::Disposed);
        assert!(provider.devices().is_empty());
        assert_eq!(provider.backend().disconnects, 1);

        assert!(provider.dispose().is_ok());
        assert!(!provider.initialize(&DeviceFilter::all(), false).unwrap());
    }
}
