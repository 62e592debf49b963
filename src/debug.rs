//! Debug vendor backend.
//!
//! Simulates an SDK that can only address one device at a time: a write selects the device,
//! stages its colors and commits them. Every committed frame is recorded for inspection.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::trace;
use parking_lot::Mutex;

use crate::color::Color;
use crate::device::DeviceDescriptor;
use crate::error::{Error, Result};
use crate::led::{DeviceKind, LedKey, Zone};
use crate::provider::DeviceBackend;
use crate::queue::{LedWriter, SessionLock};

const VENDOR: &str = "Debug";

/// Simulated device.
#[derive(Debug, Clone)]
pub struct DebugDeviceSpec {
    pub model: String,
    pub kind: DeviceKind,
    pub leds: Vec<LedKey>,
    pub honors_alpha: bool,
    /// Fail when the provider opens this device.
    pub broken: bool,
}

impl DebugDeviceSpec {
    pub fn new(model: impl Into<String>, kind: DeviceKind, leds: Vec<LedKey>) -> Self {
        Self { model: model.into(), kind, leds, honors_alpha: false, broken: false }
    }

    /// Linear strip with `count` LEDs.
    pub fn strip(model: impl Into<String>, count: u16) -> Self {
        Self::new(model, DeviceKind::Unknown, (0..count).map(LedKey::Index).collect())
    }

    /// Keyboard with a full `rows` by `columns` grid.
    pub fn keyboard(model: impl Into<String>, rows: u8, columns: u8) -> Self {
        let leds = (0..rows)
            .flat_map(|row| (0..columns).map(move |column| LedKey::Matrix { row, column }))
            .collect();
        Self::new(model, DeviceKind::Keyboard, leds)
    }

    /// Mainboard with every zone.
    pub fn mainboard(model: impl Into<String>) -> Self {
        let zones = [Zone::Io, Zone::Cpu, Zone::Audio, Zone::Chipset, Zone::Header0, Zone::Header1];
        Self::new(model, DeviceKind::Mainboard, zones.iter().copied().map(LedKey::Zone).collect())
    }

    pub fn honoring_alpha(mut self) -> Self {
        self.honors_alpha = true;
        self
    }

    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }
}

/// Colors committed to one device.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct DebugFrame {
    pub device: String,
    pub colors: BTreeMap<LedKey, Color>,
}

/// Handle for inspecting and manipulating the simulated SDK.
#[derive(Clone, Default)]
pub struct DebugRecorder {
    sdk: Arc<Mutex<DebugSdk>>,
    failing_writes: Arc<AtomicUsize>,
}

impl DebugRecorder {
    /// All frames committed so far.
    pub fn frames(&self) -> Vec<DebugFrame> {
        self.sdk.lock().frames.clone()
    }

    pub fn take_frames(&self) -> Vec<DebugFrame> {
        std::mem::take(&mut self.sdk.lock().frames)
    }

    /// Make the next `count` commits fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.sdk.lock().connected
    }

    fn select(&self, device: &str) -> Result<()> {
        let mut sdk = self.sdk.lock();
        if !sdk.connected {
            return Err(Error::Flush { device: device.into(), reason: "SDK not connected".into() });
        }

        sdk.selected = Some(device.into());
        sdk.staged.clear();

        Ok(())
    }

    fn stage(&self, led: LedKey, color: Color) {
        self.sdk.lock().staged.insert(led, color);
    }

    fn commit(&self) -> Result<()> {
        let mut sdk = self.sdk.lock();
        let device = sdk.selected.take().unwrap_or_default();
        let colors = std::mem::take(&mut sdk.staged);

        let failing = self.failing_writes.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_writes.store(failing - 1, Ordering::SeqCst);
            return Err(Error::Flush { device, reason: "simulated write failure".into() });
        }

        sdk.frames.push(DebugFrame { device, colors });

        Ok(())
    }
}

#[derive(Default)]
struct DebugSdk {
    connected: bool,
    selected: Option<String>,
    staged: BTreeMap<LedKey, Color>,
    frames: Vec<DebugFrame>,
}

/// Mock vendor backend.
pub struct DebugBackend {
    specs: Vec<DebugDeviceSpec>,
    recorder: DebugRecorder,
    session: SessionLock,
    refuse_connect: bool,
}

impl DebugBackend {
    pub fn new(specs: Vec<DebugDeviceSpec>) -> Self {
        Self { specs, recorder: Default::default(), session: Default::default(), refuse_connect: false }
    }

    /// Fail the vendor handshake.
    pub fn refusing_connect(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    pub fn recorder(&self) -> DebugRecorder {
        self.recorder.clone()
    }
}

impl DeviceBackend for DebugBackend {
    fn vendor(&self) -> &'static str {
        VENDOR
    }

    fn connect(&mut self) -> Result<()> {
        if self.refuse_connect {
            return Err(Error::Initialization("debug SDK refused the handshake".into()));
        }

        self.recorder.sdk.lock().connected = true;

        Ok(())
    }

    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>> {
        let descriptors = self.specs.iter().enumerate().map(|(index, spec)| DeviceDescriptor {
            id: format!("debug-{}", index),
            kind: spec.kind,
            manufacturer: VENDOR.into(),
            model: spec.model.clone(),
            leds: spec.leds.clone(),
            honors_alpha: spec.honors_alpha,
        });

        Ok(descriptors.collect())
    }

    fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<Box<dyn LedWriter>> {
        let broken = self.specs.iter().any(|spec| spec.broken && spec.model == descriptor.model);
        if broken {
            return Err(Error::DeviceDiscovery {
                device: descriptor.id.clone(),
                reason: "device did not respond".into(),
            });
        }

        Ok(Box::new(DebugWriter {
            id: descriptor.id.clone(),
            recorder: self.recorder.clone(),
            session: self.session.clone(),
        }))
    }

    fn disconnect(&mut self) -> Result<()> {
        let mut sdk = self.recorder.sdk.lock();
        sdk.connected = false;
        sdk.selected = None;
        sdk.staged.clear();

        Ok(())
    }
}

struct DebugWriter {
    id: String,
    recorder: DebugRecorder,
    session: SessionLock,
}

impl LedWriter for DebugWriter {
    fn write(&mut self, snapshot: &[(LedKey, Color)]) -> Result<()> {
        // Select, stage and commit must not interleave with other devices.
        let _session = self.session.acquire();

        self.recorder.select(&self.id)?;
        for (led, color) in snapshot {
            self.recorder.stage(*led, *color);
        }
        self.recorder.commit()
    }

    fn release(&mut self) -> Result<()> {
        trace!("Released {}", self.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::provider::{DeviceFilter, DeviceProvider, RgbDeviceProvider};
    use crate::trigger::TriggerConfig;

    #[test]
    fn frames_reach_recorder() {
        let backend = DebugBackend::new(vec![DebugDeviceSpec::keyboard("Board", 2, 2)]);
        let recorder = backend.recorder();
        let mut provider = DeviceProvider::new(backend, TriggerConfig::manual());
        provider.initialize(&DeviceFilter::all(), true).unwrap();
        assert!(recorder.is_connected());

        let device = &provider.devices()[0];
        device.set_color(LedKey::Matrix { row: 1, column: 0 }, Color::RED).unwrap();
        provider.trigger().pump();

        let frames = recorder.take_frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].device, "debug-0");
        assert_eq!(frames[0].colors.get(&LedKey::Matrix { row: 1, column: 0 }), Some(&Color::RED));

        provider.dispose().unwrap();
        assert!(!recorder.is_connected());
    }

    #[test]
    fn broken_spec_fails_discovery() {
        let backend = DebugBackend::new(vec![
            DebugDeviceSpec::strip("Good", 3),
            DebugDeviceSpec::strip("Bad", 3).broken(),
        ]);
        let mut provider = DeviceProvider::new(backend, TriggerConfig::manual());

        assert!(provider.initialize(&DeviceFilter::all(), false).unwrap());
        assert_eq!(provider.devices().len(), 1);

        let refusing = DebugBackend::new(Vec::new()).refusing_connect();
        let mut provider = DeviceProvider::new(refusing, TriggerConfig::manual());
        assert!(!provider.initialize(&DeviceFilter::all(), false).unwrap());
    }

    #[test]
    fn injected_failure_is_recovered_on_next_update() {
        let backend = DebugBackend::new(vec![DebugDeviceSpec::strip("Strip", 2)]);
        let recorder = backend.recorder();
        let mut provider = DeviceProvider::new(backend, TriggerConfig::manual());
        provider.initialize(&DeviceFilter::all(), false).unwrap();
        let device = &provider.devices()[0];

        recorder.fail_next_writes(1);
        device.set_color(LedKey::Index(0), Color::RED).unwrap();
        provider.trigger().pump();
        provider.trigger().pump();
        assert!(recorder.frames().is_empty());

        device.set_color(LedKey::Index(1), Color::BLUE).unwrap();
        provider.trigger().pump();
        let frames = recorder.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].colors.len(), 1);
        assert_eq!(frames[0].colors.get(&LedKey::Index(1)), Some(&Color::BLUE));
    }

    #[test]
    fn last_colors_survive_stop_and_flush() {
        let backend = DebugBackend::new(vec![DebugDeviceSpec::strip("Strip", 4)]);
        let recorder = backend.recorder();
        let config = TriggerConfig::periodic(Duration::from_millis(1)).unwrap();
        let mut provider = DeviceProvider::new(backend, config);
        provider.initialize(&DeviceFilter::all(), true).unwrap();

        let colors = [Color::RED, Color::GREEN, Color::BLUE];
        for color in colors.iter().cycle().take(300) {
            provider.devices()[0].fill(*color).unwrap();
        }
        let last = colors[(300 - 1) % colors.len()];

        provider.trigger().stop();
        provider.devices()[0].flush().unwrap();
        provider.dispose().unwrap();

        let frames = recorder.frames();
        let final_frame = frames.last().unwrap();
        assert_eq!(final_frame.colors.len(), 4);
        assert!(final_frame.colors.values().all(|color| *color == last));
    }

    #[test]
    fn session_lock_keeps_frames_consistent() {
        let backend = DebugBackend::new(vec![
            DebugDeviceSpec::strip("Left", 16),
            DebugDeviceSpec::strip("Right", 16),
        ]);
        let recorder = backend.recorder();
        let config = TriggerConfig::periodic(Duration::from_millis(1)).unwrap();
        let mut provider = DeviceProvider::new(backend, config);
        provider.initialize(&DeviceFilter::all(), true).unwrap();

        // Each device only ever receives its own color.
        let colors = [Color::RED, Color::BLUE];
        let deadline = Instant::now() + Duration::from_millis(200);
        while Instant::now() < deadline {
            for (device, color) in provider.devices().iter().zip(colors) {
                device.fill(color).unwrap();
            }
            thread::sleep(Duration::from_micros(200));
        }
        provider.dispose().unwrap();

        let frames = recorder.frames();
        assert!(!frames.is_empty());
        for frame in frames {
            let expected = if frame.device == "debug-0" { Color::RED } else { Color::BLUE };
            assert!(frame.colors.values().all(|color| *color == expected));
        }
    }
}
