//! RGB device model.

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

use crate::color::Color;
use crate::error::{Error, Result};
use crate::led::{DeviceKind, LedKey};
use crate::queue::{LedWriter, UpdateQueue};
use crate::trigger::UpdateTrigger;

/// Device as reported by a vendor backend during enumeration.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    /// Vendor handle, unique within one backend session.
    pub id: String,
    pub kind: DeviceKind,
    pub manufacturer: String,
    pub model: String,
    pub leds: Vec<LedKey>,
    /// Whether fully transparent colors are skipped instead of written.
    pub honors_alpha: bool,
}

/// Public description of an initialized device.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct DeviceInfo {
    /// Name unique within its provider.
    pub name: String,
    pub id: String,
    pub kind: DeviceKind,
    pub manufacturer: String,
    pub model: String,
    pub honors_alpha: bool,
}

impl Display for DeviceInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{:?}, {}]", self.name, self.kind, self.id)
    }
}

/// Device with its own update queue.
pub struct Device {
    info: DeviceInfo,
    leds: Vec<LedKey>,
    known: HashSet<LedKey>,
    queue: UpdateQueue,
}

impl Device {
    pub(crate) fn new(
        name: String,
        descriptor: DeviceDescriptor,
        writer: Box<dyn LedWriter>,
        trigger: &UpdateTrigger,
    ) -> Self {
        let queue = UpdateQueue::new(name.clone(), writer, trigger);
        let known = descriptor.leds.iter().copied().collect();

        let info = DeviceInfo {
            name,
            id: descriptor.id,
            kind: descriptor.kind,
            manufacturer: descriptor.manufacturer,
            model: descriptor.model,
            honors_alpha: descriptor.honors_alpha,
        };

        Self { info, leds: descriptor.leds, known, queue }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// All addressable LEDs, in vendor order.
    pub fn leds(&self) -> &[LedKey] {
        &self.leds
    }

    pub fn set_color(&self, led: impl Into<LedKey>, color: Color) -> Result<()> {
        self.set_colors([(led.into(), color)])
    }

    /// Queue colors for the next flush.
    ///
    /// Fails without queueing anything if one of the LEDs is not part of this device.
    pub fn set_colors<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (LedKey, Color)>,
    {
        let mut updates = Vec::new();
        for (led, color) in entries {
            if !self.known.contains(&led) {
                return Err(Error::UnknownLed { device: self.info.name.clone(), led: led.to_string() });
            }

            if self.info.honors_alpha && color.is_transparent() {
                continue;
            }

            updates.push((led, color));
        }

        self.queue.set_data(updates)
    }

    /// Apply one color to every LED.
    pub fn fill(&self, color: Color) -> Result<()> {
        self.set_colors(self.leds.iter().map(|led| (*led, color)))
    }

    /// Write pending colors immediately, bypassing the trigger.
    pub fn flush(&self) -> Result<()> {
        self.queue.flush()
    }

    pub fn queue(&self) -> &UpdateQueue {
        &self.queue
    }

    pub fn is_disposed(&self) -> bool {
        self.queue.is_disposed()
    }

    pub fn dispose(&mut self) -> Result<()> {
        self.queue.dispose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::led::Zone;
    use crate::trigger::TriggerConfig;

    struct Discard;

    impl LedWriter for Discard {
        fn write(&mut self, _snapshot: &[(LedKey, Color)]) -> Result<()> {
            Ok(())
        }
    }

    fn device(honors_alpha: bool) -> Device {
        let descriptor = DeviceDescriptor {
            id: "bus-0".into(),
            kind: DeviceKind::Mainboard,
            manufacturer: "Acme".into(),
            model: "Board".into(),
            leds: vec![LedKey::Zone(Zone::Io), LedKey::Zone(Zone::Cpu)],
            honors_alpha,
        };

        let trigger = UpdateTrigger::new(TriggerConfig::manual());
        Device::new("Acme Board".into(), descriptor, Box::new(Discard), &trigger)
    }

    #[test]
    fn rejects_foreign_leds() {
        let device = device(false);

        let err = device.set_colors([(Zone::Io.into(), Color::RED), (LedKey::Index(3), Color::RED)]);
        assert!(matches!(err, Err(Error::UnknownLed { .. })));
        assert_eq!(device.queue().pending(), 0);
    }

    #[test]
    fn transparent_colors_skipped_when_alpha_is_honored() {
        let device = device(true);
        device.set_color(Zone::Io, Color::TRANSPARENT).unwrap();
        device.set_color(Zone::Cpu, Color::RED).unwrap();
        assert_eq!(device.queue().pending(), 1);

        let device = self::device(false);
        device.set_color(Zone::Io, Color::TRANSPARENT).unwrap();
        assert_eq!(device.queue().pending(), 1);
    }

    #[test]
    fn fill_covers_every_led() {
        let device = device(false);
        device.fill(Color::BLUE).unwrap();
        assert_eq!(device.queue().pending(), 2);
    }

    #[test]
    fn flush_writes_without_trigger() {
        let device = device(false);
        device.fill(Color::GREEN).unwrap();

        device.flush().unwrap();
        assert_eq!(device.queue().pending(), 0);
    }

    #[test]
    fn dispose_rejects_new_colors() {
        let mut device = device(false);
        device.dispose().unwrap();

        assert!(device.is_disposed());
        assert!(matches!(device.set_color(Zone::Io, Color::RED), Err(Error::Disposed(_))));
    }
}
