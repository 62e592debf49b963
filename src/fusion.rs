//! HID mainboard lighting backend.
//!
//! The Gigabyte RGB Fusion 2 HID protocol information is documented at
//! https://gitlab.com/CalcProgrammer1/OpenRGB/-/wikis/Gigabyte-RGB-Fusion-2.0.

use std::collections::HashMap;
use std::ffi::CString;

use clap::ValueEnum;
use hidapi::{HidApi, HidDevice, HidError};
use log::debug;

use crate::asus_strix_x670e_f::AsusRogStrixX670EF;
use crate::color::Color;
use crate::controller::HidController;
use crate::device::DeviceDescriptor;
use crate::error::{Error, Result};
use crate::gigabyte_trx40_aorus_master::GigabyteTrx40AorusMaster;
use crate::led::{DeviceKind, LedKey, Zone};
use crate::provider::DeviceBackend;
use crate::queue::LedWriter;

const VENDOR: &str = "Fusion";

/// Supported RGB controllers.
#[derive(ValueEnum, PartialEq, Eq, Debug, Copy, Clone)]
pub enum Mainboard {
    X670EF,
    Trx40,
}

impl Mainboard {
    /// Get RGB controller for a device.
    fn controller(&self) -> Box<dyn HidController> {
        match self {
            Self::Trx40 => Box::new(GigabyteTrx40AorusMaster),
            Self::X670EF => Box::new(AsusRogStrixX670EF),
        }
    }
}

/// Backend discovering mainboard controllers on the HID bus.
pub struct FusionBackend {
    boards: Vec<Mainboard>,
    api: Option<HidApi>,
    discovered: HashMap<String, (Mainboard, CString)>,
}

impl FusionBackend {
    /// Look for every supported mainboard.
    pub fn new() -> Self {
        Self::with_boards(Mainboard::value_variants().to_vec())
    }

    /// Only look for the listed mainboards.
    pub fn with_boards(boards: Vec<Mainboard>) -> Self {
        Self { boards, api: None, discovered: HashMap::new() }
    }
}

impl Default for FusionBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBackend for FusionBackend {
    fn vendor(&self) -> &'static str {
        VENDOR
    }

    fn connect(&mut self) -> Result<()> {
        let hid_error = |err: HidError| Error::Initialization(format!("unable to access HID: {}", err));

        if let Some(api) = &mut self.api {
            return api.refresh_devices().map_err(hid_error);
        }

        self.api = Some(HidApi::new().map_err(hid_error)?);

        Ok(())
    }

    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>> {
        let api = match &self.api {
            Some(api) => api,
            None => return Err(Error::Initialization("HID session is not connected".into())),
        };

        self.discovered.clear();

        let mut descriptors = Vec::new();
        for info in api.device_list() {
            let board = self.boards.iter().copied().find(|board| {
                let controller = board.controller();
                controller.vendor_id() == info.vendor_id()
                    && controller.product_id() == info.product_id()
            });

            let board = match board {
                Some(board) => board,
                None => continue,
            };

            let id = format!(
                "{:04x}:{:04x}@{}",
                info.vendor_id(),
                info.product_id(),
                info.path().to_string_lossy()
            );
            if self.discovered.contains_key(&id) {
                continue;
            }

            debug!("Found {:?} controller at {}", board, id);

            let controller = board.controller();
            descriptors.push(DeviceDescriptor {
                id: id.clone(),
                kind: DeviceKind::Mainboard,
                manufacturer: controller.manufacturer().into(),
                model: controller.model().into(),
                leds: controller.zones().iter().copied().map(LedKey::Zone).collect(),
                honors_alpha: false,
            });
            self.discovered.insert(id, (board, info.path().to_owned()));
        }

        Ok(descriptors)
    }

    fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<Box<dyn LedWriter>> {
        let discovery_error = |reason: String| Error::DeviceDiscovery {
            device: descriptor.id.clone(),
            reason,
        };

        let api = self.api.as_ref().ok_or_else(|| discovery_error("HID session closed".into()))?;
        let (board, path) = self
            .discovered
            .get(&descriptor.id)
            .ok_or_else(|| discovery_error("device was not enumerated".into()))?;

        let device = api
            .open_path(path)
            .map_err(|err| discovery_error(format!("{} (root permissions required)", err)))?;

        Ok(Box::new(HidWriter { device: Some(device), controller: board.controller() }))
    }

    fn disconnect(&mut self) -> Result<()> {
        self.discovered.clear();
        self.api = None;

        Ok(())
    }
}

/// Writes zone colors to one HID controller.
struct HidWriter {
    device: Option<HidDevice>,
    controller: Box<dyn HidController>,
}

impl LedWriter for HidWriter {
    fn write(&mut self, snapshot: &[(LedKey, Color)]) -> Result<()> {
        let device = match &self.device {
            Some(device) => device,
            None => return Err(Error::Unsupported("write after release".into())),
        };

        // Get all byte packets required to apply the colors.
        let packets = self.controller.color_packets(&zone_colors(snapshot)?)?;

        for packet in packets {
            device.write(&packet)?;
        }

        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        // Dropping the handle closes the HID device.
        self.device = None;

        Ok(())
    }
}

/// Resolve LED keys to mainboard zones.
fn zone_colors(snapshot: &[(LedKey, Color)]) -> Result<Vec<(Zone, Color)>> {
    snapshot
        .iter()
        .map(|(led, color)| match led {
            LedKey::Zone(zone) => Ok((*zone, *color)),
            led => Err(Error::Unsupported(format!("LED {} on a mainboard", led))),
        })
        .collect()
}
