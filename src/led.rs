//! LED addressing.

use std::fmt::{self, Display, Formatter};

use clap::ValueEnum;

/// Motherboard RGB zone.
#[derive(ValueEnum, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Copy, Clone)]
pub enum Zone {
    #[default]
    Io,
    Cpu,
    Audio,
    Chipset,
    Header0,
    Header1,
}

/// Identity of one addressable lighting element, unique per device.
///
/// Each device family uses one variant; writers resolve it to their own encoding.
#[derive(PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Copy, Clone)]
pub enum LedKey {
    /// Named motherboard zone.
    Zone(Zone),
    /// Position on a linear strip or channel.
    Index(u16),
    /// Key position on a grid.
    Matrix { row: u8, column: u8 },
}

impl Display for LedKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zone(zone) => write!(f, "{:?}", zone),
            Self::Index(index) => write!(f, "#{}", index),
            Self::Matrix { row, column } => write!(f, "{}x{}", row, column),
        }
    }
}

impl From<Zone> for LedKey {
    fn from(zone: Zone) -> Self {
        Self::Zone(zone)
    }
}

/// Logical device category.
#[derive(ValueEnum, PartialEq, Eq, Hash, Debug, Copy, Clone)]
pub enum DeviceKind {
    Mainboard,
    Keyboard,
    Mouse,
    Mousepad,
    Headset,
    LedMatrix,
    GraphicsCard,
    Unknown,
}
