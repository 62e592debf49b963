//! Coalescing LED update pipeline for RGB lighting devices.
//!
//! Every vendor backend is wrapped in a [`DeviceProvider`], which owns one [`UpdateTrigger`] and
//! one [`UpdateQueue`] per discovered device. Applications set colors from any thread; the queue
//! merges them per LED and the trigger flushes the merged set to the vendor once per tick.
//!
//! ```no_run
//! use rgbsync::{Color, DebugBackend, DebugDeviceSpec, DeviceFilter, DeviceProvider};
//! use rgbsync::{RgbDeviceProvider, TriggerConfig};
//!
//! let backend = DebugBackend::new(vec![DebugDeviceSpec::strip("Strip", 8)]);
//! let mut provider = DeviceProvider::new(backend, TriggerConfig::default());
//! provider.initialize(&DeviceFilter::all(), true)?;
//!
//! for device in provider.devices() {
//!     device.fill(Color::RED)?;
//! }
//! # Ok::<(), rgbsync::Error>(())
//! ```

mod asus_strix_x670e_f;
mod color;
mod controller;
mod debug;
mod device;
mod error;
mod fusion;
mod gigabyte_trx40_aorus_master;
mod led;
mod provider;
mod queue;
mod registry;
mod trigger;

pub use crate::color::Color;
pub use crate::debug::{DebugBackend, DebugDeviceSpec, DebugFrame, DebugRecorder};
pub use crate::device::{Device, DeviceDescriptor, DeviceInfo};
pub use crate::error::{Error, Result};
pub use crate::fusion::{FusionBackend, Mainboard};
pub use crate::led::{DeviceKind, LedKey, Zone};
pub use crate::provider::{
    DeviceBackend, DeviceEvent, DeviceFilter, DeviceProvider, ProviderState, RgbDeviceProvider,
};
pub use crate::queue::{LedWriter, SessionLock, UpdateQueue};
pub use crate::registry::ProviderRegistry;
pub use crate::trigger::{
    ErrorHook, FlushFailure, SubscriberId, TimingSource, TriggerConfig, UpdateSubscriber,
    UpdateTrigger, DEFAULT_UPDATE_RATE, MIN_UPDATE_INTERVAL,
};
