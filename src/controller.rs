//! RGB controller abstraction.

use bytes::Bytes;

use crate::color::Color;
use crate::error::Result;
use crate::led::Zone;

/// HID RGB controller.
pub(crate) trait HidController: Send {
    /// HID vendor ID.
    fn vendor_id(&self) -> u16;

    /// HID product ID.
    fn product_id(&self) -> u16;

    fn manufacturer(&self) -> &'static str;

    fn model(&self) -> &'static str;

    /// Zones addressable through this controller.
    fn zones(&self) -> &'static [Zone];

    /// Convert zone colors to controller-specific packets.
    fn color_packets(&self, colors: &[(Zone, Color)]) -> Result<Vec<Bytes>>;
}
