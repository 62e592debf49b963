//! Gigabyte TRX40 Aorus Master RGB Fusion control.

use bytes::{BufMut, Bytes, BytesMut};

use crate::color::Color;
use crate::controller::HidController;
use crate::error::Result;
use crate::led::Zone;

/// Report ID prefixing every packet.
const REPORT_ID: u8 = 0xcc;

/// Static color effect.
const EFFECT_STATIC: u8 = 1;

/// Effect timing in milliseconds, unused by static colors.
const EFFECT_TIME: u16 = 100;

const ZONES: [Zone; 6] = [Zone::Io, Zone::Cpu, Zone::Audio, Zone::Chipset, Zone::Header0, Zone::Header1];

pub struct GigabyteTrx40AorusMaster;

impl HidController for GigabyteTrx40AorusMaster {
    fn vendor_id(&self) -> u16 {
        0x048d
    }

    fn product_id(&self) -> u16 {
        0x8297
    }

    fn manufacturer(&self) -> &'static str {
        "Gigabyte"
    }

    fn model(&self) -> &'static str {
        "TRX40 Aorus Master"
    }

    fn zones(&self) -> &'static [Zone] {
        &ZONES
    }

    fn color_packets(&self, colors: &[(Zone, Color)]) -> Result<Vec<Bytes>> {
        let mut packets: Vec<_> = colors.iter().map(|(zone, color)| zone_packet(*zone, *color)).collect();

        // Packet to apply the submitted configuration.
        let mut buf = BytesMut::new();
        buf.put_u8(REPORT_ID);
        buf.put_u8(0x28);
        buf.put_u8(0xff);
        buf.put_slice(&[0; 20]);
        packets.push(buf.freeze());

        Ok(packets)
    }
}

/// Static color configuration for one zone.
fn zone_packet(zone: Zone, color: Color) -> Bytes {
    let mut buf = BytesMut::new();

    // Report ID.
    buf.put_u8(REPORT_ID);

    // RGB Zone.
    buf.put_u16(zone_bytes(zone));

    // Padding.
    buf.put_slice(&[0; 8]);

    // Effect.
    buf.put_u8(EFFECT_STATIC);

    // Max Brightness.
    buf.put_u8(brightness_byte(u8::MAX));

    // Min Brightness.
    buf.put_u8(brightness_byte(0));

    // Primary color Data.
    buf.put_u8(color.b);
    buf.put_u8(color.g);
    buf.put_u8(color.r);

    // Padding.
    buf.put_u8(0);

    // Secondary color Data.
    buf.put_slice(&[0; 3]);

    // Padding.
    buf.put_u8(0);

    // Color effect timings.
    for _ in 0..3 {
        buf.put_u16(duration_quarters(EFFECT_TIME));
    }

    // Padding for minimum packet size.
    buf.put_slice(&[0; 3]);

    buf.freeze()
}

/// Convert milliseconds to the protocol's quarter seconds.
fn duration_quarters(millis: u16) -> u16 {
    millis / 250
}

/// Convert brightness to RGB Fusion format.
fn brightness_byte(brightness: u8) -> u8 {
    // Convert format from 0..=255 to the protocol's range 0..=90.
    (0x5a * brightness as u16 / u8::MAX as u16) as u8
}

/// Convert zone to RGB Fusion format.
fn zone_bytes(zone: Zone) -> u16 {
    match zone {
        Zone::Io => 0x2001,
        Zone::Cpu => 0x2102,
        Zone::Audio => 0x2308,
        Zone::Chipset => 0x2410,
        Zone::Header0 => 0x2520,
        Zone::Header1 => 0x2640,
    }
}
