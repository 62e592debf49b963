//! ASUS ROG Strix X670E-F Aura control.

use bytes::{BufMut, Bytes, BytesMut};

use crate::color::Color;
use crate::controller::HidController;
use crate::error::{Error, Result};
use crate::led::Zone;

const IO_MASK: u8 = 0x04 | 0x02 | 0x01;
const CPU_MASK: u8 = 0x20;
const GPU_MASK: u8 = 0x40;

/// Static color effect.
const EFFECT_STATIC: u8 = 1;

const ZONES: [Zone; 2] = [Zone::Io, Zone::Header0];

pub struct AsusRogStrixX670EF;

impl HidController for AsusRogStrixX670EF {
    fn vendor_id(&self) -> u16 {
        0x0B05
    }

    fn product_id(&self) -> u16 {
        0x19AF
    }

    fn manufacturer(&self) -> &'static str {
        "ASUS"
    }

    fn model(&self) -> &'static str {
        "ROG Strix X670E-F"
    }

    fn zones(&self) -> &'static [Zone] {
        &ZONES
    }

    fn color_packets(&self, colors: &[(Zone, Color)]) -> Result<Vec<Bytes>> {
        let mut packets = Vec::with_capacity(colors.len() * 2);

        for (zone, color) in colors {
            // Set LED effect.
            let zone_byte = zone_bytes(*zone)?;
            packets.push(Bytes::copy_from_slice(&[0xec, 0x35, zone_byte, 0x00, 0x00, EFFECT_STATIC]));

            // Set LED color.
            packets.push(color_bytes(*zone, *color)?);
        }

        Ok(packets)
    }
}

/// Convert zone to ASUS Aura format.
fn zone_bytes(zone: Zone) -> Result<u8> {
    match zone {
        Zone::Io => Ok(0x00),
        Zone::Header0 => Ok(0x01),
        zone => Err(Error::Unsupported(format!("zone: {zone:?}"))),
    }
}

/// Convert zone to ASUS Aura format mask.
fn zone_mask(zone: Zone) -> Result<u8> {
    match zone {
        Zone::Io => Ok(IO_MASK),
        Zone::Header0 => Ok(CPU_MASK | GPU_MASK),
        zone => Err(Error::Unsupported(format!("zone: {zone:?}"))),
    }
}

/// Convert color to ASUS Aura format.
fn color_bytes(zone: Zone, color: Color) -> Result<Bytes> {
    let mut buf = BytesMut::new();

    // Set mask for selecting target LEDs.
    let mask = zone_mask(zone)?;
    buf.put_slice(&[0xec, 0x36, 0x00, mask, 0x00]);

    // Motherboard colors.
    for _ in 0..3 {
        put_rgb(&mut buf, color);
    }

    // Padding.
    buf.put_slice(&[0x00; 6]);

    // CPU color.
    put_rgb(&mut buf, color);

    // GPU color.
    put_rgb(&mut buf, color);

    Ok(buf.freeze())
}

fn put_rgb(buf: &mut BytesMut, color: Color) {
    buf.put_u8(color.r);
    buf.put_u8(color.g);
    buf.put_u8(color.b);
}
