//! LED color.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// ARGB color.
#[derive(Default, PartialEq, Eq, Hash, Debug, Copy, Clone)]
pub struct Color {
    pub a: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0x00, 0x00, 0x00);
    pub const RED: Color = Color::rgb(0xff, 0x00, 0x00);
    pub const GREEN: Color = Color::rgb(0x00, 0xff, 0x00);
    pub const BLUE: Color = Color::rgb(0x00, 0x00, 0xff);
    pub const MAGENTA: Color = Color::rgb(0xff, 0x00, 0xff);
    pub const YELLOW: Color = Color::rgb(0xff, 0xff, 0x00);
    pub const WHITE: Color = Color::rgb(0xff, 0xff, 0xff);
    pub const TRANSPARENT: Color = Color::argb(0x00, 0x00, 0x00, 0x00);

    /// Fully opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { a: u8::MAX, r, g, b }
    }

    pub const fn argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self { a, r, g, b }
    }

    /// Whether alpha-honoring devices should skip this color.
    pub fn is_transparent(&self) -> bool {
        self.a == 0
    }
}

impl FromStr for Color {
    type Err = ();

    /// Parse `0xRRGGBB` or `0xAARRGGBB`.
    fn from_str(s: &str) -> Result<Color, ()> {
        let chars = match s.strip_prefix("0x") {
            Some(chars) if chars.len() == 6 || chars.len() == 8 => chars,
            _ => return Err(()),
        };

        // Radix parsing alone would accept a sign.
        if !chars.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Err(());
        }

        let mut color = u32::from_str_radix(chars, 16).map_err(|_| ())?;
        let b = (color & 0xff) as u8;
        color >>= 8;
        let g = (color & 0xff) as u8;
        color >>= 8;
        let r = (color & 0xff) as u8;
        color >>= 8;
        let a = if chars.len() == 8 { color as u8 } else { u8::MAX };

        Ok(Color { a, r, g, b })
    }
}

impl Display for Color {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.a == u8::MAX {
            write!(f, "0x{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "0x{:02x}{:02x}{:02x}{:02x}", self.a, self.r, self.g, self.b)
        }
    }
}
