//! 24-bit color handling for cell rendering
//!
//! Cells carry packed `0xRRGGBB` colors; the renderer decomposes them into
//! normalized RGB triples when building instance records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 24-bit true color packed as `0xRRGGBB`
///
/// Bits above the low 24 are always zero, also when deserialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct Rgb(u32);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0x00_00_00);
    pub const WHITE: Rgb = Rgb(0xFF_FF_FF);

    /// Create a color from its components
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    /// Build from any 32-bit value, discarding bits above the low 24
    #[must_use]
    pub const fn from_u32(value: u32) -> Self {
        Self(value & 0x00FF_FFFF)
    }

    #[must_use]
    pub const fn r(self) -> u8 {
        (self.0 >> 16) as u8
    }

    #[must_use]
    pub const fn g(self) -> u8 {
        (self.0 >> 8) as u8
    }

    #[must_use]
    pub const fn b(self) -> u8 {
        self.0 as u8
    }

    /// Packed `0xRRGGBB` value
    #[must_use]
    pub const fn packed(self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Normalized RGB triple for GPU upload
    #[must_use]
    pub fn to_normalized(self) -> [f32; 3] {
        [
            f32::from(self.r()) / 255.0,
            f32::from(self.g()) / 255.0,
            f32::from(self.b()) / 255.0,
        ]
    }

    /// Normalized RGBA with full opacity
    #[must_use]
    pub fn to_rgba(self) -> [f32; 4] {
        let [r, g, b] = self.to_normalized();
        [r, g, b, 1.0]
    }

    /// Parse `#RRGGBB` or `RRGGBB`
    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim_start_matches('#');
        if hex.len() != 6 {
            return None;
        }

        let r = u8::from_str_radix(hex.get(0..2)?, 16).ok()?;
        let g = u8::from_str_radix(hex.get(2..4)?, 16).ok()?;
        let b = u8::from_str_radix(hex.get(4..6)?, 16).ok()?;

        Some(Self::new(r, g, b))
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r(), self.g(), self.b())
    }

    /// Resolve an xterm 256-color palette index
    #[must_use]
    pub fn from_ansi(code: u8) -> Self {
        match code {
            0 => Self::new(0x00, 0x00, 0x00),
            1 => Self::new(0xCD, 0x00, 0x00),
            2 => Self::new(0x00, 0xCD, 0x00),
            3 => Self::new(0xCD, 0xCD, 0x00),
            4 => Self::new(0x00, 0x00, 0xEE),
            5 => Self::new(0xCD, 0x00, 0xCD),
            6 => Self::new(0x00, 0xCD, 0xCD),
            7 => Self::new(0xE5, 0xE5, 0xE5),
            8 => Self::new(0x7F, 0x7F, 0x7F),
            9 => Self::new(0xFF, 0x00, 0x00),
            10 => Self::new(0x00, 0xFF, 0x00),
            11 => Self::new(0xFF, 0xFF, 0x00),
            12 => Self::new(0x5C, 0x5C, 0xFF),
            13 => Self::new(0xFF, 0x00, 0xFF),
            14 => Self::new(0x00, 0xFF, 0xFF),
            15 => Self::WHITE,
            // 16-231: 6x6x6 color cube
            16..=231 => {
                let idx = code - 16;
                let level = |v: u8| if v == 0 { 0 } else { 55 + v * 40 };
                Self::new(level(idx / 36), level((idx / 6) % 6), level(idx % 6))
            }
            // 232-255: grayscale ramp
            232..=255 => {
                let gray = 8 + (code - 232) * 10;
                Self::new(gray, gray, gray)
            }
        }
    }
}

impl From<u32> for Rgb {
    fn from(value: u32) -> Self {
        Self::from_u32(value)
    }
}

impl From<Rgb> for u32 {
    fn from(color: Rgb) -> Self {
        color.packed()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components() {
        let c = Rgb::new(0x12, 0x34, 0x56);
        assert_eq!(c.packed(), 0x12_34_56);
        assert_eq!((c.r(), c.g(), c.b()), (0x12, 0x34, 0x56));
    }

    #[test]
    fn test_from_u32_masks_high_bits() {
        assert_eq!(Rgb::from_u32(0xAB12_3456), Rgb(0x12_3456));
    }

    #[test]
    fn test_deserialize_masks_high_bits() {
        let color: Rgb = serde_json::from_str("33554431").unwrap(); // 0x01FF_FFFF
        assert_eq!(color, Rgb::WHITE);
        assert_eq!(serde_json::to_string(&Rgb::new(0, 0, 1)).unwrap(), "1");
    }

    #[test]
    fn test_normalized() {
        let [r, g, b] = Rgb::new(255, 0, 51).to_normalized();
        assert!((r - 1.0).abs() < f32::EPSILON);
        assert!(g.abs() < f32::EPSILON);
        assert!((b - 0.2).abs() < 0.001);
    }

    #[test]
    fn test_hex() {
        assert_eq!(Rgb::from_hex("#FF0000"), Some(Rgb::new(255, 0, 0)));
        assert_eq!(Rgb::from_hex("00ff00"), Some(Rgb::new(0, 255, 0)));
        assert_eq!(Rgb::from_hex("#FFF"), None);
        assert_eq!(Rgb::from_hex("#GG0000"), None);
        assert_eq!(Rgb::new(0xAA, 0xBB, 0xCC).to_hex(), "#AABBCC");
    }

    #[test]
    fn test_ansi_palette() {
        assert_eq!(Rgb::from_ansi(0), Rgb::BLACK);
        assert_eq!(Rgb::from_ansi(15), Rgb::WHITE);
        assert_eq!(Rgb::from_ansi(16), Rgb::BLACK);
        assert_eq!(Rgb::from_ansi(231), Rgb::WHITE);
        assert_eq!(Rgb::from_ansi(232), Rgb::new(8, 8, 8));
        assert_eq!(Rgb::from_ansi(255), Rgb::new(238, 238, 238));
    }
}
