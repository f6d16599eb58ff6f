//! LED and RGB lighting types

use std::str::FromStr;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::KeyboardError;

/// RGB color value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Black (LED off)
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);
    pub const RED: Self = Self::new(255, 0, 0);
    pub const GREEN: Self = Self::new(0, 255, 0);
    pub const BLUE: Self = Self::new(0, 0, 255);
}

impl From<(u8, u8, u8)> for Rgb {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self::new(r, g, b)
    }
}

/// Parses `rrggbb` hex, with or without a leading `#`
impl FromStr for Rgb {
    type Err = KeyboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        let invalid = || KeyboardError::InvalidParameter(format!("invalid color {s:?}"));
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

/// Generates `from_u8`, `name` and `FromStr` (snake_case names) for a byte enum
macro_rules! byte_enum {
    ($ty:ident { $($variant:ident = $value:literal => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// All values, in wire order
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            /// Get value from its wire byte
            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $($value => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Name accepted by `FromStr`
            pub fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = KeyboardError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.name() == s)
                    .ok_or_else(|| {
                        KeyboardError::InvalidParameter(format!(
                            "invalid {} {:?}",
                            stringify!($ty),
                            s
                        ))
                    })
            }
        }
    };
}

/// Built-in lighting animation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LightingMode {
    Wave = 0x00,
    Spectrum = 0x01,
    Breathing = 0x02,
    Static = 0x03,
    Radar = 0x04,
    Vortex = 0x05,
    Fire = 0x06,
    Stars = 0x07,
    /// Per-key colors uploaded with the custom LED table
    Custom = 0x08,
    Rolling = 0x0A,
    Rain = 0x0B,
    Curve = 0x0C,
    WaveMid = 0x0E,
    Scan = 0x0F,
    Radiation = 0x12,
    Ripples = 0x13,
    SingleKey = 0x15,
}

byte_enum!(LightingMode {
    Wave = 0x00 => "wave",
    Spectrum = 0x01 => "spectrum",
    Breathing = 0x02 => "breathing",
    Static = 0x03 => "static",
    Radar = 0x04 => "radar",
    Vortex = 0x05 => "vortex",
    Fire = 0x06 => "fire",
    Stars = 0x07 => "stars",
    Custom = 0x08 => "custom",
    Rolling = 0x0A => "rolling",
    Rain = 0x0B => "rain",
    Curve = 0x0C => "curve",
    WaveMid = 0x0E => "wave_mid",
    Scan = 0x0F => "scan",
    Radiation = 0x12 => "radiation",
    Ripples = 0x13 => "ripples",
    SingleKey = 0x15 => "single_key",
});

/// Animation speed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Speed {
    VeryFast = 0,
    Fast = 1,
    Medium = 2,
    Slow = 3,
    VerySlow = 4,
}

byte_enum!(Speed {
    VeryFast = 0 => "very_fast",
    Fast = 1 => "fast",
    Medium = 2 => "medium",
    Slow = 3 => "slow",
    VerySlow = 4 => "very_slow",
});

/// LED brightness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Brightness {
    Off = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    Full = 4,
}

byte_enum!(Brightness {
    Off = 0 => "off",
    Low = 1 => "low",
    Medium = 2 => "medium",
    High = 3 => "high",
    Full = 4 => "full",
});

/// Animation settings block written at offset 0 of the animation area
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct LedAnimation {
    _reserved: u8,
    mode: u8,
    brightness: u8,
    speed: u8,
    _pad: u8,
    rainbow: u8,
    color: Rgb,
}

impl LedAnimation {
    pub fn new(
        mode: LightingMode,
        brightness: Brightness,
        speed: Speed,
        color: Rgb,
        rainbow: bool,
    ) -> Self {
        Self {
            _reserved: 0,
            mode: mode as u8,
            brightness: brightness as u8,
            speed: speed as u8,
            _pad: 0,
            rainbow: u8::from(rainbow),
            color,
        }
    }

    pub fn mode(&self) -> Option<LightingMode> {
        LightingMode::from_u8(self.mode)
    }

    pub fn color(&self) -> Rgb {
        self.color
    }
}

/// Per-key color table used by [`LightingMode::Custom`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomKeyLeds {
    key_leds: Vec<Rgb>,
}

impl Default for CustomKeyLeds {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomKeyLeds {
    /// Number of LED slots in the table
    pub const TOTAL_KEYS: usize = 126;
    /// Color bytes carried by one table write
    pub const CHUNK_SIZE: usize = 56;

    /// All keys off
    pub fn new() -> Self {
        Self {
            key_leds: vec![Rgb::BLACK; Self::TOTAL_KEYS],
        }
    }

    /// Build a table from leading key colors; remaining keys are off
    pub fn from_leds<C: Into<Rgb>>(key_leds: Vec<C>) -> Result<Self, KeyboardError> {
        if key_leds.len() > Self::TOTAL_KEYS {
            return Err(KeyboardError::InvalidParameter(format!(
                "{} key colors given, keyboard has {}",
                key_leds.len(),
                Self::TOTAL_KEYS
            )));
        }
        let mut table = Self::new();
        for (slot, color) in table.key_leds.iter_mut().zip(key_leds) {
            *slot = color.into();
        }
        Ok(table)
    }

    /// Every key the same color
    pub fn filled(color: Rgb) -> Self {
        Self {
            key_leds: vec![color; Self::TOTAL_KEYS],
        }
    }

    pub fn set_led<C: Into<Rgb>>(
        &mut self,
        key_index: usize,
        color: C,
    ) -> Result<(), KeyboardError> {
        let slot = self.key_leds.get_mut(key_index).ok_or_else(|| {
            KeyboardError::InvalidParameter(format!(
                "key index {key_index} out of range (max {})",
                Self::TOTAL_KEYS - 1
            ))
        })?;
        *slot = color.into();
        Ok(())
    }

    pub fn get_led(&self, key_index: usize) -> Option<Rgb> {
        self.key_leds.get(key_index).copied()
    }

    /// Table as written to the device, three bytes per key
    pub fn as_bytes(&self) -> &[u8] {
        self.key_leds.as_slice().as_bytes()
    }

    /// Split the table into `(byte offset, data)` writes
    pub fn chunks(&self) -> impl Iterator<Item = (u16, &[u8])> {
        self.as_bytes()
            .chunks(Self::CHUNK_SIZE)
            .enumerate()
            .map(|(i, chunk)| ((i * Self::CHUNK_SIZE) as u16, chunk))
    }
}
