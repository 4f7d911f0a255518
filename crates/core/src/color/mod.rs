use std::{fmt, str::FromStr};

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::{VisualizerError, VisualizerPreferences};

/// Packed 32-bit color in `0xAARRGGBB` order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "ArgbRepr", into = "u32")]
pub struct Argb(pub u32);

impl Argb {
    pub const TRANSPARENT: Argb = Argb(0x0000_0000);
    pub const BLACK: Argb = Argb(0xFF00_0000);
    pub const WHITE: Argb = Argb(0xFFFF_FFFF);

    pub const fn from_argb(alpha: u8, red: u8, green: u8, blue: u8) -> Self {
        Self((alpha as u32) << 24 | (red as u32) << 16 | (green as u32) << 8 | blue as u32)
    }

    pub const fn from_rgb(red: u8, green: u8, blue: u8) -> Self {
        Self::from_argb(0xFF, red, green, blue)
    }

    pub const fn alpha(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub const fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub const fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn blue(self) -> u8 {
        self.0 as u8
    }

    /// Keeps the hue and replaces the alpha channel.
    pub const fn with_alpha(self, alpha: u8) -> Self {
        Self::from_argb(alpha, self.red(), self.green(), self.blue())
    }

    /// Only the all-zero value counts as transparent; a fully translucent
    /// color with a hue is still a valid candidate.
    pub const fn is_transparent(self) -> bool {
        self.0 == Self::TRANSPARENT.0
    }
}

impl fmt::Debug for Argb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Argb(#{:08X})", self.0)
    }
}

impl fmt::Display for Argb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08X}", self.0)
    }
}

impl From<Argb> for u32 {
    fn from(value: Argb) -> Self {
        value.0
    }
}

impl From<u32> for Argb {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Rgba<u8>> for Argb {
    fn from(Rgba([red, green, blue, alpha]): Rgba<u8>) -> Self {
        Self::from_argb(alpha, red, green, blue)
    }
}

impl From<Argb> for Rgba<u8> {
    fn from(value: Argb) -> Self {
        Rgba([value.red(), value.green(), value.blue(), value.alpha()])
    }
}

impl FromStr for Argb {
    type Err = VisualizerError;

    /// Accepts `#RRGGBB` (opaque) or `#AARRGGBB`. The leading `#` is optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        let value = u32::from_str_radix(hex, 16)
            .map_err(|_| VisualizerError::msg(format!("invalid color `{s}`")))?;
        match hex.len() {
            6 => Ok(Self(0xFF00_0000 | value)),
            8 => Ok(Self(value)),
            _ => Err(VisualizerError::msg(format!(
                "invalid color `{s}`: expected #RRGGBB or #AARRGGBB"
            ))),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ArgbRepr {
    Packed(u32),
    Hex(String),
}

impl TryFrom<ArgbRepr> for Argb {
    type Error = VisualizerError;

    fn try_from(value: ArgbRepr) -> Result<Self, Self::Error> {
        match value {
            ArgbRepr::Packed(raw) => Ok(Self(raw)),
            ArgbRepr::Hex(text) => text.parse(),
        }
    }
}

/// Converts a 0-100 opacity percentage to an alpha byte, rounding to the
/// nearest integer. Values above 100 saturate.
pub fn opacity_from_percent(percent: u8) -> u8 {
    let percent = percent.min(100) as f32;
    (255.0 * (percent / 100.0)).round() as u8
}

/// Color state shared by every listener: the configured default, the
/// current (extracted or default) color and the opacity applied on top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorState {
    default_color: Argb,
    dynamic_color_enabled: bool,
    opacity: u8,
    current_color: Argb,
}

impl ColorState {
    pub fn from_preferences(prefs: &VisualizerPreferences) -> Self {
        Self {
            default_color: prefs.color,
            dynamic_color_enabled: prefs.dynamic_color,
            opacity: opacity_from_percent(prefs.opacity_percent),
            current_color: if prefs.dynamic_color {
                Argb::TRANSPARENT
            } else {
                prefs.color
            },
        }
    }

    pub fn default_color(&self) -> Argb {
        self.default_color
    }

    pub fn dynamic_color_enabled(&self) -> bool {
        self.dynamic_color_enabled
    }

    pub fn opacity(&self) -> u8 {
        self.opacity
    }

    pub fn current_color(&self) -> Argb {
        self.current_color
    }

    /// The value listeners actually display: current hue, current opacity.
    pub fn composed(&self) -> Argb {
        self.current_color.with_alpha(self.opacity)
    }

    /// Replaces the current color and returns the composed value to publish.
    pub fn set_current(&mut self, color: Argb) -> Argb {
        self.current_color = color;
        self.composed()
    }

    pub fn set_default_color(&mut self, color: Argb) {
        self.default_color = color;
    }

    pub fn set_dynamic_color_enabled(&mut self, enabled: bool) {
        self.dynamic_color_enabled = enabled;
    }

    pub fn set_opacity_percent(&mut self, percent: u8) {
        self.opacity = opacity_from_percent(percent);
    }
}
