use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Argb, Result};

/// Samples per captured spectrum frame.
pub const CAPTURE_SIZE: usize = 66;

/// Persisted visualizer preferences, shared with every listener on attach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerPreferences {
    /// Derive the color from the current artwork instead of `color`.
    pub dynamic_color: bool,
    pub color: Argb,
    /// 0-100, converted to an alpha byte when composing.
    pub opacity_percent: u8,
    /// Listener-specific keys. The coordinator never interprets them.
    pub extras: Map<String, Value>,
}

impl Default for VisualizerPreferences {
    fn default() -> Self {
        Self {
            dynamic_color: true,
            color: Argb::WHITE,
            opacity_percent: 50,
            extras: Map::new(),
        }
    }
}

impl VisualizerPreferences {
    /// Loads preferences from a JSON file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let prefs: Self = serde_json::from_str(raw)?;
        Ok(prefs.normalised())
    }

    /// Folds a change broadcast into this snapshot.
    pub fn merge(&mut self, delta: &PreferenceDelta) {
        if let Some(enabled) = delta.dynamic_color {
            self.dynamic_color = enabled;
        }
        if let Some(color) = delta.color {
            self.color = color;
        }
        if let Some(percent) = delta.opacity_percent {
            self.opacity_percent = percent.min(100);
        }
        for (key, value) in &delta.extras {
            self.extras.insert(key.clone(), value.clone());
        }
    }

    fn normalised(mut self) -> Self {
        self.opacity_percent = self.opacity_percent.min(100);
        self
    }
}

/// A preference-changed broadcast. Only the fields present are applied;
/// `extras` is always forwarded to listeners untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceDelta {
    pub dynamic_color: Option<bool>,
    pub color: Option<Argb>,
    pub opacity_percent: Option<u8>,
    pub extras: Map<String, Value>,
}

impl PreferenceDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dynamic_color(mut self, enabled: bool) -> Self {
        self.dynamic_color = Some(enabled);
        self
    }

    pub fn with_color(mut self, color: Argb) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_opacity_percent(mut self, percent: u8) -> Self {
        self.opacity_percent = Some(percent);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }
}

/// Fixed configuration applied to the capture stream on every acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub capture_size: usize,
    /// Frame rate in milli-hertz.
    pub capture_rate_mhz: u32,
    pub waveform: bool,
    pub fft: bool,
}

impl CaptureConfig {
    /// Spectrum-only capture at the device's fastest rate.
    pub fn spectrum(max_capture_rate_mhz: u32) -> Self {
        Self {
            capture_size: CAPTURE_SIZE,
            capture_rate_mhz: max_capture_rate_mhz,
            waveform: false,
            fft: true,
        }
    }
}
