//! Core library for the spectrum capture coordinator.
//!
//! The coordinator decides when the exclusive audio-spectrum capture stream
//! runs, which color is current and which visual listeners receive color
//! and frequency data. Each module owns one concern: the active-state
//! machine, the capture worker, palette extraction, preference routing and
//! the listener registry. [`VisualizerController`] ties them together
//! behind a single serialized state.

pub mod audio;
pub mod capture;
pub mod color;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod extraction;
pub mod hooks;
pub mod listener;
pub mod palette;
pub mod preferences;

#[cfg(test)]
mod testing;

pub use audio::{SpectrumCapture, DEFAULT_MAX_CAPTURE_RATE};
pub use capture::{CaptureDevice, CaptureResourceManager, CaptureStream, FrameSink};
pub use color::{opacity_from_percent, Argb, ColorState};
pub use config::{CaptureConfig, PreferenceDelta, VisualizerPreferences, CAPTURE_SIZE};
pub use controller::{ControllerBuilder, VisualizerController};
pub use coordinator::{ActiveStateCoordinator, PowerSaveMonitor, Signal, Signals, Transition};
pub use dispatch::FrameDispatcher;
pub use error::{Result, VisualizerError};
pub use extraction::{ColorExtractor, MediaSnapshot};
pub use hooks::{attach_hooks, EventHost, Hook, HostEvent, ListenerFactory};
pub use listener::{
    BatteryData, Listener, ListenerRegistry, MediaMetadata, StatusBarState, Surface,
    SurfaceContext,
};
pub use palette::{Bitmap, Palette, Swatch};
