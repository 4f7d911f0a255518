//! Named inbound subscriptions and the typed events they deliver.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    BatteryData, Listener, MediaSnapshot, PreferenceDelta, Result, StatusBarState, Surface,
    SurfaceContext,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hook {
    LockscreenInflated,
    NavbarInflated,
    MediaMetadata,
    UserActivity,
    NavbarOrder,
    NavbarTheme,
    ScreenPower,
    Preferences,
    BatteryStatus,
    StatusBarState,
}

impl Hook {
    pub const ALL: [Hook; 10] = [
        Hook::LockscreenInflated,
        Hook::MediaMetadata,
        Hook::UserActivity,
        Hook::NavbarInflated,
        Hook::NavbarOrder,
        Hook::NavbarTheme,
        Hook::ScreenPower,
        Hook::Preferences,
        Hook::BatteryStatus,
        Hook::StatusBarState,
    ];
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hook::LockscreenInflated => "lockscreen-inflated",
            Hook::NavbarInflated => "navbar-inflated",
            Hook::MediaMetadata => "media-metadata",
            Hook::UserActivity => "user-activity",
            Hook::NavbarOrder => "navbar-order",
            Hook::NavbarTheme => "navbar-theme",
            Hook::ScreenPower => "screen-power",
            Hook::Preferences => "preferences",
            Hook::BatteryStatus => "battery-status",
            Hook::StatusBarState => "status-bar-state",
        };
        f.write_str(name)
    }
}

/// Events delivered by the host once the matching [`Hook`] is attached.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    SurfaceInflated(SurfaceContext),
    MediaMetadataUpdated(MediaSnapshot),
    UserActivity,
    NavbarOrderChanged { is_right_side: bool },
    NavbarThemeChanged { is_light: bool },
    ScreenOn,
    ScreenOff,
    PreferencesChanged(PreferenceDelta),
    BatteryStatusChanged(BatteryData),
    StatusBarStateChanged { old: StatusBarState, new: StatusBarState },
}

impl HostEvent {
    /// The subscription that delivers this event.
    pub fn hook(&self) -> Hook {
        match self {
            HostEvent::SurfaceInflated(context) => match context.surface {
                Surface::Lockscreen => Hook::LockscreenInflated,
                Surface::Navbar => Hook::NavbarInflated,
            },
            HostEvent::MediaMetadataUpdated(_) => Hook::MediaMetadata,
            HostEvent::UserActivity => Hook::UserActivity,
            HostEvent::NavbarOrderChanged { .. } => Hook::NavbarOrder,
            HostEvent::NavbarThemeChanged { .. } => Hook::NavbarTheme,
            HostEvent::ScreenOn | HostEvent::ScreenOff => Hook::ScreenPower,
            HostEvent::PreferencesChanged(_) => Hook::Preferences,
            HostEvent::BatteryStatusChanged(_) => Hook::BatteryStatus,
            HostEvent::StatusBarStateChanged { .. } => Hook::StatusBarState,
        }
    }
}

/// Host side of the event boundary.
pub trait EventHost {
    fn attach(&self, hook: Hook) -> Result<()>;
}

/// Builds the listener for a freshly inflated surface.
pub trait ListenerFactory: Send + Sync {
    fn create(&self, surface: Surface) -> Arc<dyn Listener>;
}

impl<F> ListenerFactory for F
where
    F: Fn(Surface) -> Arc<dyn Listener> + Send + Sync,
{
    fn create(&self, surface: Surface) -> Arc<dyn Listener> {
        self(surface)
    }
}

/// Attaches every hook independently and returns the ones that succeeded.
pub fn attach_hooks(host: &dyn EventHost) -> Vec<Hook> {
    Hook::ALL
        .into_iter()
        .filter(|hook| match host.attach(*hook) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%hook, error = %err, "failed to attach hook");
                false
            }
        })
        .collect()
}
