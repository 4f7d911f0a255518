//! Visual consumers and the ordered registry that fans events out to them.

use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};

use crate::{Argb, Bitmap, PreferenceDelta, Result, VisualizerError, VisualizerPreferences};

/// Host surfaces a listener can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Surface {
    Lockscreen,
    Navbar,
}

/// Parent view a listener inflates itself into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceContext {
    pub surface: Surface,
    pub width: u32,
    pub height: u32,
}

impl SurfaceContext {
    pub fn new(surface: Surface, width: u32, height: u32) -> Self {
        Self {
            surface,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusBarState {
    Shade,
    Keyguard,
    ShadeLocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatteryData {
    pub level: u8,
    pub charging: bool,
    pub power_saving: bool,
}

/// Metadata of the track currently known to the media session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub art: Option<Arc<Bitmap>>,
    pub album_art: Option<Arc<Bitmap>>,
}

impl MediaMetadata {
    /// Track art, falling back to album art.
    pub fn artwork(&self) -> Option<&Arc<Bitmap>> {
        self.art.as_ref().or(self.album_art.as_ref())
    }
}

/// Capability set every visual consumer implements.
///
/// Callbacks are invoked while the controller holds its state, so
/// implementations must not call back into the controller.
pub trait Listener: Send + Sync {
    fn init_preferences(&self, prefs: &VisualizerPreferences);
    fn on_preference_changed(&self, delta: &PreferenceDelta);
    fn on_create_view(&self, parent: &SurfaceContext) -> Result<()>;
    fn on_active_state_changed(&self, active: bool);
    fn on_media_metadata_updated(
        &self,
        metadata: Option<&MediaMetadata>,
        artwork: Option<&Bitmap>,
    );
    fn on_user_activity(&self) {}
    fn on_status_bar_state_changed(&self, _old: StatusBarState, _new: StatusBarState) {}
    fn on_battery_status_changed(&self, _battery: &BatteryData) {}
    fn on_color_updated(&self, color: Argb);
    fn on_fft_data_capture(&self, fft: &[u8], sampling_rate: u32);
    fn set_vertical_left(&self, _left: bool) {}
    fn set_light(&self, _light: bool) {}
    fn is_enabled(&self) -> bool;
}

/// Ordered, append-only set of listeners.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<Arc<dyn Listener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replays the current state into `listener` and appends it.
    ///
    /// The listener creates its view, receives the preferences and the
    /// composed `color`, and only then becomes visible to fan-out. A
    /// listener that fails any of these steps is not registered.
    pub fn add(
        &self,
        parent: &SurfaceContext,
        listener: Arc<dyn Listener>,
        prefs: &VisualizerPreferences,
        color: Argb,
    ) -> Result<()> {
        guarded("on_create_view", || listener.on_create_view(parent))
            .unwrap_or_else(|| Err(VisualizerError::Listener("view creation panicked".into())))?;
        guarded("init_preferences", || listener.init_preferences(prefs))
            .ok_or_else(|| VisualizerError::Listener("preference initialisation panicked".into()))?;
        guarded("on_color_updated", || listener.on_color_updated(color))
            .ok_or_else(|| VisualizerError::Listener("initial color update panicked".into()))?;

        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        listeners.push(listener);
        tracing::info!(
            surface = ?parent.surface,
            listeners = listeners.len(),
            "listener registered"
        );
        Ok(())
    }

    /// Applies `action` to every listener in insertion order. A panicking
    /// listener is logged and skipped.
    pub fn dispatch<F>(&self, callback: &'static str, action: F)
    where
        F: Fn(&dyn Listener),
    {
        for listener in self.snapshot() {
            guarded(callback, || action(listener.as_ref()));
        }
    }

    /// Like [`dispatch`](Self::dispatch), restricted to listeners reporting
    /// enabled at call time. Returns how many listeners were reached.
    pub fn dispatch_enabled<F>(&self, callback: &'static str, action: F) -> usize
    where
        F: Fn(&dyn Listener),
    {
        let mut delivered = 0;
        for listener in self.snapshot() {
            if !is_enabled(listener.as_ref()) {
                continue;
            }
            if guarded(callback, || action(listener.as_ref())).is_some() {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn any_enabled(&self) -> bool {
        self.snapshot()
            .iter()
            .any(|listener| is_enabled(listener.as_ref()))
    }

    /// Clones the current handles so callbacks run without the lock held.
    pub fn snapshot(&self) -> Vec<Arc<dyn Listener>> {
        self.read().clone()
    }

    // Only ever appended to, so a poisoned guard still holds a consistent list.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<dyn Listener>>> {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

fn is_enabled(listener: &dyn Listener) -> bool {
    guarded("is_enabled", || listener.is_enabled()).unwrap_or(false)
}

fn guarded<T>(callback: &'static str, f: impl FnOnce() -> T) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            tracing::warn!(callback, reason = panic_message(payload.as_ref()), "listener panicked");
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
