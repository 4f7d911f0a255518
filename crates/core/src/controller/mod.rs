//! The coordinator facade the host talks to.
//!
//! Every event handler takes the state lock for its whole duration, so
//! signal updates, preference changes and extraction results are applied
//! one at a time and listeners observe them in that order. Capture
//! lifecycle work and palette generation run on their own workers.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use crate::{
    coordinator::Collaborators, preferences, ActiveStateCoordinator, Argb, BatteryData,
    CaptureDevice, CaptureResourceManager, ColorExtractor, ColorState, EventHost, FrameDispatcher,
    Hook, HostEvent, Listener, ListenerFactory, ListenerRegistry, MediaSnapshot, Palette,
    PowerSaveMonitor, PreferenceDelta, Result, Signal, Signals, StatusBarState, SurfaceContext,
    Transition, VisualizerError, VisualizerPreferences,
};

pub struct ControllerBuilder {
    prefs: VisualizerPreferences,
    device: Arc<dyn CaptureDevice>,
    power: Option<Arc<dyn PowerSaveMonitor>>,
    factory: Option<Arc<dyn ListenerFactory>>,
}

impl ControllerBuilder {
    pub fn power_monitor(mut self, monitor: Arc<dyn PowerSaveMonitor>) -> Self {
        self.power = Some(monitor);
        self
    }

    /// Used to build listeners for [`HostEvent::SurfaceInflated`].
    pub fn listener_factory(mut self, factory: Arc<dyn ListenerFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Starts the capture and extraction workers.
    pub fn build(self) -> Result<VisualizerController> {
        let registry = Arc::new(ListenerRegistry::new());
        let dispatcher = Arc::new(FrameDispatcher::new(registry.clone()));
        let capture = CaptureResourceManager::spawn(self.device, dispatcher)?;
        let extractor = ColorExtractor::spawn()?;

        let state = ControllerState {
            coordinator: ActiveStateCoordinator::new(),
            colors: ColorState::from_preferences(&self.prefs),
            prefs: self.prefs,
            color_epoch: 0,
        };

        Ok(VisualizerController {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                registry,
                capture,
                extractor,
                power: self.power,
                factory: self.factory,
            }),
        })
    }
}

/// Decides when capture runs, which color is current and who hears about it.
pub struct VisualizerController {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<ControllerState>,
    registry: Arc<ListenerRegistry>,
    capture: CaptureResourceManager,
    extractor: ColorExtractor,
    power: Option<Arc<dyn PowerSaveMonitor>>,
    factory: Option<Arc<dyn ListenerFactory>>,
}

struct ControllerState {
    coordinator: ActiveStateCoordinator,
    colors: ColorState,
    prefs: VisualizerPreferences,
    /// Advanced on every extraction request and whenever dynamic color is
    /// switched off; only a result carrying the latest value is published.
    color_epoch: u64,
}

impl VisualizerController {
    pub fn builder(
        prefs: VisualizerPreferences,
        device: Arc<dyn CaptureDevice>,
    ) -> ControllerBuilder {
        ControllerBuilder {
            prefs,
            device,
            power: None,
            factory: None,
        }
    }

    /// Subscribes to every host hook; see [`crate::attach_hooks`].
    pub fn attach_hooks(&self, host: &dyn EventHost) -> Vec<Hook> {
        let attached = crate::attach_hooks(host);
        tracing::info!(attached = attached.len(), total = Hook::ALL.len(), "host hooks attached");
        attached
    }

    /// Routes a host event to its handler.
    pub fn handle(&self, event: HostEvent) -> Result<()> {
        match event {
            HostEvent::SurfaceInflated(context) => {
                let factory = self.shared.factory.as_ref().ok_or_else(|| {
                    VisualizerError::msg(format!("no listener factory for {:?}", context.surface))
                })?;
                let listener = factory.create(context.surface);
                self.add_listener(&context, listener)
            }
            HostEvent::MediaMetadataUpdated(snapshot) => self.on_media_snapshot(snapshot),
            HostEvent::UserActivity => self.on_user_activity(),
            HostEvent::NavbarOrderChanged { is_right_side } => self.on_navbar_order(is_right_side),
            HostEvent::NavbarThemeChanged { is_light } => self.on_navbar_theme(is_light),
            HostEvent::ScreenOn => self.update_signal(Signal::ScreenOn, true).map(drop),
            HostEvent::ScreenOff => self.update_signal(Signal::ScreenOn, false).map(drop),
            HostEvent::PreferencesChanged(delta) => self.apply_preferences(&delta),
            HostEvent::BatteryStatusChanged(battery) => self.on_battery_status_changed(&battery),
            HostEvent::StatusBarStateChanged { old, new } => {
                self.on_status_bar_state_changed(old, new)
            }
        }
    }

    /// Registers a listener after replaying the current preferences and
    /// composed color into it, then re-evaluates listener demand.
    pub fn add_listener(
        &self,
        parent: &SurfaceContext,
        listener: Arc<dyn Listener>,
    ) -> Result<()> {
        let shared = &self.shared;
        let mut state = shared.lock_state()?;
        let composed = state.colors.composed();
        shared.registry.add(parent, listener, &state.prefs, composed)?;
        state.coordinator.recompute(&shared.collaborators());
        Ok(())
    }

    pub fn update_signal(&self, signal: Signal, value: bool) -> Result<Option<Transition>> {
        let shared = &self.shared;
        let mut state = shared.lock_state()?;
        Ok(state.coordinator.update_signal(signal, value, &shared.collaborators()))
    }

    /// Re-evaluates the active state, e.g. after a listener toggled itself.
    pub fn recompute(&self) -> Result<Option<Transition>> {
        let shared = &self.shared;
        let mut state = shared.lock_state()?;
        Ok(state.coordinator.recompute(&shared.collaborators()))
    }

    /// Updates playback state and, when the track changed or capture just
    /// became active, forwards metadata and requests a new palette.
    pub fn on_media_snapshot(&self, snapshot: MediaSnapshot) -> Result<()> {
        let shared = &self.shared;
        let mut state = shared.lock_state()?;

        let transition =
            state
                .coordinator
                .update_signal(Signal::Playing, snapshot.playing, &shared.collaborators());
        let metadata_changed =
            snapshot.metadata_changed || transition == Some(Transition::Activated);
        if !(snapshot.playing && metadata_changed) {
            return Ok(());
        }

        let artwork = snapshot.artwork().cloned();
        if let Some(artwork) = &artwork {
            if state.colors.dynamic_color_enabled() {
                state.color_epoch += 1;
                let epoch = state.color_epoch;
                let owner = Arc::downgrade(&self.shared);
                shared.extractor.submit(artwork.clone(), move |palette| {
                    on_palette_generated(&owner, epoch, palette)
                });
            }
        }

        tracing::debug!(
            title = ?snapshot.metadata.as_ref().and_then(|md| md.title.as_deref()),
            artwork = artwork.is_some(),
            "media metadata updated"
        );
        shared.registry.dispatch("on_media_metadata_updated", |listener| {
            listener.on_media_metadata_updated(snapshot.metadata.as_ref(), artwork.as_deref())
        });
        Ok(())
    }

    /// Forwards the change to every listener, then applies its color fields.
    pub fn apply_preferences(&self, delta: &PreferenceDelta) -> Result<()> {
        let shared = &self.shared;
        let mut state = shared.lock_state()?;

        shared
            .registry
            .dispatch("on_preference_changed", |listener| listener.on_preference_changed(delta));
        state.prefs.merge(delta);

        let change = preferences::apply_delta(&mut state.colors, delta);
        if change.dynamic_disabled {
            state.color_epoch += 1;
        }
        for composed in change.publications {
            shared.fan_out_color(composed);
        }

        state.coordinator.recompute(&shared.collaborators());
        Ok(())
    }

    pub fn on_user_activity(&self) -> Result<()> {
        let _state = self.shared.lock_state()?;
        self.shared
            .registry
            .dispatch("on_user_activity", |listener| listener.on_user_activity());
        Ok(())
    }

    pub fn on_navbar_order(&self, is_right_side: bool) -> Result<()> {
        let _state = self.shared.lock_state()?;
        self.shared
            .registry
            .dispatch("set_vertical_left", |listener| listener.set_vertical_left(!is_right_side));
        Ok(())
    }

    pub fn on_navbar_theme(&self, is_light: bool) -> Result<()> {
        let _state = self.shared.lock_state()?;
        self.shared
            .registry
            .dispatch("set_light", |listener| listener.set_light(is_light));
        Ok(())
    }

    pub fn on_status_bar_state_changed(
        &self,
        old: StatusBarState,
        new: StatusBarState,
    ) -> Result<()> {
        let shared = &self.shared;
        let mut state = shared.lock_state()?;
        shared.registry.dispatch("on_status_bar_state_changed", |listener| {
            listener.on_status_bar_state_changed(old, new)
        });
        state.coordinator.recompute(&shared.collaborators());
        Ok(())
    }

    pub fn on_battery_status_changed(&self, battery: &BatteryData) -> Result<()> {
        let shared = &self.shared;
        let mut state = shared.lock_state()?;
        state
            .coordinator
            .update_signal(Signal::PowerSaving, battery.power_saving, &shared.collaborators());
        shared.registry.dispatch("on_battery_status_changed", |listener| {
            listener.on_battery_status_changed(battery)
        });
        Ok(())
    }

    pub fn is_active(&self) -> Result<bool> {
        Ok(self.shared.lock_state()?.coordinator.is_active())
    }

    pub fn signals(&self) -> Result<Signals> {
        Ok(self.shared.lock_state()?.coordinator.signals())
    }

    /// The color a listener attached right now would be initialised with.
    pub fn composed_color(&self) -> Result<Argb> {
        Ok(self.shared.lock_state()?.colors.composed())
    }

    pub fn listener_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Whether the capture worker currently holds an enabled stream.
    pub fn is_capturing(&self) -> bool {
        self.shared.capture.is_acquired()
    }

    /// Blocks until queued palette and capture work has completed.
    pub fn wait_idle(&self) {
        self.shared.extractor.flush();
        self.shared.capture.flush();
    }
}

impl fmt::Debug for VisualizerController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisualizerController")
            .field("registry", &self.shared.registry)
            .field("capture", &self.shared.capture)
            .finish()
    }
}

impl Shared {
    fn lock_state(&self) -> Result<MutexGuard<'_, ControllerState>> {
        self.state
            .lock()
            .map_err(|_| VisualizerError::Poisoned("controller state"))
    }

    fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            registry: &self.registry,
            capture: &self.capture,
            power: self.power.as_deref(),
        }
    }

    fn publish(&self, state: &mut ControllerState, color: Argb) {
        let composed = state.colors.set_current(color);
        self.fan_out_color(composed);
    }

    fn fan_out_color(&self, composed: Argb) {
        tracing::debug!(%composed, "publishing color");
        self.registry
            .dispatch("on_color_updated", |listener| listener.on_color_updated(composed));
    }
}

/// Runs on the extraction worker.
fn on_palette_generated(owner: &Weak<Shared>, epoch: u64, palette: Palette) {
    let Some(shared) = owner.upgrade() else {
        return;
    };
    let mut state = match shared.lock_state() {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(error = %err, "dropping extracted color");
            return;
        }
    };

    if epoch != state.color_epoch || !state.colors.dynamic_color_enabled() {
        tracing::debug!(epoch, current = state.color_epoch, "discarding stale palette");
        return;
    }

    let color = palette.resolve_color(state.colors.default_color());
    shared.publish(&mut state, color);
}
