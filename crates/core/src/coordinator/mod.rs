use serde::{Deserialize, Serialize};

use crate::{CaptureResourceManager, ListenerRegistry};

/// Externally driven inputs to the active state. Listener demand is the
/// fourth input and is always queried from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    Playing,
    ScreenOn,
    PowerSaving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signals {
    pub playing: bool,
    pub screen_on: bool,
    pub power_saving: bool,
}

impl Default for Signals {
    fn default() -> Self {
        Self {
            playing: false,
            screen_on: true,
            power_saving: false,
        }
    }
}

impl Signals {
    pub fn set(&mut self, signal: Signal, value: bool) {
        match signal {
            Signal::Playing => self.playing = value,
            Signal::ScreenOn => self.screen_on = value,
            Signal::PowerSaving => self.power_saving = value,
        }
    }

    pub fn derive_active(&self, any_listener_enabled: bool) -> bool {
        self.playing && self.screen_on && !self.power_saving && any_listener_enabled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Activated,
    Deactivated,
}

/// Battery-saver state. Change notifications are only subscribed while
/// active, so the current reading is polled on every recompute.
pub trait PowerSaveMonitor: Send + Sync {
    fn is_power_saving(&self) -> bool;
    fn subscribe(&self);
    fn unsubscribe(&self);
}

/// Everything a transition acts upon.
pub struct Collaborators<'a> {
    pub registry: &'a ListenerRegistry,
    pub capture: &'a CaptureResourceManager,
    pub power: Option<&'a dyn PowerSaveMonitor>,
}

/// Two-state machine gating the capture resource.
#[derive(Debug, Clone, Default)]
pub struct ActiveStateCoordinator {
    signals: Signals,
    active: bool,
}

impl ActiveStateCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals(&self) -> Signals {
        self.signals
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn update_signal(
        &mut self,
        signal: Signal,
        value: bool,
        with: &Collaborators<'_>,
    ) -> Option<Transition> {
        self.signals.set(signal, value);
        self.recompute(with)
    }

    /// Re-derives the active state. Nothing happens unless it flips; on a
    /// flip the resource action is queued first, then every listener is told
    /// the new state in registry order.
    ///
    /// With a monitor attached its reading replaces the last reported
    /// power-saving value.
    pub fn recompute(&mut self, with: &Collaborators<'_>) -> Option<Transition> {
        if let Some(power) = with.power {
            self.signals.power_saving = power.is_power_saving();
        }
        let any_enabled = with.registry.any_enabled();
        let active = self.signals.derive_active(any_enabled);
        if active == self.active {
            tracing::trace!(active, "active state unchanged");
            return None;
        }

        self.active = active;
        let transition = if active {
            with.capture.acquire();
            if let Some(power) = with.power {
                power.subscribe();
            }
            Transition::Activated
        } else {
            with.capture.release();
            if let Some(power) = with.power {
                power.unsubscribe();
            }
            Transition::Deactivated
        };

        tracing::info!(?transition, signals = ?self.signals, any_enabled, "active state changed");
        with.registry.dispatch("on_active_state_changed", |listener| {
            listener.on_active_state_changed(active)
        });
        Some(transition)
    }
}
