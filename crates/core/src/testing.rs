//! Fakes shared by the unit tests.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use crate::{
    Argb, BatteryData, Bitmap, CaptureConfig, CaptureDevice, CaptureStream, FrameSink,
    Listener, MediaMetadata, PreferenceDelta, Result, StatusBarState, Surface, SurfaceContext,
    VisualizerError, VisualizerPreferences,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    CreateView(Surface),
    InitPreferences,
    PreferenceChanged(PreferenceDelta),
    Active(bool),
    Metadata { title: Option<String>, artwork: bool },
    UserActivity,
    StatusBar(StatusBarState, StatusBarState),
    Battery(BatteryData),
    Color(Argb),
    Fft(Vec<u8>, u32),
    VerticalLeft(bool),
    Light(bool),
}

/// Cross-listener log used to assert global delivery order.
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub(crate) fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub(crate) struct RecordingListener {
    name: &'static str,
    enabled: AtomicBool,
    fail_view: AtomicBool,
    panic_activation: AtomicBool,
    panic_enabled: AtomicBool,
    calls: Mutex<Vec<Call>>,
    journal: Mutex<Option<Journal>>,
}

impl RecordingListener {
    pub(crate) fn enabled(name: &'static str) -> Arc<Self> {
        Self::build(name, true)
    }

    pub(crate) fn disabled(name: &'static str) -> Arc<Self> {
        Self::build(name, false)
    }

    fn build(name: &'static str, enabled: bool) -> Arc<Self> {
        Arc::new(Self {
            name,
            enabled: AtomicBool::new(enabled),
            fail_view: AtomicBool::new(false),
            panic_activation: AtomicBool::new(false),
            panic_enabled: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            journal: Mutex::new(None),
        })
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub(crate) fn fail_view_creation(&self) {
        self.fail_view.store(true, Ordering::SeqCst);
    }

    pub(crate) fn panic_on_activation(&self) {
        self.panic_activation.store(true, Ordering::SeqCst);
    }

    pub(crate) fn panic_on_enabled_query(&self) {
        self.panic_enabled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn attach_journal(&self, journal: &Journal) {
        *self.journal.lock().unwrap() = Some(journal.clone());
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub(crate) fn colors(&self) -> Vec<Argb> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Color(color) => Some(color),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn activations(&self) -> Vec<bool> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Active(active) => Some(active),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn fft_frames(&self) -> Vec<(Vec<u8>, u32)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Fft(bytes, rate) => Some((bytes, rate)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn note(&self, what: &str) {
        if let Some(journal) = self.journal.lock().unwrap().as_ref() {
            journal.push(format!("{}:{what}", self.name));
        }
    }
}

impl Listener for RecordingListener {
    fn init_preferences(&self, _prefs: &VisualizerPreferences) {
        self.record(Call::InitPreferences);
    }

    fn on_preference_changed(&self, delta: &PreferenceDelta) {
        self.record(Call::PreferenceChanged(delta.clone()));
    }

    fn on_create_view(&self, parent: &SurfaceContext) -> Result<()> {
        self.record(Call::CreateView(parent.surface));
        if self.fail_view.load(Ordering::SeqCst) {
            return Err(VisualizerError::Listener(format!("{} has no parent", self.name)));
        }
        Ok(())
    }

    fn on_active_state_changed(&self, active: bool) {
        self.note("active");
        if self.panic_activation.load(Ordering::SeqCst) {
            panic!("{} cannot handle activation", self.name);
        }
        self.record(Call::Active(active));
    }

    fn on_media_metadata_updated(
        &self,
        metadata: Option<&MediaMetadata>,
        artwork: Option<&Bitmap>,
    ) {
        self.record(Call::Metadata {
            title: metadata.and_then(|md| md.title.clone()),
            artwork: artwork.is_some(),
        });
    }

    fn on_user_activity(&self) {
        self.record(Call::UserActivity);
    }

    fn on_status_bar_state_changed(&self, old: StatusBarState, new: StatusBarState) {
        self.record(Call::StatusBar(old, new));
    }

    fn on_battery_status_changed(&self, battery: &BatteryData) {
        self.record(Call::Battery(*battery));
    }

    fn on_color_updated(&self, color: Argb) {
        self.record(Call::Color(color));
    }

    fn on_fft_data_capture(&self, fft: &[u8], sampling_rate: u32) {
        self.record(Call::Fft(fft.to_vec(), sampling_rate));
    }

    fn set_vertical_left(&self, left: bool) {
        self.record(Call::VerticalLeft(left));
    }

    fn set_light(&self, light: bool) {
        self.record(Call::Light(light));
    }

    fn is_enabled(&self) -> bool {
        if self.panic_enabled.load(Ordering::SeqCst) {
            panic!("{} lost its view", self.name);
        }
        self.enabled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DeviceEvent {
    Open,
    OpenFailed,
    Enable(bool),
    EnableFailed,
    Configure(CaptureConfig),
    Release,
}

#[derive(Default)]
struct DeviceState {
    events: Vec<DeviceEvent>,
    fail_open: bool,
    fail_enable: bool,
    open_streams: usize,
    max_concurrent: usize,
    enabled: bool,
    sink: Option<Arc<dyn FrameSink>>,
}

/// Capture device that records every lifecycle call.
#[derive(Default)]
pub(crate) struct ScriptedDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl ScriptedDevice {
    pub(crate) const MAX_RATE: u32 = 20_000;

    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail_next_open(&self) {
        self.state.lock().unwrap().fail_open = true;
    }

    pub(crate) fn fail_next_enable(&self) {
        self.state.lock().unwrap().fail_enable = true;
    }

    pub(crate) fn events(&self) -> Vec<DeviceEvent> {
        self.state.lock().unwrap().events.clone()
    }

    pub(crate) fn lifecycle(&self) -> Vec<DeviceEvent> {
        self.events()
            .into_iter()
            .filter(|event| matches!(event, DeviceEvent::Open | DeviceEvent::Release))
            .collect()
    }

    pub(crate) fn count(&self, event: &DeviceEvent) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub(crate) fn open_streams(&self) -> usize {
        self.state.lock().unwrap().open_streams
    }

    pub(crate) fn max_concurrent_streams(&self) -> usize {
        self.state.lock().unwrap().max_concurrent
    }

    /// Pushes a frame through the sink of the enabled stream, if any.
    pub(crate) fn emit(&self, fft: &[u8], sampling_rate: u32) -> bool {
        let sink = {
            let state = self.state.lock().unwrap();
            if !state.enabled {
                return false;
            }
            state.sink.clone()
        };
        match sink {
            Some(sink) => {
                sink.on_fft_frame(fft, sampling_rate);
                true
            }
            None => false,
        }
    }
}

impl CaptureDevice for ScriptedDevice {
    fn open(&self) -> Result<Box<dyn CaptureStream>> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_open) {
            state.events.push(DeviceEvent::OpenFailed);
            return Err(VisualizerError::capture("scripted open failure"));
        }
        state.events.push(DeviceEvent::Open);
        state.open_streams += 1;
        state.max_concurrent = state.max_concurrent.max(state.open_streams);
        Ok(Box::new(ScriptedStream {
            state: self.state.clone(),
        }))
    }

    fn max_capture_rate(&self) -> u32 {
        Self::MAX_RATE
    }
}

struct ScriptedStream {
    state: Arc<Mutex<DeviceState>>,
}

impl CaptureStream for ScriptedStream {
    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if enabled && std::mem::take(&mut state.fail_enable) {
            state.events.push(DeviceEvent::EnableFailed);
            return Err(VisualizerError::capture("scripted enable failure"));
        }
        state.events.push(DeviceEvent::Enable(enabled));
        state.enabled = enabled;
        Ok(())
    }

    fn configure(&mut self, config: &CaptureConfig) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .events
            .push(DeviceEvent::Configure(*config));
        Ok(())
    }

    fn set_sink(&mut self, sink: Arc<dyn FrameSink>) {
        self.state.lock().unwrap().sink = Some(sink);
    }

    fn release(self: Box<Self>) {
        let mut state = self.state.lock().unwrap();
        state.events.push(DeviceEvent::Release);
        state.open_streams -= 1;
        state.enabled = false;
        state.sink = None;
    }
}
