use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use clap::{Parser, Subcommand};
use spectrum_coordinator_core::{
    palette, Argb, BatteryData, Bitmap, EventHost, Hook, HostEvent, Listener, MediaMetadata,
    MediaSnapshot, Palette, PowerSaveMonitor, PreferenceDelta, Result, SpectrumCapture, Surface,
    SurfaceContext, VisualizerController, VisualizerPreferences,
};
use tracing_subscriber::EnvFilter;

const SAMPLE_RATE: u32 = 44_100;
const BLOCK_SIZE: usize = 1_024;

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            prefs,
            tone_hz,
            seconds,
        } => run_simulation(prefs.as_ref(), tone_hz, seconds),
        Commands::Swatches { image, colors } => run_swatches(image.as_ref(), &colors),
    }
}

fn run_simulation(prefs: Option<&PathBuf>, tone_hz: f32, seconds: f32) -> Result<()> {
    let prefs = match prefs {
        Some(path) => VisualizerPreferences::load(path)?,
        None => VisualizerPreferences::default(),
    };
    tracing::info!(?prefs, tone_hz, seconds, "starting simulation");

    let capture = SpectrumCapture::new();
    let listeners: Arc<std::sync::Mutex<Vec<Arc<LogListener>>>> = Arc::default();
    let created = listeners.clone();
    let factory = move |surface: Surface| -> Arc<dyn Listener> {
        let listener = Arc::new(LogListener::new(surface));
        if let Ok(mut created) = created.lock() {
            created.push(listener.clone());
        }
        listener
    };

    let controller = VisualizerController::builder(prefs, Arc::new(capture.clone()))
        .power_monitor(Arc::new(LogPowerMonitor))
        .listener_factory(Arc::new(factory))
        .build()?;
    controller.attach_hooks(&LoopbackHost);

    for context in [
        SurfaceContext::new(Surface::Lockscreen, 1080, 600),
        SurfaceContext::new(Surface::Navbar, 1080, 48),
    ] {
        if let Err(err) = controller.handle(HostEvent::SurfaceInflated(context)) {
            tracing::warn!(error = %err, "surface listener was not attached");
        }
    }

    let artwork = palette::striped(
        &[
            Argb::from_rgb(0xE0, 0x30, 0x40),
            Argb::from_rgb(0xF4, 0xA0, 0xB0),
            Argb::from_rgb(0x30, 0x10, 0x60),
        ],
        16,
        48,
    );
    controller.handle(HostEvent::MediaMetadataUpdated(MediaSnapshot {
        playing: true,
        metadata_changed: true,
        metadata: Some(MediaMetadata {
            title: Some("Simulated tone".into()),
            art: Some(Arc::new(artwork)),
            ..Default::default()
        }),
    }))?;
    controller.wait_idle();

    let total_samples = (seconds.max(0.0) * SAMPLE_RATE as f32) as usize;
    let half = total_samples / 2;
    let mut tone = Tone::new(tone_hz, SAMPLE_RATE);

    let frames = feed(&capture, &mut tone, half)?;
    tracing::info!(frames, "first half captured");

    controller.handle(HostEvent::ScreenOff)?;
    controller.wait_idle();
    let dropped = feed(&capture, &mut tone, SAMPLE_RATE as usize / 4)?;
    tracing::info!(frames = dropped, "captured while the screen was off");

    controller.handle(HostEvent::ScreenOn)?;
    controller.handle(HostEvent::PreferencesChanged(
        PreferenceDelta::new().with_opacity_percent(80),
    ))?;
    controller.handle(HostEvent::BatteryStatusChanged(BatteryData {
        level: 64,
        charging: true,
        power_saving: false,
    }))?;
    controller.wait_idle();

    let frames = feed(&capture, &mut tone, total_samples - half)?;
    tracing::info!(frames, "second half captured");

    for listener in listeners.lock().map(|l| l.clone()).unwrap_or_default() {
        tracing::info!(
            surface = ?listener.surface,
            frames = listener.frames.load(Ordering::Relaxed),
            "listener summary"
        );
    }
    tracing::info!(
        color = %controller.composed_color()?,
        active = controller.is_active()?,
        "simulation finished"
    );
    Ok(())
}

fn run_swatches(image: Option<&PathBuf>, colors: &[String]) -> Result<()> {
    let artwork = match image {
        Some(path) => palette::open(path)?,
        None => {
            let colors = colors
                .iter()
                .map(|color| color.parse::<Argb>())
                .collect::<Result<Vec<_>>>()?;
            palette::striped(&colors, 8, 8)
        }
    };
    let palette = Palette::generate(&artwork);

    let show = |color: Option<Argb>| color.map(|c| c.to_string()).unwrap_or_else(|| "-".into());
    println!("light vibrant: {}", show(palette.light_vibrant_color()));
    println!("vibrant:       {}", show(palette.vibrant_color()));
    println!("dark vibrant:  {}", show(palette.dark_vibrant_color()));
    println!("resolved:      {}", palette.resolve_color(Argb::WHITE));
    Ok(())
}

fn feed(capture: &SpectrumCapture, tone: &mut Tone, samples: usize) -> Result<usize> {
    let mut frames = 0;
    let mut remaining = samples;
    while remaining > 0 {
        let block = tone.next_block(remaining.min(BLOCK_SIZE));
        frames += capture.feed(&block, SAMPLE_RATE)?;
        remaining -= block.len();
    }
    Ok(frames)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

struct Tone {
    phase: f32,
    step: f32,
}

impl Tone {
    fn new(frequency: f32, sample_rate: u32) -> Self {
        Self {
            phase: 0.0,
            step: std::f32::consts::TAU * frequency / sample_rate as f32,
        }
    }

    fn next_block(&mut self, len: usize) -> Vec<f32> {
        (0..len)
            .map(|_| {
                let sample = self.phase.sin() * 0.8;
                self.phase = (self.phase + self.step) % std::f32::consts::TAU;
                sample
            })
            .collect()
    }
}

/// Host that accepts every subscription; events are injected by this binary.
struct LoopbackHost;

impl EventHost for LoopbackHost {
    fn attach(&self, hook: Hook) -> Result<()> {
        tracing::debug!(%hook, "hook attached");
        Ok(())
    }
}

struct LogPowerMonitor;

impl PowerSaveMonitor for LogPowerMonitor {
    fn is_power_saving(&self) -> bool {
        false
    }

    fn subscribe(&self) {
        tracing::debug!("power saving updates subscribed");
    }

    fn unsubscribe(&self) {
        tracing::debug!("power saving updates unsubscribed");
    }
}

/// Listener that logs what it would render.
struct LogListener {
    surface: Surface,
    frames: AtomicUsize,
}

impl LogListener {
    fn new(surface: Surface) -> Self {
        Self {
            surface,
            frames: AtomicUsize::new(0),
        }
    }
}

impl Listener for LogListener {
    fn init_preferences(&self, prefs: &VisualizerPreferences) {
        tracing::info!(
            surface = ?self.surface,
            opacity = prefs.opacity_percent,
            "preferences initialised"
        );
    }

    fn on_preference_changed(&self, delta: &PreferenceDelta) {
        tracing::info!(surface = ?self.surface, ?delta, "preferences changed");
    }

    fn on_create_view(&self, parent: &SurfaceContext) -> Result<()> {
        tracing::info!(
            surface = ?self.surface,
            width = parent.width,
            height = parent.height,
            "view created"
        );
        Ok(())
    }

    fn on_active_state_changed(&self, active: bool) {
        tracing::info!(surface = ?self.surface, active, "active state changed");
    }

    fn on_media_metadata_updated(
        &self,
        metadata: Option<&MediaMetadata>,
        artwork: Option<&Bitmap>,
    ) {
        tracing::info!(
            surface = ?self.surface,
            title = ?metadata.and_then(|md| md.title.as_deref()),
            artwork = artwork.is_some(),
            "metadata updated"
        );
    }

    fn on_color_updated(&self, color: Argb) {
        tracing::info!(surface = ?self.surface, %color, "color updated");
    }

    fn on_fft_data_capture(&self, fft: &[u8], sampling_rate: u32) {
        let count = self.frames.fetch_add(1, Ordering::Relaxed);
        let Some(bins) = fft.get(2..) else {
            return;
        };
        if count % 10 == 0 {
            let peak = bins
                .chunks_exact(2)
                .enumerate()
                .map(|(bin, pair)| {
                    let (re, im) = (pair[0] as i8 as f32, pair[1] as i8 as f32);
                    (bin + 1, (re * re + im * im).sqrt())
                })
                .fold((0, 0.0_f32), |best, bin| if bin.1 > best.1 { bin } else { best });
            let hz = peak.0 as f32 * sampling_rate as f32 / fft.len() as f32;
            tracing::debug!(
                surface = ?self.surface,
                peak_hz = hz,
                magnitude = peak.1,
                "spectrum frame"
            );
        }
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-spectrum capture coordinator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the coordinator with a synthetic tone and logging listeners.
    Simulate {
        /// Optional JSON preferences file.
        #[arg(short, long)]
        prefs: Option<PathBuf>,
        /// Frequency of the generated tone.
        #[arg(long, default_value_t = 440.0)]
        tone_hz: f32,
        /// Seconds of audio to feed.
        #[arg(long, default_value_t = 2.0)]
        seconds: f32,
    },
    /// Print the vibrant swatches extracted from artwork.
    Swatches {
        /// PNG or JPEG artwork to analyse.
        #[arg(short, long, conflicts_with = "colors")]
        image: Option<PathBuf>,
        /// Colors as #RRGGBB or #AARRGGBB, laid out as vertical stripes.
        #[arg(required_unless_present = "image")]
        colors: Vec<String>,
    },
}
