//! Software capture device that turns PCM blocks into spectrum frames.

use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{CaptureConfig, CaptureDevice, CaptureStream, FrameSink, Result, VisualizerError};

/// 20 frames per second.
pub const DEFAULT_MAX_CAPTURE_RATE: u32 = 20_000;

/// Exclusive capture device fed by the host audio path.
///
/// At most one stream can be open at a time. While that stream is enabled,
/// [`SpectrumCapture::feed`] emits one packed spectrum frame per capture
/// interval to the stream's sink.
#[derive(Clone)]
pub struct SpectrumCapture {
    tap: Arc<Mutex<Tap>>,
    max_capture_rate: u32,
}

impl SpectrumCapture {
    pub fn new() -> Self {
        Self::with_max_capture_rate(DEFAULT_MAX_CAPTURE_RATE)
    }

    pub fn with_max_capture_rate(max_capture_rate: u32) -> Self {
        Self {
            tap: Arc::new(Mutex::new(Tap::default())),
            max_capture_rate: max_capture_rate.max(1),
        }
    }

    /// Feeds mono samples in `[-1.0, 1.0]` and returns how many frames were
    /// delivered. Samples fed while no stream is enabled are discarded.
    pub fn feed(&self, samples: &[f32], sample_rate: u32) -> Result<usize> {
        let (frames, sink) = {
            let mut tap = lock_tap(&self.tap)?;
            tap.collect_frames(samples, sample_rate)?
        };

        let Some(sink) = sink else {
            return Ok(0);
        };
        for frame in &frames {
            sink.on_fft_frame(frame, sample_rate);
        }
        Ok(frames.len())
    }

    pub fn is_open(&self) -> Result<bool> {
        Ok(lock_tap(&self.tap)?.open)
    }

    pub fn is_enabled(&self) -> Result<bool> {
        Ok(lock_tap(&self.tap)?.enabled)
    }
}

impl Default for SpectrumCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDevice for SpectrumCapture {
    fn open(&self) -> Result<Box<dyn CaptureStream>> {
        let mut tap = lock_tap(&self.tap)?;
        if tap.open {
            return Err(VisualizerError::capture("spectrum capture is already in use"));
        }
        tap.open = true;
        Ok(Box::new(SpectrumStream {
            tap: self.tap.clone(),
        }))
    }

    fn max_capture_rate(&self) -> u32 {
        self.max_capture_rate
    }
}

impl fmt::Debug for SpectrumCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumCapture")
            .field("max_capture_rate", &self.max_capture_rate)
            .finish()
    }
}

struct SpectrumStream {
    tap: Arc<Mutex<Tap>>,
}

impl CaptureStream for SpectrumStream {
    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        let mut tap = lock_tap(&self.tap)?;
        if enabled && (tap.config.is_none() || tap.sink.is_none()) {
            return Err(VisualizerError::capture(
                "spectrum capture must be configured before it is enabled",
            ));
        }
        tap.enabled = enabled;
        tap.history.clear();
        tap.samples_since_frame = 0;
        Ok(())
    }

    fn configure(&mut self, config: &CaptureConfig) -> Result<()> {
        if config.capture_size < 2 {
            return Err(VisualizerError::capture("capture size must be at least two samples"));
        }
        if config.waveform || !config.fft {
            return Err(VisualizerError::capture(
                "spectrum capture only produces frequency frames",
            ));
        }
        let mut tap = lock_tap(&self.tap)?;
        if tap.enabled {
            return Err(VisualizerError::capture("cannot reconfigure an enabled stream"));
        }
        tap.config = Some(*config);
        Ok(())
    }

    fn set_sink(&mut self, sink: Arc<dyn FrameSink>) {
        if let Ok(mut tap) = lock_tap(&self.tap) {
            tap.sink = Some(sink);
        }
    }

    fn release(self: Box<Self>) {
        match lock_tap(&self.tap) {
            Ok(mut tap) => tap.close(),
            Err(err) => tracing::error!(error = %err, "failed to release spectrum capture"),
        }
    }
}

struct Tap {
    open: bool,
    enabled: bool,
    config: Option<CaptureConfig>,
    sink: Option<Arc<dyn FrameSink>>,
    history: VecDeque<f32>,
    samples_since_frame: usize,
    planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl Default for Tap {
    fn default() -> Self {
        Self {
            open: false,
            enabled: false,
            config: None,
            sink: None,
            history: VecDeque::new(),
            samples_since_frame: 0,
            planner: RealFftPlanner::new(),
            fft: None,
        }
    }
}

impl Tap {
    fn close(&mut self) {
        self.open = false;
        self.enabled = false;
        self.config = None;
        self.sink = None;
        self.history.clear();
        self.samples_since_frame = 0;
    }

    fn collect_frames(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<(Vec<Vec<u8>>, Option<Arc<dyn FrameSink>>)> {
        let config = match (self.enabled, self.config) {
            (true, Some(config)) => config,
            _ => return Ok((Vec::new(), None)),
        };
        if sample_rate == 0 {
            return Err(VisualizerError::capture("sample rate must be positive"));
        }

        let interval = frame_interval(sample_rate, config.capture_rate_mhz);
        let mut frames = Vec::new();
        for sample in samples {
            if self.history.len() == config.capture_size {
                self.history.pop_front();
            }
            self.history.push_back(*sample);
            self.samples_since_frame += 1;

            if self.samples_since_frame >= interval && self.history.len() == config.capture_size {
                self.samples_since_frame = 0;
                frames.push(self.spectrum_frame(config.capture_size)?);
            }
        }

        Ok((frames, self.sink.clone()))
    }

    /// Packs the spectrum as `[Re(0), Re(n/2), Re(1), Im(1), ...]`, each
    /// value scaled so a full-scale tone on a bin reaches 127.
    fn spectrum_frame(&mut self, size: usize) -> Result<Vec<u8>> {
        let fft = prepare_fft(&mut self.planner, &mut self.fft, size);
        for (slot, sample) in fft.input.iter_mut().zip(self.history.iter()) {
            *slot = *sample;
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)
            .map_err(|err| VisualizerError::capture(format!("fft failed: {err}")))?;

        let scale = 2.0 / size as f32;
        let half = size / 2;
        let mut frame = Vec::with_capacity(size);
        frame.push(quantize(fft.spectrum[0].re, scale));
        frame.push(quantize(fft.spectrum[half].re, scale));
        for bin in &fft.spectrum[1..half] {
            frame.push(quantize(bin.re, scale));
            frame.push(quantize(bin.im, scale));
        }
        Ok(frame)
    }
}

fn prepare_fft<'a>(
    planner: &mut RealFftPlanner<f32>,
    slot: &'a mut Option<FftResources>,
    size: usize,
) -> &'a mut FftResources {
    if slot.as_ref().map(|fft| fft.size != size).unwrap_or(false) {
        *slot = None;
    }

    slot.get_or_insert_with(|| {
        let plan = planner.plan_fft_forward(size);
        FftResources {
            size,
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        }
    })
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

fn lock_tap(tap: &Mutex<Tap>) -> Result<MutexGuard<'_, Tap>> {
    tap.lock()
        .map_err(|_| VisualizerError::Poisoned("spectrum capture"))
}

/// Samples between two frames for a capture rate given in milli-hertz.
fn frame_interval(sample_rate: u32, capture_rate_mhz: u32) -> usize {
    let interval = sample_rate as u64 * 1000 / capture_rate_mhz.max(1) as u64;
    interval.max(1) as usize
}

fn quantize(value: f32, scale: f32) -> u8 {
    (value * scale * 127.0).round().clamp(-128.0, 127.0) as i8 as u8
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;
    use crate::CAPTURE_SIZE;

    #[derive(Default)]
    struct Collector {
        frames: Mutex<Vec<(Vec<u8>, u32)>>,
    }

    impl FrameSink for Collector {
        fn on_fft_frame(&self, fft: &[u8], sampling_rate: u32) {
            self.frames.lock().unwrap().push((fft.to_vec(), sampling_rate));
        }
    }

    fn enabled_stream(capture: &SpectrumCapture, sink: Arc<Collector>) -> Box<dyn CaptureStream> {
        let mut stream = capture.open().unwrap();
        stream.set_enabled(false).unwrap();
        stream
            .configure(&CaptureConfig::spectrum(capture.max_capture_rate()))
            .unwrap();
        stream.set_sink(sink);
        stream.set_enabled(true).unwrap();
        stream
    }

    fn tone(bin: usize, sample_rate: u32, len: usize) -> Vec<f32> {
        let frequency = bin as f32 * sample_rate as f32 / CAPTURE_SIZE as f32;
        (0..len)
            .map(|n| (2.0 * PI * frequency * n as f32 / sample_rate as f32).cos())
            .collect()
    }

    fn magnitude(frame: &[u8], bin: usize) -> f32 {
        let re = frame[2 * bin] as i8 as f32;
        let im = frame[2 * bin + 1] as i8 as f32;
        (re * re + im * im).sqrt()
    }

    #[test]
    fn device_is_exclusive() {
        let capture = SpectrumCapture::new();
        let stream = capture.open().unwrap();
        assert!(capture.open().is_err());

        stream.release();
        assert!(!capture.is_open().unwrap());
        assert!(capture.open().is_ok());
    }

    #[test]
    fn emits_frames_at_capture_rate() {
        let capture = SpectrumCapture::new();
        let sink = Arc::new(Collector::default());
        let _stream = enabled_stream(&capture, sink.clone());

        // 6600 Hz at 20 frames per second gives a frame every 330 samples.
        let delivered = capture.feed(&tone(5, 6_600, 660), 6_600).unwrap();

        assert_eq!(delivered, 2);
        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|(frame, rate)| frame.len() == CAPTURE_SIZE && *rate == 6_600));
    }

    #[test]
    fn tone_peaks_on_its_bin() {
        let capture = SpectrumCapture::new();
        let sink = Arc::new(Collector::default());
        let _stream = enabled_stream(&capture, sink.clone());

        capture.feed(&tone(5, 6_600, 330), 6_600).unwrap();

        let frames = sink.frames.lock().unwrap();
        let (frame, _) = &frames[0];
        let peak = magnitude(frame, 5);
        assert!(peak > 120.0, "peak magnitude was {peak}");
        for bin in (1..CAPTURE_SIZE / 2).filter(|bin| *bin != 5) {
            assert!(magnitude(frame, bin) < 4.0, "leak on bin {bin}");
        }
    }

    #[test]
    fn disabled_stream_drops_samples() {
        let capture = SpectrumCapture::new();
        let sink = Arc::new(Collector::default());
        let mut stream = enabled_stream(&capture, sink.clone());
        stream.set_enabled(false).unwrap();

        assert_eq!(capture.feed(&tone(3, 6_600, 1_000), 6_600).unwrap(), 0);
        assert!(sink.frames.lock().unwrap().is_empty());
    }

    #[test]
    fn refuses_enable_before_configuration() {
        let capture = SpectrumCapture::new();
        let mut stream = capture.open().unwrap();
        assert!(stream.set_enabled(true).is_err());

        let waveform = CaptureConfig {
            waveform: true,
            ..CaptureConfig::spectrum(DEFAULT_MAX_CAPTURE_RATE)
        };
        assert!(stream.configure(&waveform).is_err());
    }

    #[test]
    fn frame_interval_never_reaches_zero() {
        assert_eq!(frame_interval(48_000, 20_000), 2_400);
        assert_eq!(frame_interval(10, 1_000_000), 1);
    }
}
