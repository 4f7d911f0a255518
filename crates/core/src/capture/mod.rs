//! Exclusive capture resource and the worker that owns it.
//!
//! Acquire and release requests are queued to a single background thread,
//! so callers never block on device setup and two lifecycle operations can
//! never overlap.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::{CaptureConfig, Result};

/// Receives spectrum frames from an enabled capture stream.
pub trait FrameSink: Send + Sync {
    /// `sampling_rate` is in hertz.
    fn on_fft_frame(&self, fft: &[u8], sampling_rate: u32);
}

/// Factory for the exclusive capture stream.
pub trait CaptureDevice: Send + Sync {
    /// Fails when the stream cannot be created, including when it is
    /// already open.
    fn open(&self) -> Result<Box<dyn CaptureStream>>;

    /// Fastest supported frame rate, in milli-hertz.
    fn max_capture_rate(&self) -> u32;
}

/// An open capture stream. Dropped only through [`CaptureStream::release`].
pub trait CaptureStream: Send {
    fn set_enabled(&mut self, enabled: bool) -> Result<()>;
    fn configure(&mut self, config: &CaptureConfig) -> Result<()>;
    fn set_sink(&mut self, sink: Arc<dyn FrameSink>);
    fn release(self: Box<Self>);
}

enum Task {
    Acquire,
    Release,
    Flush(Sender<()>),
}

/// Owns the capture stream on a dedicated worker thread.
pub struct CaptureResourceManager {
    tasks: Option<Sender<Task>>,
    worker: Option<JoinHandle<()>>,
    acquired: Arc<AtomicBool>,
}

impl CaptureResourceManager {
    /// Starts the worker. Frames from every acquired stream go to `sink`.
    pub fn spawn(device: Arc<dyn CaptureDevice>, sink: Arc<dyn FrameSink>) -> Result<Self> {
        let (tx, rx) = unbounded();
        let acquired = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            device,
            sink,
            stream: None,
            acquired: acquired.clone(),
        };
        let handle = thread::Builder::new()
            .name("capture-worker".into())
            .spawn(move || worker.run(rx))?;

        Ok(Self {
            tasks: Some(tx),
            worker: Some(handle),
            acquired,
        })
    }

    /// Queues creation, configuration and enabling of the stream.
    pub fn acquire(&self) {
        self.submit(Task::Acquire);
    }

    /// Queues disabling and releasing the stream, if one is held.
    pub fn release(&self) {
        self.submit(Task::Release);
    }

    /// Blocks until every task queued so far has run.
    pub fn flush(&self) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.submit(Task::Flush(tx));
        let _ = rx.recv();
    }

    /// Whether the worker currently holds an enabled stream.
    pub fn is_acquired(&self) -> bool {
        self.acquired.load(Ordering::Acquire)
    }

    fn submit(&self, task: Task) {
        let delivered = self
            .tasks
            .as_ref()
            .map(|tasks| tasks.send(task).is_ok())
            .unwrap_or(false);
        if !delivered {
            tracing::warn!("capture worker is not running; task dropped");
        }
    }
}

impl Drop for CaptureResourceManager {
    fn drop(&mut self) {
        // Closing the queue lets the worker drain it and release the stream.
        self.tasks.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("capture worker panicked");
            }
        }
    }
}

impl fmt::Debug for CaptureResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureResourceManager")
            .field("acquired", &self.is_acquired())
            .finish()
    }
}

struct Worker {
    device: Arc<dyn CaptureDevice>,
    sink: Arc<dyn FrameSink>,
    stream: Option<Box<dyn CaptureStream>>,
    acquired: Arc<AtomicBool>,
}

impl Worker {
    fn run(mut self, tasks: Receiver<Task>) {
        for task in tasks.iter() {
            match task {
                Task::Acquire => self.acquire(),
                Task::Release => self.release(),
                Task::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        self.release();
        tracing::debug!("capture worker stopped");
    }

    fn acquire(&mut self) {
        if self.stream.is_some() {
            tracing::warn!("capture stream already held; acquire ignored");
            return;
        }

        let mut stream = match self.device.open() {
            Ok(stream) => stream,
            Err(err) => {
                tracing::error!(error = %err, "error initializing capture stream");
                return;
            }
        };

        let config = CaptureConfig::spectrum(self.device.max_capture_rate());
        match self.start(&mut *stream, &config) {
            Ok(()) => {
                tracing::debug!(?config, "capture stream enabled");
                self.stream = Some(stream);
                self.acquired.store(true, Ordering::Release);
            }
            Err(err) => {
                tracing::error!(error = %err, "error configuring capture stream");
                stream.release();
            }
        }
    }

    fn start(&self, stream: &mut dyn CaptureStream, config: &CaptureConfig) -> Result<()> {
        stream.set_enabled(false)?;
        stream.configure(config)?;
        stream.set_sink(self.sink.clone());
        stream.set_enabled(true)
    }

    fn release(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        if let Err(err) = stream.set_enabled(false) {
            tracing::warn!(error = %err, "failed to disable capture stream before release");
        }
        stream.release();
        self.acquired.store(false, Ordering::Release);
        tracing::debug!("capture stream released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{DeviceEvent, ScriptedDevice};

    struct NullSink;

    impl FrameSink for NullSink {
        fn on_fft_frame(&self, _fft: &[u8], _sampling_rate: u32) {}
    }

    fn manager(device: &Arc<ScriptedDevice>) -> CaptureResourceManager {
        CaptureResourceManager::spawn(device.clone(), Arc::new(NullSink)).unwrap()
    }

    #[test]
    fn acquire_configures_then_enables() {
        let device = ScriptedDevice::new();
        let capture = manager(&device);

        capture.acquire();
        capture.flush();

        assert!(capture.is_acquired());
        assert_eq!(
            device.events(),
            vec![
                DeviceEvent::Open,
                DeviceEvent::Enable(false),
                DeviceEvent::Configure(CaptureConfig::spectrum(ScriptedDevice::MAX_RATE)),
                DeviceEvent::Enable(true),
            ]
        );
    }

    #[test]
    fn release_without_stream_is_a_no_op() {
        let device = ScriptedDevice::new();
        let capture = manager(&device);

        capture.release();
        capture.flush();

        assert!(device.events().is_empty());
        assert!(!capture.is_acquired());
    }

    #[test]
    fn open_failure_leaves_resource_unset() {
        let device = ScriptedDevice::new();
        device.fail_next_open();
        let capture = manager(&device);

        capture.acquire();
        capture.release();
        capture.flush();

        assert!(!capture.is_acquired());
        assert_eq!(device.events(), vec![DeviceEvent::OpenFailed]);
    }

    #[test]
    fn enable_failure_releases_half_configured_stream() {
        let device = ScriptedDevice::new();
        device.fail_next_enable();
        let capture = manager(&device);

        capture.acquire();
        capture.flush();

        assert!(!capture.is_acquired());
        assert_eq!(device.events().last(), Some(&DeviceEvent::Release));
        assert_eq!(device.open_streams(), 0);
    }

    #[test]
    fn rapid_toggling_is_serialized() {
        let device = ScriptedDevice::new();
        let capture = manager(&device);

        for _ in 0..50 {
            capture.acquire();
            capture.release();
        }
        capture.acquire();
        capture.acquire();
        capture.flush();

        assert_eq!(device.max_concurrent_streams(), 1);
        assert_eq!(device.count(&DeviceEvent::Open), 51);
        assert_eq!(device.count(&DeviceEvent::Release), 50);
        assert!(capture.is_acquired());
    }

    #[test]
    fn drop_releases_held_stream() {
        let device = ScriptedDevice::new();
        let capture = manager(&device);
        capture.acquire();
        drop(capture);

        assert_eq!(device.open_streams(), 0);
        assert_eq!(device.events().last(), Some(&DeviceEvent::Release));
    }
}
