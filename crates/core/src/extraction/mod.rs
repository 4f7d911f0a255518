//! Background palette generation for artwork.

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::{Bitmap, MediaMetadata, Palette, Result};

/// One update from the media session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaSnapshot {
    pub playing: bool,
    pub metadata_changed: bool,
    pub metadata: Option<MediaMetadata>,
}

impl MediaSnapshot {
    pub fn artwork(&self) -> Option<&Arc<Bitmap>> {
        self.metadata.as_ref().and_then(MediaMetadata::artwork)
    }
}

type Completion = Box<dyn FnOnce(Palette) + Send>;

enum Job {
    Extract { artwork: Arc<Bitmap>, done: Completion },
    Flush(Sender<()>),
}

/// Runs palette generation off the caller's thread, one job at a time, in
/// submission order.
pub struct ColorExtractor {
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl ColorExtractor {
    pub fn spawn() -> Result<Self> {
        let (tx, rx) = unbounded();
        let worker = thread::Builder::new()
            .name("color-extractor".into())
            .spawn(move || run(rx))?;
        Ok(Self {
            jobs: Some(tx),
            worker: Some(worker),
        })
    }

    /// Queues `artwork`; `done` receives the palette on the worker thread.
    pub fn submit<F>(&self, artwork: Arc<Bitmap>, done: F)
    where
        F: FnOnce(Palette) + Send + 'static,
    {
        self.send(Job::Extract {
            artwork,
            done: Box::new(done),
        });
    }

    /// Blocks until every job queued so far, completion included, has run.
    pub fn flush(&self) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.send(Job::Flush(tx));
        let _ = rx.recv();
    }

    fn send(&self, job: Job) {
        let sent = self
            .jobs
            .as_ref()
            .map(|jobs| jobs.send(job).is_ok())
            .unwrap_or(false);
        if !sent {
            tracing::warn!("color extractor is not running; job dropped");
        }
    }
}

impl Drop for ColorExtractor {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            // A completion may hold the last reference to our owner, in which
            // case we are being dropped on the worker itself.
            if worker.thread().id() != thread::current().id() && worker.join().is_err() {
                tracing::error!("color extractor panicked");
            }
        }
    }
}

impl fmt::Debug for ColorExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColorExtractor")
            .field("running", &self.jobs.is_some())
            .finish()
    }
}

fn run(jobs: Receiver<Job>) {
    for job in jobs.iter() {
        match job {
            Job::Extract { artwork, done } => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    let palette = Palette::generate(&artwork);
                    tracing::debug!(
                        swatches = palette.swatches.len(),
                        vibrant = ?palette.vibrant_color(),
                        "palette generated"
                    );
                    done(palette);
                }));
                if outcome.is_err() {
                    tracing::error!("color extraction failed");
                }
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
