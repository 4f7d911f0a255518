use std::{fmt, sync::Arc};

use crate::{FrameSink, ListenerRegistry};

/// Forwards each captured frame to the listeners enabled at that moment.
///
/// Frames are neither buffered nor queued: every frame reaches all enabled
/// listeners before the capture stream can hand over the next one, and
/// disabled listeners simply miss it.
pub struct FrameDispatcher {
    registry: Arc<ListenerRegistry>,
}

impl FrameDispatcher {
    pub fn new(registry: Arc<ListenerRegistry>) -> Self {
        Self { registry }
    }
}

impl FrameSink for FrameDispatcher {
    fn on_fft_frame(&self, fft: &[u8], sampling_rate: u32) {
        let delivered = self
            .registry
            .dispatch_enabled("on_fft_data_capture", |listener| {
                listener.on_fft_data_capture(fft, sampling_rate)
            });
        tracing::trace!(bytes = fft.len(), delivered, "spectrum frame dispatched");
    }
}

impl fmt::Debug for FrameDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameDispatcher")
            .field("registry", &self.registry)
            .finish()
    }
}
