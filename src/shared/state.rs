//! State shared between pipeline threads and the UI thread

use parking_lot::Mutex;
use std::sync::Arc;

use crate::capture::frame::Frame;
use crate::vision::DispatchSnapshot;

/// Newest captured frame waiting to be shown.
///
/// The capture side overwrites it; the UI takes it. Frames the UI never
/// picked up are simply replaced.
#[derive(Debug, Default)]
pub struct PreviewSlot {
    frame: Mutex<Option<Arc<Frame>>>,
}

impl PreviewSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: Arc<Frame>) {
        *self.frame.lock() = Some(frame);
    }

    pub fn take(&self) -> Option<Arc<Frame>> {
        self.frame.lock().take()
    }
}

/// Snapshot of the pipeline counters for the status bar
#[derive(Debug, Clone, Default)]
pub struct PipelineStatus {
    /// Capture device name
    pub device: String,
    /// Whether capture is still producing frames
    pub capturing: bool,
    pub frames_captured: u64,
    /// Frames replaced before delivery
    pub frames_dropped: u64,
    pub dispatch: DispatchSnapshot,
}
