//! Video Capture Layer
//!
//! Pulls frames from a capture device on a background thread and hands the
//! most recent one to a registered callback on a second thread, so neither
//! the UI nor the device ever waits on a slow consumer.

pub mod frame;
pub mod image_sequence;
pub mod test_pattern;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::capture::frame::{Frame, Orientation};
use crate::capture::image_sequence::ImageSequenceDevice;
use crate::capture::test_pattern::TestPatternDevice;

/// Device name selecting the built-in synthetic source
pub const TEST_PATTERN_DEVICE: &str = "test-pattern";

/// How often the delivery thread re-checks the running flag while idle
const DELIVERY_POLL: Duration = Duration::from_millis(50);

/// Capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Device name or image directory
    pub device: String,
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Frames per second to produce (0 = as fast as the device allows)
    pub max_fps: u32,
    /// Orientation tag attached to every frame
    pub orientation: Orientation,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: TEST_PATTERN_DEVICE.to_string(),
            width: 640,
            height: 480,
            max_fps: 30,
            orientation: Orientation::Up,
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device {device:?} is unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },
    #[error("failed to configure input for {device:?}: {reason}")]
    InputConfigurationFailed { device: String, reason: String },
    #[error("failed to read from {device:?}: {reason}")]
    Read { device: String, reason: String },
}

/// A source of frames. Implementations block in `next_frame` until the next
/// frame is due, which is what paces the capture thread.
pub trait CaptureDevice: Send {
    fn name(&self) -> &str;

    /// Acquire and configure the device
    fn open(&mut self, config: &CaptureConfig) -> Result<(), CaptureError>;

    /// Next frame, or `None` at end of stream
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Release the device
    fn close(&mut self) {}
}

/// Pick a device implementation for the configured device name
pub fn open_device(config: &CaptureConfig) -> Box<dyn CaptureDevice> {
    if config.device == TEST_PATTERN_DEVICE {
        Box::new(TestPatternDevice::new())
    } else {
        Box::new(ImageSequenceDevice::new(PathBuf::from(&config.device)))
    }
}

/// Sleeps until the next frame slot for a fixed frame rate
#[derive(Debug)]
pub struct FramePacer {
    interval: Option<Duration>,
    next_due: Option<Instant>,
}

impl FramePacer {
    pub fn new(fps: u32) -> Self {
        let interval = (fps > 0).then(|| Duration::from_secs_f64(1.0 / fps as f64));
        Self {
            interval,
            next_due: None,
        }
    }

    /// Block until the next frame is due
    pub fn wait(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            thread::sleep(due - now);
        }
        // Never try to catch up on missed slots
        self.next_due = Some(due.max(now) + interval);
    }
}

/// Counters shared with the capture thread
#[derive(Debug, Default)]
pub struct CaptureStats {
    frames_captured: AtomicU64,
    frames_dropped: AtomicU64,
}

impl CaptureStats {
    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    /// Frames replaced in the hand-off slot before the consumer took them
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }
}

/// Callback receiving every delivered frame
pub type FrameCallback = Box<dyn FnMut(Frame) + Send>;

/// Owned capture session with an explicit start/stop lifecycle
pub struct FrameSource {
    config: CaptureConfig,
    device_name: String,
    device: Option<Box<dyn CaptureDevice>>,
    on_frame: Option<FrameCallback>,
    running: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
    capture_handle: Option<JoinHandle<Box<dyn CaptureDevice>>>,
    delivery_handle: Option<JoinHandle<FrameCallback>>,
}

impl FrameSource {
    /// Create a stopped source around a device and a frame callback
    pub fn new(
        config: CaptureConfig,
        device: Box<dyn CaptureDevice>,
        on_frame: impl FnMut(Frame) + Send + 'static,
    ) -> Self {
        Self {
            config,
            device_name: device.name().to_string(),
            device: Some(device),
            on_frame: Some(Box::new(on_frame)),
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(CaptureStats::default()),
            capture_handle: None,
            delivery_handle: None,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        self.stats.clone()
    }

    /// Whether the capture thread is still producing frames
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Open the device and start the capture and delivery threads.
    ///
    /// Device errors are returned here and nothing is spawned.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.capture_handle.is_some() {
            if self.is_running() {
                return Ok(());
            }
            // The stream ended on its own; reclaim the device before reopening
            self.stop();
        }

        let (mut device, on_frame) = match (self.device.take(), self.on_frame.take()) {
            (Some(device), Some(on_frame)) => (device, on_frame),
            (device, on_frame) => {
                // Keep whichever half survived the panicked session
                self.device = device;
                self.on_frame = on_frame;
                return Err(CaptureError::DeviceUnavailable {
                    device: self.device_name.clone(),
                    reason: "device was lost by a previous capture session".to_string(),
                });
            }
        };

        if let Err(e) = device.open(&self.config) {
            self.device = Some(device);
            self.on_frame = Some(on_frame);
            return Err(e);
        }

        info!(
            "Capture started on {} ({}x{} @ {} fps)",
            self.device_name, self.config.width, self.config.height, self.config.max_fps
        );

        // One-slot hand-off: the capture thread keeps a receiver to evict stale frames
        let (frame_tx, frame_rx) = bounded::<Frame>(1);
        let evict_rx = frame_rx.clone();

        self.running.store(true, Ordering::Release);

        let running = self.running.clone();
        let stats = self.stats.clone();
        self.capture_handle = Some(thread::spawn(move || {
            capture_loop(device, frame_tx, evict_rx, running, stats)
        }));

        let running = self.running.clone();
        self.delivery_handle = Some(thread::spawn(move || {
            delivery_loop(frame_rx, on_frame, running)
        }));

        Ok(())
    }

    /// Stop both threads and take back the device and callback
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);

        if let Some(handle) = self.capture_handle.take() {
            match handle.join() {
                Ok(mut device) => {
                    device.close();
                    self.device = Some(device);
                }
                Err(_) => error!("Capture thread for {} panicked", self.device_name),
            }
        }

        if let Some(handle) = self.delivery_handle.take() {
            match handle.join() {
                Ok(on_frame) => self.on_frame = Some(on_frame),
                Err(_) => error!("Frame delivery thread for {} panicked", self.device_name),
            }
        }

        debug!("Capture stopped on {}", self.device_name);
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(
    mut device: Box<dyn CaptureDevice>,
    frame_tx: Sender<Frame>,
    evict_rx: Receiver<Frame>,
    running: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
) -> Box<dyn CaptureDevice> {
    while running.load(Ordering::Acquire) {
        let frame = match device.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("Capture device {} reached end of stream", device.name());
                break;
            }
            Err(e) => {
                error!("Capture lost: {}", e);
                break;
            }
        };
        stats.frames_captured.fetch_add(1, Ordering::Relaxed);

        match frame_tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                // Most recent wins: evict the undelivered frame and retry once
                if evict_rx.try_recv().is_ok() {
                    stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                }
                if let Err(TrySendError::Disconnected(_)) = frame_tx.try_send(frame) {
                    break;
                }
            }
            Err(TrySendError::Disconnected(_)) => break,
        }
    }

    running.store(false, Ordering::Release);
    device
}

fn delivery_loop(
    frame_rx: Receiver<Frame>,
    mut on_frame: FrameCallback,
    running: Arc<AtomicBool>,
) -> FrameCallback {
    loop {
        match frame_rx.recv_timeout(DELIVERY_POLL) {
            Ok(frame) => on_frame(frame),
            Err(RecvTimeoutError::Timeout) => {
                if !running.load(Ordering::Acquire) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    if frame_rx.len() > 0 {
        warn!("Discarding {} undelivered frame(s) at shutdown", frame_rx.len());
    }
    on_frame
}
