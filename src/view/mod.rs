//! Presentation surfaces
//!
//! A GUI window built on eframe, or a headless surface where the calling
//! thread plays the UI thread. Both drain the same redispatch channel into
//! an [`OverlayRenderer`].

pub mod app;
pub mod theme;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::app::AnnotationPipeline;
use crate::capture::CaptureDevice;
use crate::config::AppConfig;
use crate::overlay::mapping::ViewSize;
use crate::overlay::OverlayRenderer;
use crate::shared::{PipelineToUi, UiDispatcher};
use crate::vision::TextDetector;

pub use app::AnnotatorView;

/// How long the headless loop waits for a message before re-checking state
const HEADLESS_POLL: Duration = Duration::from_millis(100);

/// Helper for calculating FPS
#[derive(Debug)]
pub struct FrameCounter {
    frames_this_second: u32,
    last_fps_update: Instant,
    current_fps: f32,
}

impl Default for FrameCounter {
    fn default() -> Self {
        Self {
            frames_this_second: 0,
            last_fps_update: Instant::now(),
            current_fps: 0.0,
        }
    }
}

impl FrameCounter {
    pub fn tick(&mut self) {
        self.frames_this_second += 1;

        let elapsed = self.last_fps_update.elapsed();
        if elapsed.as_secs_f32() >= 1.0 {
            self.current_fps = self.frames_this_second as f32 / elapsed.as_secs_f32();
            self.frames_this_second = 0;
            self.last_fps_update = Instant::now();
        }
    }

    pub fn fps(&self) -> f32 {
        self.current_fps
    }
}

/// Start the pipeline and show it in a window until the window closes
pub fn run_view(
    config: &AppConfig,
    device: Box<dyn CaptureDevice>,
    detector: Arc<dyn TextDetector>,
) -> Result<()> {
    let (ui, updates) = UiDispatcher::new();
    let pipeline = AnnotationPipeline::start(config, device, detector, ui.clone())
        .context("Failed to start capture")?;

    let view = AnnotatorView::new(config, pipeline, updates);
    eframe::run_native(
        &config.view.title,
        AnnotatorView::options(config),
        Box::new(move |cc| {
            let ctx = cc.egui_ctx.clone();
            ui.set_waker(move || ctx.request_repaint());
            Ok(Box::new(view))
        }),
    )
    .map_err(|e| anyhow::anyhow!("View failed: {}", e))?;

    info!("View closed");
    Ok(())
}

/// Fixed-size render surface driven without a window
pub struct HeadlessSurface {
    renderer: OverlayRenderer,
    updates: Receiver<PipelineToUi>,
    applied: u64,
}

impl HeadlessSurface {
    pub fn new(config: &AppConfig, updates: Receiver<PipelineToUi>) -> Self {
        let mut renderer = OverlayRenderer::new(config.overlay.styles());
        renderer.set_visible(config.overlay.enabled);
        renderer.set_bounds(ViewSize::new(config.view.width, config.view.height));

        Self {
            renderer,
            updates,
            applied: 0,
        }
    }

    pub fn renderer(&self) -> &OverlayRenderer {
        &self.renderer
    }

    /// Updates drawn so far
    pub fn applied(&self) -> u64 {
        self.applied
    }

    /// Wait up to `timeout` for messages and apply everything queued.
    ///
    /// Returns false once every sender is gone.
    pub fn pump(&mut self, timeout: Duration) -> bool {
        let first = match self.updates.recv_timeout(timeout) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout) => return true,
            Err(RecvTimeoutError::Disconnected) => return false,
        };

        let rest: Vec<_> = self.updates.try_iter().collect();
        for message in std::iter::once(first).chain(rest) {
            self.handle(message);
        }
        true
    }

    fn handle(&mut self, message: PipelineToUi) {
        match message {
            PipelineToUi::Detections(update) => {
                let generation = update.generation;
                let regions = update.regions.len();
                let latency = update.latency;
                if self.renderer.apply(update) {
                    self.applied += 1;
                    info!(
                        "Detection {}: {} region(s), {} outline(s) in {:?}",
                        generation,
                        regions,
                        self.renderer.overlay().len(),
                        latency
                    );
                }
            }
        }
    }
}

/// Run the pipeline on a headless surface.
///
/// Stops after `duration`, or when capture ends if no duration is given.
pub fn run_headless(
    config: &AppConfig,
    device: Box<dyn CaptureDevice>,
    detector: Arc<dyn TextDetector>,
    duration: Option<Duration>,
) -> Result<()> {
    let (ui, updates) = UiDispatcher::new();
    let mut pipeline = AnnotationPipeline::start(config, device, detector, ui)
        .context("Failed to start capture")?;
    let preview = pipeline.preview();
    let mut surface = HeadlessSurface::new(config, updates);
    let bounds = surface.renderer().bounds();

    info!(
        "Running headless on a {}x{} surface{}",
        bounds.width,
        bounds.height,
        duration
            .map(|d| format!(" for {:?}", d))
            .unwrap_or_default()
    );

    let started = Instant::now();
    let mut frames_seen = 0u64;
    loop {
        if duration.is_some_and(|d| started.elapsed() >= d) {
            break;
        }
        if !pipeline.is_running() {
            warn!("Capture ended, leaving headless loop");
            break;
        }
        if !surface.pump(HEADLESS_POLL) {
            break;
        }
        if preview.take().is_some() {
            frames_seen += 1;
        }
    }

    let status = pipeline.status();
    pipeline.stop();

    debug!("Headless frames sampled: {}", frames_seen);
    info!(
        "Headless run finished: {} frames captured, {} dropped, {} submitted, {} skipped, {} stale, {} failed, {} stalled, {} drawn",
        status.frames_captured,
        status.frames_dropped,
        status.dispatch.submitted,
        status.dispatch.skipped,
        status.dispatch.stale,
        status.dispatch.failed,
        status.dispatch.stalled,
        surface.applied()
    );
    Ok(())
}
