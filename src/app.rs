//! Application Coordinator
//!
//! Wires capture, detection and the UI channel together: every captured
//! frame is published as the preview, submitted for detection and followed
//! by a UI wake-up. Detection results travel back through the channel; the
//! pipeline itself never touches the overlay.

use std::sync::Arc;
use tracing::info;

use crate::capture::frame::Frame;
use crate::capture::{CaptureConfig, CaptureDevice, CaptureError, FrameSource};
use crate::config::AppConfig;
use crate::shared::{PipelineStatus, PipelineToUi, PreviewSlot, UiDispatcher};
use crate::vision::{DetectionDispatcher, TextDetector};

/// A running capture-to-detection pipeline
pub struct AnnotationPipeline {
    source: FrameSource,
    dispatcher: Arc<DetectionDispatcher>,
    preview: Arc<PreviewSlot>,
}

impl AnnotationPipeline {
    /// Build the pipeline and start capturing.
    ///
    /// Device failures are returned before any thread is spawned.
    pub fn start(
        config: &AppConfig,
        device: Box<dyn CaptureDevice>,
        detector: Arc<dyn TextDetector>,
        ui: UiDispatcher,
    ) -> Result<Self, CaptureError> {
        let sink_ui = ui.clone();
        let dispatcher = Arc::new(DetectionDispatcher::new(
            detector,
            config.detection.options(),
            config.detection.limits(),
            move |update| {
                sink_ui.send(PipelineToUi::Detections(update));
            },
        ));
        let preview = Arc::new(PreviewSlot::new());

        let on_frame = {
            let dispatcher = dispatcher.clone();
            let preview = preview.clone();
            move |frame: Frame| {
                let frame = Arc::new(frame);
                preview.publish(frame.clone());
                dispatcher.submit(frame);
                ui.wake();
            }
        };

        let mut source = FrameSource::new(CaptureConfig::from(&config.capture), device, on_frame);
        source.start()?;

        info!(
            "Annotation pipeline running on {} (max in flight: {:?})",
            source.device_name(),
            config.detection.limits().max_in_flight
        );

        Ok(Self {
            source,
            dispatcher,
            preview,
        })
    }

    /// Slot holding the newest frame for the preview layer
    pub fn preview(&self) -> Arc<PreviewSlot> {
        self.preview.clone()
    }

    pub fn is_running(&self) -> bool {
        self.source.is_running()
    }

    pub fn status(&self) -> PipelineStatus {
        let stats = self.source.stats();
        PipelineStatus {
            device: self.source.device_name().to_string(),
            capturing: self.source.is_running(),
            frames_captured: stats.frames_captured(),
            frames_dropped: stats.frames_dropped(),
            dispatch: self.dispatcher.stats(),
        }
    }

    /// Stop capturing. Detections already in flight may still complete.
    pub fn stop(&mut self) {
        self.source.stop();
        info!("Annotation pipeline stopped on {}", self.source.device_name());
    }
}

impl Drop for AnnotationPipeline {
    fn drop(&mut self) {
        self.source.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::mapping::{ViewRect, ViewSize};
    use crate::overlay::widgets::OutlineStyles;
    use crate::overlay::OverlayRenderer;
    use crate::shared::drain;
    use crate::vision::{
        DetectionCompletion, DetectionOptions, DetectionRequest, Generation, Quad, TextRegion,
    };
    use crossbeam_channel::Receiver;
    use parking_lot::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    const VIEW: ViewSize = ViewSize::new(200.0, 100.0);

    /// Endless 1x1 frames, a few milliseconds apart
    struct TickingDevice;

    impl CaptureDevice for TickingDevice {
        fn name(&self) -> &str {
            "ticking"
        }

        fn open(&mut self, _config: &CaptureConfig) -> Result<(), CaptureError> {
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
            thread::sleep(Duration::from_millis(5));
            Ok(Some(Frame::new(vec![0; 4], 1, 1)))
        }

        fn close(&mut self) {}
    }

    /// Device that cannot be opened
    struct MissingDevice;

    impl CaptureDevice for MissingDevice {
        fn name(&self) -> &str {
            "missing"
        }

        fn open(&mut self, _config: &CaptureConfig) -> Result<(), CaptureError> {
            Err(CaptureError::DeviceUnavailable {
                device: "missing".to_string(),
                reason: "unplugged".to_string(),
            })
        }

        fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
            Ok(None)
        }

        fn close(&mut self) {}
    }

    /// One word covering the frame, one character per quadrant
    fn four_quadrants() -> TextRegion {
        TextRegion::new(
            Quad::from_bounds(0.0, 0.0, 1.0, 1.0),
            vec![
                Quad::from_bounds(0.0, 0.0, 0.5, 0.5),
                Quad::from_bounds(0.5, 0.0, 1.0, 0.5),
                Quad::from_bounds(0.0, 0.5, 0.5, 1.0),
                Quad::from_bounds(0.5, 0.5, 1.0, 1.0),
            ],
        )
    }

    struct QuadrantDetector;

    impl TextDetector for QuadrantDetector {
        fn detect(
            &self,
            _request: DetectionRequest,
            _options: &DetectionOptions,
            completion: DetectionCompletion,
        ) {
            completion(Ok(vec![four_quadrants()]));
        }
    }

    /// Parks every request until the test completes it
    #[derive(Default)]
    struct ParkedDetector {
        pending: Mutex<Vec<(Generation, DetectionCompletion)>>,
    }

    impl TextDetector for ParkedDetector {
        fn detect(
            &self,
            request: DetectionRequest,
            _options: &DetectionOptions,
            completion: DetectionCompletion,
        ) {
            self.pending.lock().push((request.generation, completion));
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for pipeline");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn apply_all(renderer: &mut OverlayRenderer, receiver: &Receiver<PipelineToUi>) -> usize {
        let mut applied = 0;
        for message in drain(receiver) {
            match message {
                PipelineToUi::Detections(update) => {
                    if renderer.apply(update) {
                        applied += 1;
                    }
                }
            }
        }
        applied
    }

    fn assert_rect(actual: ViewRect, expected: ViewRect) {
        let close = |a: f32, b: f32| (a - b).abs() < 1e-3;
        assert!(
            close(actual.x, expected.x)
                && close(actual.y, expected.y)
                && close(actual.width, expected.width)
                && close(actual.height, expected.height),
            "{:?} != {:?}",
            actual,
            expected
        );
    }

    #[test]
    fn test_start_reports_device_errors() {
        let (ui, _receiver) = UiDispatcher::new();
        let result = AnnotationPipeline::start(
            &AppConfig::default(),
            Box::new(MissingDevice),
            Arc::new(QuadrantDetector),
            ui,
        );
        assert!(matches!(result, Err(CaptureError::DeviceUnavailable { .. })));
    }

    #[test]
    fn test_four_quadrant_region_end_to_end() {
        let (ui, receiver) = UiDispatcher::new();
        let mut pipeline = AnnotationPipeline::start(
            &AppConfig::default(),
            Box::new(TickingDevice),
            Arc::new(QuadrantDetector),
            ui,
        )
        .unwrap();

        let first = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        pipeline.stop();
        assert!(pipeline.preview().take().is_some());

        let mut renderer = OverlayRenderer::new(OutlineStyles::default());
        renderer.set_bounds(VIEW);
        let PipelineToUi::Detections(update) = first;
        assert!(renderer.apply(update));

        let outlines = renderer.overlay().outlines();
        assert_eq!(outlines.len(), 5);
        assert_eq!(outlines[0].style, OutlineStyles::default().word);
        assert_rect(outlines[0].rect, ViewRect::new(0.0, 0.0, 200.0, 100.0));

        // Detection y grows upward, so the bottom quadrants land at y = 50
        let expected = [
            ViewRect::new(0.0, 50.0, 100.0, 50.0),
            ViewRect::new(100.0, 50.0, 100.0, 50.0),
            ViewRect::new(0.0, 0.0, 100.0, 50.0),
            ViewRect::new(100.0, 0.0, 100.0, 50.0),
        ];
        for (outline, rect) in outlines[1..].iter().zip(expected) {
            assert_eq!(outline.style, OutlineStyles::default().character);
            assert_rect(outline.rect, rect);
        }
    }

    #[test]
    fn test_older_completion_never_renders_after_newer() {
        let mut config = AppConfig::default();
        config.detection.max_in_flight = 0;

        let detector = Arc::new(ParkedDetector::default());
        let (ui, receiver) = UiDispatcher::new();
        let mut pipeline =
            AnnotationPipeline::start(&config, Box::new(TickingDevice), detector.clone(), ui)
                .unwrap();

        wait_until(|| detector.pending.lock().len() >= 2);
        pipeline.stop();

        let mut pending = std::mem::take(&mut *detector.pending.lock());
        pending.sort_by_key(|(generation, _)| *generation);
        let (newest, newest_done) = pending.pop().unwrap();
        let (_, older_done) = pending.remove(0);

        newest_done(Ok(vec![four_quadrants()]));
        older_done(Ok(vec![TextRegion::new(
            Quad::from_bounds(0.1, 0.1, 0.2, 0.2),
            Vec::new(),
        )]));

        let mut renderer = OverlayRenderer::new(OutlineStyles::default());
        renderer.set_bounds(VIEW);
        assert_eq!(apply_all(&mut renderer, &receiver), 1);
        assert_eq!(renderer.last_generation(), Some(newest));
        assert_eq!(renderer.overlay().len(), 5);

        let status = pipeline.status();
        assert!(!status.capturing);
        assert_eq!(status.dispatch.stale, 1);
        assert_eq!(status.device, "ticking");
    }

    #[test]
    fn test_renderer_guards_against_reordered_channel() {
        let (ui, receiver) = UiDispatcher::new();
        let update = |generation| crate::vision::DetectionUpdate {
            generation: Generation(generation),
            regions: vec![four_quadrants()],
            latency: Duration::ZERO,
        };
        ui.send(PipelineToUi::Detections(update(2)));
        ui.send(PipelineToUi::Detections(update(1)));

        let mut renderer = OverlayRenderer::new(OutlineStyles::default());
        renderer.set_bounds(VIEW);
        assert_eq!(apply_all(&mut renderer, &receiver), 1);
        assert_eq!(renderer.last_generation(), Some(Generation(2)));
    }
}
