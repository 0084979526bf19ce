//! Asynchronous adapter for synchronous text finders
//!
//! Runs a [`TextFinder`] on the blocking pool of a private tokio runtime and
//! reports through the request's completion callback. Completions therefore
//! arrive on runtime threads, never on the submitting thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{error, info};

use crate::capture::frame::Frame;
use crate::vision::{
    DetectionCompletion, DetectionError, DetectionOptions, DetectionRequest, TextDetector,
    TextRegion,
};

/// Synchronous text detection over a single frame
pub trait TextFinder: Send + Sync + 'static {
    fn find_text(
        &self,
        frame: &Frame,
        options: &DetectionOptions,
    ) -> Result<Vec<TextRegion>, DetectionError>;
}

/// [`TextDetector`] running a [`TextFinder`] off the calling thread
pub struct BlockingDetector<F> {
    finder: Arc<F>,
    runtime: Option<Runtime>,
    handle: Handle,
}

impl<F: TextFinder> BlockingDetector<F> {
    /// Start a runtime allowing up to `max_threads` concurrent detections
    pub fn new(finder: F, max_threads: usize) -> Result<Self, DetectionError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(max_threads.max(1))
            .thread_name("text-detector")
            .build()?;
        let handle = runtime.handle().clone();

        info!("Detection runtime started ({} worker thread(s))", max_threads.max(1));

        Ok(Self {
            finder: Arc::new(finder),
            runtime: Some(runtime),
            handle,
        })
    }
}

impl<F: TextFinder> TextDetector for BlockingDetector<F> {
    fn detect(
        &self,
        request: DetectionRequest,
        options: &DetectionOptions,
        completion: DetectionCompletion,
    ) {
        let finder = self.finder.clone();
        let options = options.clone();

        self.handle.spawn_blocking(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                finder.find_text(&request.frame, &options)
            }))
            .unwrap_or_else(|_| {
                error!("Text finder panicked on detection {}", request.generation);
                Err(DetectionError::EnginePanicked)
            });
            completion(result);
        });
    }
}

impl<F> Drop for BlockingDetector<F> {
    fn drop(&mut self) {
        // Do not wait for a hung finder on shutdown
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::{Generation, Quad};
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    struct FixedFinder;

    impl TextFinder for FixedFinder {
        fn find_text(
            &self,
            frame: &Frame,
            _options: &DetectionOptions,
        ) -> Result<Vec<TextRegion>, DetectionError> {
            if frame.width == 0 {
                return Err(DetectionError::UnsupportedFrame("empty".to_string()));
            }
            Ok(vec![TextRegion::new(Quad::from_bounds(0.0, 0.0, 1.0, 1.0), Vec::new())])
        }
    }

    struct PanickingFinder;

    impl TextFinder for PanickingFinder {
        fn find_text(
            &self,
            _frame: &Frame,
            _options: &DetectionOptions,
        ) -> Result<Vec<TextRegion>, DetectionError> {
            panic!("finder bug");
        }
    }

    fn request(width: u32) -> DetectionRequest {
        DetectionRequest {
            frame: Arc::new(Frame::new(vec![0; width as usize * 4], width, 1)),
            generation: Generation::FIRST,
        }
    }

    #[test]
    fn test_completion_runs_off_the_calling_thread() {
        let detector = BlockingDetector::new(FixedFinder, 2).unwrap();
        let (tx, rx) = unbounded();
        let caller = std::thread::current().id();

        detector.detect(
            request(1),
            &DetectionOptions::default(),
            Box::new(move |result| {
                let _ = tx.send((std::thread::current().id(), result));
            }),
        );

        let (thread, result) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(thread, caller);
        assert_eq!(result.unwrap().len(), 1);
    }

    #[test]
    fn test_finder_errors_are_passed_through() {
        let detector = BlockingDetector::new(FixedFinder, 1).unwrap();
        let (tx, rx) = unbounded();

        detector.detect(
            request(0),
            &DetectionOptions::default(),
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );

        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(result, Err(DetectionError::UnsupportedFrame(_))));
    }

    #[test]
    fn test_panicking_finder_still_completes() {
        let detector = BlockingDetector::new(PanickingFinder, 1).unwrap();
        let (tx, rx) = unbounded();

        detector.detect(
            request(1),
            &DetectionOptions::default(),
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );

        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(result, Err(DetectionError::EnginePanicked)));
    }
}
