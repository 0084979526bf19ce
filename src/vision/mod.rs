//! Vision Layer
//!
//! Geometry produced by text detection and the seam to the detection engine.
//! Engines are asynchronous: they receive a request and a completion callback
//! and may finish on any thread.

pub mod detection;
pub mod dispatcher;
pub mod engine;

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::capture::frame::Frame;

pub use detection::{ContrastTextFinder, FinderConfig};
pub use dispatcher::{DetectionDispatcher, DetectionUpdate, DispatchLimits, DispatchSnapshot};
pub use engine::BlockingDetector;

/// A point in normalized image coordinates (origin bottom-left, y up)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Four corners of a detected region in normalized coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Quad {
    pub bottom_left: Point,
    pub bottom_right: Point,
    pub top_left: Point,
    pub top_right: Point,
}

impl Quad {
    /// Axis-aligned quad spanning `(min_x, min_y)` to `(max_x, max_y)`
    pub const fn from_bounds(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            bottom_left: Point::new(min_x, min_y),
            bottom_right: Point::new(max_x, min_y),
            top_left: Point::new(min_x, max_y),
            top_right: Point::new(max_x, max_y),
        }
    }
}

#[cfg(test)]
impl Quad {
    pub fn corners(&self) -> [Point; 4] {
        [self.bottom_left, self.bottom_right, self.top_left, self.top_right]
    }
}

/// One detected character inside a word
pub type CharacterBox = Quad;

/// One detected word and its characters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextRegion {
    /// Word-level quad
    pub quad: Quad,
    /// Character quads in reading order (may be empty)
    pub characters: Vec<CharacterBox>,
}

impl TextRegion {
    pub fn new(quad: Quad, characters: Vec<CharacterBox>) -> Self {
        Self { quad, characters }
    }
}

/// Submission order of detection requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
    pub const FIRST: Generation = Generation(1);

    pub fn next(self) -> Generation {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A frame submitted for detection
#[derive(Debug, Clone)]
pub struct DetectionRequest {
    pub frame: Arc<Frame>,
    pub generation: Generation,
}

/// Options passed with every detection request
#[derive(Debug, Clone)]
pub struct DetectionOptions {
    /// Ask the engine for per-character boxes
    pub report_character_boxes: bool,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            report_character_boxes: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("frame cannot be processed: {0}")]
    UnsupportedFrame(String),
    #[error("detection engine panicked")]
    EnginePanicked,
    #[error("failed to start detection runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

pub type DetectionResult = Result<Vec<TextRegion>, DetectionError>;

/// Continuation invoked exactly once per request, on any thread
pub type DetectionCompletion = Box<dyn FnOnce(DetectionResult) + Send>;

/// Asynchronous text detection capability
pub trait TextDetector: Send + Sync {
    fn detect(
        &self,
        request: DetectionRequest,
        options: &DetectionOptions,
        completion: DetectionCompletion,
    );
}
