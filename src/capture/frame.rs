//! Frame data structures for captured video content

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Byte order of a frame's pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 4 bytes per pixel, blue first (camera native)
    Bgra8,
    /// 4 bytes per pixel, red first
    Rgba8,
}

/// How the stored buffer must be rotated to appear upright.
///
/// Mirrors the EXIF orientation tags 1, 6, 3 and 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Buffer is already upright
    #[default]
    Up,
    /// Rotate 90° clockwise to display
    Right,
    /// Rotate 180° to display
    Down,
    /// Rotate 90° counter-clockwise to display
    Left,
}

impl Orientation {
    /// Dimensions of the upright image for a buffer of `width` x `height`
    pub fn upright_dimensions(self, width: u32, height: u32) -> (u32, u32) {
        match self {
            Orientation::Up | Orientation::Down => (width, height),
            Orientation::Right | Orientation::Left => (height, width),
        }
    }
}

/// 3x3 camera intrinsic matrix, row-major
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics(pub [[f32; 3]; 3]);

impl CameraIntrinsics {
    /// Ideal pinhole camera with the principal point at the buffer center
    pub fn pinhole(focal_length: f32, width: u32, height: u32) -> Self {
        Self([
            [focal_length, 0.0, width as f32 / 2.0],
            [0.0, focal_length, height as f32 / 2.0],
            [0.0, 0.0, 1.0],
        ])
    }

    /// Finite, positive focal lengths and an affine last row
    pub fn is_plausible(&self) -> bool {
        let k = &self.0;
        k.iter().flatten().all(|v| v.is_finite())
            && k[0][0] > 0.0
            && k[1][1] > 0.0
            && k[2] == [0.0, 0.0, 1.0]
    }
}

/// A captured frame from a video device
#[derive(Debug)]
pub struct Frame {
    /// Raw pixel data, 4 bytes per pixel
    pub data: Vec<u8>,
    /// Buffer width in pixels
    pub width: u32,
    /// Buffer height in pixels
    pub height: u32,
    /// Channel order of `data`
    pub format: PixelFormat,
    /// Rotation needed to display the buffer upright
    pub orientation: Orientation,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
    /// Camera intrinsics reported by the device, if any
    pub intrinsics: Option<CameraIntrinsics>,
}

impl Frame {
    /// Create a new upright BGRA frame stamped with the current time
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            format: PixelFormat::Bgra8,
            orientation: Orientation::Up,
            timestamp: Instant::now(),
            intrinsics: None,
        }
    }

    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_intrinsics(mut self, intrinsics: CameraIntrinsics) -> Self {
        self.intrinsics = Some(intrinsics);
        self
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether the buffer length matches the declared dimensions
    pub fn is_well_formed(&self) -> bool {
        if self.width == 0 || self.height == 0 {
            return false;
        }
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .is_some_and(|expected| expected == self.data.len())
    }

    /// Convert to an upright RGBA image.
    ///
    /// Returns `None` when the buffer does not match the declared dimensions.
    pub fn to_upright_rgba(&self) -> Option<RgbaImage> {
        if !self.is_well_formed() {
            return None;
        }

        let mut data = self.data.clone();
        if self.format == PixelFormat::Bgra8 {
            for chunk in data.chunks_mut(4) {
                chunk.swap(0, 2); // Swap B and R
            }
        }
        let image = RgbaImage::from_raw(self.width, self.height, data)?;

        Some(match self.orientation {
            Orientation::Up => image,
            Orientation::Right => image::imageops::rotate90(&image),
            Orientation::Down => image::imageops::rotate180(&image),
            Orientation::Left => image::imageops::rotate270(&image),
        })
    }
}
