//! Synthetic capture device
//!
//! Renders rows of dark glyph-shaped blocks grouped into words on a light
//! background and scrolls them sideways, so the whole pipeline can run
//! without a camera.

use image::{Rgba, RgbaImage};

use crate::capture::frame::{CameraIntrinsics, Frame, Orientation, PixelFormat};
use crate::capture::{CaptureConfig, CaptureDevice, CaptureError, FramePacer, TEST_PATTERN_DEVICE};

const BACKGROUND: Rgba<u8> = Rgba([232, 228, 220, 255]);
const INK: Rgba<u8> = Rgba([24, 24, 32, 255]);

/// Glyph counts of the words on each text line
const LINES: [&[u32]; 3] = [&[4, 2, 5], &[3, 6], &[2, 4, 3, 2]];

/// Smallest frame side that still fits a readable pattern
const MIN_SIDE: u32 = 32;

/// Pixels the pattern moves per frame
const SCROLL_STEP: u32 = 2;

pub struct TestPatternDevice {
    config: Option<CaptureConfig>,
    pacer: FramePacer,
    frame_index: u32,
}

impl TestPatternDevice {
    pub fn new() -> Self {
        Self {
            config: None,
            pacer: FramePacer::new(0),
            frame_index: 0,
        }
    }

    /// Draw the upright pattern for the current frame
    fn render(&self, width: u32, height: u32) -> RgbaImage {
        let mut image = RgbaImage::from_pixel(width, height, BACKGROUND);

        let glyph_h = (width.min(height) / 14).max(4);
        let glyph_w = (glyph_h * 3 / 5).max(2);
        let glyph_gap = (glyph_w * 2 / 5).max(1);
        let word_gap = glyph_h * 3 / 2;
        let offset = self.frame_index.wrapping_mul(SCROLL_STEP) % width;

        for (line, words) in LINES.iter().enumerate() {
            let top = height * (line as u32 + 1) / (LINES.len() as u32 + 1) - glyph_h / 2;
            let mut x = glyph_w + offset;
            for &glyphs in words.iter() {
                for _ in 0..glyphs {
                    fill_wrapped(&mut image, x, top, glyph_w, glyph_h);
                    x += glyph_w + glyph_gap;
                }
                x += word_gap - glyph_gap;
            }
        }

        image
    }
}

impl Default for TestPatternDevice {
    fn default() -> Self {
        Self::new()
    }
}

/// Fill a rectangle, wrapping horizontally around the image edge
fn fill_wrapped(image: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32) {
    let (width, height) = image.dimensions();
    for dy in 0..h {
        let py = y + dy;
        if py >= height {
            break;
        }
        for dx in 0..w {
            let px = (x + dx) % width;
            image.put_pixel(px, py, INK);
        }
    }
}

impl CaptureDevice for TestPatternDevice {
    fn name(&self) -> &str {
        TEST_PATTERN_DEVICE
    }

    fn open(&mut self, config: &CaptureConfig) -> Result<(), CaptureError> {
        if config.width < MIN_SIDE || config.height < MIN_SIDE {
            return Err(CaptureError::InputConfigurationFailed {
                device: TEST_PATTERN_DEVICE.to_string(),
                reason: format!(
                    "resolution {}x{} is below the {}px minimum",
                    config.width, config.height, MIN_SIDE
                ),
            });
        }
        self.pacer = FramePacer::new(config.max_fps);
        self.frame_index = 0;
        self.config = Some(config.clone());
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        let Some(config) = self.config.clone() else {
            return Err(CaptureError::Read {
                device: TEST_PATTERN_DEVICE.to_string(),
                reason: "device is not open".to_string(),
            });
        };
        self.pacer.wait();

        let (upright_w, upright_h) = config
            .orientation
            .upright_dimensions(config.width, config.height);
        let upright = self.render(upright_w, upright_h);
        self.frame_index = self.frame_index.wrapping_add(1);

        // Store the buffer the way a sensor mounted with this orientation would
        let stored = match config.orientation {
            Orientation::Up => upright,
            Orientation::Right => image::imageops::rotate270(&upright),
            Orientation::Down => image::imageops::rotate180(&upright),
            Orientation::Left => image::imageops::rotate90(&upright),
        };

        let (width, height) = stored.dimensions();
        let intrinsics = CameraIntrinsics::pinhole(width.max(height) as f32, width, height);
        let mut data = stored.into_raw();
        for chunk in data.chunks_mut(4) {
            chunk.swap(0, 2); // RGBA -> BGRA
        }

        Ok(Some(
            Frame::new(data, width, height)
                .with_format(PixelFormat::Bgra8)
                .with_orientation(config.orientation)
                .with_intrinsics(intrinsics),
        ))
    }

    fn close(&mut self) {
        self.config = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(width: u32, height: u32, orientation: Orientation) -> CaptureConfig {
        CaptureConfig {
            width,
            height,
            max_fps: 0,
            orientation,
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_tiny_resolution() {
        let mut device = TestPatternDevice::new();
        let result = device.open(&config(0, 480, Orientation::Up));
        assert!(matches!(result, Err(CaptureError::InputConfigurationFailed { .. })));
    }

    #[test]
    fn test_next_frame_requires_open() {
        let mut device = TestPatternDevice::new();
        assert!(device.next_frame().is_err());
    }

    #[test]
    fn test_frames_match_configuration() {
        let mut device = TestPatternDevice::new();
        device.open(&config(160, 120, Orientation::Right)).unwrap();

        let frame = device.next_frame().unwrap().unwrap();
        assert!(frame.is_well_formed());
        assert_eq!(frame.dimensions(), (160, 120));
        assert_eq!(frame.orientation, Orientation::Right);
        assert!(frame.intrinsics.is_some_and(|k| k.is_plausible()));

        // Upright view swaps the sides back
        let upright = frame.to_upright_rgba().unwrap();
        assert_eq!(upright.dimensions(), (120, 160));
    }

    #[test]
    fn test_pattern_contains_ink_and_scrolls() {
        let mut device = TestPatternDevice::new();
        device.open(&config(160, 120, Orientation::Up)).unwrap();

        let first = device.next_frame().unwrap().unwrap();
        let second = device.next_frame().unwrap().unwrap();

        let ink = first.data.chunks(4).filter(|p| p[0] < 100).count();
        assert!(ink > 0);
        assert_ne!(first.data, second.data);
    }
}
