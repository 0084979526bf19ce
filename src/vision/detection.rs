//! Contrast-based text region finder
//!
//! A lightweight reference [`TextFinder`]: binarizes the frame with Otsu's
//! threshold, treats connected ink blobs of glyph-like size as characters and
//! chains horizontally adjacent characters on the same baseline into words.
//! It recognizes nothing; it only produces geometry.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::HashMap;
use tracing::trace;

use crate::capture::frame::Frame;
use crate::vision::engine::TextFinder;
use crate::vision::{DetectionError, DetectionOptions, Quad, TextRegion};

/// Configuration for the contrast finder
#[derive(Debug, Clone)]
pub struct FinderConfig {
    /// Frames larger than this on either side are downscaled first
    pub max_dimension: u32,
    /// Minimum luminance spread for a frame to contain anything
    pub min_contrast: u8,
    /// Glyph height bounds as a fraction of the image height
    pub min_glyph_height: f32,
    pub max_glyph_height: f32,
    /// Smallest blob kept, in pixels
    pub min_glyph_pixels: u32,
    /// Widest accepted width/height ratio for a single glyph
    pub max_glyph_aspect: f32,
    /// Largest horizontal gap inside a word, in glyph heights
    pub word_gap: f32,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            max_dimension: 480,
            min_contrast: 48,
            min_glyph_height: 0.02,
            max_glyph_height: 0.4,
            min_glyph_pixels: 6,
            max_glyph_aspect: 3.0,
            word_gap: 0.8,
        }
    }
}

/// Inclusive pixel bounds of a blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelBox {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    pixels: u32,
}

impl PixelBox {
    fn at(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            pixels: 1,
        }
    }

    fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.pixels += 1;
    }

    fn merge(&mut self, other: &PixelBox) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
        self.pixels += other.pixels;
    }

    fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    fn vertical_overlap(&self, other: &PixelBox) -> u32 {
        let top = self.min_y.max(other.min_y);
        let bottom = self.max_y.min(other.max_y);
        if bottom >= top {
            bottom - top + 1
        } else {
            0
        }
    }

    /// Normalized quad with origin bottom-left, y up
    fn to_quad(self, width: u32, height: u32) -> Quad {
        let (w, h) = (width as f32, height as f32);
        Quad::from_bounds(
            self.min_x as f32 / w,
            1.0 - (self.max_y + 1) as f32 / h,
            (self.max_x + 1) as f32 / w,
            1.0 - self.min_y as f32 / h,
        )
    }
}

#[derive(Debug)]
struct Word {
    glyphs: Vec<PixelBox>,
    bounds: PixelBox,
}

/// Finds dark-on-light (or light-on-dark) glyph runs
#[derive(Debug, Clone, Default)]
pub struct ContrastTextFinder {
    config: FinderConfig,
}

impl ContrastTextFinder {
    pub fn new(config: FinderConfig) -> Self {
        Self { config }
    }

    fn prepare(&self, frame: &Frame) -> Result<GrayImage, DetectionError> {
        if let Some(intrinsics) = frame.intrinsics.filter(|k| !k.is_plausible()) {
            return Err(DetectionError::UnsupportedFrame(format!(
                "implausible camera intrinsics {:?}",
                intrinsics.0
            )));
        }
        let rgba = frame.to_upright_rgba().ok_or_else(|| {
            DetectionError::UnsupportedFrame(format!(
                "{} bytes for a {}x{} frame",
                frame.data.len(),
                frame.width,
                frame.height
            ))
        })?;
        let gray = DynamicImage::ImageRgba8(rgba).to_luma8();

        let (width, height) = gray.dimensions();
        let longest = width.max(height);
        if longest <= self.config.max_dimension || self.config.max_dimension == 0 {
            return Ok(gray);
        }

        let scale = self.config.max_dimension as f32 / longest as f32;
        let new_width = ((width as f32 * scale) as u32).max(1);
        let new_height = ((height as f32 * scale) as u32).max(1);
        Ok(image::imageops::resize(&gray, new_width, new_height, FilterType::Triangle))
    }

    /// Ink mask: 255 for glyph pixels, 0 for background
    fn binarize(&self, gray: &GrayImage) -> Option<GrayImage> {
        let (lo, hi) = gray
            .pixels()
            .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
        if hi.saturating_sub(lo) < self.config.min_contrast {
            return None;
        }

        let level = otsu_level(gray);
        let dark = gray.pixels().filter(|p| p[0] <= level).count();
        // Ink is the minority class
        let ink_is_dark = dark * 2 <= gray.len();

        Some(GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            let is_dark = gray.get_pixel(x, y)[0] <= level;
            if is_dark == ink_is_dark {
                Luma([255])
            } else {
                Luma([0])
            }
        }))
    }

    fn find_glyphs(&self, mask: &GrayImage) -> Vec<PixelBox> {
        let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));

        let mut blobs: HashMap<u32, PixelBox> = HashMap::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label[0];
            if label == 0 {
                continue;
            }
            blobs
                .entry(label)
                .and_modify(|b| b.include(x, y))
                .or_insert_with(|| PixelBox::at(x, y));
        }

        let image_height = mask.height() as f32;
        let min_h = self.config.min_glyph_height * image_height;
        let max_h = self.config.max_glyph_height * image_height;

        blobs
            .into_values()
            .filter(|b| {
                let h = b.height() as f32;
                b.pixels >= self.config.min_glyph_pixels
                    && h >= min_h
                    && h <= max_h
                    && (b.width() as f32 / h) <= self.config.max_glyph_aspect
            })
            .collect()
    }

    fn group_words(&self, mut glyphs: Vec<PixelBox>) -> Vec<Word> {
        glyphs.sort_by_key(|g| (g.min_x, g.min_y));

        let mut words: Vec<Word> = Vec::new();
        for glyph in glyphs {
            let mut best: Option<(usize, i64)> = None;
            for (index, word) in words.iter().enumerate() {
                let Some(last) = word.glyphs.last() else {
                    continue;
                };
                let shorter = glyph.height().min(last.height());
                if glyph.vertical_overlap(last) * 2 < shorter {
                    continue;
                }
                let gap = glyph.min_x as i64 - word.bounds.max_x as i64 - 1;
                let limit = (self.config.word_gap * glyph.height().max(last.height()) as f32) as i64;
                if gap > limit || gap < -(glyph.width() as i64) {
                    continue;
                }
                if best.map_or(true, |(_, best_gap)| gap < best_gap) {
                    best = Some((index, gap));
                }
            }

            match best {
                Some((index, _)) => {
                    let word = &mut words[index];
                    word.bounds.merge(&glyph);
                    word.glyphs.push(glyph);
                }
                None => words.push(Word {
                    glyphs: vec![glyph],
                    bounds: glyph,
                }),
            }
        }

        // Reading order: lines top to bottom, then left to right
        words.sort_by_key(|w| (w.bounds.min_y, w.bounds.min_x));
        words
    }
}

impl TextFinder for ContrastTextFinder {
    fn find_text(
        &self,
        frame: &Frame,
        options: &DetectionOptions,
    ) -> Result<Vec<TextRegion>, DetectionError> {
        let gray = self.prepare(frame)?;
        let Some(mask) = self.binarize(&gray) else {
            trace!("Frame has too little contrast for text");
            return Ok(Vec::new());
        };

        let glyphs = self.find_glyphs(&mask);
        let words = self.group_words(glyphs);
        let (width, height) = mask.dimensions();

        let regions: Vec<TextRegion> = words
            .into_iter()
            .map(|word| {
                let characters = if options.report_character_boxes {
                    word.glyphs.iter().map(|g| g.to_quad(width, height)).collect()
                } else {
                    Vec::new()
                };
                TextRegion::new(word.bounds.to_quad(width, height), characters)
            })
            .collect();

        trace!("Found {} text region(s)", regions.len());
        Ok(regions)
    }
}
