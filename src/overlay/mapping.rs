//! Normalized detection geometry to view pixels
//!
//! Detection quads use a bottom-left origin with y growing upward; the view
//! uses a top-left origin with y growing downward. Every rect produced here
//! has non-negative extents and lies inside the view.

use crate::vision::{Quad, TextRegion};

/// Pixel size of the render surface
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewSize {
    pub width: f32,
    pub height: f32,
}

impl ViewSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// Rectangle in view pixels, origin top-left, y down
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ViewRect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Flip negative extents so the rect covers the same span
    fn normalized(self) -> Self {
        let (x, width) = if self.width < 0.0 {
            (self.x + self.width, -self.width)
        } else {
            (self.x, self.width)
        };
        let (y, height) = if self.height < 0.0 {
            (self.y + self.height, -self.height)
        } else {
            (self.y, self.height)
        };
        Self::new(x, y, width, height)
    }

    /// Intersect with `[0, W] x [0, H]`
    fn clamped(self, view: ViewSize) -> Self {
        let w = view.width.max(0.0);
        let h = view.height.max(0.0);
        let x0 = self.x.clamp(0.0, w);
        let x1 = (self.x + self.width).clamp(0.0, w);
        let y0 = self.y.clamp(0.0, h);
        let y1 = (self.y + self.height).clamp(0.0, h);
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }

    fn fit(self, view: ViewSize) -> Self {
        self.normalized().clamped(view)
    }
}

/// Map a single character quad.
///
/// x and y come from the top-left corner; width spans bottom-left to
/// top-right and height spans bottom-left to top-left.
pub fn map_character_box(quad: &Quad, view: ViewSize) -> ViewRect {
    let (w, h) = (view.width, view.height);
    ViewRect::new(
        quad.top_left.x * w,
        (1.0 - quad.top_left.y) * h,
        (quad.top_right.x - quad.bottom_left.x) * w,
        (quad.top_left.y - quad.bottom_left.y) * h,
    )
    .fit(view)
}

/// Map a word as the bounding box of its character boxes.
///
/// A region without character boxes maps its own quad instead.
pub fn map_word(region: &TextRegion, view: ViewSize) -> ViewRect {
    let Some(first) = region.characters.first() else {
        return map_character_box(&region.quad, view);
    };

    let mut min_x = first.bottom_left.x;
    let mut max_x = first.bottom_right.x;
    let mut min_y = first.bottom_right.y;
    let mut max_y = first.top_right.y;
    for quad in &region.characters[1..] {
        min_x = min_x.min(quad.bottom_left.x);
        max_x = max_x.max(quad.bottom_right.x);
        min_y = min_y.min(quad.bottom_right.y);
        max_y = max_y.max(quad.top_right.y);
    }

    let (w, h) = (view.width, view.height);
    ViewRect::new(
        min_x * w,
        (1.0 - max_y) * h,
        (max_x - min_x) * w,
        (max_y - min_y) * h,
    )
    .fit(view)
}
