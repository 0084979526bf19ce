//! Outline styles for overlay primitives

use egui::{Color32, Stroke};

/// Stroke used to outline one rectangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlineStyle {
    /// Border color (RGBA)
    pub color: [u8; 4],
    /// Border width in points
    pub width: f32,
}

impl Default for OutlineStyle {
    fn default() -> Self {
        Self {
            color: [255, 255, 255, 255],
            width: 1.0,
        }
    }
}

impl OutlineStyle {
    pub fn stroke(&self) -> Stroke {
        let [r, g, b, a] = self.color;
        Stroke::new(self.width, Color32::from_rgba_unmultiplied(r, g, b, a))
    }
}

/// Styles for the two kinds of outline drawn per detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlineStyles {
    pub word: OutlineStyle,
    pub character: OutlineStyle,
}

impl Default for OutlineStyles {
    fn default() -> Self {
        Self {
            word: OutlineStyle {
                color: [255, 0, 0, 255],
                width: 2.0,
            },
            character: OutlineStyle {
                color: [0, 0, 255, 255],
                width: 1.0,
            },
        }
    }
}
