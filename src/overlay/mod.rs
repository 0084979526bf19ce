//! Overlay Presentation Layer
//!
//! The annotated video surface: a base preview layer showing the live frame
//! and a separately owned overlay layer of word and character outlines that
//! is replaced wholesale for every accepted detection result.
//!
//! The renderer is owned by the UI thread and is never shared; detection
//! results reach it only through the UI redispatch channel.

pub mod mapping;
pub mod widgets;

use egui::{Color32, Painter, Pos2, Rect, Rounding, TextureHandle, TextureOptions};
use tracing::{debug, trace};

use crate::capture::frame::Frame;
use crate::overlay::mapping::{map_character_box, map_word, ViewRect, ViewSize};
use crate::overlay::widgets::{OutlineStyle, OutlineStyles};
use crate::vision::{DetectionUpdate, Generation, TextRegion};

/// The live video layer underneath the outlines
#[derive(Default)]
pub struct PreviewLayer {
    texture: Option<TextureHandle>,
    frame_size: Option<(u32, u32)>,
}

impl PreviewLayer {
    /// Upload a frame as the new preview image
    pub fn update(&mut self, ctx: &egui::Context, frame: &Frame) -> bool {
        let Some(rgba) = frame.to_upright_rgba() else {
            debug!("Dropping malformed preview frame {}x{}", frame.width, frame.height);
            return false;
        };
        let (width, height) = rgba.dimensions();
        let color_image = egui::ColorImage::from_rgba_unmultiplied(
            [width as usize, height as usize],
            rgba.as_raw(),
        );

        let needs_new_texture = self.frame_size != Some((width, height)) || self.texture.is_none();
        if needs_new_texture {
            self.texture = Some(ctx.load_texture("camera_preview", color_image, TextureOptions::LINEAR));
            self.frame_size = Some((width, height));
        } else if let Some(texture) = self.texture.as_mut() {
            texture.set(color_image, TextureOptions::LINEAR);
        }

        trace!("Preview frame shown {:?} after capture", frame.timestamp.elapsed());
        true
    }

    /// Upright size of the last frame shown
    pub fn frame_size(&self) -> Option<(u32, u32)> {
        self.frame_size
    }

    fn paint(&self, painter: &Painter, rect: Rect) {
        match &self.texture {
            Some(texture) => painter.image(
                texture.id(),
                rect,
                Rect::from_min_max(Pos2::new(0.0, 0.0), Pos2::new(1.0, 1.0)),
                Color32::WHITE,
            ),
            None => painter.rect_filled(rect, Rounding::ZERO, Color32::BLACK),
        };
    }
}

/// One outline primitive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outline {
    pub rect: ViewRect,
    pub style: OutlineStyle,
}

/// Outlines currently on screen
#[derive(Debug, Default)]
pub struct OverlayLayer {
    outlines: Vec<Outline>,
}

impl OverlayLayer {
    pub fn outlines(&self) -> &[Outline] {
        &self.outlines
    }

    pub fn len(&self) -> usize {
        self.outlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outlines.is_empty()
    }
}

/// Owns the preview and overlay layers and redraws outlines per result
pub struct OverlayRenderer {
    base: PreviewLayer,
    overlay: OverlayLayer,
    styles: OutlineStyles,
    bounds: ViewSize,
    regions: Vec<TextRegion>,
    last_generation: Option<Generation>,
    visible: bool,
}

impl OverlayRenderer {
    pub fn new(styles: OutlineStyles) -> Self {
        Self {
            base: PreviewLayer::default(),
            overlay: OverlayLayer::default(),
            styles,
            bounds: ViewSize::default(),
            regions: Vec::new(),
            last_generation: None,
            visible: true,
        }
    }

    pub fn base(&self) -> &PreviewLayer {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut PreviewLayer {
        &mut self.base
    }

    pub fn overlay(&self) -> &OverlayLayer {
        &self.overlay
    }

    pub fn bounds(&self) -> ViewSize {
        self.bounds
    }

    /// Generation of the result currently drawn
    pub fn last_generation(&self) -> Option<Generation> {
        self.last_generation
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Remove every outline. The preview layer is untouched.
    pub fn clear(&mut self) {
        self.overlay.outlines.clear();
    }

    pub fn draw(&mut self, rect: ViewRect, style: OutlineStyle) {
        self.overlay.outlines.push(Outline { rect, style });
    }

    /// Replace the outlines with an accepted detection result.
    ///
    /// Results not newer than the one on screen are ignored; returns whether
    /// the update was drawn.
    pub fn apply(&mut self, update: DetectionUpdate) -> bool {
        if self
            .last_generation
            .is_some_and(|last| update.generation <= last)
        {
            trace!("Ignoring out-of-order update {}", update.generation);
            return false;
        }

        self.last_generation = Some(update.generation);
        self.regions = update.regions;
        self.redraw();
        true
    }

    /// Track the surface size; outlines are remapped when it changes
    pub fn set_bounds(&mut self, bounds: ViewSize) {
        if bounds != self.bounds {
            debug!("Overlay bounds changed to {}x{}", bounds.width, bounds.height);
            self.bounds = bounds;
            self.redraw();
        }
    }

    fn redraw(&mut self) {
        let outlines = layout_outlines(&self.regions, self.bounds, &self.styles);
        self.clear();
        for outline in outlines {
            self.draw(outline.rect, outline.style);
        }
    }

    /// Paint the preview, then the outlines, into `rect`
    pub fn paint(&self, painter: &Painter, rect: Rect) {
        self.base.paint(painter, rect);
        if !self.visible {
            return;
        }
        for outline in &self.overlay.outlines {
            let r = outline.rect;
            let screen = Rect::from_min_size(
                rect.min + egui::vec2(r.x, r.y),
                egui::vec2(r.width, r.height),
            );
            painter.rect_stroke(screen, Rounding::ZERO, outline.style.stroke());
        }
    }
}

/// One word outline per region followed by its character outlines
fn layout_outlines(regions: &[TextRegion], bounds: ViewSize, styles: &OutlineStyles) -> Vec<Outline> {
    if bounds.is_empty() {
        return Vec::new();
    }

    let mut outlines = Vec::with_capacity(regions.iter().map(|r| 1 + r.characters.len()).sum());
    for region in regions {
        outlines.push(Outline {
            rect: map_word(region, bounds),
            style: styles.word,
        });
        for character in &region.characters {
            outlines.push(Outline {
                rect: map_character_box(character, bounds),
                style: styles.character,
            });
        }
    }
    outlines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::Quad;
    use std::time::Duration;

    fn update(generation: u64, regions: Vec<TextRegion>) -> DetectionUpdate {
        DetectionUpdate {
            generation: Generation(generation),
            regions,
            latency: Duration::ZERO,
        }
    }

    fn word(x: f32) -> TextRegion {
        TextRegion::new(
            Quad::from_bounds(x, 0.4, x + 0.2, 0.6),
            vec![
                Quad::from_bounds(x, 0.4, x + 0.1, 0.6),
                Quad::from_bounds(x + 0.1, 0.4, x + 0.2, 0.6),
            ],
        )
    }

    fn renderer() -> OverlayRenderer {
        let mut renderer = OverlayRenderer::new(OutlineStyles::default());
        renderer.set_bounds(ViewSize::new(200.0, 100.0));
        renderer
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut renderer = renderer();
        renderer.clear();
        assert!(renderer.overlay().is_empty());
        renderer.clear();
        assert!(renderer.overlay().is_empty());

        renderer.draw(ViewRect::new(0.0, 0.0, 10.0, 10.0), OutlineStyle::default());
        renderer.clear();
        renderer.clear();
        assert!(renderer.overlay().is_empty());
    }

    #[test]
    fn test_apply_draws_word_then_characters() {
        let mut renderer = renderer();
        assert!(renderer.apply(update(1, vec![word(0.1)])));

        let outlines = renderer.overlay().outlines();
        assert_eq!(outlines.len(), 3);
        assert_eq!(outlines[0].style, OutlineStyles::default().word);
        assert_eq!(outlines[1].style, OutlineStyles::default().character);
        assert_eq!(outlines[2].style, OutlineStyles::default().character);
        assert!(outlines[0].style.width > outlines[1].style.width);
    }

    #[test]
    fn test_apply_replaces_previous_outlines() {
        let mut renderer = renderer();
        renderer.apply(update(1, vec![word(0.1), word(0.5)]));
        assert_eq!(renderer.overlay().len(), 6);

        renderer.apply(update(2, vec![word(0.3)]));
        assert_eq!(renderer.overlay().len(), 3);

        renderer.apply(update(3, Vec::new()));
        assert!(renderer.overlay().is_empty());
    }

    #[test]
    fn test_older_generation_never_replaces_newer() {
        let mut renderer = renderer();
        renderer.apply(update(5, vec![word(0.1)]));
        let before = renderer.overlay().outlines().to_vec();

        assert!(!renderer.apply(update(4, vec![word(0.5), word(0.7)])));
        assert!(!renderer.apply(update(5, Vec::new())));
        assert_eq!(renderer.overlay().outlines(), before.as_slice());
        assert_eq!(renderer.last_generation(), Some(Generation(5)));
    }

    #[test]
    fn test_bounds_change_remaps_outlines() {
        let mut renderer = renderer();
        renderer.apply(update(1, vec![word(0.0)]));
        let close = |a: ViewRect, b: ViewRect| {
            [a.x - b.x, a.y - b.y, a.width - b.width, a.height - b.height]
                .iter()
                .all(|d| d.abs() < 1e-3)
        };

        let narrow = renderer.overlay().outlines()[0].rect;
        assert!(close(narrow, ViewRect::new(0.0, 40.0, 40.0, 20.0)), "{:?}", narrow);

        renderer.set_bounds(ViewSize::new(400.0, 200.0));
        let wide = renderer.overlay().outlines()[0].rect;
        assert!(close(wide, ViewRect::new(0.0, 80.0, 80.0, 40.0)), "{:?}", wide);
    }

    #[test]
    fn test_empty_bounds_draw_nothing_until_laid_out() {
        let mut renderer = OverlayRenderer::new(OutlineStyles::default());
        renderer.apply(update(1, vec![word(0.1)]));
        assert!(renderer.overlay().is_empty());

        renderer.set_bounds(ViewSize::new(200.0, 100.0));
        assert_eq!(renderer.overlay().len(), 3);
    }

    /// Shapes emitted by one paint of `renderer` into a fresh context
    fn painted_shapes(renderer: &OverlayRenderer) -> usize {
        let ctx = egui::Context::default();
        let output = ctx.run(egui::RawInput::default(), |ctx| {
            let painter = ctx.layer_painter(egui::LayerId::background());
            renderer.paint(&painter, Rect::from_min_size(Pos2::ZERO, egui::vec2(200.0, 100.0)));
        });
        output.shapes.len()
    }

    #[test]
    fn test_paint_draws_base_then_outlines() {
        let mut renderer = renderer();
        renderer.apply(update(1, vec![word(0.1)]));
        let visible = painted_shapes(&renderer);

        renderer.set_visible(false);
        let hidden = painted_shapes(&renderer);

        // Base layer is painted even with outlines hidden
        assert!(hidden >= 1);
        assert_eq!(visible - hidden, 3);
    }

    #[test]
    fn test_preview_upload_tracks_upright_size() {
        let ctx = egui::Context::default();
        let mut layer = PreviewLayer::default();
        let sideways = Frame::new(vec![0; 4 * 2 * 4], 4, 2)
            .with_orientation(crate::capture::frame::Orientation::Right);
        let malformed = Frame::new(vec![0; 3], 4, 2);

        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            assert!(layer.update(ctx, &sideways));
            assert!(!layer.update(ctx, &malformed));
        });
        assert_eq!(layer.frame_size(), Some((2, 4)));
    }

    #[test]
    fn test_clearing_outlines_keeps_preview_layer() {
        let mut renderer = renderer();
        renderer.apply(update(1, vec![word(0.1)]));
        renderer.clear();

        assert!(renderer.overlay().is_empty());
        assert!(renderer.base().frame_size().is_none());
    }
}
