//! Annotated video window

use crossbeam_channel::Receiver;
use eframe::egui;
use egui::RichText;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::app::AnnotationPipeline;
use crate::config::AppConfig;
use crate::overlay::mapping::ViewSize;
use crate::overlay::OverlayRenderer;
use crate::shared::{drain, PipelineToUi, PreviewSlot};
use crate::view::theme::{self, ThemeColors};
use crate::view::FrameCounter;

/// eframe application owning the renderer; the UI thread is its only writer
pub struct AnnotatorView {
    pipeline: AnnotationPipeline,
    updates: Receiver<PipelineToUi>,
    preview: Arc<PreviewSlot>,
    renderer: OverlayRenderer,
    frame_counter: FrameCounter,
    theme_applied: bool,
    capture_lost_reported: bool,
}

impl AnnotatorView {
    pub fn new(config: &AppConfig, pipeline: AnnotationPipeline, updates: Receiver<PipelineToUi>) -> Self {
        let mut renderer = OverlayRenderer::new(config.overlay.styles());
        renderer.set_visible(config.overlay.enabled);

        Self {
            preview: pipeline.preview(),
            pipeline,
            updates,
            renderer,
            frame_counter: FrameCounter::default(),
            theme_applied: false,
            capture_lost_reported: false,
        }
    }

    /// Create eframe options for the view window
    pub fn options(config: &AppConfig) -> eframe::NativeOptions {
        eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size([config.view.width, config.view.height])
                .with_min_inner_size([320.0, 240.0])
                .with_title(config.view.title.clone()),
            ..Default::default()
        }
    }

    fn apply_updates(&mut self) {
        for message in drain(&self.updates) {
            match message {
                PipelineToUi::Detections(update) => {
                    let generation = update.generation;
                    let latency = update.latency;
                    if self.renderer.apply(update) {
                        debug!(
                            "Drew detection {} ({} outlines, {:?})",
                            generation,
                            self.renderer.overlay().len(),
                            latency
                        );
                    }
                }
            }
        }
    }

    fn show_preview(&mut self, ctx: &egui::Context) {
        if let Some(frame) = self.preview.take() {
            if self.renderer.base_mut().update(ctx, &frame) {
                self.frame_counter.tick();
            }
        }
    }

    fn status_bar(&mut self, ui: &mut egui::Ui) {
        let status = self.pipeline.status();
        if !status.capturing && !self.capture_lost_reported {
            warn!("Capture on {} is no longer running", status.device);
            self.capture_lost_reported = true;
        }

        ui.horizontal(|ui| {
            let (label, color) = if status.capturing {
                ("LIVE", ThemeColors::STATUS_RUNNING)
            } else {
                ("STOPPED", ThemeColors::STATUS_ERROR)
            };
            ui.label(RichText::new(label).color(color).strong());
            ui.label(RichText::new(&status.device).color(ThemeColors::TEXT_MUTED));
            if let Some((width, height)) = self.renderer.base().frame_size() {
                ui.label(RichText::new(format!("{}x{}", width, height)).color(ThemeColors::TEXT_MUTED));
            }
            ui.separator();
            ui.label(format!("{:.1} fps", self.frame_counter.fps()));
            ui.separator();
            ui.label(format!("in flight {}", status.dispatch.in_flight));
            ui.label(format!("stale {}", status.dispatch.stale));
            ui.label(format!("failed {}", status.dispatch.failed));
            if status.dispatch.stalled > 0 {
                ui.label(
                    RichText::new(format!("stalled {}", status.dispatch.stalled))
                        .color(ThemeColors::STATUS_ERROR),
                );
            }
            ui.separator();

            if let Some(generation) = self.renderer.last_generation() {
                ui.label(RichText::new(generation.to_string()).color(ThemeColors::TEXT_MUTED));
            }

            let outlines = if self.renderer.is_visible() {
                RichText::new(format!("{} outlines", self.renderer.overlay().len()))
            } else {
                RichText::new("outlines hidden (O)").color(ThemeColors::STATUS_STOPPED)
            };
            ui.label(outlines);
        });
    }
}

impl eframe::App for AnnotatorView {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if !self.theme_applied {
            theme::apply_theme(ctx);
            self.theme_applied = true;
        }

        if ctx.input(|i| i.key_pressed(egui::Key::O)) {
            let visible = !self.renderer.is_visible();
            self.renderer.set_visible(visible);
            debug!("Outlines {}", if visible { "shown" } else { "hidden" });
        }

        self.apply_updates();
        self.show_preview(ctx);

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            self.status_bar(ui);
        });

        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let (rect, _) = ui.allocate_exact_size(ui.available_size(), egui::Sense::hover());
                self.renderer.set_bounds(ViewSize::new(rect.width(), rect.height()));
                self.renderer.paint(ui.painter(), rect);
            });
    }
}
