// ============================================================================
// Selection canvas: displays the workspace image and handles drag-to-select
// ============================================================================

use egui::{
    self, Color32, ColorImage, Pos2, Rect, Sense, Stroke, TextureHandle, TextureOptions, Vec2,
};
use image::RgbaImage;
use image::imageops::FilterType;

use crate::selection::{BoundingBox, SelectionDrag, percent_from_screen};

/// Largest texture edge uploaded for display. Guides and requests always use
/// the full-resolution image.
const MAX_DISPLAY_EDGE: u32 = 4096;
const SELECTION_STROKE: Color32 = Color32::from_rgb(0, 255, 0);

/// Upload-ready copy of an image, downscaled if too large for a texture.
pub fn display_image(rgba: &RgbaImage) -> ColorImage {
    let (w, h) = rgba.dimensions();
    let longest = w.max(h);
    if longest > MAX_DISPLAY_EDGE {
        let scale = MAX_DISPLAY_EDGE as f32 / longest as f32;
        let nw = ((w as f32 * scale).round() as u32).max(1);
        let nh = ((h as f32 * scale).round() as u32).max(1);
        let small = image::imageops::resize(rgba, nw, nh, FilterType::Triangle);
        return ColorImage::from_rgba_unmultiplied([nw as usize, nh as usize], small.as_raw());
    }
    ColorImage::from_rgba_unmultiplied([w as usize, h as usize], rgba.as_raw())
}

/// Largest rect with the image's aspect ratio centred inside `area` (object-fit: contain).
pub fn fit_rect(area: Rect, image_size: Vec2) -> Rect {
    if image_size.x <= 0.0 || image_size.y <= 0.0 {
        return Rect::from_center_size(area.center(), Vec2::ZERO);
    }
    let scale = (area.width() / image_size.x).min(area.height() / image_size.y);
    Rect::from_center_size(area.center(), image_size * scale)
}

/// Holds the uploaded texture and the drag state for one workspace image.
#[derive(Default)]
pub struct SelectionCanvas {
    texture: Option<TextureHandle>,
    /// Epoch of the editor state this canvas last synced with.
    epoch: u64,
    drag: SelectionDrag,
}

impl SelectionCanvas {
    /// Drop the texture and drag when the editor's epoch moved (new image,
    /// continue editing, start over).
    pub fn sync(&mut self, epoch: u64) {
        if self.epoch != epoch {
            self.epoch = epoch;
            self.texture = None;
            self.drag.reset();
        }
    }

    /// Draw the canvas. Returns `Some(selection)` when a drag was released
    /// this frame.
    pub fn show(&mut self, ui: &mut egui::Ui, image: &RgbaImage, enabled: bool) -> Option<BoundingBox> {
        let texture = self
            .texture
            .get_or_insert_with(|| {
                ui.ctx()
                    .load_texture("workspace_image", display_image(image), TextureOptions::LINEAR)
            })
            .clone();

        let (response, painter) = ui.allocate_painter(ui.available_size(), Sense::click_and_drag());
        let image_rect = fit_rect(
            response.rect,
            Vec2::new(image.width() as f32, image.height() as f32),
        );
        painter.image(
            texture.id(),
            image_rect,
            Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
            Color32::WHITE,
        );

        let mut committed = None;
        if enabled {
            if response.drag_started()
                && let Some(pos) = response.interact_pointer_pos()
            {
                self.drag.begin(percent_from_screen(pos, image_rect));
            }
            if response.dragged()
                && let Some(pos) = response.interact_pointer_pos()
            {
                self.drag.update(percent_from_screen(pos, image_rect));
            }
            if response.drag_released() {
                committed = self.drag.finish();
            }
        }

        match self.drag.current() {
            Some(sel) => paint_selection(&painter, image_rect, &sel),
            None => {
                painter.text(
                    image_rect.center(),
                    egui::Align2::CENTER_CENTER,
                    "Drag to select text area",
                    egui::FontId::proportional(16.0),
                    Color32::from_white_alpha(220),
                );
            }
        }

        if enabled {
            response.on_hover_cursor(egui::CursorIcon::Crosshair);
        }
        committed
    }
}

/// Dim everything outside the box and outline it.
fn paint_selection(painter: &egui::Painter, image_rect: Rect, sel: &BoundingBox) {
    let r = sel.to_screen(image_rect);
    let shade = Color32::from_black_alpha(110);
    // Four bands around the selection.
    let bands = [
        Rect::from_min_max(image_rect.min, Pos2::new(image_rect.max.x, r.min.y)),
        Rect::from_min_max(Pos2::new(image_rect.min.x, r.max.y), image_rect.max),
        Rect::from_min_max(Pos2::new(image_rect.min.x, r.min.y), Pos2::new(r.min.x, r.max.y)),
        Rect::from_min_max(Pos2::new(r.max.x, r.min.y), Pos2::new(image_rect.max.x, r.max.y)),
    ];
    for band in bands {
        if band.is_positive() {
            painter.rect_filled(band, 0.0, shade);
        }
    }
    painter.rect_stroke(r, 0.0, Stroke::new(2.0, SELECTION_STROKE));
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn fit_keeps_aspect_and_centres() {
        let area = Rect::from_min_size(Pos2::ZERO, Vec2::new(400.0, 200.0));
        let r = fit_rect(area, Vec2::new(100.0, 100.0));
        assert_eq!(r, Rect::from_min_size(Pos2::new(100.0, 0.0), Vec2::new(200.0, 200.0)));
    }

    #[test]
    fn huge_images_are_downscaled_for_display() {
        let img = RgbaImage::from_pixel(5000, 100, Rgba([0, 0, 0, 255]));
        let shown = display_image(&img);
        assert_eq!(shown.size, [4096, 82]);

        let small = RgbaImage::from_pixel(10, 20, Rgba([0, 0, 0, 255]));
        assert_eq!(display_image(&small).size, [10, 20]);
    }

    /// One headless frame with the canvas filling a 200x100 screen.
    fn frame(
        ctx: &egui::Context,
        canvas: &mut SelectionCanvas,
        image: &RgbaImage,
        events: Vec<egui::Event>,
    ) -> Option<BoundingBox> {
        let input = egui::RawInput {
            screen_rect: Some(Rect::from_min_size(Pos2::ZERO, Vec2::new(200.0, 100.0))),
            events,
            ..Default::default()
        };
        let mut committed = None;
        let _ = ctx.run(input, |ctx| {
            egui::CentralPanel::default()
                .frame(egui::Frame::none())
                .show(ctx, |ui| {
                    committed = canvas.show(ui, image, true);
                });
        });
        committed
    }

    fn button(pos: Pos2, pressed: bool) -> egui::Event {
        egui::Event::PointerButton {
            pos,
            button: egui::PointerButton::Primary,
            pressed,
            modifiers: egui::Modifiers::default(),
        }
    }

    #[test]
    fn drag_past_the_image_edge_commits_a_clamped_box() {
        let ctx = egui::Context::default();
        let mut canvas = SelectionCanvas::default();
        // 100x50 image fits the 200x100 screen exactly at scale 2.
        let image = RgbaImage::from_pixel(100, 50, Rgba([255, 255, 255, 255]));

        let start = Pos2::new(20.0, 10.0);
        let end = Pos2::new(300.0, 60.0);
        let mut committed = frame(&ctx, &mut canvas, &image, vec![egui::Event::PointerMoved(start)]);
        committed = committed.or(frame(
            &ctx,
            &mut canvas,
            &image,
            vec![egui::Event::PointerMoved(start), button(start, true)],
        ));
        committed = committed.or(frame(&ctx, &mut canvas, &image, vec![egui::Event::PointerMoved(end)]));
        committed = committed.or(frame(&ctx, &mut canvas, &image, vec![button(end, false)]));

        let sel = committed.expect("release should commit a selection");
        assert!((sel.x - 10.0).abs() < 1e-3);
        assert!((sel.y - 10.0).abs() < 1e-3);
        assert!((sel.width - 90.0).abs() < 1e-3);
        assert!((sel.height - 50.0).abs() < 1e-3);
        assert!(!canvas.drag.is_dragging());
    }

    #[test]
    fn sync_resets_drag_on_new_epoch() {
        let mut canvas = SelectionCanvas::default();
        canvas.drag.begin((10.0, 10.0));
        canvas.sync(0);
        assert!(canvas.drag.is_dragging());
        canvas.sync(1);
        assert!(!canvas.drag.is_dragging());
        assert!(canvas.drag.current().is_none());
    }
}
