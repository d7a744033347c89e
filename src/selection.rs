// ============================================================================
// Selection: percent-space bounding box and drag-to-select state
// ============================================================================
//
// Selections are stored as percentages (0 to 100) of the image so they survive
// any display scaling. Pixel coordinates are only derived at composite time.

use egui::{Pos2, Rect};

/// Boxes at or below this extent (in percent) count as "no selection".
pub const MIN_EXTENT: f32 = 0.01;

/// An axis-aligned box in percent of the image's width/height.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Normalized box spanning two arbitrary corners.
    pub fn from_corners(a: (f32, f32), b: (f32, f32)) -> Self {
        Self {
            x: a.0.min(b.0),
            y: a.1.min(b.1),
            width: (a.0 - b.0).abs(),
            height: (a.1 - b.1).abs(),
        }
    }

    /// Box from pixel coordinates on an image of the given size.
    pub fn from_pixels(x: f32, y: f32, w: f32, h: f32, img_w: u32, img_h: u32) -> Self {
        let iw = img_w.max(1) as f32;
        let ih = img_h.max(1) as f32;
        Self::new(x / iw * 100.0, y / ih * 100.0, w / iw * 100.0, h / ih * 100.0).clamped()
    }

    /// Clip to the [0,100]×[0,100] image square.
    pub fn clamped(&self) -> Self {
        let x0 = self.x.clamp(0.0, 100.0);
        let y0 = self.y.clamp(0.0, 100.0);
        let x1 = (self.x + self.width).clamp(0.0, 100.0);
        let y1 = (self.y + self.height).clamp(0.0, 100.0);
        Self::from_corners((x0, y0), (x1, y1))
    }

    pub fn is_empty(&self) -> bool {
        self.width <= MIN_EXTENT || self.height <= MIN_EXTENT
    }

    pub fn to_pixels(&self, img_w: u32, img_h: u32) -> PixelRegion {
        let w = img_w as f32;
        let h = img_h as f32;
        let x0 = self.x / 100.0 * w;
        let y0 = self.y / 100.0 * h;
        PixelRegion {
            x0,
            y0,
            x1: x0 + self.width / 100.0 * w,
            y1: y0 + self.height / 100.0 * h,
        }
    }

    /// Screen-space rect of this box over a displayed image.
    pub fn to_screen(&self, image_rect: Rect) -> Rect {
        let sx = image_rect.width() / 100.0;
        let sy = image_rect.height() / 100.0;
        Rect::from_min_size(
            Pos2::new(image_rect.min.x + self.x * sx, image_rect.min.y + self.y * sy),
            egui::vec2(self.width * sx, self.height * sy),
        )
    }
}

/// A selection mapped onto a concrete image, in float pixel space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelRegion {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl PixelRegion {
    /// Pixel-centre coverage test against the half-open rect.
    pub fn contains(&self, px: u32, py: u32) -> bool {
        let cx = px as f32 + 0.5;
        let cy = py as f32 + 0.5;
        cx >= self.x0 && cx < self.x1 && cy >= self.y0 && cy < self.y1
    }

    /// True when the pixel centre lies within `half` of the rect outline.
    pub fn on_outline(&self, px: u32, py: u32, half: f32) -> bool {
        let cx = px as f32 + 0.5;
        let cy = py as f32 + 0.5;
        let in_outer = cx >= self.x0 - half
            && cx < self.x1 + half
            && cy >= self.y0 - half
            && cy < self.y1 + half;
        if !in_outer {
            return false;
        }
        let in_inner = cx >= self.x0 + half
            && cx < self.x1 - half
            && cy >= self.y0 + half
            && cy < self.y1 - half;
        !in_inner
    }
}

/// Convert a pointer position to percent of the displayed image, clamped so
/// drags that leave the image still produce a box inside it.
pub fn percent_from_screen(pos: Pos2, image_rect: Rect) -> (f32, f32) {
    let w = image_rect.width().max(f32::EPSILON);
    let h = image_rect.height().max(f32::EPSILON);
    let x = (pos.x - image_rect.min.x).clamp(0.0, w);
    let y = (pos.y - image_rect.min.y).clamp(0.0, h);
    (x / w * 100.0, y / h * 100.0)
}

/// Drag-to-select state. `anchor` is set only while the button is held.
#[derive(Clone, Debug, Default)]
pub struct SelectionDrag {
    anchor: Option<(f32, f32)>,
    current: Option<BoundingBox>,
}

impl SelectionDrag {
    pub fn is_dragging(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn current(&self) -> Option<BoundingBox> {
        self.current
    }

    pub fn begin(&mut self, p: (f32, f32)) {
        self.anchor = Some(p);
        self.current = Some(BoundingBox::new(p.0, p.1, 0.0, 0.0));
    }

    pub fn update(&mut self, p: (f32, f32)) {
        if let Some(anchor) = self.anchor {
            self.current = Some(BoundingBox::from_corners(anchor, p));
        }
    }

    /// End the drag. Returns the committed box, or `None` if no drag was active.
    pub fn finish(&mut self) -> Option<BoundingBox> {
        self.anchor.take()?;
        self.current
    }

    pub fn reset(&mut self) {
        self.anchor = None;
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_are_normalized() {
        let b = BoundingBox::from_corners((60.0, 10.0), (20.0, 40.0));
        assert_eq!(b, BoundingBox::new(20.0, 10.0, 40.0, 30.0));
    }

    #[test]
    fn clamped_stays_inside_image() {
        let b = BoundingBox::new(-10.0, 90.0, 50.0, 30.0).clamped();
        assert_eq!(b, BoundingBox::new(0.0, 90.0, 40.0, 10.0));
    }

    #[test]
    fn zero_size_box_is_empty() {
        assert!(BoundingBox::new(5.0, 5.0, 0.0, 12.0).is_empty());
        assert!(!BoundingBox::new(5.0, 5.0, 1.0, 1.0).is_empty());
    }

    #[test]
    fn pixel_mapping_uses_percentages() {
        let r = BoundingBox::new(25.0, 50.0, 50.0, 25.0).to_pixels(200, 100);
        assert_eq!(r, PixelRegion { x0: 50.0, y0: 50.0, x1: 150.0, y1: 75.0 });
        assert!(r.contains(50, 50));
        assert!(!r.contains(150, 50));
        assert!(!r.contains(49, 60));
    }

    #[test]
    fn from_pixels_round_trips_through_to_pixels() {
        let b = BoundingBox::from_pixels(10.0, 20.0, 30.0, 40.0, 100, 200);
        assert!((b.x - 10.0).abs() < 1e-4 && (b.y - 10.0).abs() < 1e-4);
        assert!((b.width - 30.0).abs() < 1e-4 && (b.height - 20.0).abs() < 1e-4);
        let r = b.to_pixels(100, 200);
        assert!((r.x1 - 40.0).abs() < 1e-4);
        assert!((r.y1 - 60.0).abs() < 1e-4);
    }

    #[test]
    fn outline_band_straddles_edges() {
        let r = PixelRegion { x0: 10.0, y0: 10.0, x1: 30.0, y1: 30.0 };
        assert!(r.on_outline(9, 20, 1.0));
        assert!(r.on_outline(10, 20, 1.0));
        assert!(!r.on_outline(11, 20, 1.0));
        assert!(!r.on_outline(20, 20, 1.0));
        assert!(!r.on_outline(5, 20, 1.0));
    }

    #[test]
    fn screen_pointer_is_clamped_to_image() {
        let rect = Rect::from_min_size(Pos2::new(100.0, 100.0), egui::vec2(200.0, 100.0));
        assert_eq!(percent_from_screen(Pos2::new(200.0, 150.0), rect), (50.0, 50.0));
        assert_eq!(percent_from_screen(Pos2::new(0.0, 500.0), rect), (0.0, 100.0));
    }

    #[test]
    fn drag_lifecycle() {
        let mut drag = SelectionDrag::default();
        drag.update((50.0, 50.0));
        assert!(drag.current().is_none());

        drag.begin((40.0, 40.0));
        assert!(drag.is_dragging());
        assert_eq!(drag.current(), Some(BoundingBox::new(40.0, 40.0, 0.0, 0.0)));

        drag.update((10.0, 60.0));
        assert_eq!(drag.current(), Some(BoundingBox::new(10.0, 40.0, 30.0, 20.0)));

        let committed = drag.finish();
        assert_eq!(committed, Some(BoundingBox::new(10.0, 40.0, 30.0, 20.0)));
        assert!(!drag.is_dragging());
        // Second release (e.g. pointer leave after mouse up) commits nothing.
        assert_eq!(drag.finish(), None);

        drag.reset();
        assert!(drag.current().is_none());
    }
}
