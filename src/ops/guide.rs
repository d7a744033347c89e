// ============================================================================
// LOCATION GUIDE: the second image sent alongside the prompt
// ============================================================================
//
// Two flavours:
//   * Visual guide: the source image darkened everywhere except the
//     selection, which is left at full brightness and framed in bright green.
//     The model keeps seeing the background, which helps it line up pixels.
//   * Binary mask: white selection on a black field.
//
// Rows are composited in parallel via rayon.
// ============================================================================

use std::io::Cursor;

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, ImageError, RgbaImage};
use rayon::prelude::*;

use crate::selection::{BoundingBox, PixelRegion};

/// Alpha of the black overlay painted outside the selection.
pub const DIM_ALPHA: f32 = 0.85;
/// Frame colour around the selection (#00FF00).
pub const FRAME_COLOR: [u8; 4] = [0, 255, 0, 255];

/// Which kind of location guide accompanies the source image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GuideMode {
    #[default]
    VisualGuide,
    BinaryMask,
}

impl GuideMode {
    pub fn label(&self) -> &'static str {
        match self {
            GuideMode::VisualGuide => "Visual guide",
            GuideMode::BinaryMask => "Binary mask",
        }
    }

    pub fn all() -> &'static [GuideMode] {
        &[GuideMode::VisualGuide, GuideMode::BinaryMask]
    }

    /// Config / CLI spelling.
    pub fn key(&self) -> &'static str {
        match self {
            GuideMode::VisualGuide => "guide",
            GuideMode::BinaryMask => "mask",
        }
    }

    pub fn from_key(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "guide" | "visual" | "visual_guide" => Some(GuideMode::VisualGuide),
            "mask" | "binary" | "binary_mask" => Some(GuideMode::BinaryMask),
            _ => None,
        }
    }
}

/// Frame thickness for an image of the given width: 0.5 % of the width, at least 2 px.
pub fn frame_width(image_width: u32) -> f32 {
    (image_width as f32 * 0.005).max(2.0)
}

/// Build the guide for `mode`.
pub fn build_guide(mode: GuideMode, src: &RgbaImage, selection: &BoundingBox) -> RgbaImage {
    match mode {
        GuideMode::VisualGuide => create_visual_guide(src, selection),
        GuideMode::BinaryMask => create_binary_mask(src.width(), src.height(), selection),
    }
}

/// Darken everything outside the selection, keep the selection untouched and
/// stroke a green frame centred on its edges.
pub fn create_visual_guide(src: &RgbaImage, selection: &BoundingBox) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 {
        return src.clone();
    }
    let region = selection.to_pixels(src.width(), src.height());
    let half = frame_width(src.width()) / 2.0;

    let src_raw = src.as_raw();
    let stride = w * 4;
    let mut dst_raw = vec![0u8; w * h * 4];

    dst_raw.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &src_raw[y * stride..(y + 1) * stride];
        for x in 0..w {
            let pi = x * 4;
            let px = [row_in[pi], row_in[pi + 1], row_in[pi + 2], row_in[pi + 3]];
            let out = guide_pixel(px, &region, x as u32, y as u32, half);
            row_out[pi..pi + 4].copy_from_slice(&out);
        }
    });

    RgbaImage::from_raw(src.width(), src.height(), dst_raw)
        .unwrap_or_else(|| src.clone())
}

fn guide_pixel(px: [u8; 4], region: &PixelRegion, x: u32, y: u32, half: f32) -> [u8; 4] {
    // The stroke is painted last, so it wins over both the dim and the cut-out.
    if region.on_outline(x, y, half) {
        return FRAME_COLOR;
    }
    if region.contains(x, y) {
        return px;
    }
    dim_over(px)
}

/// Source-over of black at `DIM_ALPHA` onto an unpremultiplied pixel.
fn dim_over(px: [u8; 4]) -> [u8; 4] {
    let a = px[3] as f32 / 255.0;
    let keep = a * (1.0 - DIM_ALPHA);
    let out_a = DIM_ALPHA + keep;
    let channel = |c: u8| ((c as f32 * keep) / out_a).round().clamp(0.0, 255.0) as u8;
    [
        channel(px[0]),
        channel(px[1]),
        channel(px[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ]
}

/// Opaque white inside the selection, opaque black elsewhere.
pub fn create_binary_mask(width: u32, height: u32, selection: &BoundingBox) -> RgbaImage {
    let region = selection.to_pixels(width, height);
    let w = width as usize;
    let stride = w * 4;
    let mut dst_raw = vec![0u8; w * height as usize * 4];
    if stride > 0 {
        dst_raw.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
            for x in 0..w {
                let v = if region.contains(x as u32, y as u32) { 255 } else { 0 };
                row_out[x * 4..x * 4 + 4].copy_from_slice(&[v, v, v, 255]);
            }
        });
    }
    RgbaImage::from_raw(width, height, dst_raw).unwrap_or_else(|| RgbaImage::new(width, height))
}

/// PNG-encode an RGBA buffer in memory.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ImageError> {
    let mut buf = Cursor::new(Vec::new());
    PngEncoder::new(&mut buf).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgba8,
    )?;
    Ok(buf.into_inner())
}
