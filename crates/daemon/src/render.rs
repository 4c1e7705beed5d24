//! Rasterisation of watermark overlays.
//!
//! The text is laid out once into a coverage mask whose anchor sits at the
//! horizontal centre of the advance width, on the baseline (SVG
//! `text-anchor="middle"`). Each tile then stamps that mask rotated about its
//! own anchor, sampling the mask through the inverse rotation with bilinear
//! interpolation.

use ab_glyph::{point, Font, FontRef, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};
use std::sync::OnceLock;
use thiserror::Error;

use crate::pattern::Overlay;

/// Embedded bold sans-serif face (DejaVu Sans Bold, Bitstream Vera license,
/// see `assets/DejaVu-LICENSE.txt`).
const EMBEDDED_FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSans-Bold.ttf");

static EMBEDDED_FONT: OnceLock<Option<FontRef<'static>>> = OnceLock::new();

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Embedded font could not be parsed")]
    FontUnavailable,
}

fn embedded_font() -> Result<&'static FontRef<'static>, RenderError> {
    EMBEDDED_FONT
        .get_or_init(|| FontRef::try_from_slice(EMBEDDED_FONT_DATA).ok())
        .as_ref()
        .ok_or(RenderError::FontUnavailable)
}

/// Anti-aliased coverage of a laid-out text run.
#[derive(Debug, Clone)]
pub struct TextMask {
    pub width: u32,
    pub height: u32,
    /// Row-major coverage in `0.0..=1.0`.
    coverage: Vec<f32>,
    /// Anchor in mask pixel coordinates.
    pub anchor_x: f32,
    pub anchor_y: f32,
}

impl TextMask {
    fn at(&self, x: i64, y: i64) -> f32 {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return 0.0;
        }
        self.coverage[y as usize * self.width as usize + x as usize]
    }

    /// Bilinear sample with pixel centres at `i + 0.5`.
    fn sample(&self, x: f32, y: f32) -> f32 {
        let sx = x - 0.5;
        let sy = y - 0.5;
        let x0 = sx.floor();
        let y0 = sy.floor();
        let fx = sx - x0;
        let fy = sy - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        self.at(x0, y0) * (1.0 - fx) * (1.0 - fy)
            + self.at(x0 + 1, y0) * fx * (1.0 - fy)
            + self.at(x0, y0 + 1) * (1.0 - fx) * fy
            + self.at(x0 + 1, y0 + 1) * fx * fy
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Fraction of mask pixels with any coverage.
    pub fn ink_ratio(&self) -> f32 {
        if self.coverage.is_empty() {
            return 0.0;
        }
        let inked = self.coverage.iter().filter(|c| **c > 0.0).count();
        inked as f32 / self.coverage.len() as f32
    }
}

/// Lay out `text` at `font_size` pixels into a coverage mask.
///
/// Control characters are ignored. Text made only of whitespace produces an
/// empty mask.
pub fn layout_text(text: &str, font_size: f32) -> Result<TextMask, RenderError> {
    let font = embedded_font()?;
    let scale = PxScale::from(font_size);
    let scaled_font = font.as_scaled(scale);

    let mut caret = 0.0f32;
    let mut prev_glyph: Option<ab_glyph::GlyphId> = None;
    let mut outlines = Vec::new();

    for c in text.chars().filter(|c| !c.is_control()) {
        let glyph_id = scaled_font.glyph_id(c);
        if let Some(prev) = prev_glyph {
            caret += scaled_font.kern(prev, glyph_id);
        }

        let glyph = glyph_id.with_scale_and_position(scale, point(caret, 0.0));
        if let Some(outlined) = font.outline_glyph(glyph) {
            outlines.push(outlined);
        }

        caret += scaled_font.h_advance(glyph_id);
        prev_glyph = Some(glyph_id);
    }

    // Baseline is y = 0; glyph bounds are already whole pixels.
    let Some(first) = outlines.first() else {
        return Ok(TextMask {
            width: 0,
            height: 0,
            coverage: Vec::new(),
            anchor_x: 0.0,
            anchor_y: 0.0,
        });
    };
    let mut min_x = first.px_bounds().min.x;
    let mut min_y = first.px_bounds().min.y;
    let mut max_x = first.px_bounds().max.x;
    let mut max_y = first.px_bounds().max.y;
    for outlined in &outlines[1..] {
        let bounds = outlined.px_bounds();
        min_x = min_x.min(bounds.min.x);
        min_y = min_y.min(bounds.min.y);
        max_x = max_x.max(bounds.max.x);
        max_y = max_y.max(bounds.max.y);
    }
    let origin_x = min_x.floor();
    let origin_y = min_y.floor();
    let width = (max_x - origin_x).ceil().max(0.0) as u32;
    let height = (max_y - origin_y).ceil().max(0.0) as u32;

    let mut coverage = vec![0.0f32; width as usize * height as usize];
    for outlined in &outlines {
        let bounds = outlined.px_bounds();
        let dx = (bounds.min.x - origin_x) as i64;
        let dy = (bounds.min.y - origin_y) as i64;

        outlined.draw(|px, py, c| {
            let x = dx + i64::from(px);
            let y = dy + i64::from(py);
            if x >= 0 && y >= 0 && x < i64::from(width) && y < i64::from(height) {
                let idx = y as usize * width as usize + x as usize;
                // Kerned neighbours may overlap; keep the stronger coverage.
                coverage[idx] = coverage[idx].max(c.clamp(0.0, 1.0));
            }
        });
    }

    Ok(TextMask {
        width,
        height,
        coverage,
        anchor_x: caret / 2.0 - origin_x,
        anchor_y: -origin_y,
    })
}

/// Rasterise the overlay onto a transparent canvas of the overlay's size.
pub fn rasterize(overlay: &Overlay) -> Result<RgbaImage, RenderError> {
    let mut canvas = RgbaImage::new(overlay.width, overlay.height);
    let mask = layout_text(&overlay.text, overlay.style.font_size)?;
    if mask.is_empty() || overlay.style.opacity <= 0.0 {
        return Ok(canvas);
    }

    let radians = overlay.style.rotation_degrees.to_radians();
    let (sin, cos) = radians.sin_cos();
    let color = overlay.style.color;
    let opacity = overlay.style.opacity.clamp(0.0, 1.0);

    for tile in &overlay.tiles {
        stamp(
            &mut canvas,
            &mask,
            tile.x as f32,
            tile.y as f32,
            (sin, cos),
            |coverage| Rgba([color.r, color.g, color.b, unit_to_u8(coverage * opacity)]),
        );
    }

    Ok(canvas)
}

/// Draw `mask` rotated about (`ax`, `ay`).
///
/// Forward mapping of a mask offset `(u, v)` from its anchor is the SVG
/// rotation `(u cos - v sin, u sin + v cos)`; destination pixels are mapped
/// back through the inverse.
fn stamp<F>(canvas: &mut RgbaImage, mask: &TextMask, ax: f32, ay: f32, rot: (f32, f32), paint: F)
where
    F: Fn(f32) -> Rgba<u8>,
{
    let (sin, cos) = rot;
    let corners = [
        (-mask.anchor_x, -mask.anchor_y),
        (mask.width as f32 - mask.anchor_x, -mask.anchor_y),
        (-mask.anchor_x, mask.height as f32 - mask.anchor_y),
        (mask.width as f32 - mask.anchor_x, mask.height as f32 - mask.anchor_y),
    ];

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for (u, v) in corners {
        let x = ax + u * cos - v * sin;
        let y = ay + u * sin + v * cos;
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    let x_start = min_x.floor().max(0.0) as i64;
    let y_start = min_y.floor().max(0.0) as i64;
    let x_end = (max_x.ceil() as i64).min(i64::from(canvas.width()));
    let y_end = (max_y.ceil() as i64).min(i64::from(canvas.height()));

    for py in y_start..y_end {
        for px in x_start..x_end {
            let dx = px as f32 + 0.5 - ax;
            let dy = py as f32 + 0.5 - ay;
            let u = dx * cos + dy * sin;
            let v = -dx * sin + dy * cos;

            let coverage = mask.sample(u + mask.anchor_x, v + mask.anchor_y);
            if coverage <= 0.0 {
                continue;
            }

            let top = paint(coverage);
            if top[3] == 0 {
                continue;
            }
            let existing = canvas.get_pixel_mut(px as u32, py as u32);
            *existing = blend_pixels(*existing, top);
        }
    }
}

fn unit_to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Source-over blend of two straight-alpha RGBA pixels.
fn blend_pixels(bottom: Rgba<u8>, top: Rgba<u8>) -> Rgba<u8> {
    let top_alpha = f32::from(top[3]) / 255.0;
    let bottom_alpha = f32::from(bottom[3]) / 255.0;

    let out_alpha = top_alpha + bottom_alpha * (1.0 - top_alpha);
    if out_alpha < 0.001 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend = |t: u8, b: u8| -> u8 {
        let t = f32::from(t) / 255.0;
        let b = f32::from(b) / 255.0;
        unit_to_u8((t * top_alpha + b * bottom_alpha * (1.0 - top_alpha)) / out_alpha)
    };

    Rgba([
        blend(top[0], bottom[0]),
        blend(top[1], bottom[1]),
        blend(top[2], bottom[2]),
        unit_to_u8(out_alpha),
    ])
}
