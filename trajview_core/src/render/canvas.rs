//! A panel-sized RGBA canvas with alpha-blended drawing primitives.
//!
//! Every primitive clips to the panel, so callers can pass points far
//! outside it.

use super::style::LineStyle;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{imageops, Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_polygon_mut,
    Blend,
};
use imageproc::point::Point;
use imageproc::rect::Rect;

/// Glyph cell size of the bitmap font before scaling.
pub const GLYPH: u32 = 8;

pub type Px = (f32, f32);

pub struct Panel {
    canvas: Blend<RgbaImage>,
}

impl Panel {
    pub fn new(width: u32, height: u32, background: Rgba<u8>) -> Self {
        Self {
            canvas: Blend(RgbaImage::from_pixel(width, height, background)),
        }
    }

    pub fn width(&self) -> u32 {
        self.canvas.0.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.0.height()
    }

    pub fn into_image(self) -> RgbaImage {
        self.canvas.0
    }

    pub fn contains(&self, p: Px, margin: f32) -> bool {
        p.0 >= -margin && p.1 >= -margin && p.0 <= self.width() as f32 + margin && p.1 <= self.height() as f32 + margin
    }

    /// Straight segment, `thickness` pixels wide.
    pub fn line(&mut self, start: Px, end: Px, color: Rgba<u8>, thickness: u32) {
        let Some((s, e)) = clip_segment(start, end, self.width() as f32, self.height() as f32) else {
            return;
        };
        let dx = e.0 - s.0;
        let dy = e.1 - s.1;
        let len = (dx * dx + dy * dy).sqrt();
        if thickness <= 1 || len < 1e-3 {
            draw_line_segment_mut(&mut self.canvas, s, e, color);
            return;
        }
        // Parallel offsets along the unit normal
        let nx = -dy / len;
        let ny = dx / len;
        let half = (thickness / 2) as i32;
        for k in -half..=half {
            let off = k as f32;
            draw_line_segment_mut(
                &mut self.canvas,
                (s.0 + nx * off, s.1 + ny * off),
                (e.0 + nx * off, e.1 + ny * off),
                color,
            );
        }
    }

    /// Polyline with a dash pattern carried across vertices.
    pub fn polyline(&mut self, points: &[Px], color: Rgba<u8>, style: LineStyle, thickness: u32) {
        match style {
            LineStyle::Solid => {
                for pair in points.windows(2) {
                    self.line(pair[0], pair[1], color, thickness);
                }
            }
            LineStyle::Dashed { on, off } => {
                for (s, e) in dash_pattern(points, on, off) {
                    self.line(s, e, color, thickness);
                }
            }
            LineStyle::Dotted { spacing } => {
                let radius = (thickness as i32 / 2).max(1);
                for dot in dot_positions(points, spacing) {
                    self.circle(dot, radius, color);
                }
            }
        }
    }

    pub fn circle(&mut self, center: Px, radius: i32, color: Rgba<u8>) {
        if !self.contains(center, radius as f32) {
            return;
        }
        draw_filled_circle_mut(&mut self.canvas, (center.0.round() as i32, center.1.round() as i32), radius, color);
    }

    pub fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: Rgba<u8>) {
        if width == 0 || height == 0 {
            return;
        }
        draw_filled_rect_mut(&mut self.canvas, Rect::at(x, y).of_size(width, height), color);
    }

    pub fn outline_rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: Rgba<u8>) {
        if width == 0 || height == 0 {
            return;
        }
        draw_hollow_rect_mut(&mut self.canvas, Rect::at(x, y).of_size(width, height), color);
    }

    /// Filled polygon. Skipped when it degenerates or lies off the panel.
    pub fn polygon(&mut self, points: &[Px], color: Rgba<u8>) {
        if !points.iter().any(|p| self.contains(*p, 0.0)) {
            return;
        }
        let mut poly: Vec<Point<i32>> = Vec::with_capacity(points.len());
        for p in points {
            let q = Point::new(p.0.round() as i32, p.1.round() as i32);
            if poly.last() != Some(&q) {
                poly.push(q);
            }
        }
        while poly.len() > 1 && poly.first() == poly.last() {
            poly.pop();
        }
        if poly.len() < 3 {
            return;
        }
        draw_polygon_mut(&mut self.canvas, &poly, color);
    }

    /// Draws `text` with the 8x8 bitmap font; returns the pixel width used.
    pub fn text(&mut self, x: i32, y: i32, text: &str, scale: u32, color: Rgba<u8>) -> u32 {
        let scale = scale.max(1);
        let mut cursor = x;
        for ch in text.chars() {
            let glyph = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')).unwrap_or([0; 8]);
            for (row, bits) in glyph.iter().enumerate() {
                for col in 0..GLYPH {
                    if bits & (1 << col) != 0 {
                        self.fill_rect(
                            cursor + (col * scale) as i32,
                            y + (row as u32 * scale) as i32,
                            scale,
                            scale,
                            color,
                        );
                    }
                }
            }
            cursor += (GLYPH * scale) as i32;
        }
        (cursor - x) as u32
    }

    /// Pastes an opaque image at (x, y).
    pub fn paste(&mut self, image: &RgbaImage, x: i64, y: i64) {
        imageops::replace(&mut self.canvas.0, image, x, y);
    }
}

/// Width in pixels of `text` at `scale`.
pub fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * GLYPH * scale.max(1)
}

/// Clips a segment to `[0, width] x [0, height]` (Liang-Barsky).
pub fn clip_segment(start: Px, end: Px, width: f32, height: f32) -> Option<(Px, Px)> {
    if !(start.0.is_finite() && start.1.is_finite() && end.0.is_finite() && end.1.is_finite()) {
        return None;
    }
    let (x0, y0) = (start.0 as f64, start.1 as f64);
    let dx = end.0 as f64 - x0;
    let dy = end.1 as f64 - y0;
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    let edges = [
        (-dx, x0),
        (dx, width as f64 - x0),
        (-dy, y0),
        (dy, height as f64 - y0),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some((
        ((x0 + t0 * dx) as f32, (y0 + t0 * dy) as f32),
        ((x0 + t1 * dx) as f32, (y0 + t1 * dy) as f32),
    ))
}

/// Splits a polyline into "on" pieces of length `on`, separated by `off`.
/// The pattern phase carries across vertices.
fn dash_pattern(points: &[Px], on: f32, off: f32) -> Vec<(Px, Px)> {
    let period = on + off;
    let mut pieces = Vec::new();
    if on <= 0.0 || off < 0.0 {
        return pieces;
    }
    let mut phase = 0.0f32;
    for pair in points.windows(2) {
        let Some((len, at)) = walker(pair[0], pair[1], period) else {
            continue;
        };
        let mut d = 0.0f32;
        while d < len {
            if phase < on {
                let step = (on - phase).min(len - d);
                pieces.push((at(d), at(d + step)));
                phase += step;
                d += step;
            } else {
                let step = (period - phase).min(len - d);
                phase += step;
                d += step;
            }
            if phase >= period {
                phase -= period;
            }
        }
    }
    pieces
}

/// Points every `spacing` pixels along a polyline.
fn dot_positions(points: &[Px], spacing: f32) -> Vec<Px> {
    let mut dots = Vec::new();
    if spacing <= 0.0 {
        return dots;
    }
    let mut next = 0.0f32;
    for pair in points.windows(2) {
        let Some((len, at)) = walker(pair[0], pair[1], spacing) else {
            continue;
        };
        let mut d = next;
        while d < len {
            dots.push(at(d));
            d += spacing;
        }
        next = d - len;
    }
    dots
}

/// Length of `a -> b` and a point-at-distance function. `None` for
/// degenerate segments and ones so long they can only come from off-panel
/// points.
fn walker(a: Px, b: Px, period: f32) -> Option<(f32, impl Fn(f32) -> Px)> {
    let len = ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt();
    if !len.is_finite() || len < 1e-3 || len / period > 10_000.0 {
        return None;
    }
    Some((len, move |d: f32| (a.0 + (b.0 - a.0) * d / len, a.1 + (b.1 - a.1) * d / len)))
}
