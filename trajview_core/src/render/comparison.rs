//! Prediction vs. references, auto-fitted to the data.

use super::canvas::{Panel, Px};
use super::style::{self, TrajectoryStyle, TrajectoryStyles};
use super::EgoScene;
use crate::geometry::Trajectory;
use nalgebra::Point2;

const MARGIN: f64 = 28.0;
/// Smallest extent the fit will zoom to, in meters
const MIN_EXTENT: f64 = 2.0;

/// Uniform scale from a local ego-frame box onto the panel, forward to the right.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Fit {
    min: Point2<f64>,
    scale: f64,
    offset: (f64, f64),
    height: f64,
}

impl Fit {
    fn new<'a>(trajectories: impl Iterator<Item = &'a Trajectory>, width: u32, height: u32) -> Self {
        let mut min = Point2::new(f64::INFINITY, f64::INFINITY);
        let mut max = Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in trajectories.flat_map(|t| t.points()) {
            min = Point2::new(min.x.min(p.x), min.y.min(p.y));
            max = Point2::new(max.x.max(p.x), max.y.max(p.y));
        }
        // The ego origin is always in view
        min = Point2::new(min.x.min(0.0), min.y.min(0.0));
        max = Point2::new(max.x.max(0.0), max.y.max(0.0));

        let extent_x = (max.x - min.x).max(MIN_EXTENT);
        let extent_y = (max.y - min.y).max(MIN_EXTENT);
        let usable_w = (width as f64 - 2.0 * MARGIN).max(1.0);
        let usable_h = (height as f64 - 2.0 * MARGIN).max(1.0);
        let scale = (usable_w / extent_x).min(usable_h / extent_y);
        let offset = (
            MARGIN + (usable_w - (max.x - min.x) * scale) / 2.0,
            MARGIN + (usable_h - (max.y - min.y) * scale) / 2.0,
        );
        Self {
            min,
            scale,
            offset,
            height: height as f64,
        }
    }

    fn to_px(&self, p: Point2<f64>) -> Px {
        let x = self.offset.0 + (p.x - self.min.x) * self.scale;
        let y = self.height - (self.offset.1 + (p.y - self.min.y) * self.scale);
        (x as f32, y as f32)
    }
}

pub(super) fn draw(panel: &mut Panel, scene: &EgoScene<'_>, styles: &TrajectoryStyles) {
    let (w, h) = (panel.width(), panel.height());
    let all = std::iter::once(&scene.prediction).chain(scene.references.iter().map(|(t, _)| t));
    let fit = Fit::new(all, w, h);

    for (trajectory, _) in &scene.references {
        draw_with_markers(panel, &fit, trajectory, styles.get(trajectory.kind()));
    }
    draw_with_markers(panel, &fit, &scene.prediction, &styles.prediction);

    panel.circle(fit.to_px(Point2::origin()), 4, style::EGO);
    panel.text(8, 8, "COMPARISON", 2, style::TEXT);
    let scale = format!("{:.1} px/m", fit.scale);
    panel.text(8, 28, &scale, 1, style::TEXT_DIM);
}

/// Start as a circle, end as a square.
fn draw_with_markers(panel: &mut Panel, fit: &Fit, trajectory: &Trajectory, style: &TrajectoryStyle) {
    let points: Vec<Px> = trajectory.points().map(|p| fit.to_px(p)).collect();
    panel.polyline(&points, style.color, style.line, style.thickness);
    if let Some(first) = points.first() {
        panel.circle(*first, 4, style.color);
    }
    if let Some(last) = points.last() {
        panel.fill_rect(last.0.round() as i32 - 4, last.1.round() as i32 - 4, 9, 9, style.color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{TimedPose, TrajectoryKind};

    #[test]
    fn test_fit_keeps_data_inside_panel() {
        let poses = (1..=8).map(|k| TimedPose::new(k as f64 * 0.5, k as f64 * 5.0, -(k as f64), 0.0)).collect();
        let trajectory = Trajectory::new(TrajectoryKind::Prediction, 0.0, poses).unwrap();
        let fit = Fit::new(std::iter::once(&trajectory), 560, 240);
        for p in trajectory.points().chain(std::iter::once(Point2::origin())) {
            let (x, y) = fit.to_px(p);
            assert!(x >= MARGIN as f32 - 0.5 && x <= 560.0 - MARGIN as f32 + 0.5);
            assert!(y >= MARGIN as f32 - 0.5 && y <= 240.0 - MARGIN as f32 + 0.5);
        }
    }
}
