//! Bird's-eye view panel: map, agents, ego, references, prediction and the
//! fading history, all in the sample's ego frame.

use super::canvas::{Panel, Px};
use super::style::{self, map_feature_style, with_opacity, AgentStyles, LineStyle, MarkerShape, TrajectoryStyles};
use super::EgoScene;
use crate::collaborators::{MapFeatureKind, MapLayer};
use crate::geometry::{Pose2, Trajectory, TrajectoryKind};
use nalgebra::Point2;

/// Ego-frame meters to panel pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BevView {
    pub pixels_per_meter: f32,
    /// Fraction of the panel height at which the ego sits
    pub ego_row: f32,
}

impl Default for BevView {
    fn default() -> Self {
        Self {
            pixels_per_meter: 10.0,
            ego_row: 0.65,
        }
    }
}

impl BevView {
    /// Forward (+x) is up, left (+y) is left.
    pub fn to_px(&self, width: u32, height: u32, p: Point2<f64>) -> Px {
        let ppm = self.pixels_per_meter as f64;
        let cx = width as f64 / 2.0;
        let cy = height as f64 * self.ego_row as f64;
        ((cx - p.y * ppm) as f32, (cy - p.x * ppm) as f32)
    }

    /// Radius in meters that covers the whole panel.
    pub fn coverage(&self, width: u32, height: u32) -> f64 {
        (width as f64).hypot(height as f64) / self.pixels_per_meter as f64
    }
}

pub(super) fn draw(
    panel: &mut Panel,
    view: &BevView,
    scene: &EgoScene<'_>,
    styles: &TrajectoryStyles,
    agent_styles: &AgentStyles,
    map: &dyn MapLayer,
) {
    let (w, h) = (panel.width(), panel.height());
    let to_px = |p: Point2<f64>| view.to_px(w, h, p);

    draw_grid(panel, view);

    // Map
    let transform = &scene.input.transform;
    for feature in map.features_near(transform.anchor(), view.coverage(w, h)) {
        let points: Vec<Px> = feature.points.iter().map(|p| to_px(transform.point_to_ego(*p))).collect();
        let (color, line) = map_feature_style(feature.kind);
        if feature.kind == MapFeatureKind::Crosswalk {
            panel.polygon(&points, color);
        } else {
            panel.polyline(&points, color, line, 1);
        }
    }

    // History, oldest first so newer overlays sit on top
    let history_style = styles.history;
    for (trajectory, opacity) in &scene.history {
        let points = project(trajectory, &to_px);
        panel.polyline(&points, with_opacity(history_style.color, *opacity), history_style.line, history_style.thickness);
    }

    for (trajectory, _) in &scene.references {
        let style = styles.get(trajectory.kind());
        panel.polyline(&project(trajectory, &to_px), style.color, style.line, style.thickness);
    }

    for (kind, pose) in &scene.agents {
        draw_agent(panel, view, *pose, agent_styles.get(*kind).shape, agent_styles.get(*kind).color);
    }

    draw_ego(panel, view);
    draw_prediction(panel, &scene.prediction, styles.prediction.thickness, &to_px);
    draw_legend(panel, scene, styles);

    let title = format!("BEV  {}", scene.input.scene_label);
    panel.text(10, 10, &title, 2, style::TEXT);
}

fn project(trajectory: &Trajectory, to_px: &impl Fn(Point2<f64>) -> Px) -> Vec<Px> {
    trajectory.points().map(to_px).collect()
}

/// Prediction stroked along the hue ramp from the ego to the horizon.
fn draw_prediction(panel: &mut Panel, prediction: &Trajectory, thickness: u32, to_px: &impl Fn(Point2<f64>) -> Px) {
    let horizon = prediction.horizon().max(f64::EPSILON);
    let mut previous = to_px(Point2::origin());
    for pose in prediction.poses() {
        let color = style::ramp(pose.offset / horizon);
        let current = to_px(Point2::new(pose.x, pose.y));
        panel.line(previous, current, color, thickness);
        panel.circle(current, 3, color);
        previous = current;
    }
}

fn draw_grid(panel: &mut Panel, view: &BevView) {
    let (w, h) = (panel.width(), panel.height());
    let spacing = 10.0 * view.pixels_per_meter;
    if spacing < 4.0 {
        return;
    }
    let origin = view.to_px(w, h, Point2::origin());
    let mut x = origin.0 % spacing;
    while x < w as f32 {
        panel.line((x, 0.0), (x, h as f32), style::GRID, 1);
        x += spacing;
    }
    let mut y = origin.1 % spacing;
    while y < h as f32 {
        panel.line((0.0, y), (w as f32, y), style::GRID, 1);
        y += spacing;
    }
}

fn draw_agent(panel: &mut Panel, view: &BevView, pose: Pose2, shape: MarkerShape, color: image::Rgba<u8>) {
    let (w, h) = (panel.width(), panel.height());
    let to_px = |local: (f64, f64)| view.to_px(w, h, pose.compose(&Pose2::new(local.0, local.1, 0.0)).position());
    let ppm = view.pixels_per_meter;
    match shape {
        MarkerShape::Box { length, width } => {
            let (hl, hw) = (length as f64 / 2.0, width as f64 / 2.0);
            let corners: Vec<Px> = [(hl, hw), (hl, -hw), (-hl, -hw), (-hl, hw)].into_iter().map(to_px).collect();
            panel.polygon(&corners, color);
            // Nose line shows heading
            panel.line(to_px((0.0, 0.0)), to_px((hl, 0.0)), style::EGO, 1);
        }
        MarkerShape::Circle { radius } => {
            panel.circle(to_px((0.0, 0.0)), ((radius * ppm).round() as i32).max(2), color);
        }
        MarkerShape::Diamond { radius } => {
            let r = radius as f64;
            let corners: Vec<Px> = [(r, 0.0), (0.0, r), (-r, 0.0), (0.0, -r)].into_iter().map(to_px).collect();
            panel.polygon(&corners, color);
        }
    }
}

fn draw_ego(panel: &mut Panel, view: &BevView) {
    let (w, h) = (panel.width(), panel.height());
    let to_px = |x: f64, y: f64| view.to_px(w, h, Point2::new(x, y));
    let body = [to_px(2.25, 0.95), to_px(2.25, -0.95), to_px(-2.25, -0.95), to_px(-2.25, 0.95)];
    panel.polygon(&body, with_opacity(style::EGO, 0.85));
    // Heading indicator
    panel.line(to_px(0.0, 0.0), to_px(5.0, 0.0), style::EGO, 2);
    panel.polygon(&[to_px(6.0, 0.0), to_px(4.8, 0.6), to_px(4.8, -0.6)], style::EGO);
}

fn draw_legend(panel: &mut Panel, scene: &EgoScene<'_>, styles: &TrajectoryStyles) {
    let mut entries = vec![(styles.prediction.color, LineStyle::Solid, styles.prediction.label.to_string())];
    for kind in [TrajectoryKind::GroundTruth, TrajectoryKind::BaselineReference] {
        let mut matching = scene.references_of(kind).peekable();
        if matching.peek().is_none() {
            continue;
        }
        let approximate = matching.any(|(_, fidelity)| fidelity.is_approximate());
        let style = styles.get(kind);
        let label = if approximate {
            format!("{} (index timing)", style.label)
        } else {
            style.label.to_string()
        };
        entries.push((style.color, style.line, label));
    }
    if !scene.history.is_empty() {
        entries.push((styles.history.color, styles.history.line, format!("{} x{}", styles.history.label, scene.history.len())));
    }

    let x = 10;
    let mut y = 36;
    for (color, line, label) in entries {
        panel.polyline(&[(x as f32, y as f32 + 4.0), (x as f32 + 28.0, y as f32 + 4.0)], color, line, 2);
        let text_color = if label.contains("index timing") { style::WARNING } else { style::TEXT_DIM };
        panel.text(x + 36, y, &label, 1, text_color);
        y += 14;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ego_sits_at_its_row() {
        let view = BevView::default();
        assert_eq!(view.to_px(720, 720, Point2::origin()), (360.0, 468.0));
        // 10 m ahead is 100 px up, 5 m left is 50 px left
        assert_eq!(view.to_px(720, 720, Point2::new(10.0, 5.0)), (310.0, 368.0));
    }
}
