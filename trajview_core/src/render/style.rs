//! Palette, line styles and the per-kind style tables.

use crate::collaborators::MapFeatureKind;
use crate::geometry::TrajectoryKind;
use crate::scene::AgentKind;
use image::Rgba;

pub const BACKGROUND: Rgba<u8> = Rgba([24, 26, 31, 255]); // Dark asphalt
pub const PANEL_BORDER: Rgba<u8> = Rgba([70, 74, 84, 255]);
pub const TEXT: Rgba<u8> = Rgba([235, 235, 235, 255]);
pub const TEXT_DIM: Rgba<u8> = Rgba([150, 154, 162, 255]);
pub const WARNING: Rgba<u8> = Rgba([255, 176, 0, 255]); // Amber
pub const EGO: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const GRID: Rgba<u8> = Rgba([44, 47, 55, 255]);

/// Start and end of the prediction hue ramp.
pub const RAMP_START: Rgba<u8> = Rgba([255, 215, 0, 255]); // Gold
pub const RAMP_END: Rgba<u8> = Rgba([220, 20, 60, 255]); // Crimson

/// How a polyline is stroked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineStyle {
    Solid,
    /// On/off lengths in pixels
    Dashed { on: f32, off: f32 },
    Dotted { spacing: f32 },
}

impl LineStyle {
    pub const DASHED: LineStyle = LineStyle::Dashed { on: 10.0, off: 6.0 };
    pub const DOTTED: LineStyle = LineStyle::Dotted { spacing: 5.0 };
}

/// Stroke for one trajectory kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryStyle {
    pub color: Rgba<u8>,
    pub line: LineStyle,
    pub thickness: u32,
    pub label: &'static str,
}

/// Trajectory styles by kind, plus the stroke used for aged history.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryStyles {
    pub prediction: TrajectoryStyle,
    pub ground_truth: TrajectoryStyle,
    pub baseline: TrajectoryStyle,
    pub history: TrajectoryStyle,
}

impl Default for TrajectoryStyles {
    fn default() -> Self {
        Self {
            prediction: TrajectoryStyle {
                color: RAMP_END,
                line: LineStyle::Solid,
                thickness: 3,
                label: "prediction",
            },
            ground_truth: TrajectoryStyle {
                color: Rgba([46, 139, 87, 255]), // Sea green
                line: LineStyle::Solid,
                thickness: 2,
                label: "ground truth",
            },
            baseline: TrajectoryStyle {
                color: Rgba([65, 105, 225, 255]), // Royal blue
                line: LineStyle::DASHED,
                thickness: 2,
                label: "baseline",
            },
            history: TrajectoryStyle {
                color: RAMP_END,
                line: LineStyle::DOTTED,
                thickness: 2,
                label: "history",
            },
        }
    }
}

impl TrajectoryStyles {
    pub fn get(&self, kind: TrajectoryKind) -> &TrajectoryStyle {
        match kind {
            TrajectoryKind::Prediction => &self.prediction,
            TrajectoryKind::GroundTruth => &self.ground_truth,
            TrajectoryKind::BaselineReference => &self.baseline,
        }
    }
}

/// Marker shape for agents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkerShape {
    /// Heading-aligned box, length x width in meters
    Box { length: f32, width: f32 },
    Circle { radius: f32 },
    Diamond { radius: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentStyle {
    pub shape: MarkerShape,
    pub color: Rgba<u8>,
}

/// Agent marker styles, one per [`AgentKind`].
#[derive(Debug, Clone, PartialEq)]
pub struct AgentStyles {
    pub vehicle: AgentStyle,
    pub pedestrian: AgentStyle,
    pub other: AgentStyle,
}

impl Default for AgentStyles {
    fn default() -> Self {
        Self {
            vehicle: AgentStyle {
                shape: MarkerShape::Box { length: 4.5, width: 1.9 },
                color: Rgba([0, 180, 220, 220]), // Cyan
            },
            pedestrian: AgentStyle {
                shape: MarkerShape::Circle { radius: 0.5 },
                color: Rgba([255, 120, 200, 230]), // Pink
            },
            other: AgentStyle {
                shape: MarkerShape::Diamond { radius: 0.8 },
                color: Rgba([160, 160, 160, 200]), // Gray
            },
        }
    }
}

impl AgentStyles {
    pub fn get(&self, kind: AgentKind) -> &AgentStyle {
        match kind {
            AgentKind::Vehicle => &self.vehicle,
            AgentKind::Pedestrian => &self.pedestrian,
            AgentKind::Other => &self.other,
        }
    }
}

pub fn map_feature_style(kind: MapFeatureKind) -> (Rgba<u8>, LineStyle) {
    match kind {
        MapFeatureKind::LaneDivider => (Rgba([120, 124, 132, 255]), LineStyle::DASHED),
        MapFeatureKind::RoadEdge => (Rgba([150, 154, 162, 255]), LineStyle::Solid),
        MapFeatureKind::Crosswalk => (Rgba([200, 200, 200, 160]), LineStyle::Solid),
    }
}

/// Color at `t` in [0, 1] along the prediction ramp.
pub fn ramp(t: f64) -> Rgba<u8> {
    lerp(RAMP_START, RAMP_END, t)
}

pub fn lerp(a: Rgba<u8>, b: Rgba<u8>, t: f64) -> Rgba<u8> {
    let t = t.clamp(0.0, 1.0);
    let mix = |i: usize| (a.0[i] as f64 + (b.0[i] as f64 - a.0[i] as f64) * t).round() as u8;
    Rgba([mix(0), mix(1), mix(2), mix(3)])
}

/// `color` with its alpha scaled by `opacity`.
pub fn with_opacity(color: Rgba<u8>, opacity: f64) -> Rgba<u8> {
    let alpha = (color.0[3] as f64 * opacity.clamp(0.0, 1.0)).round() as u8;
    Rgba([color.0[0], color.0[1], color.0[2], alpha])
}
