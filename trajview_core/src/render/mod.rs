//! Multi-panel frame renderer.
//!
//! Produces one still image per sample:
//!
//! ```text
//! ┌──────────────────────┬──────────────┐
//! │                      │    camera    │
//! │         BEV          ├──────────────┤
//! │                      │  comparison  │
//! │                      ├──────────────┤
//! │                      │    status    │
//! └──────────────────────┴──────────────┘
//! ```
//!
//! Every trajectory is moved into the sample's ego frame through the one
//! [`EgoTransform`] carried by the [`RenderInput`] before any panel sees it.
//! Rendering is pure: the same input yields a byte-identical image.

mod bev;
mod camera;
pub mod canvas;
mod comparison;
mod status;
pub mod style;

use crate::collaborators::{CameraProjector, MapLayer};
use crate::error::RenderError;
use crate::geometry::{EgoTransform, Pose2, Trajectory, TrajectoryKind};
use crate::history::PredictionRecord;
use crate::metrics::TrajectoryMetrics;
use crate::scene::{AgentKind, Frame};
use crate::slicer::{SlicedReference, TimingFidelity};
use crate::timeline::Sample;
use canvas::Panel;
use image::RgbaImage;
use std::sync::Arc;
use style::{AgentStyles, TrajectoryStyles};

pub use bev::BevView;

/// A prior prediction to overlay, with its precomputed opacity.
#[derive(Debug, Clone)]
pub struct HistoryOverlay {
    pub record: PredictionRecord,
    pub age: usize,
    pub opacity: f64,
}

/// Everything drawn for one sample.
#[derive(Debug, Clone)]
pub struct RenderInput {
    pub sample: Sample,
    pub frame: Frame,
    pub prediction: PredictionRecord,
    /// Global-frame references sliced to the prediction window
    pub references: Vec<SlicedReference>,
    /// Oldest first
    pub history: Vec<HistoryOverlay>,
    pub transform: EgoTransform,
    pub metrics: Option<TrajectoryMetrics>,
    /// Scene label for panel titles
    pub scene_label: String,
}

/// Pixel rectangle of one panel on the output canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// Canvas size and panel placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
    pub bev: Region,
    pub camera: Region,
    pub comparison: Region,
    pub status: Region,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            bev: Region::new(0, 0, 720, 720),
            camera: Region::new(720, 0, 560, 300),
            comparison: Region::new(720, 300, 560, 240),
            status: Region::new(720, 540, 560, 180),
        }
    }
}

/// Trajectories and agents already moved into the sample's ego frame.
pub(crate) struct EgoScene<'a> {
    pub input: &'a RenderInput,
    pub prediction: Trajectory,
    pub references: Vec<(Trajectory, TimingFidelity)>,
    /// Oldest first, with opacity
    pub history: Vec<(Trajectory, f64)>,
    pub agents: Vec<(AgentKind, Pose2)>,
}

impl<'a> EgoScene<'a> {
    fn build(input: &'a RenderInput) -> Result<Self, RenderError> {
        if !input.frame.ego.pose.is_finite() || !input.transform.anchor().is_finite() {
            return Err(RenderError::NonFinite("ego pose"));
        }
        if !input.sample.elapsed.is_finite() {
            return Err(RenderError::NonFinite("elapsed time"));
        }
        if input.prediction.trajectory.is_empty() {
            return Err(RenderError::EmptyPrediction);
        }

        let transform = &input.transform;
        let prediction = transform.relative_to_ego(input.prediction.anchor, &input.prediction.trajectory);
        ensure_finite(&prediction, "prediction")?;

        let references = input
            .references
            .iter()
            .map(|r| {
                let local = transform.trajectory_to_ego(&r.trajectory);
                ensure_finite(&local, "reference trajectory").map(|_| (local, r.fidelity))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let history = input
            .history
            .iter()
            .map(|h| {
                let local = transform.relative_to_ego(h.record.anchor, &h.record.trajectory);
                ensure_finite(&local, "history trajectory").map(|_| (local, h.opacity))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let agents = input
            .frame
            .agents
            .iter()
            .map(|a| {
                let local = transform.to_ego(a.pose);
                if local.is_finite() {
                    Ok((a.kind, local))
                } else {
                    Err(RenderError::NonFinite("agent pose"))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            input,
            prediction,
            references,
            history,
            agents,
        })
    }

    /// References of `kind` in the ego frame.
    pub fn references_of(&self, kind: TrajectoryKind) -> impl Iterator<Item = &(Trajectory, TimingFidelity)> {
        self.references.iter().filter(move |(t, _)| t.kind() == kind)
    }
}

fn ensure_finite(trajectory: &Trajectory, what: &'static str) -> Result<(), RenderError> {
    if trajectory.poses().iter().all(|p| p.pose().is_finite()) {
        Ok(())
    } else {
        Err(RenderError::NonFinite(what))
    }
}

/// Draws sample images. Shared read-only across render tasks.
pub struct FrameRenderer {
    layout: Layout,
    styles: TrajectoryStyles,
    agent_styles: AgentStyles,
    bev: BevView,
    map: Arc<dyn MapLayer>,
    projector: Option<Arc<dyn CameraProjector>>,
}

impl FrameRenderer {
    pub fn new(map: Arc<dyn MapLayer>) -> Self {
        Self {
            layout: Layout::default(),
            styles: TrajectoryStyles::default(),
            agent_styles: AgentStyles::default(),
            bev: BevView::default(),
            map,
            projector: None,
        }
    }

    pub fn with_projector(mut self, projector: Arc<dyn CameraProjector>) -> Self {
        self.projector = Some(projector);
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_styles(mut self, styles: TrajectoryStyles) -> Self {
        self.styles = styles;
        self
    }

    pub fn with_bev_view(mut self, view: BevView) -> Self {
        self.bev = view;
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Renders one sample.
    ///
    /// # Returns
    /// * `Err(RenderError::EmptyPrediction)` - the prediction has no poses
    /// * `Err(RenderError::NonFinite)` - a pose or the elapsed time is NaN/inf
    pub fn render(&self, input: &RenderInput) -> Result<RgbaImage, RenderError> {
        let scene = EgoScene::build(input)?;
        let mut canvas = Panel::new(self.layout.width, self.layout.height, style::BACKGROUND);

        let region = self.layout.bev;
        let mut panel = Panel::new(region.width, region.height, style::BACKGROUND);
        bev::draw(&mut panel, &self.bev, &scene, &self.styles, &self.agent_styles, self.map.as_ref());
        place(&mut canvas, panel, region);

        let region = self.layout.camera;
        let mut panel = Panel::new(region.width, region.height, style::BACKGROUND);
        camera::draw(&mut panel, &scene, self.projector.as_deref());
        place(&mut canvas, panel, region);

        let region = self.layout.comparison;
        let mut panel = Panel::new(region.width, region.height, style::BACKGROUND);
        comparison::draw(&mut panel, &scene, &self.styles);
        place(&mut canvas, panel, region);

        let region = self.layout.status;
        let mut panel = Panel::new(region.width, region.height, style::BACKGROUND);
        status::draw(&mut panel, input);
        place(&mut canvas, panel, region);

        Ok(canvas.into_image())
    }
}

fn place(canvas: &mut Panel, mut panel: Panel, region: Region) {
    let (w, h) = (panel.width(), panel.height());
    panel.outline_rect(0, 0, w, h, style::PANEL_BORDER);
    canvas.paste(&panel.into_image(), region.x as i64, region.y as i64);
}
