//! Front camera panel with the prediction projected into the image.

use super::canvas::{text_width, Panel, Px};
use super::style;
use super::EgoScene;
use crate::collaborators::CameraProjector;
use crate::scene::CameraFrame;
use image::imageops::{self, FilterType};
use nalgebra::Point2;
use tracing::debug;

pub(super) fn draw(panel: &mut Panel, scene: &EgoScene<'_>, projector: Option<&dyn CameraProjector>) {
    let (w, h) = (panel.width(), panel.height());
    let camera = scene.input.frame.sensors.front_camera.as_ref();

    match camera.and_then(|c| c.image.as_ref()) {
        Some(image) => {
            let scaled = imageops::resize(image.as_ref(), w, h, FilterType::Triangle);
            panel.paste(&scaled, 0, 0);
        }
        None => {
            let label = "NO CAMERA IMAGE";
            let x = (w.saturating_sub(text_width(label, 2)) / 2) as i32;
            panel.text(x, (h / 2) as i32 - 8, label, 2, style::TEXT_DIM);
        }
    }

    if let (Some(camera), Some(projector)) = (camera, projector) {
        draw_projected_prediction(panel, scene, camera, projector);
    }

    let ego = &scene.input.frame.ego;
    let overlay = format!("t={:.2}s  v={:.1} m/s", scene.input.sample.elapsed, ego.speed());
    let width = text_width(&overlay, 2) + 12;
    panel.fill_rect(6, 6, width, 28, style::with_opacity(style::BACKGROUND, 0.7));
    panel.text(12, 12, &overlay, 2, style::TEXT);
}

fn draw_projected_prediction(panel: &mut Panel, scene: &EgoScene<'_>, camera: &CameraFrame, projector: &dyn CameraProjector) {
    let calibration = &camera.calibration;
    if calibration.width == 0 || calibration.height == 0 {
        return;
    }
    let points: Vec<Point2<f64>> = scene.prediction.points().collect();
    let pixels = match projector.project(calibration, &points) {
        Ok(pixels) => pixels,
        Err(err) => {
            debug!("Camera projection skipped: {}", err);
            return;
        }
    };

    let sx = panel.width() as f32 / calibration.width as f32;
    let sy = panel.height() as f32 / calibration.height as f32;
    let scaled: Vec<Px> = pixels.iter().map(|(u, v)| (u * sx, v * sy)).collect();
    let n = scaled.len().max(2) - 1;
    for (i, pair) in scaled.windows(2).enumerate() {
        panel.line(pair[0], pair[1], style::ramp(i as f64 / n as f64), 3);
    }
    for (i, p) in scaled.iter().enumerate() {
        panel.circle(*p, 3, style::ramp(i as f64 / n as f64));
    }
}
