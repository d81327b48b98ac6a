//! Status panel. Kinematics come from the current frame's ego state only.

use super::canvas::Panel;
use super::style;
use super::RenderInput;

pub(super) fn draw(panel: &mut Panel, input: &RenderInput) {
    let ego = &input.frame.ego;
    let heading = ego.pose.heading.to_degrees();
    let mut lines = vec![
        format!("FRAME {}  T+{:.2}s", input.sample.frame_index, input.sample.elapsed),
        format!("SPEED   {:.1} m/s", ego.speed()),
        format!("HEADING {:.1} deg", heading),
        format!("POS     ({:.1}, {:.1})", ego.pose.x, ego.pose.y),
    ];
    lines.push(match &input.metrics {
        Some(m) => format!("ADE {:.2}  FDE {:.2}  RMSE {:.2}", m.ade, m.fde, m.rmse),
        None => "ADE --  FDE --".to_string(),
    });

    let mut y = 10;
    for line in &lines {
        panel.text(12, y, line, 2, style::TEXT);
        y += 22;
    }
    let latency = format!("inference {} ms", input.prediction.latency.as_millis());
    panel.text(12, y + 2, &latency, 1, style::TEXT_DIM);
}
