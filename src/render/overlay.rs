//! Overlay primitives derived from a measurement snapshot.
//!
//! Everything here is in NDC so any rasterizer can consume it; see
//! `ImageOverlayRenderer` for the CPU one.

use crate::geometry::NdcQuad;
use crate::measurement::MeasurementState;

/// Connecting-line width at the reference depth, in pixels.
const REFERENCE_LINE_WIDTH_PX: f32 = 8.0;
/// Depth at which the line has its reference width, in mm.
const REFERENCE_DEPTH_MM: f32 = 100.0;
const MIN_LINE_WIDTH_PX: f32 = 1.0;
const MAX_LINE_WIDTH_PX: f32 = 16.0;

/// Line width for an end of the connecting line at `depth_mm`.
///
/// Nearer markers get a thicker line, so the line reads as lying in 3-D.
pub fn line_width_for_depth(depth_mm: f32) -> f32 {
    if depth_mm.is_nan() || depth_mm <= 0.0 {
        return MIN_LINE_WIDTH_PX;
    }
    (REFERENCE_LINE_WIDTH_PX * REFERENCE_DEPTH_MM / depth_mm).clamp(MIN_LINE_WIDTH_PX, MAX_LINE_WIDTH_PX)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outline {
    pub marker_id: i32,
    pub ndc: NdcQuad,
}

/// Line between the first two marker midpoints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectingLine {
    pub from: [f32; 2],
    pub to: [f32; 2],
    pub width_from: f32,
    pub width_to: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLabel {
    pub text: String,
    pub ndc: [f32; 2],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointMarker {
    pub marker_id: i32,
    pub ndc: [f32; 2],
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OverlayPrimitives {
    pub outlines: Vec<Outline>,
    pub connecting_line: Option<ConnectingLine>,
    pub distance_label: Option<TextLabel>,
    /// Tracked points that are visible this frame.
    pub points: Vec<PointMarker>,
    pub point_label: Option<TextLabel>,
}

impl OverlayPrimitives {
    pub fn from_state(state: &MeasurementState) -> Self {
        let outlines = state
            .markers()
            .iter()
            .map(|m| Outline {
                marker_id: m.observation.id,
                ndc: m.ndc,
            })
            .collect();

        let connecting_line = match (state.markers(), state.depths()) {
            ([a, b], Some((d0, d1))) => Some(ConnectingLine {
                from: a.midpoint_ndc(),
                to: b.midpoint_ndc(),
                width_from: line_width_for_depth(d0),
                width_to: line_width_for_depth(d1),
            }),
            _ => None,
        };

        let distance_label = state
            .distance_label()
            .zip(state.line_center_ndc())
            .map(|(text, ndc)| TextLabel { text, ndc });

        let points: Vec<PointMarker> = state
            .projected_points()
            .iter()
            .filter_map(|p| {
                p.ndc.map(|ndc| PointMarker {
                    marker_id: p.marker_id,
                    ndc,
                })
            })
            .collect();

        let point_label = match (state.point_distance_label(), points.as_slice()) {
            (Some(text), [p1, p2]) => Some(TextLabel {
                text,
                ndc: [(p1.ndc[0] + p2.ndc[0]) / 2.0, (p1.ndc[1] + p2.ndc[1]) / 2.0],
            }),
            _ => None,
        };

        Self {
            outlines,
            connecting_line,
            distance_label,
            points,
            point_label,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.outlines.is_empty() && self.points.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &TextLabel> {
        self.distance_label.iter().chain(self.point_label.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::MarkerObservation;
    use crate::geometry::{Pose, corners_to_ndc};
    use crate::measurement::{MarkerEntry, PointTrackState, ProjectedPoint, TrackedPoint};
    use nalgebra::{Point2, Rotation3, Vector3};

    fn entry(id: i32, x: f64, depth: f64) -> MarkerEntry {
        let observation = MarkerObservation::new(
            id,
            [
                Point2::new(x, 100.0),
                Point2::new(x + 50.0, 100.0),
                Point2::new(x + 50.0, 150.0),
                Point2::new(x, 150.0),
            ],
        );
        MarkerEntry {
            ndc: corners_to_ndc(&observation.corners, 640, 480),
            observation,
            pose: Some(Pose::from_rt(Rotation3::identity(), Vector3::new(x, 0.0, depth))),
        }
    }

    #[test]
    fn test_line_width_shrinks_with_depth() {
        assert_eq!(line_width_for_depth(100.0), 8.0);
        assert_eq!(line_width_for_depth(400.0), 2.0);
        assert_eq!(line_width_for_depth(10.0), MAX_LINE_WIDTH_PX);
        assert_eq!(line_width_for_depth(0.0), MIN_LINE_WIDTH_PX);
        assert_eq!(line_width_for_depth(f32::NAN), MIN_LINE_WIDTH_PX);
    }

    #[test]
    fn test_two_markers_get_line_and_label() {
        let state = MeasurementState::new(
            1,
            (640, 480),
            vec![entry(1, 100.0, 100.0), entry(2, 300.0, 200.0)],
            PointTrackState::Idle,
            vec![],
        );
        let overlay = OverlayPrimitives::from_state(&state);
        assert_eq!(overlay.outlines.len(), 2);

        let line = overlay.connecting_line.unwrap();
        assert_eq!(line.from, state.markers()[0].midpoint_ndc());
        assert_eq!(line.width_from, 8.0);
        assert_eq!(line.width_to, 4.0);

        let label = overlay.distance_label.unwrap();
        assert_eq!(label.text, "223mm");
        assert_eq!(Some(label.ndc), state.line_center_ndc());
    }

    #[test]
    fn test_single_marker_has_no_line() {
        let state = MeasurementState::new(1, (640, 480), vec![entry(1, 0.0, 100.0)], PointTrackState::Idle, vec![]);
        let overlay = OverlayPrimitives::from_state(&state);
        assert_eq!(overlay.outlines.len(), 1);
        assert!(overlay.connecting_line.is_none());
        assert_eq!(overlay.labels().count(), 0);
    }

    #[test]
    fn test_hidden_points_are_skipped() {
        let p = |x: f64| TrackedPoint {
            marker_id: 1,
            local: Vector3::new(x, 0.0, 0.0),
        };
        let track = PointTrackState::OnePlaced(p(0.0))
            .apply(crate::measurement::PointEvent::Place(p(30.0)));
        let projected = vec![
            ProjectedPoint {
                marker_id: 1,
                pixel: Some(Point2::new(320.0, 240.0)),
                ndc: Some([0.0, 0.0]),
            },
            ProjectedPoint {
                marker_id: 1,
                pixel: None,
                ndc: None,
            },
        ];
        let state = MeasurementState::new(1, (640, 480), vec![], track, projected);
        let overlay = OverlayPrimitives::from_state(&state);
        assert_eq!(overlay.points.len(), 1);
        // Label needs both points on screen.
        assert!(overlay.point_label.is_none());
        assert!(!overlay.is_empty());
    }
}
