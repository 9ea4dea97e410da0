//! One detection cycle: frame in, complete `MeasurementState` out.
//!
//! Within a cycle the steps run in a fixed order and their results are
//! published together:
//! 1. detect markers (poses when they are needed)
//! 2. derive the inter-marker distance and depths
//! 3. apply pending point placements
//! 4. re-project tracked points with the current poses

use std::time::Instant;

use anyhow::Result;
use nalgebra::{Point2, Vector3};
use tracing::{debug, info, warn};

use crate::camera::{CameraIntrinsics, Frame};
use crate::config::{IntrinsicRatios, MeasureConfig};
use crate::detection::{DetectionOutput, MarkerDetectionAdapter};
use crate::error::MeasureError;
use crate::geometry::{MarkerPlane, camera_to_marker, corners_to_ndc, pixel_to_ndc};
use crate::measurement::point_track::{PointEvent, PointTrackState, TrackedPoint};
use crate::measurement::state::{CycleTiming, MarkerEntry, MeasurementState, ProjectedPoint};

/// A "place point" event from the user.
///
/// Without a pixel the point is placed where the optical axis meets the
/// marker (the screen centre).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlacementRequest {
    pub pixel: Option<Point2<f64>>,
}

impl PlacementRequest {
    pub fn at_center() -> Self {
        Self { pixel: None }
    }

    pub fn at_pixel(x: f64, y: f64) -> Self {
        Self {
            pixel: Some(Point2::new(x, y)),
        }
    }
}

/// What happened to one placement request.
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementOutcome {
    Placed(TrackedPoint),
    /// The request arrived with two points placed and cleared them.
    Cleared,
    /// The point could not be computed; tracking state is unchanged.
    Rejected(MeasureError),
}

/// Result of [`FrameAnalyzer::analyze`].
#[derive(Debug, Clone)]
pub struct Analysis {
    pub state: MeasurementState,
    pub placements: Vec<PlacementOutcome>,
}

/// Owns the detector and the point-tracking state across cycles.
pub struct FrameAnalyzer {
    adapter: MarkerDetectionAdapter,
    ratios: IntrinsicRatios,
    degenerate_epsilon: f64,

    /// Intrinsics for the last seen resolution.
    intrinsics: Option<CameraIntrinsics>,

    point_track: PointTrackState,
}

impl FrameAnalyzer {
    pub fn new(adapter: MarkerDetectionAdapter, config: &MeasureConfig) -> Self {
        Self {
            adapter,
            ratios: config.intrinsics,
            degenerate_epsilon: config.degenerate_epsilon,
            intrinsics: None,
            point_track: PointTrackState::Idle,
        }
    }

    pub fn point_track(&self) -> &PointTrackState {
        &self.point_track
    }

    /// Intrinsics for a resolution, rebuilt only when the resolution changes.
    pub fn intrinsics_for(&mut self, width: u32, height: u32) -> Result<CameraIntrinsics> {
        if let Some(k) = self.intrinsics.filter(|k| k.matches(width, height)) {
            return Ok(k);
        }
        let k = CameraIntrinsics::from_resolution(width, height, &self.ratios)?;
        info!(
            width,
            height,
            fx = k.fx,
            fy = k.fy,
            cx = k.cx,
            cy = k.cy,
            "camera intrinsics derived"
        );
        self.intrinsics = Some(k);
        Ok(k)
    }

    /// Run one detection cycle over `frame`.
    ///
    /// Detector failures are returned as errors and leave the point-tracking
    /// state untouched. Rejected placements are not errors; they are reported
    /// in [`Analysis::placements`].
    pub fn analyze(
        &mut self,
        frame: &Frame,
        marker_length: f64,
        placements: &[PlacementRequest],
    ) -> Result<Analysis> {
        let t_start = Instant::now();
        let (width, height) = frame.resolution();
        let intrinsics = self.intrinsics_for(width, height)?;

        // Poses cost a solve per marker; only ask when something consumes them.
        let tracking = !self.point_track.is_idle() || !placements.is_empty();
        let detection = self
            .adapter
            .detect_with(frame, &intrinsics, marker_length, |markers| {
                tracking || markers.len() == 2
            })?;
        let detect_ms = t_start.elapsed().as_secs_f64() * 1000.0;

        let markers = self.marker_entries(&detection, width, height);

        let outcomes = placements
            .iter()
            .map(|request| self.apply_placement(&detection, &intrinsics, marker_length, request))
            .collect();

        let projected = self.reproject(&detection, &intrinsics);

        let timing = CycleTiming {
            detect_ms,
            total_ms: t_start.elapsed().as_secs_f64() * 1000.0,
        };
        let state = MeasurementState::new(
            frame.seq,
            (width, height),
            markers,
            self.point_track,
            projected,
        )
        .with_timing(timing);

        debug!(
            frame = frame.seq,
            markers = state.num_markers(),
            distance_mm = state.distance_mm(),
            detect_ms = timing.detect_ms,
            total_ms = timing.total_ms,
            "cycle complete"
        );

        Ok(Analysis {
            state,
            placements: outcomes,
        })
    }

    fn marker_entries(&self, detection: &DetectionOutput, width: u32, height: u32) -> Vec<MarkerEntry> {
        detection
            .markers
            .iter()
            .enumerate()
            .map(|(idx, obs)| MarkerEntry {
                observation: *obs,
                ndc: corners_to_ndc(&obs.corners, width, height),
                pose: detection.poses.get(idx).copied(),
            })
            .collect()
    }

    fn apply_placement(
        &mut self,
        detection: &DetectionOutput,
        intrinsics: &CameraIntrinsics,
        marker_length: f64,
        request: &PlacementRequest,
    ) -> PlacementOutcome {
        if self.point_track.next_placement_resets() {
            self.point_track = self.point_track.apply(PointEvent::Reset);
            info!("tracked points cleared");
            return PlacementOutcome::Cleared;
        }

        match self.locate_point(detection, intrinsics, marker_length, request) {
            Ok(point) => {
                self.point_track = self.point_track.apply(PointEvent::Place(point));
                info!(
                    marker = point.marker_id,
                    x = point.local.x,
                    y = point.local.y,
                    z = point.local.z,
                    "point placed"
                );
                if let Some(distance) = self.point_track.distance() {
                    info!(distance_mm = distance, "point distance");
                }
                PlacementOutcome::Placed(point)
            }
            Err(err) => {
                warn!(error = %err, "placement rejected");
                PlacementOutcome::Rejected(err)
            }
        }
    }

    /// Intersect the placement ray with the anchor marker's plane and express
    /// the hit in that marker's local frame.
    fn locate_point(
        &self,
        detection: &DetectionOutput,
        intrinsics: &CameraIntrinsics,
        marker_length: f64,
        request: &PlacementRequest,
    ) -> Result<TrackedPoint, MeasureError> {
        let anchor_id = match self.point_track.anchor_marker() {
            Some(id) => id,
            None => detection.markers.first().ok_or(MeasureError::NoMarkerInView)?.id,
        };
        let pose = detection.pose_of(anchor_id).ok_or(if detection.is_empty() {
            MeasureError::NoMarkerInView
        } else {
            MeasureError::AnchorMarkerLost {
                marker_id: anchor_id,
            }
        })?;

        let plane = MarkerPlane::from_pose(pose, marker_length);
        let p_cam = match request.pixel {
            Some(pixel) => plane.intersect_ray(
                &Vector3::zeros(),
                &intrinsics.pixel_ray(&pixel),
                self.degenerate_epsilon,
            )?,
            None => plane.intersect_optical_axis(self.degenerate_epsilon)?,
        };

        Ok(TrackedPoint {
            marker_id: anchor_id,
            local: camera_to_marker(pose, &p_cam),
        })
    }

    fn reproject(&self, detection: &DetectionOutput, intrinsics: &CameraIntrinsics) -> Vec<ProjectedPoint> {
        self.point_track
            .points()
            .into_iter()
            .map(|point| {
                let pixel = detection
                    .pose_of(point.marker_id)
                    .and_then(|pose| self.adapter.project_point(&point.local, pose, intrinsics));
                let ndc = pixel.map(|px| {
                    let (u, v) = pixel_to_ndc(px.x, px.y, intrinsics.width, intrinsics.height);
                    [u, v]
                });
                ProjectedPoint {
                    marker_id: point.marker_id,
                    pixel,
                    ndc,
                }
            })
            .collect()
    }
}
