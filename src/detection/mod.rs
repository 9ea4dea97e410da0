//! Marker detection: the backend seam and the adapter the pipeline calls.
//!
//! A [`FiducialBackend`] supplies the three external primitives (detect
//! markers, estimate per-marker pose, project a marker-local point). The
//! [`MarkerDetectionAdapter`] validates what the backend returns and hands the
//! pipeline a consistent [`DetectionOutput`].

pub mod replay;
pub mod types;

#[cfg(feature = "opencv")]
pub mod opencv_backend;

use anyhow::Result;
use nalgebra::{Point2, Vector3};
use tracing::debug;

use crate::camera::{CameraIntrinsics, Frame};
use crate::error::MeasureError;
use crate::geometry::Pose;

pub use replay::ReplayBackend;
pub use types::{MarkerObservation, RawMarker};

#[cfg(feature = "opencv")]
pub use opencv_backend::OpenCvBackend;

/// External fiducial detection and pose primitives.
///
/// Implementations are treated as correct black boxes; the adapter only checks
/// the shape of what they return.
pub trait FiducialBackend: Send {
    /// Detect markers in an RGBA frame. An empty vector means "no markers".
    fn detect_markers(&mut self, frame: &Frame) -> Result<Vec<RawMarker>>;

    /// Estimate one pose per marker (marker-local -> camera), in the unit of
    /// `marker_length`.
    fn estimate_poses(
        &mut self,
        markers: &[MarkerObservation],
        marker_length: f64,
        intrinsics: &CameraIntrinsics,
    ) -> Result<Vec<Pose>>;

    /// Project a marker-local point into pixel coordinates.
    ///
    /// The default is the distortion-free pinhole projection, which is exact
    /// for the zero distortion vector used by every calibration here.
    fn project_point(
        &self,
        point_marker: &Vector3<f64>,
        pose: &Pose,
        intrinsics: &CameraIntrinsics,
    ) -> Option<Point2<f64>> {
        intrinsics.project(&pose.transform_point(point_marker))
    }
}

/// Result of one detection call.
#[derive(Debug, Clone, Default)]
pub struct DetectionOutput {
    pub markers: Vec<MarkerObservation>,
    /// One pose per marker when poses were requested, otherwise empty.
    pub poses: Vec<Pose>,
}

impl DetectionOutput {
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn has_poses(&self) -> bool {
        !self.markers.is_empty() && self.poses.len() == self.markers.len()
    }

    /// Pose of the marker with the given id, if detected and estimated.
    pub fn pose_of(&self, marker_id: i32) -> Option<&Pose> {
        self.markers
            .iter()
            .position(|m| m.id == marker_id)
            .and_then(|idx| self.poses.get(idx))
    }
}

/// Wraps a backend and enforces the observation contract.
pub struct MarkerDetectionAdapter {
    backend: Box<dyn FiducialBackend>,
}

impl MarkerDetectionAdapter {
    pub fn new(backend: Box<dyn FiducialBackend>) -> Self {
        Self { backend }
    }

    /// Detect markers and, if `with_poses`, estimate a pose for each.
    ///
    /// Zero markers is a normal outcome and yields an empty output. Backend
    /// failures and malformed observations are propagated.
    pub fn detect(
        &mut self,
        frame: &Frame,
        intrinsics: &CameraIntrinsics,
        marker_length: f64,
        with_poses: bool,
    ) -> Result<DetectionOutput> {
        self.detect_with(frame, intrinsics, marker_length, |_| with_poses)
    }

    /// Like [`detect`](Self::detect), but decides whether to estimate poses
    /// after seeing the observations.
    pub fn detect_with<F>(
        &mut self,
        frame: &Frame,
        intrinsics: &CameraIntrinsics,
        marker_length: f64,
        want_poses: F,
    ) -> Result<DetectionOutput>
    where
        F: FnOnce(&[MarkerObservation]) -> bool,
    {
        let raw = self.backend.detect_markers(frame)?;
        if raw.is_empty() {
            return Ok(DetectionOutput::default());
        }

        let markers = raw
            .iter()
            .enumerate()
            .map(|(idx, r)| MarkerObservation::from_raw(idx, r))
            .collect::<Result<Vec<_>, _>>()?;

        let poses = if want_poses(&markers) {
            let poses = self
                .backend
                .estimate_poses(&markers, marker_length, intrinsics)?;
            if poses.len() != markers.len() {
                return Err(MeasureError::PoseCountMismatch {
                    markers: markers.len(),
                    poses: poses.len(),
                }
                .into());
            }
            poses
        } else {
            Vec::new()
        };

        debug!(
            frame = frame.seq,
            markers = markers.len(),
            poses = poses.len(),
            "detection finished"
        );

        Ok(DetectionOutput { markers, poses })
    }

    /// Forward projection of a marker-local point through the backend.
    pub fn project_point(
        &self,
        point_marker: &Vector3<f64>,
        pose: &Pose,
        intrinsics: &CameraIntrinsics,
    ) -> Option<Point2<f64>> {
        self.backend.project_point(point_marker, pose, intrinsics)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted backend shared by the pipeline tests.

    use std::collections::VecDeque;

    use anyhow::{Result, bail};

    use super::*;

    /// One scripted detection: marker id, pixel corners and marker pose.
    #[derive(Debug, Clone)]
    pub struct ScriptedMarker {
        pub id: i32,
        pub corners: Vec<Point2<f64>>,
        pub pose: Pose,
    }

    impl ScriptedMarker {
        /// Marker whose corners are the exact projection of its pose.
        pub fn projected(id: i32, pose: Pose, marker_length: f64, k: &CameraIntrinsics) -> Self {
            let corners = crate::geometry::marker_corners_camera(&pose, marker_length)
                .iter()
                .map(|c| k.project(c).unwrap_or_else(|| Point2::origin()))
                .collect();
            Self { id, corners, pose }
        }
    }

    /// Replays a queue of frames' worth of markers; repeats the last entry
    /// once the queue runs dry. `fail_next` makes the next call error,
    /// `fail_on_call` the n-th call (1-based).
    #[derive(Default)]
    pub struct ScriptedBackend {
        pub frames: VecDeque<Vec<ScriptedMarker>>,
        current: Vec<ScriptedMarker>,
        pub fail_next: bool,
        pub fail_on_call: Option<usize>,
        calls: usize,
    }

    impl ScriptedBackend {
        pub fn new(frames: Vec<Vec<ScriptedMarker>>) -> Self {
            Self {
                frames: frames.into(),
                current: Vec::new(),
                fail_next: false,
                fail_on_call: None,
                calls: 0,
            }
        }
    }

    impl FiducialBackend for ScriptedBackend {
        fn detect_markers(&mut self, _frame: &Frame) -> Result<Vec<RawMarker>> {
            self.calls += 1;
            if self.fail_next || self.fail_on_call == Some(self.calls) {
                self.fail_next = false;
                bail!("scripted detector failure");
            }
            if let Some(next) = self.frames.pop_front() {
                self.current = next;
            }
            Ok(self
                .current
                .iter()
                .map(|m| RawMarker {
                    id: m.id,
                    corners: m.corners.clone(),
                })
                .collect())
        }

        fn estimate_poses(
            &mut self,
            markers: &[MarkerObservation],
            _marker_length: f64,
            _intrinsics: &CameraIntrinsics,
        ) -> Result<Vec<Pose>> {
            Ok(markers
                .iter()
                .filter_map(|obs| self.current.iter().find(|m| m.id == obs.id))
                .map(|m| m.pose)
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{ScriptedBackend, ScriptedMarker};
    use super::*;
    use crate::config::IntrinsicRatios;
    use nalgebra::Rotation3;

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics::from_resolution(640, 480, &IntrinsicRatios::default()).unwrap()
    }

    fn marker(id: i32, x: f64) -> ScriptedMarker {
        let pose = Pose::from_rt(Rotation3::identity(), Vector3::new(x, 0.0, 300.0));
        ScriptedMarker::projected(id, pose, 50.0, &intrinsics())
    }

    #[test]
    fn test_zero_markers_is_empty_not_error() {
        let mut adapter = MarkerDetectionAdapter::new(Box::new(ScriptedBackend::new(vec![vec![]])));
        let out = adapter
            .detect(&Frame::blank(1, 0, 640, 480), &intrinsics(), 50.0, true)
            .unwrap();
        assert!(out.is_empty());
        assert!(out.poses.is_empty());
    }

    #[test]
    fn test_poses_only_when_requested() {
        let backend = ScriptedBackend::new(vec![vec![marker(1, 0.0), marker(2, 60.0)]]);
        let mut adapter = MarkerDetectionAdapter::new(Box::new(backend));
        let frame = Frame::blank(1, 0, 640, 480);

        let out = adapter.detect(&frame, &intrinsics(), 50.0, false).unwrap();
        assert_eq!(out.markers.len(), 2);
        assert!(out.poses.is_empty());
        assert!(!out.has_poses());

        let out = adapter.detect(&frame, &intrinsics(), 50.0, true).unwrap();
        assert!(out.has_poses());
        assert_eq!(out.pose_of(2).map(|p| p.translation.x), Some(60.0));
        assert!(out.pose_of(9).is_none());
    }

    #[test]
    fn test_malformed_observation_propagates() {
        let mut bad = marker(4, 0.0);
        bad.corners.truncate(2);
        let mut adapter = MarkerDetectionAdapter::new(Box::new(ScriptedBackend::new(vec![vec![bad]])));
        let err = adapter
            .detect(&Frame::blank(1, 0, 640, 480), &intrinsics(), 50.0, true)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<MeasureError>(),
            Some(&MeasureError::MalformedObservation {
                index: 0,
                corners: 2
            })
        );
    }

    #[test]
    fn test_backend_failure_propagates() {
        let mut backend = ScriptedBackend::new(vec![vec![marker(1, 0.0)]]);
        backend.fail_next = true;
        let mut adapter = MarkerDetectionAdapter::new(Box::new(backend));
        assert!(
            adapter
                .detect(&Frame::blank(1, 0, 640, 480), &intrinsics(), 50.0, true)
                .is_err()
        );
    }

    #[test]
    fn test_default_projection_hits_marker_centre() {
        let k = intrinsics();
        let m = marker(3, 20.0);
        let adapter = MarkerDetectionAdapter::new(Box::new(ScriptedBackend::default()));
        let centre = adapter.project_point(&Vector3::zeros(), &m.pose, &k).unwrap();
        let expected = k.project(&m.pose.translation).unwrap();
        assert_eq!(centre, expected);
    }
}
