//! Detector backend that replays a recorded session.
//!
//! Frames are looked up by sequence number. Recorded translations are rescaled
//! when the live marker length differs from the one used while recording,
//! which is what a pose estimator would report for the same corners.

use std::collections::HashMap;

use anyhow::Result;
use tracing::debug;

use crate::camera::{CameraIntrinsics, Frame, FrameSeq};
use crate::detection::{FiducialBackend, MarkerObservation, RawMarker};
use crate::geometry::Pose;
use crate::io::{RecordedMarker, RecordedSession};

pub struct ReplayBackend {
    frames: HashMap<FrameSeq, Vec<RecordedMarker>>,
    recorded_marker_length: f64,
    /// Markers of the frame most recently passed to `detect_markers`.
    current: Vec<RecordedMarker>,
}

impl ReplayBackend {
    pub fn new(session: &RecordedSession) -> Self {
        let frames = session
            .frames
            .iter()
            .map(|f| (f.seq, f.markers.clone()))
            .collect();
        Self {
            frames,
            recorded_marker_length: session.marker_length_mm,
            current: Vec::new(),
        }
    }
}

impl FiducialBackend for ReplayBackend {
    fn detect_markers(&mut self, frame: &Frame) -> Result<Vec<RawMarker>> {
        self.current = match self.frames.get(&frame.seq) {
            Some(markers) => markers.clone(),
            None => {
                debug!(frame = frame.seq, "frame not in recording, reporting no markers");
                Vec::new()
            }
        };
        Ok(self
            .current
            .iter()
            .map(|m| RawMarker {
                id: m.id,
                corners: m.corners.to_vec(),
            })
            .collect())
    }

    fn estimate_poses(
        &mut self,
        markers: &[MarkerObservation],
        marker_length: f64,
        _intrinsics: &CameraIntrinsics,
    ) -> Result<Vec<Pose>> {
        let scale = marker_length / self.recorded_marker_length;
        Ok(markers
            .iter()
            .filter_map(|obs| self.current.iter().find(|m| m.id == obs.id))
            .map(|m| Pose::from_rt(m.pose.rotation, m.pose.translation * scale))
            .collect())
    }
}
