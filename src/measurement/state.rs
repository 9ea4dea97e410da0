//! The published measurement snapshot.
//!
//! A `MeasurementState` is built in one piece at the end of a detection cycle
//! and never mutated afterwards. The inter-marker distance and depth pair are
//! derived in the constructor, so they exist exactly when two markers with
//! poses are present and are absent for any other marker count.

use nalgebra::Point2;

use crate::camera::FrameSeq;
use crate::detection::MarkerObservation;
use crate::geometry::{NdcQuad, Pose, quad_midpoint};
use crate::measurement::distance::{format_distance_mm, inter_marker_distance, marker_depths};
use crate::measurement::point_track::PointTrackState;

/// One detected marker as the renderer sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerEntry {
    pub observation: MarkerObservation,
    /// Outline polygon in NDC, corner order preserved.
    pub ndc: NdcQuad,
    pub pose: Option<Pose>,
}

impl MarkerEntry {
    /// Centre of the outline (average of corners 0 and 2), in NDC.
    pub fn midpoint_ndc(&self) -> [f32; 2] {
        quad_midpoint(&self.ndc)
    }
}

/// Current screen position of a tracked point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPoint {
    pub marker_id: i32,
    /// `None` when the anchor marker is out of view this frame.
    pub pixel: Option<Point2<f64>>,
    pub ndc: Option<[f32; 2]>,
}

/// Wall-clock cost of one detection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CycleTiming {
    pub detect_ms: f64,
    pub total_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeasurementState {
    frame_seq: FrameSeq,
    resolution: (u32, u32),
    markers: Vec<MarkerEntry>,
    distance_mm: Option<f64>,
    depths: Option<(f32, f32)>,
    point_track: PointTrackState,
    projected_points: Vec<ProjectedPoint>,
    timing: CycleTiming,
}

impl MeasurementState {
    /// State before any frame was analyzed: no markers, nothing derived.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(
        frame_seq: FrameSeq,
        resolution: (u32, u32),
        markers: Vec<MarkerEntry>,
        point_track: PointTrackState,
        projected_points: Vec<ProjectedPoint>,
    ) -> Self {
        let (distance_mm, depths) = match markers.as_slice() {
            [
                MarkerEntry { pose: Some(p1), .. },
                MarkerEntry { pose: Some(p2), .. },
            ] => (
                Some(inter_marker_distance(&p1.translation, &p2.translation)),
                Some(marker_depths(p1, p2)),
            ),
            _ => (None, None),
        };
        Self {
            frame_seq,
            resolution,
            markers,
            distance_mm,
            depths,
            point_track,
            projected_points,
            timing: CycleTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: CycleTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn frame_seq(&self) -> FrameSeq {
        self.frame_seq
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    pub fn markers(&self) -> &[MarkerEntry] {
        &self.markers
    }

    pub fn num_markers(&self) -> usize {
        self.markers.len()
    }

    pub fn distance_mm(&self) -> Option<f64> {
        self.distance_mm
    }

    pub fn depths(&self) -> Option<(f32, f32)> {
        self.depths
    }

    pub fn point_track(&self) -> &PointTrackState {
        &self.point_track
    }

    pub fn projected_points(&self) -> &[ProjectedPoint] {
        &self.projected_points
    }

    pub fn timing(&self) -> CycleTiming {
        self.timing
    }

    /// `"<n>mm"` for the inter-marker distance.
    pub fn distance_label(&self) -> Option<String> {
        self.distance_mm.map(format_distance_mm)
    }

    /// `"<n>mm"` for the distance between the two tracked points.
    pub fn point_distance_label(&self) -> Option<String> {
        self.point_track.distance().map(format_distance_mm)
    }

    /// Midway between the first two marker midpoints, where the label goes.
    pub fn line_center_ndc(&self) -> Option<[f32; 2]> {
        self.distance_mm?;
        let a = self.markers[0].midpoint_ndc();
        let b = self.markers[1].midpoint_ndc();
        Some([(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0])
    }
}
