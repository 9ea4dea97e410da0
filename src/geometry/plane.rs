//! Marker plane derivation and ray-plane intersection.
//!
//! The plane is rebuilt from the current pose every frame:
//!
//! ```text
//! half = marker_length / 2
//! c0 = t - half·a0 + half·a1        (-h, +h)
//! c1 = t + half·a0 + half·a1        (+h, +h)
//! c2 = t + half·a0 - half·a1        (+h, -h)
//! c3 = t - half·a0 - half·a1        (-h, -h)
//!
//! n = normalize((c3 - c0) × (c1 - c0))
//! D = -n · c0                       so that  n·x + D = 0
//! ```
//!
//! where `a0`, `a1` are the marker-local x/y axes expressed in camera
//! coordinates. For the identity pose the normal is `(0, 0, 1)`.

use nalgebra::{Unit, Vector3};

use crate::error::MeasureError;
use crate::geometry::Pose;

/// Plane `A·x + B·y + C·z + D = 0` through a marker's surface, camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerPlane {
    /// Unit normal `(A, B, C)`.
    pub normal: Unit<Vector3<f64>>,
    pub d: f64,
    /// Marker corners in the camera frame, clockwise from the top-left.
    pub corners: [Vector3<f64>; 4],
}

impl MarkerPlane {
    pub fn from_pose(pose: &Pose, marker_length: f64) -> Self {
        let corners = marker_corners_camera(pose, marker_length);
        let edge_a = corners[3] - corners[0];
        let edge_b = corners[1] - corners[0];
        let normal = Unit::new_normalize(edge_a.cross(&edge_b));
        let d = -normal.dot(&corners[0]);
        Self { normal, d, corners }
    }

    /// Signed distance of a camera-frame point to the plane.
    pub fn signed_distance(&self, p: &Vector3<f64>) -> f64 {
        self.normal.dot(p) + self.d
    }

    /// Intersect the ray `origin + s·dir` (s > 0) with the plane.
    ///
    /// Rejects rays whose direction is within `epsilon` of parallel to the
    /// plane (measured as |n·d̂|) and intersections behind the origin.
    pub fn intersect_ray(
        &self,
        origin: &Vector3<f64>,
        dir: &Vector3<f64>,
        epsilon: f64,
    ) -> Result<Vector3<f64>, MeasureError> {
        let dir_len = dir.norm();
        if dir_len == 0.0 {
            return Err(MeasureError::DegenerateGeometry { denominator: 0.0 });
        }
        let denominator = self.normal.dot(dir);
        if (denominator / dir_len).abs() < epsilon {
            return Err(MeasureError::DegenerateGeometry { denominator });
        }
        let s = -(self.normal.dot(origin) + self.d) / denominator;
        if s <= 0.0 {
            return Err(MeasureError::PointBehindCamera);
        }
        Ok(origin + dir * s)
    }

    /// Intersection with the optical axis: `x = y = 0`, `z = -D / C`.
    pub fn intersect_optical_axis(&self, epsilon: f64) -> Result<Vector3<f64>, MeasureError> {
        let c = self.normal.z;
        if c.abs() < epsilon {
            return Err(MeasureError::DegenerateGeometry { denominator: c });
        }
        let z = -self.d / c;
        if z <= 0.0 {
            return Err(MeasureError::PointBehindCamera);
        }
        Ok(Vector3::new(0.0, 0.0, z))
    }
}

/// The four marker corners in the camera frame, clockwise from the top-left.
///
/// `pose.rotation` maps marker to camera, so its columns (the rows of the
/// camera-to-marker rotation) are the marker's x and y edges.
pub fn marker_corners_camera(pose: &Pose, marker_length: f64) -> [Vector3<f64>; 4] {
    let half = marker_length / 2.0;
    let rot = pose.rotation.matrix();
    let axis0 = rot.column(0).into_owned();
    let axis1 = rot.column(1).into_owned();
    let t = pose.translation;
    [
        t - axis0 * half + axis1 * half,
        t + axis0 * half + axis1 * half,
        t + axis0 * half - axis1 * half,
        t - axis0 * half - axis1 * half,
    ]
}
