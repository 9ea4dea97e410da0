//! Camera-frame <-> marker-frame point transforms.
//!
//! A tracked point is stored in the marker's local frame, because the marker
//! stays put while the camera moves. Each frame the stored point is mapped
//! back through the marker's current pose.

use nalgebra::{Matrix4, Vector3, Vector4};

use crate::geometry::Pose;

/// Camera -> marker transform: the inverse of `[R | t; 0 0 0 1]`.
pub fn camera_to_marker_matrix(pose: &Pose) -> Matrix4<f64> {
    let marker_to_camera = pose.to_homogeneous();
    // A rigid transform is always invertible; fall back to the closed form
    // if the numeric inverse ever fails.
    marker_to_camera
        .try_inverse()
        .unwrap_or_else(|| pose.inverse().to_homogeneous())
}

/// Express a camera-frame point in the marker's local frame.
pub fn camera_to_marker(pose: &Pose, p_cam: &Vector3<f64>) -> Vector3<f64> {
    let m = camera_to_marker_matrix(pose);
    let h = m * Vector4::new(p_cam.x, p_cam.y, p_cam.z, 1.0);
    Vector3::new(h.x / h.w, h.y / h.w, h.z / h.w)
}

/// Express a marker-local point in the camera frame.
pub fn marker_to_camera(pose: &Pose, p_marker: &Vector3<f64>) -> Vector3<f64> {
    let m = pose.to_homogeneous();
    let h = m * Vector4::new(p_marker.x, p_marker.y, p_marker.z, 1.0);
    Vector3::new(h.x / h.w, h.y / h.w, h.z / h.w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    use crate::geometry::MarkerPlane;

    #[test]
    fn test_identity_pose_offsets_by_translation() {
        let pose = Pose::from_rt(Rotation3::identity(), Vector3::new(0.0, 0.0, 100.0));
        let local = camera_to_marker(&pose, &Vector3::new(0.0, 0.0, 100.0));
        assert_relative_eq!(local, Vector3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn test_matches_closed_form_inverse() {
        let pose = Pose::from_rvec_tvec(Vector3::new(-0.3, 0.5, 0.2), Vector3::new(12.0, 8.0, 310.0));
        let m = camera_to_marker_matrix(&pose);
        assert_relative_eq!(m, pose.inverse().to_homogeneous(), epsilon = 1e-9);
    }

    #[test]
    fn test_point_on_plane_has_zero_local_z() {
        let pose = Pose::from_rvec_tvec(Vector3::new(0.3, -0.1, 0.6), Vector3::new(-20.0, 15.0, 280.0));
        let plane = MarkerPlane::from_pose(&pose, 50.0);
        let hit = plane.intersect_optical_axis(1e-6).unwrap();
        let local = camera_to_marker(&pose, &hit);
        assert_relative_eq!(local.z, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_round_trip() {
        let pose = Pose::from_rvec_tvec(Vector3::new(0.7, 0.1, -0.4), Vector3::new(3.0, -2.0, 150.0));
        let p = Vector3::new(4.0, -9.0, 0.0);
        let back = camera_to_marker(&pose, &marker_to_camera(&pose, &p));
        assert_relative_eq!(back, p, epsilon = 1e-9);
    }
}
