//! Rigid marker pose relative to the camera.

use nalgebra::{Matrix4, Rotation3, Vector3};

/// Pose of a marker in the camera frame (T_cm: marker-local -> camera).
///
/// `translation` is the marker centre in camera coordinates, expressed in the
/// same unit as the marker length (millimetres in practice). The rotation maps
/// marker-local axes onto camera axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl Pose {
    pub fn identity() -> Self {
        Self {
            rotation: Rotation3::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn from_rt(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Build from an axis-angle (Rodrigues) vector and a translation, the form
    /// pose estimators return.
    pub fn from_rvec_tvec(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self {
            rotation: Rotation3::from_scaled_axis(rvec),
            translation: tvec,
        }
    }

    /// Axis-angle (Rodrigues) vector of the rotation.
    pub fn rvec(&self) -> Vector3<f64> {
        self.rotation.scaled_axis()
    }

    /// Homogeneous 4x4 matrix `[R | t; 0 0 0 1]`.
    pub fn to_homogeneous(&self) -> Matrix4<f64> {
        let mut m = self.rotation.to_homogeneous();
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    /// Inverse transform (camera -> marker-local).
    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// Map a marker-local point into the camera frame.
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    /// Camera-frame depth of the marker centre.
    pub fn depth(&self) -> f64 {
        self.translation.z
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}
