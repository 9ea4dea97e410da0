use nalgebra::{Matrix3, Point2, Vector3};

use crate::config::IntrinsicRatios;
use crate::error::MeasureError;

/// Number of distortion coefficients (k1, k2, p1, p2, k3).
pub const DISTORTION_LEN: usize = 5;

/// Pinhole intrinsics for a given frame resolution.
///
/// Built once per resolution from fixed calibration ratios and never mutated.
/// The distortion vector is kept for the detector backends but is all zeros
/// for every calibration in use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub distortion: [f64; DISTORTION_LEN],
    pub width: u32,
    pub height: u32,
}

impl CameraIntrinsics {
    /// Derive intrinsics from the frame resolution.
    pub fn from_resolution(
        width: u32,
        height: u32,
        ratios: &IntrinsicRatios,
    ) -> Result<Self, MeasureError> {
        if width == 0 || height == 0 {
            return Err(MeasureError::InvalidResolution { width, height });
        }
        let w = width as f64;
        let h = height as f64;
        Ok(Self {
            fx: w * ratios.fx,
            fy: h * ratios.fy,
            cx: w * ratios.cx,
            cy: h * ratios.cy,
            distortion: [0.0; DISTORTION_LEN],
            width,
            height,
        })
    }

    /// Whether these intrinsics were derived for the given resolution.
    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    /// The 3x3 camera matrix K.
    #[rustfmt::skip]
    pub fn camera_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0,     self.cx,
            0.0,     self.fy, self.cy,
            0.0,     0.0,     1.0,
        )
    }

    /// Project a camera-frame point to pixel coordinates (zero distortion).
    ///
    /// Returns `None` for points on or behind the image plane.
    pub fn project(&self, p_cam: &Vector3<f64>) -> Option<Point2<f64>> {
        if p_cam.z <= 0.0 {
            return None;
        }
        Some(Point2::new(
            self.fx * p_cam.x / p_cam.z + self.cx,
            self.fy * p_cam.y / p_cam.z + self.cy,
        ))
    }

    /// Direction of the viewing ray through a pixel, in the camera frame (z = 1).
    pub fn pixel_ray(&self, pixel: &Point2<f64>) -> Vector3<f64> {
        Vector3::new(
            (pixel.x - self.cx) / self.fx,
            (pixel.y - self.cy) / self.fy,
            1.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_resolution_uses_ratios() {
        let k = CameraIntrinsics::from_resolution(1920, 1080, &IntrinsicRatios::default()).unwrap();
        assert_relative_eq!(k.fx, 1920.0 * 0.67352064836, epsilon = 1e-9);
        assert_relative_eq!(k.fy, 1080.0 * 1.19671093141, epsilon = 1e-9);
        assert_relative_eq!(k.cx, 1920.0 * 0.49904564092, epsilon = 1e-9);
        assert_relative_eq!(k.cy, 1080.0 * 0.49937073486, epsilon = 1e-9);
        assert_eq!(k.distortion, [0.0; 5]);
        assert!(k.matches(1920, 1080));
    }

    #[test]
    fn test_zero_resolution_rejected() {
        let err = CameraIntrinsics::from_resolution(0, 480, &IntrinsicRatios::default());
        assert_eq!(
            err,
            Err(MeasureError::InvalidResolution {
                width: 0,
                height: 480
            })
        );
    }

    #[test]
    fn test_project_and_pixel_ray_agree() {
        let k = CameraIntrinsics::from_resolution(640, 480, &IntrinsicRatios::default()).unwrap();
        let p = Vector3::new(12.0, -7.0, 250.0);
        let px = k.project(&p).unwrap();
        let ray = k.pixel_ray(&px);
        assert_relative_eq!(ray * p.z, p, epsilon = 1e-9);
    }

    #[test]
    fn test_project_behind_camera() {
        let k = CameraIntrinsics::from_resolution(640, 480, &IntrinsicRatios::default()).unwrap();
        assert!(k.project(&Vector3::new(0.0, 0.0, -1.0)).is_none());
    }
}
