//! ArUco detection and pose estimation through OpenCV.
//!
//! Only built with the `opencv` feature since it links against a system OpenCV.

use anyhow::{Result, bail};
use nalgebra::{Matrix3, Point2, Vector3};
use opencv::calib3d;
use opencv::core::{Mat, Point2f, Point3d, Vector};
use opencv::imgproc;
use opencv::objdetect::{self, ArucoDetector, PredefinedDictionaryType};
use opencv::prelude::*;

use crate::camera::{CameraIntrinsics, Frame};
use crate::detection::{FiducialBackend, MarkerObservation, RawMarker};
use crate::geometry::Pose;

pub struct OpenCvBackend {
    detector: ArucoDetector,
}

impl OpenCvBackend {
    /// Create a detector for a predefined dictionary such as `DICT_6X6_50`.
    pub fn new(dictionary: &str) -> Result<Self> {
        let dict_type = match dictionary {
            "DICT_4X4_50" => PredefinedDictionaryType::DICT_4X4_50,
            "DICT_4X4_100" => PredefinedDictionaryType::DICT_4X4_100,
            "DICT_5X5_50" => PredefinedDictionaryType::DICT_5X5_50,
            "DICT_5X5_100" => PredefinedDictionaryType::DICT_5X5_100,
            "DICT_6X6_50" => PredefinedDictionaryType::DICT_6X6_50,
            "DICT_6X6_100" => PredefinedDictionaryType::DICT_6X6_100,
            "DICT_6X6_250" => PredefinedDictionaryType::DICT_6X6_250,
            "DICT_ARUCO_ORIGINAL" => PredefinedDictionaryType::DICT_ARUCO_ORIGINAL,
            other => bail!("unsupported marker dictionary {}", other),
        };
        let dictionary = objdetect::get_predefined_dictionary(dict_type)?;
        let detector = ArucoDetector::new_def(&dictionary)?;
        Ok(Self { detector })
    }
}

impl FiducialBackend for OpenCvBackend {
    fn detect_markers(&mut self, frame: &Frame) -> Result<Vec<RawMarker>> {
        // RGBA bytes -> 4-channel Mat -> grayscale.
        let (width, height) = frame.resolution();
        let bytes = Mat::from_slice(frame.pixels().as_raw())?.try_clone()?;
        let rgba = bytes.reshape(4, height as i32)?.try_clone()?;
        debug_assert_eq!(rgba.cols(), width as i32);
        let mut gray = Mat::default();
        imgproc::cvt_color_def(&rgba, &mut gray, imgproc::COLOR_RGBA2GRAY)?;

        let mut corners = Vector::<Vector<Point2f>>::new();
        let mut ids = Vector::<i32>::new();
        self.detector
            .detect_markers_def(&gray, &mut corners, &mut ids)?;

        Ok(ids
            .iter()
            .zip(corners.iter())
            .map(|(id, quad)| RawMarker {
                id,
                corners: quad
                    .iter()
                    .map(|p| Point2::new(p.x as f64, p.y as f64))
                    .collect(),
            })
            .collect())
    }

    fn estimate_poses(
        &mut self,
        markers: &[MarkerObservation],
        marker_length: f64,
        intrinsics: &CameraIntrinsics,
    ) -> Result<Vec<Pose>> {
        let half = marker_length / 2.0;
        // Same corner order as the detector output (IPPE_SQUARE layout).
        let object_points = Vector::<Point3d>::from_slice(&[
            Point3d::new(-half, half, 0.0),
            Point3d::new(half, half, 0.0),
            Point3d::new(half, -half, 0.0),
            Point3d::new(-half, -half, 0.0),
        ]);
        let camera_matrix = camera_matrix_mat(intrinsics)?;
        let dist_coeffs = Mat::from_slice(&intrinsics.distortion)?.try_clone()?;

        let mut poses = Vec::with_capacity(markers.len());
        for marker in markers {
            let image_points: Vector<Point2f> = marker
                .corners
                .iter()
                .map(|c| Point2f::new(c.x as f32, c.y as f32))
                .collect();
            let mut rvec = Mat::default();
            let mut tvec = Mat::default();
            calib3d::solve_pnp(
                &object_points,
                &image_points,
                &camera_matrix,
                &dist_coeffs,
                &mut rvec,
                &mut tvec,
                false,
                calib3d::SOLVEPNP_IPPE_SQUARE,
            )?;
            poses.push(Pose::from_rvec_tvec(mat_to_vec3(&rvec)?, mat_to_vec3(&tvec)?));
        }
        Ok(poses)
    }

    fn project_point(
        &self,
        point_marker: &Vector3<f64>,
        pose: &Pose,
        intrinsics: &CameraIntrinsics,
    ) -> Option<Point2<f64>> {
        let project = || -> Result<Point2<f64>> {
            let object = Vector::<Point3d>::from_slice(&[Point3d::new(
                point_marker.x,
                point_marker.y,
                point_marker.z,
            )]);
            let rvec_v = pose.rvec();
            let rvec = Mat::from_slice(&[rvec_v.x, rvec_v.y, rvec_v.z])?.try_clone()?;
            let t = pose.translation;
            let tvec = Mat::from_slice(&[t.x, t.y, t.z])?.try_clone()?;
            let camera_matrix = camera_matrix_mat(intrinsics)?;
            let dist_coeffs = Mat::from_slice(&intrinsics.distortion)?.try_clone()?;
            let mut projected = Vector::<Point2f>::new();
            calib3d::project_points_def(
                &object,
                &rvec,
                &tvec,
                &camera_matrix,
                &dist_coeffs,
                &mut projected,
            )?;
            let p = projected.get(0)?;
            Ok(Point2::new(p.x as f64, p.y as f64))
        };
        // Points behind the camera have no meaningful projection.
        if pose.transform_point(point_marker).z <= 0.0 {
            return None;
        }
        project().ok()
    }
}

fn camera_matrix_mat(intrinsics: &CameraIntrinsics) -> Result<Mat> {
    let k: Matrix3<f64> = intrinsics.camera_matrix();
    Ok(Mat::from_slice_2d(&[
        [k[(0, 0)], k[(0, 1)], k[(0, 2)]],
        [k[(1, 0)], k[(1, 1)], k[(1, 2)]],
        [k[(2, 0)], k[(2, 1)], k[(2, 2)]],
    ])?)
}

fn mat_to_vec3(mat: &Mat) -> Result<Vector3<f64>> {
    Ok(Vector3::new(
        *mat.at::<f64>(0i32)?,
        *mat.at::<f64>(1i32)?,
        *mat.at::<f64>(2i32)?,
    ))
}
