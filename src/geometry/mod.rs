//! Geometry: marker poses, pixel/NDC mapping, marker planes and frame transforms.

pub mod ndc;
pub mod plane;
pub mod pose;
pub mod transform;

pub use ndc::{NdcQuad, corners_to_ndc, ndc_to_pixel, pixel_to_ndc, quad_midpoint};
pub use plane::{MarkerPlane, marker_corners_camera};
pub use pose::Pose;
pub use transform::{camera_to_marker, camera_to_marker_matrix, marker_to_camera};
