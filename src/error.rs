//! Typed failures of the measurement pipeline.
//!
//! Orchestration code works with `anyhow::Result`; the variants here are the
//! cases a caller is expected to match on (for example to tell the user that a
//! point could not be placed because the marker is seen edge-on).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeasureError {
    /// The viewing ray is (nearly) parallel to the marker plane, so there is
    /// no finite intersection.
    #[error("viewing ray is parallel to the marker plane (denominator {denominator:.3e})")]
    DegenerateGeometry { denominator: f64 },

    /// The ray meets the marker plane behind the camera.
    #[error("marker plane intersection lies behind the camera")]
    PointBehindCamera,

    /// A placement was requested while no marker is visible.
    #[error("no marker in view")]
    NoMarkerInView,

    /// The marker the first point was placed on is not visible anymore.
    #[error("anchor marker {marker_id} is not in view")]
    AnchorMarkerLost { marker_id: i32 },

    /// The detector backend returned a marker without exactly four corners.
    #[error("observation {index} has {corners} corners, expected 4")]
    MalformedObservation { index: usize, corners: usize },

    /// The detector backend returned a different number of poses than markers.
    #[error("pose estimator returned {poses} poses for {markers} markers")]
    PoseCountMismatch { markers: usize, poses: usize },

    #[error("marker length must be positive and finite, got {0}")]
    InvalidMarkerLength(f64),

    #[error("degenerate-geometry epsilon must be positive and finite, got {0}")]
    InvalidDegenerateEpsilon(f64),

    #[error("invalid frame resolution {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },

    /// The detection worker has shut down and accepts no more frames.
    #[error("detection scheduler is stopped")]
    SchedulerStopped,
}
