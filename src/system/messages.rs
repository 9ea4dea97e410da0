//! Messages passed to the detection worker.

use std::time::Instant;

use crate::camera::Frame;

/// A frame queued for detection.
///
/// Placement requests and the marker length are not part of the job; the
/// worker reads them from `SharedState` when the cycle starts, so an evicted
/// job never loses a user request.
pub struct DetectionJob {
    pub frame: Frame,
    /// When the job was admitted, for queue latency logging.
    pub queued_at: Instant,
}

impl DetectionJob {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            queued_at: Instant::now(),
        }
    }
}
