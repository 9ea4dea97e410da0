//! Distance derivation, point tracking and the per-frame analysis cycle.

pub mod analyzer;
pub mod distance;
pub mod point_track;
pub mod state;

pub use analyzer::{Analysis, FrameAnalyzer, PlacementOutcome, PlacementRequest};
pub use distance::{format_distance_mm, inter_marker_distance, marker_depths};
pub use point_track::{PointEvent, PointTrackState, TrackedPoint};
pub use state::{CycleTiming, MarkerEntry, MeasurementState, ProjectedPoint};
