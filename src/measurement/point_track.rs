//! Interactive point placement as an explicit state machine.
//!
//! ```text
//!   Idle ──place──▶ OnePlaced ──place──▶ TwoPlaced ──place──▶ Idle
//! ```
//!
//! Points are stored in the marker-local frame of the marker they were placed
//! on, so they stay attached to the marker surface when the camera moves.
//! A placement request in `TwoPlaced` clears both points instead of starting
//! a third.

use nalgebra::Vector3;

/// A point on a marker's surface, in that marker's local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedPoint {
    pub marker_id: i32,
    pub local: Vector3<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PointTrackState {
    #[default]
    Idle,
    OnePlaced(TrackedPoint),
    TwoPlaced {
        first: TrackedPoint,
        second: TrackedPoint,
        /// `||first - second||` in marker-local units (mm).
        distance: f64,
    },
}

/// Input to the state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointEvent {
    /// A new point was computed for a placement request.
    Place(TrackedPoint),
    /// Drop all points.
    Reset,
}

impl PointTrackState {
    /// Pure transition function.
    pub fn apply(self, event: PointEvent) -> Self {
        match (self, event) {
            (_, PointEvent::Reset) => Self::Idle,
            (Self::Idle, PointEvent::Place(p)) => Self::OnePlaced(p),
            (Self::OnePlaced(first), PointEvent::Place(second)) => Self::TwoPlaced {
                first,
                second,
                distance: (first.local - second.local).norm(),
            },
            (Self::TwoPlaced { .. }, PointEvent::Place(_)) => Self::Idle,
        }
    }

    /// Whether the next placement request only clears the current points.
    pub fn next_placement_resets(&self) -> bool {
        matches!(self, Self::TwoPlaced { .. })
    }

    /// Marker the points are attached to.
    pub fn anchor_marker(&self) -> Option<i32> {
        match self {
            Self::Idle => None,
            Self::OnePlaced(p) => Some(p.marker_id),
            Self::TwoPlaced { first, .. } => Some(first.marker_id),
        }
    }

    pub fn points(&self) -> Vec<TrackedPoint> {
        match *self {
            Self::Idle => Vec::new(),
            Self::OnePlaced(p) => vec![p],
            Self::TwoPlaced { first, second, .. } => vec![first, second],
        }
    }

    pub fn distance(&self) -> Option<f64> {
        match self {
            Self::TwoPlaced { distance, .. } => Some(*distance),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}
