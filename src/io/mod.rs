//! Input sources: recorded marker sessions.

pub mod recording;

pub use recording::{RecordedFrame, RecordedMarker, RecordedSession};
