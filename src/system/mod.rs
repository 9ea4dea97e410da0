//! System orchestration and thread management.
//!
//! This module contains the top-level `MeasurementSystem` that wires frame
//! ingestion, detection scheduling and the render handoff together, along
//! with the shared state and the message types passed to the worker.

pub mod frame_buffer;
pub mod messages;
pub mod scheduler;
pub mod shared_state;
mod measurement_system;

pub use frame_buffer::{FrameBuffer, PresentedFrame};
pub use messages::DetectionJob;
pub use measurement_system::MeasurementSystem;
pub use scheduler::{DetectionScheduler, SchedulerCounts, SchedulerStats, Submission};
pub use shared_state::SharedState;
