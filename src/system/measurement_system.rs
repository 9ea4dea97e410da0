//! Measurement system - main entry point and stage wiring.
//!
//! The `MeasurementSystem` is what the capture side talks to. It owns the
//! shared state, the frame buffer and the detection scheduler, and exposes the
//! user events (place a point, change the marker length).

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use nalgebra::Point2;
use tracing::{debug, info};

use crate::camera::Frame;
use crate::config::{DetectionPolicy, MeasureConfig};
use crate::detection::{FiducialBackend, MarkerDetectionAdapter};
use crate::error::MeasureError;
use crate::measurement::{FrameAnalyzer, MeasurementState, PlacementRequest};
use crate::render::{FrameConsumer, RenderSurface};

use super::frame_buffer::FrameBuffer;
use super::scheduler::{DetectionScheduler, SchedulerCounts, Submission};
use super::shared_state::SharedState;

pub struct MeasurementSystem {
    /// Snapshot, marker length, pending placements and flags.
    shared: Arc<SharedState>,

    /// Producer -> renderer frame handoff.
    frames: Arc<FrameBuffer>,

    scheduler: DetectionScheduler,
}

impl MeasurementSystem {
    /// Build the pipeline around a detector backend.
    ///
    /// With the asynchronous policy this spawns the detection worker.
    pub fn new(config: &MeasureConfig, backend: Box<dyn FiducialBackend>) -> Result<Self> {
        config.validate().context("invalid measurement configuration")?;
        let shared = SharedState::new(config.marker_length_mm)?;
        let analyzer = FrameAnalyzer::new(MarkerDetectionAdapter::new(backend), config);
        let scheduler = DetectionScheduler::new(config.policy, analyzer, Arc::clone(&shared));
        info!(
            policy = ?config.policy,
            marker_length_mm = config.marker_length_mm,
            "measurement system started"
        );
        Ok(Self {
            shared,
            frames: Arc::new(FrameBuffer::new()),
            scheduler,
        })
    }

    /// Ingest one captured frame.
    ///
    /// Synchronous policy: detection finishes first and the frame is handed
    /// to the renderer together with the state computed from it, so the image
    /// on screen always matches the measurements drawn over it. Asynchronous
    /// policy: the frame is shown right away and detection catches up in the
    /// background.
    pub fn submit_frame(&self, frame: Frame) -> Result<()> {
        if self.shared.is_shutdown_requested() {
            return Err(MeasureError::SchedulerStopped.into());
        }
        match self.scheduler.policy() {
            DetectionPolicy::Synchronous => {
                if let Submission::Published(state) = self.scheduler.submit(frame.clone())? {
                    self.present(frame, Some(state));
                }
            }
            DetectionPolicy::Asynchronous => {
                self.present(frame.clone(), None);
                self.scheduler.submit(frame)?;
            }
        }
        Ok(())
    }

    fn present(&self, frame: Frame, state: Option<Arc<MeasurementState>>) {
        let dropped = match state {
            Some(state) => self.frames.publish_with_state(frame, state),
            None => self.frames.publish(frame),
        };
        if let Some(dropped) = dropped {
            debug!(frame = dropped.seq, "frame replaced before it was rendered");
        }
        self.shared.mark_dirty();
    }

    /// Queue a "place point" event for the next detection cycle.
    ///
    /// Without a pixel the point goes where the optical axis meets the marker.
    pub fn request_placement(&self, pixel: Option<Point2<f64>>) {
        self.shared.push_placement(PlacementRequest { pixel });
    }

    pub fn set_marker_length(&self, length_mm: f64) -> Result<(), MeasureError> {
        self.shared.set_marker_length(length_mm)?;
        info!(marker_length_mm = length_mm, "marker length updated");
        Ok(())
    }

    pub fn marker_length(&self) -> f64 {
        self.shared.marker_length()
    }

    /// Latest published measurement.
    pub fn snapshot(&self) -> Arc<MeasurementState> {
        self.shared.snapshot()
    }

    pub fn policy(&self) -> DetectionPolicy {
        self.scheduler.policy()
    }

    pub fn scheduler_stats(&self) -> SchedulerCounts {
        self.scheduler.stats()
    }

    pub fn shared_state(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn frame_buffer(&self) -> &Arc<FrameBuffer> {
        &self.frames
    }

    /// A render surface reading from this system's frame buffer and snapshot.
    pub fn render_surface(&self) -> RenderSurface {
        RenderSurface::new(
            Arc::clone(&self.frames),
            Arc::clone(&self.shared),
            self.scheduler.policy(),
        )
    }

    /// Wait until every submitted frame was processed, evicted or failed.
    ///
    /// Returns `false` on timeout. Immediate for the synchronous policy.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.scheduler.stats().is_settled() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Shut the system down gracefully.
    ///
    /// Signals the detection worker to finish and waits for it. A cycle that
    /// is already running completes first.
    pub fn shutdown(&mut self) {
        self.shared.request_shutdown();
        self.scheduler.shutdown();
        info!(counts = ?self.scheduler.stats(), "measurement system stopped");
    }
}

impl FrameConsumer for MeasurementSystem {
    fn analyze(&mut self, frame: Frame) -> Result<()> {
        self.submit_frame(frame)
    }
}

impl Drop for MeasurementSystem {
    fn drop(&mut self) {
        if !self.shared.is_shutdown_requested() {
            self.shutdown();
        }
    }
}
