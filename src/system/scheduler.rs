//! When and where detection runs.
//!
//! - `Synchronous`: the cycle runs on the caller's thread; failures propagate.
//! - `Asynchronous`: one worker thread behind a queue of depth 1. A frame that
//!   arrives while the queue is occupied evicts the queued one, so the worker
//!   always picks up the freshest frame and never builds a backlog. A running
//!   cycle is never interrupted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::camera::Frame;
use crate::config::DetectionPolicy;
use crate::error::MeasureError;
use crate::measurement::{FrameAnalyzer, MeasurementState, PlacementOutcome};

use super::messages::DetectionJob;
use super::shared_state::SharedState;

/// Depth of the detection queue.
const JOB_QUEUE_CAPACITY: usize = 1;

/// Timeout for receiving jobs. Allows periodic shutdown checks.
const RECV_TIMEOUT: Duration = Duration::from_millis(50);

/// Counters describing scheduler behaviour under load.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    submitted: AtomicU64,
    processed: AtomicU64,
    evicted: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`SchedulerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerCounts {
    pub submitted: u64,
    pub processed: u64,
    pub evicted: u64,
    pub failed: u64,
}

impl SchedulerCounts {
    /// Every submitted frame has been processed, evicted or has failed.
    pub fn is_settled(&self) -> bool {
        self.processed + self.evicted + self.failed == self.submitted
    }
}

impl SchedulerStats {
    pub fn counts(&self) -> SchedulerCounts {
        SchedulerCounts {
            submitted: self.submitted.load(Ordering::SeqCst),
            processed: self.processed.load(Ordering::SeqCst),
            evicted: self.evicted.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

/// What `DetectionScheduler::submit` did with a frame.
#[derive(Debug, Clone)]
pub enum Submission {
    /// Detection ran inline; this is the state published for the frame.
    Published(Arc<MeasurementState>),
    /// The frame is waiting for the background worker.
    Queued,
}

/// Run one full cycle and publish its state.
///
/// Placement requests are drained from the shared state and restored if the
/// cycle fails, so they are retried with the next frame. Waking the renderer
/// is left to the caller.
fn run_cycle(
    analyzer: &mut FrameAnalyzer,
    shared: &SharedState,
    frame: &Frame,
) -> Result<Arc<MeasurementState>> {
    let placements = shared.take_placements();
    let marker_length = shared.marker_length();
    match analyzer.analyze(frame, marker_length, &placements) {
        Ok(analysis) => {
            let rejected = analysis
                .placements
                .iter()
                .filter(|o| matches!(o, PlacementOutcome::Rejected(_)))
                .count();
            if rejected > 0 {
                debug!(frame = frame.seq, rejected, "placements rejected this cycle");
            }
            Ok(shared.publish(analysis.state))
        }
        Err(e) => {
            shared.restore_placements(placements);
            Err(e)
        }
    }
}

pub enum DetectionScheduler {
    Synchronous(InlineDetection),
    Asynchronous(BackgroundDetection),
}

impl DetectionScheduler {
    pub fn new(policy: DetectionPolicy, analyzer: FrameAnalyzer, shared: Arc<SharedState>) -> Self {
        match policy {
            DetectionPolicy::Synchronous => Self::Synchronous(InlineDetection::new(analyzer, shared)),
            DetectionPolicy::Asynchronous => {
                Self::Asynchronous(BackgroundDetection::spawn(analyzer, shared))
            }
        }
    }

    pub fn policy(&self) -> DetectionPolicy {
        match self {
            Self::Synchronous(_) => DetectionPolicy::Synchronous,
            Self::Asynchronous(_) => DetectionPolicy::Asynchronous,
        }
    }

    /// Hand a frame to detection.
    ///
    /// Synchronous: returns after the new state is published. Asynchronous:
    /// returns once the frame is queued.
    pub fn submit(&self, frame: Frame) -> Result<Submission> {
        match self {
            Self::Synchronous(inline) => inline.run(frame).map(Submission::Published),
            Self::Asynchronous(background) => background.admit(frame).map(|()| Submission::Queued),
        }
    }

    pub fn stats(&self) -> SchedulerCounts {
        match self {
            Self::Synchronous(inline) => inline.stats.counts(),
            Self::Asynchronous(background) => background.stats.counts(),
        }
    }

    /// Stop accepting frames and join the worker, if any.
    pub fn shutdown(&mut self) {
        match self {
            Self::Synchronous(inline) => inline.shared.request_shutdown(),
            Self::Asynchronous(background) => background.shutdown(),
        }
    }
}

/// Detection on the submitting thread.
pub struct InlineDetection {
    analyzer: Mutex<FrameAnalyzer>,
    shared: Arc<SharedState>,
    stats: SchedulerStats,
}

impl InlineDetection {
    fn new(analyzer: FrameAnalyzer, shared: Arc<SharedState>) -> Self {
        Self {
            analyzer: Mutex::new(analyzer),
            shared,
            stats: SchedulerStats::default(),
        }
    }

    fn run(&self, frame: Frame) -> Result<Arc<MeasurementState>> {
        if self.shared.is_shutdown_requested() {
            return Err(MeasureError::SchedulerStopped.into());
        }
        self.stats.submitted.fetch_add(1, Ordering::SeqCst);
        let mut analyzer = self.analyzer.lock();
        match run_cycle(&mut analyzer, &self.shared, &frame) {
            Ok(state) => {
                self.stats.processed.fetch_add(1, Ordering::SeqCst);
                Ok(state)
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }
}

/// Single worker thread with a depth-1, discard-oldest queue.
pub struct BackgroundDetection {
    job_sender: Sender<DetectionJob>,
    /// Producer-side handle on the queue, used to evict the queued job.
    job_evictor: Receiver<DetectionJob>,
    /// Serializes producers so eviction and insertion happen as one step.
    admission: Mutex<()>,
    shared: Arc<SharedState>,
    stats: Arc<SchedulerStats>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundDetection {
    fn spawn(analyzer: FrameAnalyzer, shared: Arc<SharedState>) -> Self {
        let (job_sender, job_receiver) = bounded::<DetectionJob>(JOB_QUEUE_CAPACITY);
        let stats = Arc::new(SchedulerStats::default());

        let worker_shared = Arc::clone(&shared);
        let worker_stats = Arc::clone(&stats);
        let receiver = job_receiver.clone();
        let handle = thread::spawn(move || {
            let mut worker = DetectionWorker { analyzer };
            worker.run(receiver, worker_shared, worker_stats);
        });

        Self {
            job_sender,
            job_evictor: job_receiver,
            admission: Mutex::new(()),
            shared,
            stats,
            handle: Some(handle),
        }
    }

    fn admit(&self, frame: Frame) -> Result<()> {
        if self.shared.is_shutdown_requested() || self.handle.is_none() {
            return Err(MeasureError::SchedulerStopped.into());
        }
        let _admission = self.admission.lock();
        self.stats.submitted.fetch_add(1, Ordering::SeqCst);

        let job = match self.job_sender.try_send(DetectionJob::new(frame)) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(job)) => job,
            Err(TrySendError::Disconnected(_)) => return Err(MeasureError::SchedulerStopped.into()),
        };

        // The worker may have taken the queued job in the meantime, in which
        // case there is nothing to evict and the slot is free.
        if let Ok(evicted) = self.job_evictor.try_recv() {
            self.stats.evicted.fetch_add(1, Ordering::SeqCst);
            debug!(
                evicted = evicted.frame.seq,
                replacement = job.frame.seq,
                "queued frame evicted"
            );
        }

        // Only producers fill the queue and they hold `admission`, so it has room.
        self.job_sender
            .try_send(job)
            .map_err(|_| MeasureError::SchedulerStopped.into())
    }

    fn shutdown(&mut self) {
        self.shared.request_shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        // Anything still queued will never run.
        while let Ok(job) = self.job_evictor.try_recv() {
            self.stats.evicted.fetch_add(1, Ordering::SeqCst);
            debug!(frame = job.frame.seq, "queued frame dropped at shutdown");
        }
    }
}

impl Drop for BackgroundDetection {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Body of the detection thread.
struct DetectionWorker {
    analyzer: FrameAnalyzer,
}

impl DetectionWorker {
    /// Process jobs until shutdown is requested or the queue is closed.
    fn run(&mut self, jobs: Receiver<DetectionJob>, shared: Arc<SharedState>, stats: Arc<SchedulerStats>) {
        info!("detection worker started");
        loop {
            if shared.is_shutdown_requested() {
                break;
            }

            match jobs.recv_timeout(RECV_TIMEOUT) {
                Ok(job) => {
                    let wait_ms = job.queued_at.elapsed().as_secs_f64() * 1000.0;
                    match run_cycle(&mut self.analyzer, &shared, &job.frame) {
                        Ok(_) => {
                            shared.mark_dirty();
                            stats.processed.fetch_add(1, Ordering::SeqCst);
                            debug!(frame = job.frame.seq, wait_ms, "frame processed");
                        }
                        Err(e) => {
                            // Previous snapshot stays published.
                            stats.failed.fetch_add(1, Ordering::SeqCst);
                            error!(frame = job.frame.seq, error = %e, "detection failed");
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        info!(counts = ?stats.counts(), "detection worker exiting");
    }
}
