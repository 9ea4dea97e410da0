//! State shared between the frame producer, the detection worker and the
//! render stage.
//!
//! The measurement snapshot is swapped whole under an `RwLock`, so a reader
//! holds either the previous or the new `Arc<MeasurementState>` and never a
//! partially written one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::{Mutex, RwLock};

use crate::config::validate_marker_length;
use crate::error::MeasureError;
use crate::measurement::{MeasurementState, PlacementRequest};

pub struct SharedState {
    /// Latest published measurement. Written by the detection stage only.
    snapshot: RwLock<Arc<MeasurementState>>,

    /// Marker side length in mm, stored as `f64` bits.
    marker_length_bits: AtomicU64,

    /// Placement requests waiting for the next detection cycle.
    pending_placements: Mutex<Vec<PlacementRequest>>,

    /// "Something to draw" signal for the render stage. Capacity 1, so
    /// repeated notifications before a redraw collapse into one.
    dirty_tx: Sender<()>,
    dirty_rx: Receiver<()>,

    /// Request the detection worker to exit.
    pub shutdown_requested: AtomicBool,
}

impl SharedState {
    pub fn new(marker_length: f64) -> Result<Arc<Self>, MeasureError> {
        validate_marker_length(marker_length)?;
        let (dirty_tx, dirty_rx) = bounded(1);
        Ok(Arc::new(Self {
            snapshot: RwLock::new(Arc::new(MeasurementState::empty())),
            marker_length_bits: AtomicU64::new(marker_length.to_bits()),
            pending_placements: Mutex::new(Vec::new()),
            dirty_tx,
            dirty_rx,
            shutdown_requested: AtomicBool::new(false),
        }))
    }

    /// Current measurement snapshot.
    pub fn snapshot(&self) -> Arc<MeasurementState> {
        Arc::clone(&self.snapshot.read())
    }

    /// Replace the snapshot. Does not wake the renderer; see [`Self::mark_dirty`].
    pub fn publish(&self, state: MeasurementState) -> Arc<MeasurementState> {
        let state = Arc::new(state);
        *self.snapshot.write() = Arc::clone(&state);
        state
    }

    pub fn marker_length(&self) -> f64 {
        f64::from_bits(self.marker_length_bits.load(Ordering::SeqCst))
    }

    /// Takes effect on the next detection cycle.
    pub fn set_marker_length(&self, length: f64) -> Result<(), MeasureError> {
        validate_marker_length(length)?;
        self.marker_length_bits
            .store(length.to_bits(), Ordering::SeqCst);
        Ok(())
    }

    pub fn push_placement(&self, request: PlacementRequest) {
        self.pending_placements.lock().push(request);
    }

    /// Take all queued placement requests, oldest first.
    pub fn take_placements(&self) -> Vec<PlacementRequest> {
        std::mem::take(&mut *self.pending_placements.lock())
    }

    /// Put back requests of a cycle that failed, ahead of newer ones.
    pub fn restore_placements(&self, mut requests: Vec<PlacementRequest>) {
        if requests.is_empty() {
            return;
        }
        let mut pending = self.pending_placements.lock();
        requests.append(&mut pending);
        *pending = requests;
    }

    pub fn pending_placements(&self) -> usize {
        self.pending_placements.lock().len()
    }

    pub fn mark_dirty(&self) {
        // Full means a redraw is already pending.
        let _ = self.dirty_tx.try_send(());
    }

    /// Consume the dirty flag without waiting.
    pub fn take_dirty(&self) -> bool {
        self.dirty_rx.try_recv().is_ok()
    }

    /// Block up to `timeout` for the dirty flag.
    pub fn wait_dirty(&self, timeout: Duration) -> bool {
        self.dirty_rx.recv_timeout(timeout).is_ok()
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_length_round_trips_through_bits() {
        let shared = SharedState::new(50.0).unwrap();
        assert_eq!(shared.marker_length(), 50.0);
        shared.set_marker_length(37.5).unwrap();
        assert_eq!(shared.marker_length(), 37.5);
        assert_eq!(
            shared.set_marker_length(-1.0),
            Err(MeasureError::InvalidMarkerLength(-1.0))
        );
        assert_eq!(shared.marker_length(), 37.5);
    }

    #[test]
    fn test_dirty_notifications_coalesce() {
        let shared = SharedState::new(50.0).unwrap();
        assert!(!shared.take_dirty());
        shared.mark_dirty();
        shared.mark_dirty();
        assert!(shared.take_dirty());
        assert!(!shared.take_dirty());
    }

    #[test]
    fn test_publish_swaps_whole_snapshot() {
        let shared = SharedState::new(50.0).unwrap();
        let before = shared.snapshot();
        let published = shared.publish(MeasurementState::empty().with_timing(Default::default()));
        let after = shared.snapshot();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(Arc::ptr_eq(&published, &after));
        assert!(!shared.take_dirty());
    }

    #[test]
    fn test_restored_placements_stay_first() {
        let shared = SharedState::new(50.0).unwrap();
        shared.push_placement(PlacementRequest::at_pixel(1.0, 1.0));
        let taken = shared.take_placements();
        shared.push_placement(PlacementRequest::at_pixel(2.0, 2.0));
        shared.restore_placements(taken);
        let order: Vec<_> = shared
            .take_placements()
            .iter()
            .map(|r| r.pixel.map(|p| p.x))
            .collect();
        assert_eq!(order, vec![Some(1.0), Some(2.0)]);
    }
}
