//! Frame handoff between the producer and the render stage.
//!
//! Two slots: the back slot holds the newest published frame until the
//! renderer latches it, the front frame is owned by the renderer itself
//! (see `RenderSurface`). Publishing moves a frame into the back slot and
//! hands back whatever it replaced; latching moves it out. No frame is ever
//! written while another stage reads it.
//!
//! A frame may carry the measurement state computed from it. The pair is
//! installed and latched under one lock, so the renderer never sees one
//! without the other.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::camera::{Frame, FrameSeq};
use crate::measurement::MeasurementState;

/// A frame waiting in the back slot.
#[derive(Debug, Clone)]
pub struct PresentedFrame {
    pub frame: Frame,
    /// State analyzed from exactly this frame, if detection ran before presenting.
    pub state: Option<Arc<MeasurementState>>,
}

#[derive(Default)]
pub struct FrameBuffer {
    back: Mutex<Option<PresentedFrame>>,
    published: AtomicU64,
    superseded: AtomicU64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `frame` as the newest frame.
    ///
    /// Returns the frame it replaced if the renderer never latched it.
    pub fn publish(&self, frame: Frame) -> Option<Frame> {
        self.install(PresentedFrame { frame, state: None })
    }

    /// Install `frame` together with the state analyzed from it.
    pub fn publish_with_state(&self, frame: Frame, state: Arc<MeasurementState>) -> Option<Frame> {
        self.install(PresentedFrame {
            frame,
            state: Some(state),
        })
    }

    fn install(&self, presented: PresentedFrame) -> Option<Frame> {
        let seq = presented.frame.seq;
        let previous = self.back.lock().replace(presented);
        self.published.fetch_add(1, Ordering::Relaxed);
        previous.map(|old| {
            self.superseded.fetch_add(1, Ordering::Relaxed);
            trace!(frame = seq, superseded = old.frame.seq, "frame superseded before render");
            old.frame
        })
    }

    /// Take the newest frame, leaving the back slot empty.
    pub fn latch(&self) -> Option<PresentedFrame> {
        self.back.lock().take()
    }

    /// Sequence number of the frame waiting to be latched.
    pub fn pending_seq(&self) -> Option<FrameSeq> {
        self.back.lock().as_ref().map(|p| p.frame.seq)
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Frames replaced before the renderer saw them.
    pub fn superseded(&self) -> u64 {
        self.superseded.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_returns_superseded_frame() {
        let buffer = FrameBuffer::new();
        assert!(buffer.publish(Frame::blank(1, 0, 4, 4)).is_none());
        let old = buffer.publish(Frame::blank(2, 0, 4, 4)).unwrap();
        assert_eq!(old.seq, 1);
        assert_eq!(buffer.pending_seq(), Some(2));
        assert_eq!(buffer.superseded(), 1);
        assert_eq!(buffer.published(), 2);
    }

    #[test]
    fn test_latch_moves_frame_out() {
        let buffer = FrameBuffer::new();
        buffer.publish(Frame::blank(7, 0, 4, 4));
        let presented = buffer.latch().unwrap();
        assert_eq!(presented.frame.seq, 7);
        assert!(presented.state.is_none());
        assert!(buffer.latch().is_none());
        // Sole owner after the handoff.
        assert_eq!(presented.frame.holders(), 1);
    }

    #[test]
    fn test_paired_state_travels_with_its_frame() {
        let buffer = FrameBuffer::new();
        let first = Arc::new(MeasurementState::new(1, (4, 4), vec![], Default::default(), vec![]));
        let second = Arc::new(MeasurementState::new(2, (8, 8), vec![], Default::default(), vec![]));
        buffer.publish_with_state(Frame::blank(1, 0, 4, 4), first);
        buffer.publish_with_state(Frame::blank(2, 0, 8, 8), Arc::clone(&second));

        let presented = buffer.latch().unwrap();
        assert_eq!(presented.frame.seq, 2);
        let state = presented.state.unwrap();
        assert!(Arc::ptr_eq(&state, &second));
        assert_eq!(state.resolution(), presented.frame.resolution());
    }
}
