//! Render-side view of the pipeline.
//!
//! The surface owns the front frame. It starts out with a 1x1 placeholder and
//! replaces it whenever a newer frame has been published; the superseded
//! buffer is released at that point.
//!
//! Under the synchronous policy the state only changes together with the
//! frame it was computed from. Under the asynchronous policy the surface
//! shows the newest frame with the newest snapshot, which may lag behind.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::camera::Frame;
use crate::config::DetectionPolicy;
use crate::measurement::MeasurementState;
use crate::render::SceneRenderer;
use crate::system::{FrameBuffer, SharedState};

pub struct RenderSurface {
    frames: Arc<FrameBuffer>,
    shared: Arc<SharedState>,
    current: Frame,
    state: Arc<MeasurementState>,
    /// States arrive paired with frames; the shared snapshot is not read.
    paired: bool,
}

impl RenderSurface {
    pub fn new(frames: Arc<FrameBuffer>, shared: Arc<SharedState>, policy: DetectionPolicy) -> Self {
        let paired = policy == DetectionPolicy::Synchronous;
        let state = if paired {
            Arc::new(MeasurementState::empty())
        } else {
            shared.snapshot()
        };
        Self {
            frames,
            shared,
            current: Frame::placeholder(),
            state,
            paired,
        }
    }

    /// Pick up the newest frame and snapshot. Returns whether the frame changed.
    pub fn latch(&mut self) -> bool {
        // Frame first: a snapshot read afterwards is never older than it.
        let presented = self.frames.latch();
        let changed = match presented {
            Some(presented) => {
                self.current = presented.frame;
                if let Some(state) = presented.state {
                    self.state = state;
                }
                true
            }
            None => false,
        };
        if !self.paired {
            self.state = self.shared.snapshot();
        }
        changed
    }

    pub fn current_frame(&self) -> &Frame {
        &self.current
    }

    pub fn state(&self) -> &MeasurementState {
        &self.state
    }

    /// Draw whatever is current, without waiting.
    pub fn render<R: SceneRenderer>(&mut self, renderer: &mut R) -> Result<R::Output> {
        renderer.draw(self.current.pixels(), &self.state)
    }

    /// Wait up to `timeout` for the dirty signal, then latch and draw.
    ///
    /// Returns `None` if nothing changed within the timeout.
    pub fn render_when_dirty<R: SceneRenderer>(
        &mut self,
        renderer: &mut R,
        timeout: Duration,
    ) -> Result<Option<R::Output>> {
        if !self.shared.wait_dirty(timeout) {
            return Ok(None);
        }
        self.latch();
        self.render(renderer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    /// Records what it was asked to draw.
    #[derive(Default)]
    struct Recorder {
        drawn: Vec<((u32, u32), u64)>,
    }

    impl SceneRenderer for Recorder {
        type Output = ();

        fn draw(&mut self, image: &RgbaImage, state: &MeasurementState) -> Result<()> {
            self.drawn.push((image.dimensions(), state.frame_seq()));
            Ok(())
        }
    }

    #[test]
    fn test_placeholder_until_first_frame() {
        let frames = Arc::new(FrameBuffer::new());
        let shared = SharedState::new(50.0).unwrap();
        let mut surface = RenderSurface::new(
            Arc::clone(&frames),
            Arc::clone(&shared),
            DetectionPolicy::Asynchronous,
        );
        let mut recorder = Recorder::default();

        surface.render(&mut recorder).unwrap();
        assert_eq!(recorder.drawn, vec![((1, 1), 0)]);

        frames.publish(Frame::blank(3, 0, 8, 6));
        assert!(surface.latch());
        assert!(!surface.latch());
        surface.render(&mut recorder).unwrap();
        assert_eq!(recorder.drawn[1], ((8, 6), 0));
    }

    #[test]
    fn test_superseded_front_frame_is_released() {
        let frames = Arc::new(FrameBuffer::new());
        let shared = SharedState::new(50.0).unwrap();
        let mut surface = RenderSurface::new(Arc::clone(&frames), shared, DetectionPolicy::Asynchronous);

        let first = Frame::blank(1, 0, 4, 4);
        let probe = first.clone();
        frames.publish(first);
        surface.latch();
        assert_eq!(probe.holders(), 2);

        frames.publish(Frame::blank(2, 0, 4, 4));
        surface.latch();
        assert_eq!(probe.holders(), 1);
    }

    #[test]
    fn test_render_when_dirty_times_out_quietly() {
        let frames = Arc::new(FrameBuffer::new());
        let shared = SharedState::new(50.0).unwrap();
        let mut surface = RenderSurface::new(frames, Arc::clone(&shared), DetectionPolicy::Asynchronous);
        let mut recorder = Recorder::default();

        let out = surface
            .render_when_dirty(&mut recorder, Duration::from_millis(5))
            .unwrap();
        assert!(out.is_none());

        shared.mark_dirty();
        let out = surface
            .render_when_dirty(&mut recorder, Duration::from_millis(5))
            .unwrap();
        assert!(out.is_some());
    }

    fn state_for(seq: u64, width: u32, height: u32) -> MeasurementState {
        MeasurementState::new(seq, (width, height), vec![], Default::default(), vec![])
    }

    #[test]
    fn test_synchronous_surface_ignores_unpresented_snapshot() {
        let frames = Arc::new(FrameBuffer::new());
        let shared = SharedState::new(50.0).unwrap();
        let mut surface = RenderSurface::new(
            Arc::clone(&frames),
            Arc::clone(&shared),
            DetectionPolicy::Synchronous,
        );

        let state = shared.publish(state_for(1, 8, 6));
        frames.publish_with_state(Frame::blank(1, 0, 8, 6), state);
        assert!(surface.latch());
        assert_eq!(surface.state().frame_seq(), 1);

        // Frame 2 analyzed but not yet presented.
        shared.publish(state_for(2, 16, 12));
        assert!(!surface.latch());
        assert_eq!(surface.current_frame().seq, 1);
        assert_eq!(surface.state().frame_seq(), 1);
        assert_eq!(surface.state().resolution(), surface.current_frame().resolution());
    }

    #[test]
    fn test_asynchronous_surface_follows_latest_snapshot() {
        let frames = Arc::new(FrameBuffer::new());
        let shared = SharedState::new(50.0).unwrap();
        let mut surface = RenderSurface::new(
            Arc::clone(&frames),
            Arc::clone(&shared),
            DetectionPolicy::Asynchronous,
        );

        frames.publish(Frame::blank(1, 0, 8, 6));
        surface.latch();
        assert_eq!(surface.state().frame_seq(), 0);

        shared.publish(state_for(1, 8, 6));
        assert!(!surface.latch());
        assert_eq!(surface.state().frame_seq(), 1);
    }
}
