//! The render side: stage interfaces, overlay primitives and a CPU renderer.
//!
//! Analysis and drawing are separate capabilities joined only through the
//! shared snapshot and the frame buffer:
//!
//! - [`FrameConsumer`] takes captured frames and updates the measurement state.
//! - [`SceneRenderer`] draws an image together with a measurement snapshot.

pub mod image_renderer;
pub mod overlay;
pub mod surface;

use anyhow::Result;
use image::RgbaImage;

use crate::camera::Frame;
use crate::measurement::MeasurementState;

pub use image_renderer::{ImageOverlayRenderer, PixelLabel, RenderedOverlay};
pub use overlay::{ConnectingLine, OverlayPrimitives, Outline, PointMarker, TextLabel, line_width_for_depth};
pub use surface::RenderSurface;

/// Receives captured frames.
pub trait FrameConsumer {
    fn analyze(&mut self, frame: Frame) -> Result<()>;
}

/// Draws one image with the measurement overlay.
pub trait SceneRenderer {
    type Output;

    fn draw(&mut self, image: &RgbaImage, state: &MeasurementState) -> Result<Self::Output>;
}
