//! CPU overlay renderer on top of `imageproc`.
//!
//! Draws marker outlines, the connecting line and tracked points onto a copy
//! of the frame. Labels are returned with pixel anchors rather than
//! rasterized, since no font is bundled.

use anyhow::Result;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use crate::geometry::ndc_to_pixel;
use crate::measurement::MeasurementState;
use crate::render::SceneRenderer;
use crate::render::overlay::{ConnectingLine, OverlayPrimitives};

const OUTLINE_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
const LINE_COLOR: Rgba<u8> = Rgba([255, 200, 0, 255]);
const POINT_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const POINT_RADIUS_PX: i32 = 5;

/// A label positioned in pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelLabel {
    pub text: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone)]
pub struct RenderedOverlay {
    pub image: RgbaImage,
    pub labels: Vec<PixelLabel>,
}

#[derive(Debug, Default)]
pub struct ImageOverlayRenderer {
    frames_drawn: u64,
}

impl ImageOverlayRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }
}

impl SceneRenderer for ImageOverlayRenderer {
    type Output = RenderedOverlay;

    fn draw(&mut self, image: &RgbaImage, state: &MeasurementState) -> Result<RenderedOverlay> {
        let mut canvas = image.clone();
        let (width, height) = canvas.dimensions();
        let to_px = |ndc: [f32; 2]| {
            let (x, y) = ndc_to_pixel(ndc[0], ndc[1], width, height);
            (x as f32, y as f32)
        };

        let overlay = OverlayPrimitives::from_state(state);

        for outline in &overlay.outlines {
            let corners: Vec<(f32, f32)> = outline
                .ndc
                .chunks_exact(2)
                .map(|c| to_px([c[0], c[1]]))
                .collect();
            for i in 0..corners.len() {
                let next = corners[(i + 1) % corners.len()];
                draw_line_segment_mut(&mut canvas, corners[i], next, OUTLINE_COLOR);
            }
        }

        if let Some(line) = &overlay.connecting_line {
            draw_thick_line(&mut canvas, line, &to_px);
        }

        for point in &overlay.points {
            let (x, y) = to_px(point.ndc);
            draw_filled_circle_mut(&mut canvas, (x.round() as i32, y.round() as i32), POINT_RADIUS_PX, POINT_COLOR);
        }

        let labels = overlay
            .labels()
            .map(|label| {
                let (x, y) = to_px(label.ndc);
                PixelLabel {
                    text: label.text.clone(),
                    x,
                    y,
                }
            })
            .collect();

        self.frames_drawn += 1;
        Ok(RenderedOverlay { image: canvas, labels })
    }
}

/// Approximate a tapered line with parallel one-pixel segments.
fn draw_thick_line<F>(canvas: &mut RgbaImage, line: &ConnectingLine, to_px: &F)
where
    F: Fn([f32; 2]) -> (f32, f32),
{
    let (x0, y0) = to_px(line.from);
    let (x1, y1) = to_px(line.to);
    let (dx, dy) = (x1 - x0, y1 - y0);
    let len = (dx * dx + dy * dy).sqrt();
    if len < f32::EPSILON {
        return;
    }
    let (nx, ny) = (-dy / len, dx / len);

    let strands = line.width_from.max(line.width_to).ceil() as i32;
    for k in 0..strands {
        let s = k as f32 - (strands - 1) as f32 / 2.0;
        // Offsets beyond an end's half width collapse onto the centre line.
        let o0 = s.clamp(-line.width_from / 2.0, line.width_from / 2.0);
        let o1 = s.clamp(-line.width_to / 2.0, line.width_to / 2.0);
        draw_line_segment_mut(
            canvas,
            (x0 + nx * o0, y0 + ny * o0),
            (x1 + nx * o1, y1 + ny * o1),
            LINE_COLOR,
        );
    }
}
