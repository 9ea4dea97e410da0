//! Pixel <-> normalized device coordinates.
//!
//! The renderer expects `[-1, 1]` on both axes with +Y pointing up, while image
//! rows grow downwards, hence the flipped V axis:
//!
//! ```text
//! u =   px * 2/W - 1
//! v = -(py * 2/H - 1)
//! ```

use nalgebra::Point2;

/// Four corners, each `(u, v)`, flattened in corner order.
pub type NdcQuad = [f32; 8];

/// Map a pixel coordinate to NDC.
#[inline]
pub fn pixel_to_ndc(px: f64, py: f64, width: u32, height: u32) -> (f32, f32) {
    let u = px * 2.0 / width as f64 - 1.0;
    let v = -(py * 2.0 / height as f64 - 1.0);
    (u as f32, v as f32)
}

/// Inverse of [`pixel_to_ndc`].
#[inline]
pub fn ndc_to_pixel(u: f32, v: f32, width: u32, height: u32) -> (f64, f64) {
    let px = (u as f64 + 1.0) * width as f64 / 2.0;
    let py = (1.0 - v as f64) * height as f64 / 2.0;
    (px, py)
}

/// Convert a marker's four pixel corners into the 8-float outline polygon.
pub fn corners_to_ndc(corners: &[Point2<f64>; 4], width: u32, height: u32) -> NdcQuad {
    let mut quad = [0.0f32; 8];
    for (i, c) in corners.iter().enumerate() {
        let (u, v) = pixel_to_ndc(c.x, c.y, width, height);
        quad[2 * i] = u;
        quad[2 * i + 1] = v;
    }
    quad
}

/// Midpoint of the diagonal between corner 0 and corner 2.
pub fn quad_midpoint(quad: &NdcQuad) -> [f32; 2] {
    [(quad[0] + quad[4]) / 2.0, (quad[1] + quad[5]) / 2.0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_image_corners_map_to_ndc_extremes() {
        assert_eq!(pixel_to_ndc(0.0, 0.0, 1920, 1080), (-1.0, 1.0));
        assert_eq!(pixel_to_ndc(1920.0, 1080.0, 1920, 1080), (1.0, -1.0));
        assert_eq!(pixel_to_ndc(960.0, 540.0, 1920, 1080), (0.0, 0.0));
    }

    #[test]
    fn test_in_range_for_image_grid() {
        let (w, h) = (640u32, 480u32);
        for px in (0..=w).step_by(37) {
            for py in (0..=h).step_by(29) {
                let (u, v) = pixel_to_ndc(px as f64, py as f64, w, h);
                assert!((-1.0..=1.0).contains(&u), "u={} out of range", u);
                assert!((-1.0..=1.0).contains(&v), "v={} out of range", v);
            }
        }
    }

    #[test]
    fn test_mapping_is_reproducible() {
        let a = pixel_to_ndc(123.25, 77.5, 640, 480);
        let b = pixel_to_ndc(123.25, 77.5, 640, 480);
        assert_eq!(a.0.to_bits(), b.0.to_bits());
        assert_eq!(a.1.to_bits(), b.1.to_bits());
    }

    #[test]
    fn test_ndc_to_pixel_inverts() {
        let (u, v) = pixel_to_ndc(100.0, 300.0, 640, 480);
        let (px, py) = ndc_to_pixel(u, v, 640, 480);
        assert_relative_eq!(px, 100.0, epsilon = 1e-3);
        assert_relative_eq!(py, 300.0, epsilon = 1e-3);
    }

    #[test]
    fn test_quad_and_midpoint() {
        let corners = [
            Point2::new(0.0, 0.0),
            Point2::new(640.0, 0.0),
            Point2::new(640.0, 480.0),
            Point2::new(0.0, 480.0),
        ];
        let quad = corners_to_ndc(&corners, 640, 480);
        assert_eq!(quad, [-1.0, 1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0]);
        assert_eq!(quad_midpoint(&quad), [0.0, 0.0]);
    }
}
