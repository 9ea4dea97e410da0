use nalgebra::Point2;

use crate::error::MeasureError;

/// Raw detector output for one marker, before corner validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMarker {
    pub id: i32,
    pub corners: Vec<Point2<f64>>,
}

/// A detected marker: its dictionary id and four pixel-space corners,
/// clockwise from the marker's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerObservation {
    pub id: i32,
    pub corners: [Point2<f64>; 4],
}

impl MarkerObservation {
    pub fn new(id: i32, corners: [Point2<f64>; 4]) -> Self {
        Self { id, corners }
    }

    /// Validate a raw detection; `index` is its position in the detector output.
    pub fn from_raw(index: usize, raw: &RawMarker) -> Result<Self, MeasureError> {
        let corners: [Point2<f64>; 4] =
            raw.corners
                .as_slice()
                .try_into()
                .map_err(|_| MeasureError::MalformedObservation {
                    index,
                    corners: raw.corners.len(),
                })?;
        Ok(Self { id: raw.id, corners })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, side: f64) -> Vec<Point2<f64>> {
        vec![
            Point2::new(x, y),
            Point2::new(x + side, y),
            Point2::new(x + side, y + side),
            Point2::new(x, y + side),
        ]
    }

    #[test]
    fn test_from_raw_accepts_four_corners() {
        let raw = RawMarker {
            id: 7,
            corners: square(10.0, 20.0, 40.0),
        };
        let obs = MarkerObservation::from_raw(0, &raw).unwrap();
        assert_eq!(obs.id, 7);
        assert_eq!(obs.corners[2], Point2::new(50.0, 60.0));
    }

    #[test]
    fn test_from_raw_rejects_wrong_corner_count() {
        let mut corners = square(0.0, 0.0, 10.0);
        corners.pop();
        let raw = RawMarker { id: 1, corners };
        assert_eq!(
            MarkerObservation::from_raw(3, &raw),
            Err(MeasureError::MalformedObservation {
                index: 3,
                corners: 3
            })
        );
    }
}
