//! Metric distances and their on-screen labels.

use nalgebra::Vector3;

use crate::geometry::Pose;

/// Euclidean distance between two marker centres (camera-frame translations).
pub fn inter_marker_distance(t1: &Vector3<f64>, t2: &Vector3<f64>) -> f64 {
    (t1 - t2).norm()
}

/// Camera-frame depths of two markers, used for line thickness.
pub fn marker_depths(first: &Pose, second: &Pose) -> (f32, f32) {
    (first.depth() as f32, second.depth() as f32)
}

/// Label shown next to a distance: whole millimetres, truncated.
pub fn format_distance_mm(distance: f64) -> String {
    format!("{}mm", distance.trunc() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation3;

    #[test]
    fn test_distance_example() {
        let d = inter_marker_distance(&Vector3::new(0.0, 0.0, 100.0), &Vector3::new(50.0, 0.0, 100.0));
        assert_eq!(d, 50.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = Vector3::new(3.0, -4.0, 120.0);
        let b = Vector3::new(-1.0, 2.0, 95.0);
        assert_eq!(inter_marker_distance(&a, &b), inter_marker_distance(&b, &a));
    }

    #[test]
    fn test_depths() {
        let p1 = Pose::from_rt(Rotation3::identity(), Vector3::new(0.0, 0.0, 120.5));
        let p2 = Pose::from_rt(Rotation3::identity(), Vector3::new(0.0, 0.0, 300.0));
        assert_eq!(marker_depths(&p1, &p2), (120.5, 300.0));
    }

    #[test]
    fn test_label_truncates() {
        assert_eq!(format_distance_mm(50.0), "50mm");
        assert_eq!(format_distance_mm(123.99), "123mm");
        assert_eq!(format_distance_mm(0.4), "0mm");
    }
}
