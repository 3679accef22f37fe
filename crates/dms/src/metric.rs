//! Eye Aspect Ratio (EAR)
//!
//! EAR = (|p2 - p6| + |p3 - p5|) / (2 * |p1 - p4|)
//!
//! Open eyes sit around 0.3, a closed eye approaches 0.

use crate::landmarks::EyeLandmarks;
use crate::DmsError;

/// EAR of a single eye
pub fn eye_aspect_ratio(eye: &EyeLandmarks) -> Result<f64, DmsError> {
    let [p1, p2, p3, p4, p5, p6] = eye.points();

    let horizontal = p1.distance(p4);
    if horizontal == 0.0 {
        return Err(DmsError::InvalidLandmarks(
            "eye corners coincide (zero horizontal span)".to_string(),
        ));
    }

    let vertical = p2.distance(p6) + p3.distance(p5);
    let ear = vertical / (2.0 * horizontal);

    // Subnormal spans can still overflow
    if !ear.is_finite() {
        return Err(DmsError::InvalidLandmarks(format!(
            "eye aspect ratio is not finite (span {horizontal:e})"
        )));
    }

    Ok(ear)
}

/// Frame score: mean EAR of both eyes
pub fn compute_frame_score(left: &EyeLandmarks, right: &EyeLandmarks) -> Result<f64, DmsError> {
    let left_ear = eye_aspect_ratio(left)?;
    let right_ear = eye_aspect_ratio(right)?;
    Ok((left_ear + right_ear) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{Point, EYE_POINTS};
    use proptest::prelude::*;

    fn eye(coords: [(f64, f64); EYE_POINTS]) -> EyeLandmarks {
        EyeLandmarks::new(coords.map(Point::from)).unwrap()
    }

    fn open_eye() -> EyeLandmarks {
        eye([(0.0, 0.0), (1.0, 1.0), (2.0, 1.0), (3.0, 0.0), (2.0, -1.0), (1.0, -1.0)])
    }

    fn closed_eye() -> EyeLandmarks {
        eye([(0.0, 0.0), (1.0, 0.1), (2.0, 0.1), (3.0, 0.0), (2.0, -0.1), (1.0, -0.1)])
    }

    fn flip_vertical(eye: &EyeLandmarks) -> EyeLandmarks {
        EyeLandmarks::new(eye.points().map(|p| Point::new(p.x, -p.y))).unwrap()
    }

    #[test]
    fn test_open_eye_ear() {
        // (2 + 2) / (2 * 3)
        let ear = eye_aspect_ratio(&open_eye()).unwrap();
        assert!((ear - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_closed_eye_is_lower() {
        let open = eye_aspect_ratio(&open_eye()).unwrap();
        let closed = eye_aspect_ratio(&closed_eye()).unwrap();
        assert!(closed < open);
        assert!((closed - 0.4 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_frame_score_is_mean_of_eyes() {
        let score = compute_frame_score(&open_eye(), &closed_eye()).unwrap();
        let expected = (2.0 / 3.0 + 0.4 / 6.0) / 2.0;
        assert!((score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_zero_horizontal_span_is_invalid() {
        let degenerate = eye([(1.0, 1.0), (1.0, 2.0), (2.0, 2.0), (1.0, 1.0), (2.0, 0.0), (1.0, 0.0)]);
        assert!(matches!(
            eye_aspect_ratio(&degenerate),
            Err(DmsError::InvalidLandmarks(_))
        ));
        assert!(compute_frame_score(&open_eye(), &degenerate).is_err());
        assert!(compute_frame_score(&degenerate, &open_eye()).is_err());
    }

    fn arb_point() -> impl Strategy<Value = Point> {
        (-1000.0f64..1000.0, -1000.0f64..1000.0).prop_map(|(x, y)| Point::new(x, y))
    }

    fn arb_eye() -> impl Strategy<Value = EyeLandmarks> {
        proptest::collection::vec(arb_point(), EYE_POINTS)
            .prop_map(|points| EyeLandmarks::from_slice(&points).unwrap())
    }

    proptest! {
        #[test]
        fn prop_vertical_flip_symmetry(left in arb_eye(), right in arb_eye()) {
            prop_assume!(left.points()[0] != left.points()[3]);
            prop_assume!(right.points()[0] != right.points()[3]);

            let score = compute_frame_score(&left, &right).unwrap();
            let flipped = compute_frame_score(&flip_vertical(&left), &flip_vertical(&right)).unwrap();
            prop_assert_eq!(score, flipped);
        }

        #[test]
        fn prop_deterministic(left in arb_eye(), right in arb_eye()) {
            let first = compute_frame_score(&left, &right);
            let second = compute_frame_score(&left, &right);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_coincident_corners_always_invalid(eye in arb_eye()) {
            let mut points = *eye.points();
            points[3] = points[0];
            let degenerate = EyeLandmarks::new(points).unwrap();
            prop_assert!(eye_aspect_ratio(&degenerate).is_err());
        }

        #[test]
        fn prop_score_non_negative(left in arb_eye(), right in arb_eye()) {
            if let Ok(score) = compute_frame_score(&left, &right) {
                prop_assert!(score >= 0.0);
            }
        }
    }
}
