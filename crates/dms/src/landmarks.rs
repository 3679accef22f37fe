//! Eye landmark input types

use serde::{Deserialize, Serialize};

use crate::DmsError;

/// Number of points describing one eye
pub const EYE_POINTS: usize = 6;

/// Image-space point (pixels)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Six eye contour points in anatomical order:
/// outer corner, upper lid (2), inner corner, lower lid (2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point>", into = "Vec<Point>")]
pub struct EyeLandmarks {
    points: [Point; EYE_POINTS],
}

impl EyeLandmarks {
    pub fn new(points: [Point; EYE_POINTS]) -> Result<Self, DmsError> {
        if let Some(index) = points.iter().position(|p| !p.is_finite()) {
            return Err(DmsError::InvalidLandmarks(format!(
                "point {} has a non-finite coordinate",
                index + 1
            )));
        }
        Ok(Self { points })
    }

    /// Build from a slice that must hold exactly six points
    pub fn from_slice(points: &[Point]) -> Result<Self, DmsError> {
        let points: [Point; EYE_POINTS] = points.try_into().map_err(|_| {
            DmsError::InvalidLandmarks(format!(
                "expected {} points per eye, got {}",
                EYE_POINTS,
                points.len()
            ))
        })?;
        Self::new(points)
    }

    pub fn points(&self) -> &[Point; EYE_POINTS] {
        &self.points
    }
}

impl TryFrom<Vec<Point>> for EyeLandmarks {
    type Error = DmsError;

    fn try_from(points: Vec<Point>) -> Result<Self, Self::Error> {
        Self::from_slice(&points)
    }
}

impl From<EyeLandmarks> for Vec<Point> {
    fn from(eye: EyeLandmarks) -> Self {
        eye.points.to_vec()
    }
}

/// Both eyes of one detected face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EyePair {
    pub left: EyeLandmarks,
    pub right: EyeLandmarks,
}

/// One frame of landmark-detector output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    /// Monotonic capture timestamp (milliseconds)
    pub timestamp_ms: u64,

    /// Eye landmarks, absent when no face was detected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eyes: Option<EyePair>,
}

impl LandmarkFrame {
    pub fn face(timestamp_ms: u64, left: EyeLandmarks, right: EyeLandmarks) -> Self {
        Self {
            timestamp_ms,
            eyes: Some(EyePair { left, right }),
        }
    }

    pub fn no_face(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            eyes: None,
        }
    }
}
