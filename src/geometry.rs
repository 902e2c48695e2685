//! Points and corner sets in source and destination space

use serde::{Deserialize, Serialize};

/// A 2D point in pixel units (media space or canvas space)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// One of the four drag handles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl Corner {
    /// Clockwise order starting at the top-left
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomRight,
        Corner::BottomLeft,
    ];

    pub fn index(&self) -> usize {
        match self {
            Corner::TopLeft => 0,
            Corner::TopRight => 1,
            Corner::BottomRight => 2,
            Corner::BottomLeft => 3,
        }
    }
}

/// Four corners of a quadrilateral
///
/// No convexity is enforced. Self-intersecting or collinear sets are accepted
/// here and rejected later by the solver if no projective map exists.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CornerSet {
    pub top_left: Point2D,
    pub top_right: Point2D,
    pub bottom_right: Point2D,
    pub bottom_left: Point2D,
}

impl CornerSet {
    pub const fn new(
        top_left: Point2D,
        top_right: Point2D,
        bottom_right: Point2D,
        bottom_left: Point2D,
    ) -> Self {
        Self {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        }
    }

    /// The media rectangle `(0,0)`-`(width,height)`
    pub fn rect(width: f64, height: f64) -> Self {
        Self::new(
            Point2D::new(0.0, 0.0),
            Point2D::new(width, 0.0),
            Point2D::new(width, height),
            Point2D::new(0.0, height),
        )
    }

    pub fn from_array(points: [Point2D; 4]) -> Self {
        Self::new(points[0], points[1], points[2], points[3])
    }

    pub fn to_array(&self) -> [Point2D; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    pub fn get(&self, corner: Corner) -> Point2D {
        self.to_array()[corner.index()]
    }

    /// A copy with one corner moved; the original is left untouched
    pub fn with_corner(&self, corner: Corner, point: Point2D) -> Self {
        let mut points = self.to_array();
        points[corner.index()] = point;
        Self::from_array(points)
    }

    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self::from_array(self.to_array().map(|p| Point2D::new(p.x + dx, p.y + dy)))
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self::from_array(self.to_array().map(|p| Point2D::new(p.x * factor, p.y * factor)))
    }
}
