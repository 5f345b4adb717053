//! Per-layer effective shapes of board items

use serde::Serialize;

use super::types::{Point, Polygon, Rect};

/// Geometry an item presents on one layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Shape {
    Segment { start: Point, end: Point, width: f64 },
    Circle { center: Point, radius: f64 },
    /// Stroked circle: the annulus `radius ± width / 2`
    Ring { center: Point, radius: f64, width: f64 },
    Polygon(Polygon),
    /// Stroked polygon boundary; the interior is empty
    Outline { polygon: Polygon, width: f64 },
    Triangle([Point; 3]),
}

impl Shape {
    pub fn bbox(&self) -> Option<Rect> {
        match self {
            Shape::Segment { start, end, width } => {
                Some(Rect::new(*start, *end).inflate(width / 2.0))
            }
            Shape::Circle { center, radius } => Some(Rect::around(*center, *radius, *radius)),
            Shape::Ring { center, radius, width } => {
                let outer = radius + width / 2.0;
                Some(Rect::around(*center, outer, outer))
            }
            Shape::Polygon(poly) => poly.bbox(),
            Shape::Outline { polygon, width } => Rect::from_points(&polygon.outer_ring).map(|r| r.inflate(width / 2.0)),
            Shape::Triangle(t) => Rect::from_points(t),
        }
    }

    /// Zero-width, zero-radius or zero-area shapes
    pub fn is_degenerate(&self) -> bool {
        match self {
            Shape::Segment { width, .. } => *width <= 0.0,
            Shape::Circle { radius, .. } => *radius <= 0.0,
            Shape::Ring { radius, width, .. } => *width <= 0.0 || *radius < 0.0,
            Shape::Polygon(poly) => poly.is_degenerate(),
            Shape::Outline { polygon, width } => *width <= 0.0 || polygon.outer_ring.len() < 2,
            Shape::Triangle(t) => super::tessellation::triangle_area(t) <= f64::EPSILON,
        }
    }
}
