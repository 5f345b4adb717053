//! Polygon boolean helpers backed by the `geo` crate
//!
//! Deflate/inflate, intersection and area are delegated to `geo`; this
//! module only converts board polygons and drops degenerate results.

use geo::{Area, BooleanOps, Buffer, Intersects, LineString, MultiPolygon};

use crate::board::{Point, Polygon, Shape};
use super::distance::{
    point_in_polygon, point_polygon_distance, point_segment_distance, polygon_edges, segment_collides_polygon,
    segment_distance,
};

/// Areas below this (mm²) are treated as empty
const AREA_EPSILON: f64 = 1e-9;

pub fn to_geo_ring(ring: &[Point]) -> LineString<f64> {
    LineString::from(ring.iter().map(|p| (p.x, p.y)).collect::<Vec<_>>())
}

pub fn to_geo_polygon(poly: &Polygon) -> geo::Polygon<f64> {
    geo::Polygon::new(
        to_geo_ring(&poly.outer_ring),
        poly.holes.iter().filter(|h| h.len() >= 3).map(|h| to_geo_ring(h)).collect(),
    )
}

pub fn to_geo_multi(polys: &[Polygon]) -> MultiPolygon<f64> {
    MultiPolygon::new(
        polys
            .iter()
            .filter(|p| !p.is_degenerate())
            .map(to_geo_polygon)
            .collect(),
    )
}

pub fn triangle_to_geo(t: &[Point; 3]) -> geo::Polygon<f64> {
    geo::Polygon::new(to_geo_ring(t), Vec::new())
}

/// Shrink by `amount`; outlines that collapse entirely are dropped
pub fn deflate(shape: &MultiPolygon<f64>, amount: f64) -> MultiPolygon<f64> {
    if amount <= 0.0 {
        return shape.clone();
    }
    drop_slivers(shape.buffer(-amount))
}

/// Grow by `amount`
pub fn inflate(shape: &MultiPolygon<f64>, amount: f64) -> MultiPolygon<f64> {
    if amount <= 0.0 {
        return shape.clone();
    }
    drop_slivers(shape.buffer(amount))
}

fn drop_slivers(shape: MultiPolygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon::new(
        shape
            .into_iter()
            .filter(|p| p.unsigned_area() > AREA_EPSILON)
            .collect(),
    )
}

/// Number of outlines and total number of holes
pub fn outline_and_hole_count(shape: &MultiPolygon<f64>) -> (usize, usize) {
    let holes = shape.iter().map(|p| p.interiors().len()).sum();
    (shape.0.len(), holes)
}

pub fn area(shape: &MultiPolygon<f64>) -> f64 {
    shape.unsigned_area()
}

/// Whether two areas share more than a boundary point
pub fn areas_overlap(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> bool {
    if !a.intersects(b) {
        return false;
    }
    a.intersection(b).unsigned_area() > AREA_EPSILON
}

/// Whether two areas share any point, boundary contact included
pub fn areas_touch(a: &MultiPolygon<f64>, b: &geo::Polygon<f64>) -> bool {
    a.intersects(b)
}

fn shape_area(shape: &Shape) -> Option<MultiPolygon<f64>> {
    match shape {
        Shape::Polygon(p) => Some(to_geo_multi(std::slice::from_ref(p))),
        Shape::Triangle(t) => Some(MultiPolygon::new(vec![triangle_to_geo(t)])),
        _ => None,
    }
}

/// Whether an item shape reaches into `area`. Strokes and circles use
/// their width; filled shapes must share area, not just an edge.
pub fn shape_intersects_area(shape: &Shape, area: &Polygon) -> bool {
    match shape {
        Shape::Segment { start, end, width } => segment_collides_polygon(*start, *end, width / 2.0, area),
        Shape::Circle { center, radius } => circle_intersects_area(*center, *radius, area),
        Shape::Ring { center, radius, width } => ring_intersects_area(*center, *radius, *width, area),
        Shape::Outline { polygon, width } => {
            polygon_edges(polygon).any(|(a, b)| segment_collides_polygon(a, b, width / 2.0, area))
        }
        _ => match shape_area(shape) {
            Some(filled) => areas_overlap(&filled, &to_geo_multi(std::slice::from_ref(area))),
            None => false,
        },
    }
}

pub fn circle_intersects_area(center: Point, radius: f64, area: &Polygon) -> bool {
    let d = point_polygon_distance(center, area);
    d == 0.0 || d < radius
}

/// Whether the annulus `radius ± width / 2` around `center` reaches into
/// `area`. The area is connected, so its distances from `center` cover
/// one interval; the ring hits when that interval overlaps the annulus.
pub fn ring_intersects_area(center: Point, radius: f64, width: f64, area: &Polygon) -> bool {
    let outer = radius + width / 2.0;
    let inner = (radius - width / 2.0).max(0.0);
    let near = point_polygon_distance(center, area);
    if !(near == 0.0 || near < outer) {
        return false;
    }
    let far = area.outer_ring.iter().map(|p| p.distance(&center)).fold(0.0, f64::max);
    far > inner
}

fn segment_inside_area(start: Point, end: Point, width: f64, area: &Polygon) -> bool {
    point_in_polygon(start, area)
        && point_in_polygon(end, area)
        && polygon_edges(area).all(|(a, b)| segment_distance(start, end, a, b) >= width / 2.0)
}

fn circle_inside_area(center: Point, radius: f64, area: &Polygon) -> bool {
    point_in_polygon(center, area) && polygon_edges(area).all(|(a, b)| point_segment_distance(center, a, b).0 >= radius)
}

/// Whether an item shape lies entirely within `area`
pub fn shape_inside_area(shape: &Shape, area: &Polygon) -> bool {
    match shape {
        Shape::Segment { start, end, width } => segment_inside_area(*start, *end, *width, area),
        Shape::Circle { center, radius } => circle_inside_area(*center, *radius, area),
        // Judged by the outer disc, so a ring around a hole of the area is not inside
        Shape::Ring { center, radius, width } => circle_inside_area(*center, radius + width / 2.0, area),
        Shape::Outline { polygon, width } => {
            polygon_edges(polygon).all(|(a, b)| segment_inside_area(a, b, *width, area))
        }
        _ => match shape_area(shape) {
            Some(filled) => filled.difference(&to_geo_multi(std::slice::from_ref(area))).unsigned_area() <= AREA_EPSILON,
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Polygon {
        Polygon::new(vec![
            Point::new(x, y),
            Point::new(x + w, y),
            Point::new(x + w, y + h),
            Point::new(x, y + h),
        ])
    }

    #[test]
    fn test_overlap_requires_shared_area() {
        let a = to_geo_multi(&[rect(0.0, 0.0, 2.0, 2.0)]);
        let touching = to_geo_multi(&[rect(2.0, 0.0, 2.0, 2.0)]);
        let overlapping = to_geo_multi(&[rect(1.0, 1.0, 2.0, 2.0)]);
        assert!(!areas_overlap(&a, &touching));
        assert!(areas_overlap(&a, &overlapping));
    }

    #[test]
    fn test_deflate_collapses_thin_stroke() {
        let stroke = to_geo_multi(&[rect(0.0, 0.0, 10.0, 0.2)]);
        assert!(deflate(&stroke, 0.1).0.is_empty());
        let thick = to_geo_multi(&[rect(0.0, 0.0, 10.0, 0.4)]);
        let shrunk = deflate(&thick, 0.1);
        assert_eq!(outline_and_hole_count(&shrunk), (1, 0));
        assert!((area(&shrunk) - 9.8 * 0.2).abs() < 1e-3);
    }

    #[test]
    fn test_shape_against_area() {
        let area = rect(0.0, 0.0, 5.0, 5.0);
        let via = Shape::Circle { center: Point::new(5.2, 2.0), radius: 0.3 };
        assert!(shape_intersects_area(&via, &area));
        assert!(!shape_inside_area(&via, &area));

        let track = Shape::Segment { start: Point::new(1.0, 1.0), end: Point::new(4.0, 1.0), width: 0.2 };
        assert!(shape_inside_area(&track, &area));
        let pad = Shape::Polygon(rect(4.5, 4.5, 1.0, 1.0));
        assert!(shape_intersects_area(&pad, &area));
        assert!(!shape_inside_area(&pad, &area));
        let outside = Shape::Polygon(rect(5.0, 0.0, 1.0, 1.0));
        assert!(!shape_intersects_area(&outside, &area));
    }

    #[test]
    fn test_stroked_shapes_are_hollow() {
        let area = rect(0.0, 0.0, 5.0, 5.0);
        let center = Point::new(2.5, 2.5);

        let around = Shape::Ring { center, radius: 10.0, width: 0.1 };
        assert!(!shape_intersects_area(&around, &area));
        let crossing = Shape::Ring { center, radius: 3.0, width: 0.1 };
        assert!(shape_intersects_area(&crossing, &area));
        let within = Shape::Ring { center, radius: 1.0, width: 0.1 };
        assert!(shape_intersects_area(&within, &area));
        assert!(shape_inside_area(&within, &area));
        // Area fits inside the hole of the ring
        let small = rect(2.0, 2.0, 1.0, 1.0);
        assert!(!shape_intersects_area(&crossing, &small));

        let frame = Shape::Outline { polygon: rect(-2.0, -2.0, 9.0, 9.0), width: 0.2 };
        assert!(!shape_intersects_area(&frame, &area));
        let overlapping = Shape::Outline { polygon: rect(4.0, 4.0, 3.0, 3.0), width: 0.2 };
        assert!(shape_intersects_area(&overlapping, &area));
        assert!(!shape_inside_area(&overlapping, &area));
    }
}
