//! Polygon triangulation using the earcut algorithm
//!
//! Filled zone regions are indexed one triangle at a time, so a large pour
//! only answers queries where it actually has copper.

use super::types::{Point, Polygon};

/// Triangulate a polygon with holes. Degenerate input yields no triangles.
pub fn triangulate_polygon(polygon: &Polygon) -> Vec<[Point; 3]> {
    if polygon.is_degenerate() {
        return Vec::new();
    }

    // Build flat coordinate array for earcut
    let mut flat_coords: Vec<f64> = Vec::with_capacity(polygon.outer_ring.len() * 2);
    let mut hole_indices: Vec<usize> = Vec::new();

    for p in &polygon.outer_ring {
        flat_coords.push(p.x);
        flat_coords.push(p.y);
    }

    for hole in &polygon.holes {
        if hole.len() < 3 {
            continue; // Skip degenerate holes
        }
        hole_indices.push(flat_coords.len() / 2);
        for p in hole {
            flat_coords.push(p.x);
            flat_coords.push(p.y);
        }
    }

    let indices = earcutr::earcut(&flat_coords, &hole_indices, 2).unwrap_or_default();

    let vertex = |i: usize| Point::new(flat_coords[i * 2], flat_coords[i * 2 + 1]);
    indices
        .chunks_exact(3)
        .filter(|c| c.iter().all(|&i| i * 2 + 1 < flat_coords.len()))
        .map(|c| [vertex(c[0]), vertex(c[1]), vertex(c[2])])
        .filter(|t| triangle_area(t) > f64::EPSILON)
        .collect()
}

/// Unsigned triangle area
pub fn triangle_area(t: &[Point; 3]) -> f64 {
    ((t[1].x - t[0].x) * (t[2].y - t[0].y) - (t[2].x - t[0].x) * (t[1].y - t[0].y)).abs() / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Polygon {
        Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(size, 0.0),
            Point::new(size, size),
            Point::new(0.0, size),
        ])
    }

    #[test]
    fn test_square_triangulates_to_two_triangles() {
        let tris = triangulate_polygon(&square(2.0));
        assert_eq!(tris.len(), 2);
        let area: f64 = tris.iter().map(triangle_area).sum();
        assert!((area - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_hole_area_is_excluded() {
        let mut poly = square(4.0);
        poly.holes.push(vec![
            Point::new(1.0, 1.0),
            Point::new(1.0, 3.0),
            Point::new(3.0, 3.0),
            Point::new(3.0, 1.0),
        ]);
        let area: f64 = triangulate_polygon(&poly).iter().map(triangle_area).sum();
        assert!((area - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_polygon_is_skipped() {
        let line = Polygon::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(2.0, 0.0)]);
        assert!(triangulate_polygon(&line).is_empty());
    }
}
