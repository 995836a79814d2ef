//! Sample lattice generation.

use crate::models::{BoundingBox, GeoPoint};

/// Lattice of points covering the given bounds at a fixed step.
///
/// Both loops accumulate `step` and stop on `<=`, so rounding drift can drop
/// or add the final row/column when the span is not an exact multiple of the
/// step. With `(0, 0, 0.05, 0.05, 0.02)` the result is the 3x3 lattice at
/// 0, 0.02 and 0.04 on each axis; the fourth step lands at 0.06 which is
/// past the bound.
pub fn generate_grid_points(
    min_lat: f64,
    min_lon: f64,
    max_lat: f64,
    max_lon: f64,
    step: f64,
) -> Vec<GeoPoint> {
    let mut points = Vec::new();

    if !(step.is_finite() && step > 0.0) {
        return points;
    }

    let mut lat = min_lat;
    while lat <= max_lat {
        let mut lon = min_lon;
        while lon <= max_lon {
            points.push(GeoPoint::new(lat, lon));
            lon += step;
        }
        lat += step;
    }

    points
}

/// Lattice over a bounding box
pub fn grid_for_bounds(bbox: &BoundingBox, step: f64) -> Vec<GeoPoint> {
    generate_grid_points(bbox.south, bbox.west, bbox.north, bbox.east, step)
}

/// Number of points `grid_for_bounds` would produce, computed without
/// allocating. Saturates at `usize::MAX`.
pub fn lattice_size(bbox: &BoundingBox, step: f64) -> usize {
    if !(step.is_finite() && step > 0.0) || bbox.north < bbox.south || bbox.east < bbox.west {
        return 0;
    }
    let rows = ((bbox.north - bbox.south) / step).floor() + 1.0;
    let cols = ((bbox.east - bbox.west) / step).floor() + 1.0;
    (rows * cols) as usize
}
