//! Point-in-shape tests.

use geo::{Distance, Haversine};

use crate::models::{GeoPoint, Shape};

/// True if `point` lies inside `shape`.
///
/// Rectangles and circles include their boundary. Polygons follow the
/// half-open edge rule of ray casting, so a point on the bottom edge of a
/// square counts as inside while a point on its top edge does not.
pub fn contains(shape: &Shape, point: &GeoPoint) -> bool {
    match shape {
        Shape::Rectangle {
            southwest,
            northeast,
        } => {
            point.lat >= southwest.lat
                && point.lat <= northeast.lat
                && point.lon >= southwest.lon
                && point.lon <= northeast.lon
        }
        Shape::Polygon { vertices } => point_in_polygon(point, vertices),
        Shape::Circle {
            center,
            radius_meters,
        } => distance_meters(center, point) <= *radius_meters,
    }
}

/// Great-circle distance between two points in meters
pub fn distance_meters(a: &GeoPoint, b: &GeoPoint) -> f64 {
    Haversine.distance(geo::Point::from(*a), geo::Point::from(*b))
}

/// Ray casting: count crossings of a horizontal ray running east from the point.
pub fn point_in_polygon(point: &GeoPoint, vertices: &[GeoPoint]) -> bool {
    if vertices.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = vertices.len() - 1;

    for i in 0..vertices.len() {
        let (xi, yi) = (vertices[i].lon, vertices[i].lat);
        let (xj, yj) = (vertices[j].lon, vertices[j].lat);

        // Exactly one endpoint strictly above the ray; horizontal edges never qualify
        if (yi > point.lat) != (yj > point.lat) {
            let x_cross = (xj - xi) * (point.lat - yi) / (yj - yi) + xi;
            if point.lon < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }

    inside
}
