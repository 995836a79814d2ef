//! User-drawn shapes and their bounding boxes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::GeoPoint;

/// Mean earth radius in meters, matching `geo::Haversine`
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

#[derive(Debug, Error, PartialEq)]
pub enum ShapeError {
    #[error("polygon needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),
    #[error("shape has a non-finite or out-of-range coordinate")]
    InvalidCoordinate,
    #[error("rectangle south-west corner must not lie north or east of its north-east corner")]
    InvertedRectangle,
    #[error("circle radius must be finite and positive, got {0}")]
    InvalidRadius(f64),
    #[error("shape extends outside the permitted area")]
    OutsideBounds,
}

/// Map extent the drawing surface is limited to
pub const UK_BOUNDS: BoundingBox = BoundingBox {
    south: 49.8,
    west: -8.6,
    north: 60.9,
    east: 1.8,
};

/// Axis-aligned latitude/longitude rectangle. All bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    pub fn from_corners(southwest: GeoPoint, northeast: GeoPoint) -> Self {
        Self::new(southwest.lat, southwest.lon, northeast.lat, northeast.lon)
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lat >= self.south
            && point.lat <= self.north
            && point.lon >= self.west
            && point.lon <= self.east
    }

    /// True when `other` lies entirely inside this box
    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        other.south >= self.south
            && other.north <= self.north
            && other.west >= self.west
            && other.east <= self.east
    }

    pub fn southwest(&self) -> GeoPoint {
        GeoPoint::new(self.south, self.west)
    }

    pub fn northeast(&self) -> GeoPoint {
        GeoPoint::new(self.north, self.east)
    }

    /// Grow the box by `margin` degrees on every side
    pub fn expand(&self, margin: f64) -> Self {
        Self::new(
            self.south - margin,
            self.west - margin,
            self.north + margin,
            self.east + margin,
        )
    }
}

/// A shape drawn on the map.
///
/// Serialized with a `kind` tag, e.g.
/// `{"kind": "circle", "center": {"lat": 52.95, "lon": -1.15}, "radius_meters": 5000}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Shape {
    Rectangle {
        southwest: GeoPoint,
        northeast: GeoPoint,
    },
    Polygon {
        /// Ordered ring; the closing edge back to the first vertex is implied
        vertices: Vec<GeoPoint>,
    },
    Circle {
        center: GeoPoint,
        radius_meters: f64,
    },
}

impl Shape {
    pub fn rectangle(southwest: GeoPoint, northeast: GeoPoint) -> Self {
        Shape::Rectangle {
            southwest,
            northeast,
        }
    }

    pub fn polygon(vertices: Vec<GeoPoint>) -> Self {
        Shape::Polygon { vertices }
    }

    pub fn circle(center: GeoPoint, radius_meters: f64) -> Self {
        Shape::Circle {
            center,
            radius_meters,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Shape::Rectangle { .. } => "rectangle",
            Shape::Polygon { .. } => "polygon",
            Shape::Circle { .. } => "circle",
        }
    }

    pub fn validate(&self) -> Result<(), ShapeError> {
        match self {
            Shape::Rectangle {
                southwest,
                northeast,
            } => {
                if !southwest.is_valid() || !northeast.is_valid() {
                    return Err(ShapeError::InvalidCoordinate);
                }
                if southwest.lat > northeast.lat || southwest.lon > northeast.lon {
                    return Err(ShapeError::InvertedRectangle);
                }
            }
            Shape::Polygon { vertices } => {
                if vertices.len() < 3 {
                    return Err(ShapeError::TooFewVertices(vertices.len()));
                }
                if !vertices.iter().all(GeoPoint::is_valid) {
                    return Err(ShapeError::InvalidCoordinate);
                }
            }
            Shape::Circle {
                center,
                radius_meters,
            } => {
                if !center.is_valid() {
                    return Err(ShapeError::InvalidCoordinate);
                }
                if !radius_meters.is_finite() || *radius_meters <= 0.0 {
                    return Err(ShapeError::InvalidRadius(*radius_meters));
                }
            }
        }
        Ok(())
    }

    /// `validate`, then require the whole bounding box to sit inside `bounds`
    pub fn validate_within(&self, bounds: &BoundingBox) -> Result<(), ShapeError> {
        self.validate()?;
        match self.bounding_box() {
            Some(bbox) if bounds.contains_box(&bbox) => Ok(()),
            _ => Err(ShapeError::OutsideBounds),
        }
    }

    /// Smallest lat/lon rectangle containing the shape.
    ///
    /// Returns `None` only for a polygon without vertices.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        match self {
            Shape::Rectangle {
                southwest,
                northeast,
            } => Some(BoundingBox::from_corners(*southwest, *northeast)),
            Shape::Polygon { vertices } => {
                let first = vertices.first()?;
                let init = BoundingBox::new(first.lat, first.lon, first.lat, first.lon);
                Some(vertices.iter().skip(1).fold(init, |bb, v| {
                    BoundingBox::new(
                        bb.south.min(v.lat),
                        bb.west.min(v.lon),
                        bb.north.max(v.lat),
                        bb.east.max(v.lon),
                    )
                }))
            }
            Shape::Circle {
                center,
                radius_meters,
            } => Some(circle_bounds(center, *radius_meters)),
        }
    }
}

/// Envelope of a spherical cap around `center`
fn circle_bounds(center: &GeoPoint, radius_meters: f64) -> BoundingBox {
    let angular = radius_meters / EARTH_RADIUS_METERS;
    let dlat = angular.to_degrees();

    let north = (center.lat + dlat).min(90.0);
    let south = (center.lat - dlat).max(-90.0);

    // A cap touching a pole spans every longitude
    if north >= 90.0 || south <= -90.0 {
        return BoundingBox::new(south, -180.0, north, 180.0);
    }

    let ratio = angular.sin() / center.lat.to_radians().cos();
    if ratio >= 1.0 {
        return BoundingBox::new(south, -180.0, north, 180.0);
    }

    let dlon = ratio.asin().to_degrees();
    BoundingBox::new(
        south,
        (center.lon - dlon).max(-180.0),
        north,
        (center.lon + dlon).min(180.0),
    )
}
