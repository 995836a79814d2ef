//! Core data models for places and drawn shapes.

pub mod place;
pub mod shape;

pub use place::{GeoPoint, Place, PlaceCategory};
pub use shape::{BoundingBox, Shape, ShapeError, UK_BOUNDS};
