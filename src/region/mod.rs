//! Region membership engine.
//!
//! Decides which catalog places fall inside the shapes a user has drawn,
//! using an R-tree envelope prefilter followed by an exact point-in-shape test.

mod contains;
mod filter;
mod index;

pub use contains::{contains, distance_meters, point_in_polygon};
pub use filter::{filter_places, filter_places_slice, FilterOutcome, PlaceFilter, SortOrder};
pub use index::PlaceIndex;
