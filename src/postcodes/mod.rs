//! Postcode area sampler.
//!
//! Approximates "every postcode district inside a shape" by querying a
//! nearest-postcode service on a regular lattice of points.

mod grid;
mod lookup;
mod sampler;

pub use grid::{generate_grid_points, grid_for_bounds, lattice_size};
pub use lookup::{parse_bulk_response, LookupError, PointLookup, PostcodesIoClient, POSTCODES_IO_URL};
pub use sampler::{PostcodeFormat, PostcodeSampler, SampleReport, SamplerConfig};
