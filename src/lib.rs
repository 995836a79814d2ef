//! Townscope - find UK towns and postcode districts inside hand-drawn regions
//!
//! This library provides the region engine, postcode sampler and session
//! state shared by the `serve` and `areas` binaries.

pub mod catalog;
pub mod config;
pub mod customers;
pub mod export;
pub mod models;
pub mod postcodes;
pub mod ready;
pub mod region;
pub mod session;

pub use models::{BoundingBox, GeoPoint, Place, Shape};
