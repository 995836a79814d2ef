//! Filtering the catalog against the drawn shapes.

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use super::contains::contains;
use super::PlaceIndex;
use crate::models::{Place, Shape};

/// Ordering of matched places
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Catalog order
    #[default]
    Catalog,
    /// Largest population first, ties kept in catalog order
    PopulationDesc,
}

/// Non-geometric filters applied after containment
#[derive(Debug, Clone, Default)]
pub struct PlaceFilter {
    /// Minimum population (inclusive); places without a population count as 0
    pub population_min: u64,
    /// Names removed by the user
    pub excluded: HashSet<String>,
    pub sort: SortOrder,
}

impl PlaceFilter {
    fn accepts(&self, place: &Place) -> bool {
        place.population_or_zero() >= self.population_min && !self.excluded.contains(&place.name)
    }
}

/// Result of a membership query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "status", content = "places", rename_all = "snake_case")]
pub enum FilterOutcome {
    /// No shapes exist, so nothing was tested
    #[default]
    NoShapesDrawn,
    /// Shapes exist; the list may be empty
    Matched(Vec<Place>),
}

impl FilterOutcome {
    pub fn places(&self) -> &[Place] {
        match self {
            FilterOutcome::NoShapesDrawn => &[],
            FilterOutcome::Matched(places) => places,
        }
    }

    /// Shapes were drawn but nothing survived the filters
    pub fn is_empty_result(&self) -> bool {
        matches!(self, FilterOutcome::Matched(places) if places.is_empty())
    }

    pub fn len(&self) -> usize {
        self.places().len()
    }

    pub fn is_empty(&self) -> bool {
        self.places().is_empty()
    }
}

/// Places contained in at least one shape that pass `filter`.
pub fn filter_places(index: &PlaceIndex, shapes: &[Shape], filter: &PlaceFilter) -> FilterOutcome {
    if shapes.is_empty() {
        return FilterOutcome::NoShapesDrawn;
    }

    let matched = index
        .locate(shapes)
        .into_iter()
        .filter_map(|idx| index.get(idx));

    FilterOutcome::Matched(finish(matched, filter))
}

/// Same contract as [`filter_places`] over a plain slice, without the index.
pub fn filter_places_slice(places: &[Place], shapes: &[Shape], filter: &PlaceFilter) -> FilterOutcome {
    if shapes.is_empty() {
        return FilterOutcome::NoShapesDrawn;
    }

    let matched = places.iter().filter(|place| match place.position() {
        Some(p) => shapes.iter().any(|shape| contains(shape, &p)),
        None => false,
    });

    FilterOutcome::Matched(finish(matched, filter))
}

fn finish<'a>(matched: impl Iterator<Item = &'a Place>, filter: &PlaceFilter) -> Vec<Place> {
    let mut places: Vec<Place> = matched.filter(|p| filter.accepts(p)).cloned().collect();

    if filter.sort == SortOrder::PopulationDesc {
        // Stable, so equal populations keep catalog order
        places.sort_by(|a, b| b.population_or_zero().cmp(&a.population_or_zero()));
    }

    places
}
