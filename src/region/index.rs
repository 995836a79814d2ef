//! Spatial index over the place catalog.

use rstar::{RTree, RTreeObject, AABB};
use std::collections::BTreeSet;
use tracing::{debug, info};

use super::contains::contains;
use crate::models::{Place, Shape};

/// Padding (degrees) applied to shape envelopes so boundary points survive the prefilter
const ENVELOPE_MARGIN: f64 = 1e-9;

/// Catalog position wrapped for R-tree indexing
#[derive(Debug, Clone)]
struct IndexedPlace {
    /// Position in the catalog
    idx: usize,
    /// [lon, lat]
    position: [f64; 2],
}

impl RTreeObject for IndexedPlace {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

/// Read-only place catalog with an R-tree over valid positions
pub struct PlaceIndex {
    places: Vec<Place>,
    tree: RTree<IndexedPlace>,
    unlocated: usize,
}

impl PlaceIndex {
    /// Build the index. Places without usable coordinates are kept in the
    /// catalog but never indexed, so no shape can ever match them.
    pub fn build(places: Vec<Place>) -> Self {
        let mut unlocated = 0;
        let indexed: Vec<IndexedPlace> = places
            .iter()
            .enumerate()
            .filter_map(|(idx, place)| match place.position() {
                Some(p) => Some(IndexedPlace {
                    idx,
                    position: [p.lon, p.lat],
                }),
                None => {
                    debug!("Place has no usable coordinates: {}", place.name);
                    unlocated += 1;
                    None
                }
            })
            .collect();

        let tree = RTree::bulk_load(indexed);

        info!(
            "Place index built with {} entries ({} without coordinates)",
            tree.size(),
            unlocated
        );

        Self {
            places,
            tree,
            unlocated,
        }
    }

    /// Catalog indices of places inside at least one shape, in catalog order.
    pub fn locate(&self, shapes: &[Shape]) -> BTreeSet<usize> {
        let mut hits = BTreeSet::new();

        for shape in shapes {
            let Some(bbox) = shape.bounding_box() else {
                continue;
            };
            let bbox = bbox.expand(ENVELOPE_MARGIN);
            let envelope = AABB::from_corners([bbox.west, bbox.south], [bbox.east, bbox.north]);

            // Envelope candidates first, then the exact test
            for candidate in self.tree.locate_in_envelope(&envelope) {
                if hits.contains(&candidate.idx) {
                    continue;
                }
                if let Some(position) = self.places[candidate.idx].position() {
                    if contains(shape, &position) {
                        hits.insert(candidate.idx);
                    }
                }
            }
        }

        hits
    }

    pub fn places(&self) -> &[Place] {
        &self.places
    }

    pub fn get(&self, idx: usize) -> Option<&Place> {
        self.places.get(idx)
    }

    /// Case-insensitive name lookup
    pub fn find_by_name(&self, name: &str) -> Option<&Place> {
        self.places
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    /// Number of places skipped for lack of coordinates
    pub fn unlocated(&self) -> usize {
        self.unlocated
    }
}
