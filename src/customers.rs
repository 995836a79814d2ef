//! Customer locations imported from a spreadsheet export.
//!
//! Rows carry the customer name in the first column and a location such as
//! `Guildford (01483)` in the second. Further columns are ignored.

use anyhow::Result;
use csv::ReaderBuilder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::models::{GeoPoint, Place, Shape};
use crate::region::PlaceIndex;

#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRow {
    pub customer: String,
    /// Location with dialing code, e.g. "Guildford (01483)"
    pub location: String,
}

/// A customer location resolved against the catalog
#[derive(Debug, Clone, Serialize)]
pub struct CustomerLocation {
    pub label: String,
    pub place: Place,
}

/// Resolved locations grouped by customer
#[derive(Debug, Default, Serialize)]
pub struct CustomerLocations {
    pub by_customer: BTreeMap<String, Vec<CustomerLocation>>,
    pub unmatched: Vec<String>,
}

impl CustomerLocations {
    pub fn iter(&self) -> impl Iterator<Item = &CustomerLocation> {
        self.by_customer.values().flatten()
    }

    pub fn positions(&self) -> impl Iterator<Item = GeoPoint> + '_ {
        self.iter().filter_map(|loc| loc.place.position())
    }

    pub fn len(&self) -> usize {
        self.by_customer.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read rows after the header line, skipping any without a customer or location
pub fn read_customer_rows<R: Read>(reader: R) -> Result<Vec<CustomerRow>> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for result in csv_reader.records() {
        let record = result?;
        let customer = record.get(0).unwrap_or_default();
        let location = record.get(1).unwrap_or_default();
        if customer.is_empty() || location.is_empty() {
            continue;
        }
        rows.push(CustomerRow {
            customer: customer.to_string(),
            location: location.to_string(),
        });
    }

    Ok(rows)
}

/// "Guildford (01483)" -> "Guildford"; text without a code is returned trimmed
pub fn extract_city_name(location: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"(.+?)\s*\([0-9]+\)").expect("valid regex"));

    pattern
        .captures(location)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| location.trim().to_string())
}

/// Resolve rows against the catalog by case-insensitive name
pub fn match_locations(rows: &[CustomerRow], index: &PlaceIndex) -> CustomerLocations {
    let mut result = CustomerLocations::default();

    for row in rows {
        let city = extract_city_name(&row.location);
        let entry = result.by_customer.entry(row.customer.clone()).or_default();

        match index.find_by_name(&city) {
            Some(place) if place.position().is_some() => {
                debug!("Matched {} for {}", place.name, row.customer);
                entry.push(CustomerLocation {
                    label: row.location.clone(),
                    place: place.clone(),
                });
            }
            _ => {
                warn!("No catalog match for customer location '{}'", row.location);
                result.unmatched.push(row.location.clone());
            }
        }
    }

    info!(
        "Resolved {} customer locations for {} customers ({} unmatched)",
        result.len(),
        result.by_customer.len(),
        result.unmatched.len()
    );

    result
}

/// Licence and advertising cost for one location
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TierCost {
    pub ald: u64,
    pub adspend: u64,
}

/// Per-location costs by population band
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CostTiers {
    /// 500,000 and over
    pub major: TierCost,
    /// 200,000 and over
    pub large: TierCost,
    /// 100,000 and over
    pub medium: TierCost,
    pub small: TierCost,
}

impl CostTiers {
    pub fn tier_for(&self, population: u64) -> &TierCost {
        match population {
            p if p >= 500_000 => &self.major,
            p if p >= 200_000 => &self.large,
            p if p >= 100_000 => &self.medium,
            _ => &self.small,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CostTotals {
    pub ald: u64,
    pub adspend: u64,
}

impl CostTotals {
    pub fn combined(&self) -> u64 {
        self.ald + self.adspend
    }
}

pub fn estimate_costs(locations: &CustomerLocations, tiers: &CostTiers) -> CostTotals {
    locations.iter().fold(CostTotals::default(), |mut totals, loc| {
        let cost = tiers.tier_for(loc.place.population_or_zero());
        totals.ald += cost.ald;
        totals.adspend += cost.adspend;
        totals
    })
}

/// A new shape is refused when its bounding box covers an existing customer location
pub fn overlaps_existing(shape: &Shape, locations: &CustomerLocations) -> bool {
    match shape.bounding_box() {
        Some(bbox) => locations.positions().any(|p| bbox.contains(&p)),
        None => false,
    }
}
