//! Static town/city catalog.

mod area_codes;

pub use area_codes::{area_code_for, DEFAULT_AREA_CODE};

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::models::{Place, PlaceCategory};

/// Load the catalog from a CSV file (optionally gzipped)
pub fn load_catalog(path: &Path) -> Result<Vec<Place>> {
    info!("Loading place catalog from {}", path.display());

    let file = File::open(path).context("Failed to open catalog file")?;
    let reader: Box<dyn Read> = if path.extension().map_or(false, |e| e == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let places = read_catalog(reader)?;
    info!("Loaded {} places", places.len());
    Ok(places)
}

/// Parse catalog rows.
///
/// Expected header: `name,latitude,longitude,population,area_code`. Any column
/// but `name` may be empty. Rows that fail to parse are skipped with a warning.
pub fn read_catalog<R: Read>(reader: R) -> Result<Vec<Place>> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    headers
        .iter()
        .position(|h| h == "name")
        .context("Column 'name' not found")?;

    let mut places = Vec::new();

    for (line, result) in csv_reader.deserialize::<Place>().enumerate() {
        let mut place = match result {
            Ok(p) => p,
            Err(e) => {
                warn!("Skipping catalog row {}: {}", line + 2, e);
                continue;
            }
        };

        if place.name.is_empty() {
            warn!("Skipping catalog row {}: empty name", line + 2);
            continue;
        }

        if place.area_code.as_deref().map_or(true, str::is_empty) {
            place.area_code = Some(area_code_for(&place.name).to_string());
        }

        places.push(place);
    }

    Ok(places)
}

/// Group places by size band, largest band first. Empty bands are omitted.
pub fn categorize(places: &[Place]) -> Vec<(PlaceCategory, Vec<&Place>)> {
    PlaceCategory::all()
        .iter()
        .filter_map(|category| {
            let members: Vec<&Place> = places.iter().filter(|p| p.category() == *category).collect();
            (!members.is_empty()).then_some((*category, members))
        })
        .collect()
}
