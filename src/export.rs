//! Tabular export of places and postcodes.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use csv::WriterBuilder;
use serde::{Deserialize, Serialize};

use crate::models::Place;

pub const PLACE_HEADER: [&str; 5] = ["Location", "Population", "Area Code", "Latitude", "Longitude"];
pub const POSTCODE_HEADER: [&str; 1] = ["Postcode"];

/// Output flavour. `Xls` is tab separated text that spreadsheet tools open directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableFormat {
    #[default]
    Csv,
    Xls,
}

impl TableFormat {
    pub fn delimiter(&self) -> u8 {
        match self {
            TableFormat::Csv => b',',
            TableFormat::Xls => b'\t',
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            TableFormat::Csv => "csv",
            TableFormat::Xls => "xls",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            TableFormat::Csv => "text/csv;charset=utf-8",
            TableFormat::Xls => "text/tab-separated-values;charset=utf-8",
        }
    }
}

/// What is being exported, which decides the file name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Locations,
    Postcodes,
}

impl ExportKind {
    fn prefix(&self) -> &'static str {
        match self {
            ExportKind::Locations => "uk_locations",
            ExportKind::Postcodes => "uk_postcodes",
        }
    }
}

/// e.g. `uk_postcodes_2024-03-01.xls`
pub fn export_filename(kind: ExportKind, format: TableFormat, date: NaiveDate) -> String {
    format!("{}_{}.{}", kind.prefix(), date.format("%Y-%m-%d"), format.extension())
}

pub fn export_places(places: &[Place], format: TableFormat) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .delimiter(format.delimiter())
        .from_writer(Vec::new());

    writer.write_record(PLACE_HEADER)?;
    for place in places {
        writer.write_record([
            place.name.clone(),
            place.population.map(|p| p.to_string()).unwrap_or_default(),
            place.area_code.clone().unwrap_or_default(),
            place.latitude.map(|v| v.to_string()).unwrap_or_default(),
            place.longitude.map(|v| v.to_string()).unwrap_or_default(),
        ])?;
    }

    finish(writer)
}

/// Export postcodes sorted alphabetically
pub fn export_postcodes<'a, I>(postcodes: I, format: TableFormat) -> Result<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut sorted: Vec<&String> = postcodes.into_iter().collect();
    sorted.sort();
    sorted.dedup();

    let mut writer = WriterBuilder::new()
        .delimiter(format.delimiter())
        .from_writer(Vec::new());

    writer.write_record(POSTCODE_HEADER)?;
    for postcode in sorted {
        writer.write_record([postcode])?;
    }

    finish(writer)
}

/// Sorted, comma separated postcodes for pasting elsewhere
pub fn clipboard_text<'a, I>(postcodes: I) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    let mut sorted: Vec<&str> = postcodes.into_iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(", ")
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush export: {}", e.error()))?;
    String::from_utf8(bytes).context("Export produced invalid UTF-8")
}
