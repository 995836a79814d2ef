//! Place records drawn from the static town/city catalog.

use serde::{Deserialize, Serialize};

/// Geographic point (lat/lon)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True when both coordinates are finite and inside the WGS84 range
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl From<GeoPoint> for geo::Point<f64> {
    fn from(p: GeoPoint) -> Self {
        geo::Point::new(p.lon, p.lat)
    }
}

/// Size band used to group places in listings and to price customer locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceCategory {
    /// 500,000 and over
    MajorCity,
    /// 200,000 and over
    LargeCity,
    /// 100,000 and over
    MediumCity,
    /// 50,000 and over
    SmallCity,
    Town,
}

impl PlaceCategory {
    pub fn from_population(population: Option<u64>) -> Self {
        match population.unwrap_or(0) {
            p if p >= 500_000 => PlaceCategory::MajorCity,
            p if p >= 200_000 => PlaceCategory::LargeCity,
            p if p >= 100_000 => PlaceCategory::MediumCity,
            p if p >= 50_000 => PlaceCategory::SmallCity,
            _ => PlaceCategory::Town,
        }
    }

    /// All categories in listing order (largest first)
    pub fn all() -> &'static [PlaceCategory] {
        &[
            PlaceCategory::MajorCity,
            PlaceCategory::LargeCity,
            PlaceCategory::MediumCity,
            PlaceCategory::SmallCity,
            PlaceCategory::Town,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            PlaceCategory::MajorCity => "Major City",
            PlaceCategory::LargeCity => "Large City",
            PlaceCategory::MediumCity => "Medium City",
            PlaceCategory::SmallCity => "Small City",
            PlaceCategory::Town => "Town",
        }
    }
}

impl std::fmt::Display for PlaceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A town or city from the catalog.
///
/// Places are never mutated once loaded, only filtered. Every field apart
/// from the name is optional so that partial catalog rows still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,

    #[serde(default)]
    pub latitude: Option<f64>,

    #[serde(default)]
    pub longitude: Option<f64>,

    #[serde(default)]
    pub population: Option<u64>,

    /// UK dialing code, e.g. "0115"
    #[serde(default)]
    pub area_code: Option<String>,
}

impl Place {
    pub fn new(name: &str, lat: f64, lon: f64, population: u64) -> Self {
        Self {
            name: name.to_string(),
            latitude: Some(lat),
            longitude: Some(lon),
            population: Some(population),
            area_code: None,
        }
    }

    pub fn with_area_code(mut self, code: &str) -> Self {
        self.area_code = Some(code.to_string());
        self
    }

    /// Position of the place, or `None` if the coordinates are missing or invalid
    pub fn position(&self) -> Option<GeoPoint> {
        let point = GeoPoint::new(self.latitude?, self.longitude?);
        point.is_valid().then_some(point)
    }

    pub fn population_or_zero(&self) -> u64 {
        self.population.unwrap_or(0)
    }

    pub fn category(&self) -> PlaceCategory {
        PlaceCategory::from_population(self.population)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_requires_both_coordinates() {
        let mut place = Place::new("York", 53.959, -1.0815, 153_717);
        assert!(place.position().is_some());

        place.longitude = None;
        assert!(place.position().is_none());
    }

    #[test]
    fn test_position_rejects_out_of_range() {
        let place = Place::new("Nowhere", 91.0, 0.0, 0);
        assert!(place.position().is_none());

        let place = Place::new("Nowhere", f64::NAN, 0.0, 0);
        assert!(place.position().is_none());
    }

    #[test]
    fn test_zero_coordinates_are_valid() {
        let place = Place::new("Null Island", 0.0, 0.0, 0);
        assert_eq!(place.position(), Some(GeoPoint::new(0.0, 0.0)));
    }

    #[test]
    fn test_category_thresholds() {
        assert_eq!(PlaceCategory::from_population(Some(500_000)), PlaceCategory::MajorCity);
        assert_eq!(PlaceCategory::from_population(Some(499_999)), PlaceCategory::LargeCity);
        assert_eq!(PlaceCategory::from_population(Some(100_000)), PlaceCategory::MediumCity);
        assert_eq!(PlaceCategory::from_population(Some(50_000)), PlaceCategory::SmallCity);
        assert_eq!(PlaceCategory::from_population(None), PlaceCategory::Town);
    }
}
