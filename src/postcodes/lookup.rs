//! Nearest-postcode lookups against postcodes.io.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::models::GeoPoint;

pub const POSTCODES_IO_URL: &str = "https://api.postcodes.io";

/// Why a batch lookup produced no usable answer
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("lookup request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("lookup service returned HTTP {0}")]
    Status(u16),
    #[error("malformed lookup response: {0}")]
    Malformed(String),
    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Resolves coordinates to their nearest postcode.
///
/// The returned vector has one entry per input point, in the same order;
/// `None` means nothing was found within the radius.
pub trait PointLookup {
    fn lookup(
        &self,
        points: &[GeoPoint],
        radius_meters: f64,
    ) -> impl Future<Output = Result<Vec<Option<String>>, LookupError>> + Send;
}

#[derive(Debug, Serialize)]
struct BulkReverseRequest {
    geolocations: Vec<Geolocation>,
}

#[derive(Debug, Serialize)]
struct Geolocation {
    longitude: f64,
    latitude: f64,
    radius: f64,
    limit: u32,
}

/// One nearest-postcode query per point, all sharing the same radius
fn bulk_request(points: &[GeoPoint], radius_meters: f64) -> BulkReverseRequest {
    BulkReverseRequest {
        geolocations: points
            .iter()
            .map(|p| Geolocation {
                longitude: p.lon,
                latitude: p.lat,
                radius: radius_meters,
                limit: 1,
            })
            .collect(),
    }
}

#[derive(Debug, Deserialize)]
struct BulkReverseResponse {
    result: Option<Vec<BulkReverseEntry>>,
}

#[derive(Debug, Deserialize)]
struct BulkReverseEntry {
    result: Option<Vec<PostcodeHit>>,
}

#[derive(Debug, Deserialize)]
struct PostcodeHit {
    postcode: String,
}

/// Client for the postcodes.io bulk reverse-geocoding endpoint
#[derive(Clone)]
pub struct PostcodesIoClient {
    client: Client,
    endpoint: Url,
}

impl PostcodesIoClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let endpoint = Url::parse(&format!("{}/postcodes", base_url.trim_end_matches('/')))?;
        let client = Client::builder()
            .user_agent("townscope/0.1 (uk area finder)")
            .timeout(timeout)
            .build()?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl PointLookup for PostcodesIoClient {
    async fn lookup(
        &self,
        points: &[GeoPoint],
        radius_meters: f64,
    ) -> Result<Vec<Option<String>>, LookupError> {
        let body = bulk_request(points, radius_meters);

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LookupError::Status(response.status().as_u16()));
        }

        let text = response.text().await?;
        let resolved = parse_bulk_response(&text, points.len())?;

        debug!(
            "Resolved {}/{} points to postcodes",
            resolved.iter().filter(|r| r.is_some()).count(),
            points.len()
        );

        Ok(resolved)
    }
}

/// Decode a bulk reverse-geocoding body into one optional postcode per query
pub fn parse_bulk_response(body: &str, expected: usize) -> Result<Vec<Option<String>>, LookupError> {
    let data: BulkReverseResponse =
        serde_json::from_str(body).map_err(|e| LookupError::Malformed(e.to_string()))?;

    let entries = data
        .result
        .ok_or_else(|| LookupError::Malformed("missing `result` array".to_string()))?;

    if entries.len() != expected {
        return Err(LookupError::Malformed(format!(
            "expected {} results, got {}",
            expected,
            entries.len()
        )));
    }

    Ok(entries
        .into_iter()
        .map(|entry| {
            entry
                .result
                .and_then(|hits| hits.into_iter().next())
                .map(|hit| hit.postcode)
        })
        .collect())
}
