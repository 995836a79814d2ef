//! Grid sampling of postcodes inside drawn shapes.
//!
//! The lookup service only answers "nearest postcode to this coordinate", so
//! an area is approximated by sampling a lattice over each shape's bounding
//! box, not the exact geometry. Results can include districts just outside an
//! irregular shape and can miss sparse ones.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::grid::{grid_for_bounds, lattice_size};
use super::lookup::{LookupError, PointLookup};
use crate::models::{BoundingBox, Shape};

/// How resolved postcodes are stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostcodeFormat {
    /// District only, e.g. "SW1A"
    #[default]
    Outward,
    /// Full unit postcode, e.g. "SW1A 1AA"
    Full,
}

impl PostcodeFormat {
    pub fn normalize(&self, postcode: &str) -> Option<String> {
        let postcode = postcode.trim();
        if postcode.is_empty() {
            return None;
        }
        match self {
            PostcodeFormat::Outward => postcode.split_whitespace().next().map(str::to_string),
            PostcodeFormat::Full => Some(postcode.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Lattice spacing in degrees (about 2 km at 0.02)
    pub step_degrees: f64,
    /// Points per lookup request
    pub batch_size: usize,
    /// Search radius around each sample point
    pub radius_meters: f64,
    /// Pause between consecutive requests
    pub chunk_delay: Duration,
    /// Upper bound on a single request
    pub chunk_timeout: Duration,
    /// Areas needing more sample points than this are skipped
    pub max_points: usize,
    pub format: PostcodeFormat,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            step_degrees: 0.02,
            batch_size: 100,
            radius_meters: 1500.0,
            chunk_delay: Duration::from_millis(100),
            chunk_timeout: Duration::from_secs(10),
            max_points: 300_000,
            format: PostcodeFormat::Outward,
        }
    }
}

/// Outcome of a sampling run. Failed chunks never abort the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SampleReport {
    pub postcodes: BTreeSet<String>,
    pub points_sampled: usize,
    pub chunks_total: usize,
    pub chunks_failed: usize,
    /// Areas refused for exceeding `max_points`
    pub areas_skipped: usize,
    pub errors: Vec<String>,
}

impl SampleReport {
    pub fn has_errors(&self) -> bool {
        self.chunks_failed > 0 || self.areas_skipped > 0
    }

    /// Every request failed, so the empty set says nothing about the area
    pub fn total_failure(&self) -> bool {
        (self.chunks_total > 0 || self.areas_skipped > 0) && self.chunks_failed == self.chunks_total
    }

    /// Message for the user when the result is partial or empty for lack of data
    pub fn warning(&self) -> Option<String> {
        if self.total_failure() {
            return Some(format!(
                "No lookup succeeded, the postcode list is empty: {}",
                self.errors.join("; ")
            ));
        }
        if !self.has_errors() {
            return None;
        }
        let mut parts = Vec::new();
        if self.chunks_failed > 0 {
            parts.push(format!("{} of {} lookup requests failed", self.chunks_failed, self.chunks_total));
        }
        if self.areas_skipped > 0 {
            parts.push(format!("{} areas were too large to sample", self.areas_skipped));
        }
        Some(format!("{}; results are partial", parts.join(", ")))
    }

    pub fn merge(&mut self, other: SampleReport) {
        self.postcodes.extend(other.postcodes);
        self.points_sampled += other.points_sampled;
        self.chunks_total += other.chunks_total;
        self.chunks_failed += other.chunks_failed;
        self.areas_skipped += other.areas_skipped;
        self.errors.extend(other.errors);
    }
}

/// Samples areas against a [`PointLookup`], one request at a time
pub struct PostcodeSampler<L> {
    lookup: L,
    config: SamplerConfig,
}

impl<L: PointLookup> PostcodeSampler<L> {
    pub fn new(lookup: L, config: SamplerConfig) -> Self {
        Self { lookup, config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Sample a single bounding box
    pub async fn sample_area(&self, bbox: &BoundingBox) -> SampleReport {
        let mut report = SampleReport::default();
        self.sample_into(bbox, &mut report).await;
        report
    }

    /// Sample each shape's bounding box independently and union the results
    pub async fn sample_shapes(&self, shapes: &[Shape]) -> SampleReport {
        let mut report = SampleReport::default();

        for shape in shapes {
            match shape.bounding_box() {
                Some(bbox) => self.sample_into(&bbox, &mut report).await,
                None => debug!("Skipping {} without a bounding box", shape.kind()),
            }
        }

        info!(
            "Sampled {} points in {} chunks ({} failed): {} postcodes",
            report.points_sampled,
            report.chunks_total,
            report.chunks_failed,
            report.postcodes.len()
        );

        report
    }

    async fn sample_into(&self, bbox: &BoundingBox, report: &mut SampleReport) {
        let needed = lattice_size(bbox, self.config.step_degrees);
        if needed > self.config.max_points {
            warn!(
                "Skipping area needing {} sample points (limit {})",
                needed, self.config.max_points
            );
            report.areas_skipped += 1;
            report.errors.push(format!(
                "area needs {} sample points, limit is {}",
                needed, self.config.max_points
            ));
            return;
        }

        let points = grid_for_bounds(bbox, self.config.step_degrees);
        let batch_size = self.config.batch_size.max(1);

        debug!(
            "Sampling {} grid points in chunks of {}",
            points.len(),
            batch_size
        );
        report.points_sampled += points.len();

        for chunk in points.chunks(batch_size) {
            // Rate limit between requests, including across shapes
            if report.chunks_total > 0 && !self.config.chunk_delay.is_zero() {
                tokio::time::sleep(self.config.chunk_delay).await;
            }
            report.chunks_total += 1;

            let result = match tokio::time::timeout(
                self.config.chunk_timeout,
                self.lookup.lookup(chunk, self.config.radius_meters),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(LookupError::Timeout(self.config.chunk_timeout)),
            };

            match result {
                Ok(resolved) => {
                    for postcode in resolved.into_iter().flatten() {
                        if let Some(code) = self.config.format.normalize(&postcode) {
                            report.postcodes.insert(code);
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "Postcode lookup failed for chunk {} ({} points): {}",
                        report.chunks_total,
                        chunk.len(),
                        e
                    );
                    report.chunks_failed += 1;
                    report.errors.push(e.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeoPoint;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Answers from a closure; calls listed in `fail_calls` return HTTP 503
    struct ScriptedLookup<F> {
        resolve: F,
        fail_calls: Vec<usize>,
        stall: Option<Duration>,
        calls: Mutex<Vec<Vec<GeoPoint>>>,
        call_times: Mutex<Vec<tokio::time::Instant>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl<F> ScriptedLookup<F>
    where
        F: Fn(&GeoPoint) -> Option<String> + Send + Sync,
    {
        fn new(resolve: F) -> Self {
            Self {
                resolve,
                fail_calls: Vec::new(),
                stall: None,
                calls: Mutex::new(Vec::new()),
                call_times: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn failing(mut self, calls: &[usize]) -> Self {
            self.fail_calls = calls.to_vec();
            self
        }

        fn stalling(mut self, stall: Duration) -> Self {
            self.stall = Some(stall);
            self
        }

        fn calls(&self) -> Vec<Vec<GeoPoint>> {
            self.calls.lock().unwrap().clone()
        }

        fn call_times(&self) -> Vec<tokio::time::Instant> {
            self.call_times.lock().unwrap().clone()
        }
    }

    impl<F> PointLookup for ScriptedLookup<F>
    where
        F: Fn(&GeoPoint) -> Option<String> + Send + Sync,
    {
        async fn lookup(
            &self,
            points: &[GeoPoint],
            _radius_meters: f64,
        ) -> Result<Vec<Option<String>>, LookupError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            self.call_times.lock().unwrap().push(tokio::time::Instant::now());
            let call = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(points.to_vec());
                calls.len() - 1
            };

            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_calls.contains(&call) {
                return Err(LookupError::Status(503));
            }
            Ok(points.iter().map(|p| (self.resolve)(p)).collect())
        }
    }

    fn fast_config(batch_size: usize) -> SamplerConfig {
        SamplerConfig {
            batch_size,
            chunk_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    fn small_box() -> BoundingBox {
        // 3x3 lattice at the default step
        BoundingBox::new(0.0, 0.0, 0.05, 0.05)
    }

    /// Distinct postcode per lattice row
    fn by_row(p: &GeoPoint) -> Option<String> {
        Some(format!("R{} {}AA", (p.lat * 50.0).round() as i64, (p.lon * 50.0).round() as i64))
    }

    #[test]
    fn test_normalize_formats() {
        assert_eq!(PostcodeFormat::Outward.normalize("SW1A 1AA"), Some("SW1A".to_string()));
        assert_eq!(PostcodeFormat::Full.normalize(" SW1A 1AA "), Some("SW1A 1AA".to_string()));
        assert_eq!(PostcodeFormat::Outward.normalize("  "), None);
    }

    #[tokio::test]
    async fn test_duplicates_collapse() {
        let lookup = ScriptedLookup::new(|_: &GeoPoint| Some("NG1 5FS".to_string()));
        let sampler = PostcodeSampler::new(lookup, fast_config(100));

        let report = sampler.sample_area(&small_box()).await;
        assert_eq!(report.points_sampled, 9);
        assert_eq!(report.postcodes.len(), 1);
        assert!(report.postcodes.contains("NG1"));
        assert!(!report.has_errors());
    }

    #[tokio::test]
    async fn test_full_format_keeps_unit() {
        let lookup = ScriptedLookup::new(|_: &GeoPoint| Some("NG1 5FS".to_string()));
        let config = SamplerConfig {
            format: PostcodeFormat::Full,
            ..fast_config(100)
        };
        let report = PostcodeSampler::new(lookup, config).sample_area(&small_box()).await;
        assert_eq!(report.postcodes.into_iter().collect::<Vec<_>>(), vec!["NG1 5FS"]);
    }

    #[tokio::test]
    async fn test_chunks_are_ordered_and_bounded() {
        let sampler = PostcodeSampler::new(ScriptedLookup::new(by_row), fast_config(4));
        let report = sampler.sample_area(&small_box()).await;

        let calls = sampler.lookup.calls();
        let sizes: Vec<usize> = calls.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 4, 1]);
        assert_eq!(report.chunks_total, 3);
        assert_eq!(calls[0][0], GeoPoint::new(0.0, 0.0));
        assert_eq!(sampler.lookup.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_other_chunks() {
        let lookup = ScriptedLookup::new(by_row).failing(&[1]);
        let sampler = PostcodeSampler::new(lookup, fast_config(3));

        let report = sampler.sample_area(&small_box()).await;
        assert_eq!(report.chunks_total, 3);
        assert_eq!(report.chunks_failed, 1);
        assert!(report.has_errors());
        assert!(!report.total_failure());
        assert_eq!(report.errors.len(), 1);

        // Rows 0 and 2 survive, row 1 was lost with the failed chunk
        assert!(report.postcodes.contains("R0"));
        assert!(report.postcodes.contains("R2"));
        assert!(!report.postcodes.contains("R1"));
    }

    #[tokio::test]
    async fn test_total_failure_returns_empty_set() {
        let lookup = ScriptedLookup::new(by_row).failing(&[0, 1, 2]);
        let sampler = PostcodeSampler::new(lookup, fast_config(3));

        let report = sampler.sample_area(&small_box()).await;
        assert!(report.postcodes.is_empty());
        assert!(report.total_failure());
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failed_chunk() {
        let lookup = ScriptedLookup::new(by_row).stalling(Duration::from_secs(5));
        let config = SamplerConfig {
            chunk_timeout: Duration::from_millis(20),
            ..fast_config(100)
        };
        let report = PostcodeSampler::new(lookup, config).sample_area(&small_box()).await;

        assert!(report.total_failure());
        assert!(report.errors[0].contains("timed out"));
    }

    #[tokio::test]
    async fn test_shapes_sampled_independently_and_unioned() {
        let shapes = vec![
            Shape::rectangle(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.05, 0.05)),
            Shape::rectangle(GeoPoint::new(0.04, 0.0), GeoPoint::new(0.09, 0.05)),
        ];
        let sampler = PostcodeSampler::new(ScriptedLookup::new(by_row), fast_config(100));

        let report = sampler.sample_shapes(&shapes).await;
        assert_eq!(report.chunks_total, 2);
        assert_eq!(report.points_sampled, 18);
        // Rows from both boxes, the shared row counted once
        let rows: Vec<&str> = report.postcodes.iter().map(String::as_str).collect();
        assert_eq!(rows, vec!["R0", "R1", "R2", "R3", "R4"]);
    }

    #[tokio::test]
    async fn test_polygon_samples_whole_bounding_box() {
        // Triangle whose bounding box corner (0.04, 0.04) lies outside it
        let triangle = Shape::polygon(vec![
            GeoPoint::new(0.0, 0.0),
            GeoPoint::new(0.0, 0.05),
            GeoPoint::new(0.05, 0.0),
        ]);
        let sampler = PostcodeSampler::new(ScriptedLookup::new(by_row), fast_config(100));
        sampler.sample_shapes(&[triangle]).await;

        let sampled: Vec<GeoPoint> = sampler.lookup.calls().concat();
        assert_eq!(sampled.len(), 9);
        assert!(sampled.iter().any(|p| (p.lat - 0.04).abs() < 1e-9 && (p.lon - 0.04).abs() < 1e-9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_chunks_only() {
        let config = SamplerConfig {
            batch_size: 3,
            ..Default::default()
        };
        let delay = config.chunk_delay;
        let sampler = PostcodeSampler::new(ScriptedLookup::new(by_row), config);

        let start = tokio::time::Instant::now();
        let report = sampler.sample_area(&small_box()).await;
        assert_eq!(report.chunks_total, 3);

        let times = sampler.lookup.call_times();
        assert_eq!(times.len(), 3);
        assert_eq!(times[0], start);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= delay);
        }
        assert!(start.elapsed() >= delay * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_applies_across_shapes() {
        let shapes = vec![
            Shape::rectangle(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.05, 0.05)),
            Shape::rectangle(GeoPoint::new(0.1, 0.0), GeoPoint::new(0.15, 0.05)),
        ];
        let sampler = PostcodeSampler::new(ScriptedLookup::new(by_row), SamplerConfig::default());
        sampler.sample_shapes(&shapes).await;

        let times = sampler.lookup.call_times();
        assert_eq!(times.len(), 2);
        assert!(times[1] - times[0] >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_oversized_area_is_skipped() {
        let shapes = vec![
            Shape::rectangle(GeoPoint::new(0.0, 0.0), GeoPoint::new(0.05, 0.05)),
            Shape::rectangle(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 1.0)),
        ];
        let config = SamplerConfig {
            max_points: 100,
            ..fast_config(100)
        };
        let sampler = PostcodeSampler::new(ScriptedLookup::new(by_row), config);

        let report = sampler.sample_shapes(&shapes).await;
        assert_eq!(report.areas_skipped, 1);
        assert_eq!(report.points_sampled, 9);
        assert_eq!(sampler.lookup.calls().len(), 1);
        assert!(report.has_errors());
        assert!(!report.total_failure());
        assert!(report.errors[0].contains("limit is 100"));

        let only_huge = sampler.sample_shapes(&shapes[1..]).await;
        assert!(only_huge.total_failure());
        assert!(only_huge.postcodes.is_empty());
    }

    #[test]
    fn test_report_warnings() {
        assert_eq!(SampleReport::default().warning(), None);

        let partial = SampleReport {
            chunks_total: 4,
            chunks_failed: 1,
            areas_skipped: 1,
            ..Default::default()
        };
        assert_eq!(
            partial.warning().as_deref(),
            Some("1 of 4 lookup requests failed, 1 areas were too large to sample; results are partial")
        );

        let failed = SampleReport {
            chunks_total: 2,
            chunks_failed: 2,
            errors: vec!["chunk 1: timed out".to_string()],
            ..Default::default()
        };
        let message = failed.warning().unwrap();
        assert!(message.starts_with("No lookup succeeded"));
        assert!(message.contains("chunk 1: timed out"));
    }

    #[tokio::test]
    async fn test_missing_postcodes_ignored() {
        let lookup = ScriptedLookup::new(|p: &GeoPoint| (p.lat == 0.0).then(|| "TR21 0HE".to_string()));
        let report = PostcodeSampler::new(lookup, fast_config(100))
            .sample_area(&small_box())
            .await;
        assert_eq!(report.postcodes.len(), 1);
        assert!(!report.has_errors());
    }
}
