use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::customers::CostTiers;
use crate::models::{BoundingBox, UK_BOUNDS};
use crate::postcodes::{PostcodeFormat, SamplerConfig, POSTCODES_IO_URL};

/// Runtime configuration. Every section and field is optional.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub lookup: LookupConfig,
    pub sampler: SamplerSection,
    pub catalog: CatalogConfig,
    pub costs: CostTiers,
    pub region: RegionConfig,
    pub server: ServerConfig,
}

/// Drawing limits
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RegionConfig {
    /// Shapes must fit inside this box
    pub bounds: BoundingBox,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self { bounds: UK_BOUNDS }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Sessions untouched for this long are dropped
    pub session_idle_secs: u64,
    /// How often idle sessions are swept
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            session_idle_secs: 3600,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LookupConfig {
    pub base_url: String,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: POSTCODES_IO_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SamplerSection {
    pub step_degrees: f64,
    pub batch_size: usize,
    pub radius_meters: f64,
    pub delay_ms: u64,
    pub timeout_ms: u64,
    pub max_points: usize,
    pub format: PostcodeFormat,
}

impl Default for SamplerSection {
    fn default() -> Self {
        let defaults = SamplerConfig::default();
        Self {
            step_degrees: defaults.step_degrees,
            batch_size: defaults.batch_size,
            radius_meters: defaults.radius_meters,
            delay_ms: defaults.chunk_delay.as_millis() as u64,
            timeout_ms: defaults.chunk_timeout.as_millis() as u64,
            max_points: defaults.max_points,
            format: defaults.format,
        }
    }
}

impl SamplerSection {
    pub fn to_sampler_config(&self) -> Result<SamplerConfig> {
        anyhow::ensure!(self.step_degrees > 0.0, "sampler.step_degrees must be positive");
        anyhow::ensure!(self.batch_size > 0, "sampler.batch_size must be at least 1");

        Ok(SamplerConfig {
            step_degrees: self.step_degrees,
            batch_size: self.batch_size,
            radius_meters: self.radius_meters,
            chunk_delay: Duration::from_millis(self.delay_ms),
            chunk_timeout: Duration::from_millis(self.timeout_ms),
            max_points: self.max_points,
            format: self.format,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CatalogConfig {
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/uk_places.csv"),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Load `path` if given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.lookup.base_url, POSTCODES_IO_URL);
        assert_eq!(config.catalog.path, PathBuf::from("data/uk_places.csv"));

        let sampler = config.sampler.to_sampler_config().unwrap();
        assert_eq!(sampler.batch_size, 100);
        assert_eq!(sampler.chunk_delay, Duration::from_millis(100));
        assert_eq!(sampler.chunk_timeout, Duration::from_secs(10));
        assert_eq!(config.costs, CostTiers::default());
        assert_eq!(config.region.bounds, UK_BOUNDS);
        assert_eq!(sampler.max_points, 300_000);
    }

    #[test]
    fn test_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[sampler]
batch_size = 50
format = "full"

[costs.major]
ald = 400
adspend = 4000

[costs.large]
ald = 300

[region.bounds]
south = 50.0
west = -6.0
north = 56.0
east = 2.0
"#
        )
        .unwrap();

        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.sampler.batch_size, 50);
        assert_eq!(config.sampler.format, PostcodeFormat::Full);
        assert_eq!(config.sampler.step_degrees, 0.02);
        assert_eq!(config.costs.major.adspend, 4000);
        assert_eq!(config.costs.small.ald, 0);
        assert_eq!(config.costs.large.ald, 300);
        assert_eq!(config.costs.large.adspend, 0);
        assert_eq!(config.region.bounds, BoundingBox::new(50.0, -6.0, 56.0, 2.0));
        assert_eq!(config.server.session_idle_secs, 3600);
    }

    #[test]
    fn test_invalid_sampler_rejected() {
        let section = SamplerSection {
            batch_size: 0,
            ..Default::default()
        };
        assert!(section.to_sampler_config().is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Config::load_from_file("/nonexistent/townscope.toml").is_err());
    }
}
