//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.seisrisk.toml` files.

use crate::catalog::RetryPolicy;
use crate::cli::OutputFormat;
use crate::error::ConfigError;
use crate::models::{BoundingBox, Feature, TimeWindow};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = ".seisrisk.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Seismic catalog settings.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Analysis settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Classifier model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Region boundary settings.
    #[serde(default)]
    pub regions: RegionsConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Report output file. Printed to stdout when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Report format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: None,
            format: OutputFormat::Markdown,
            verbose: false,
        }
    }
}

/// Remote catalog settings, including the national bounding box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// FDSN event query endpoint.
    #[serde(default = "default_catalog_url")]
    pub url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Smallest magnitude requested from the catalog.
    #[serde(default = "default_min_magnitude")]
    pub min_magnitude: f64,

    /// Retries after a transient fetch failure.
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_min_latitude")]
    pub min_latitude: f64,

    #[serde(default = "default_max_latitude")]
    pub max_latitude: f64,

    #[serde(default = "default_min_longitude")]
    pub min_longitude: f64,

    #[serde(default = "default_max_longitude")]
    pub max_longitude: f64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: default_catalog_url(),
            timeout_seconds: default_timeout(),
            min_magnitude: default_min_magnitude(),
            retries: default_retries(),
            min_latitude: default_min_latitude(),
            max_latitude: default_max_latitude(),
            min_longitude: default_min_longitude(),
            max_longitude: default_max_longitude(),
        }
    }
}

fn default_catalog_url() -> String {
    "https://earthquake.usgs.gov/fdsnws/event/1/query".to_string()
}

fn default_timeout() -> u64 {
    15
}

fn default_min_magnitude() -> f64 {
    1.0
}

fn default_retries() -> u32 {
    2
}

// Turkey
fn default_min_latitude() -> f64 {
    36.0
}

fn default_max_latitude() -> f64 {
    42.5
}

fn default_min_longitude() -> f64 {
    26.0
}

fn default_max_longitude() -> f64 {
    45.5
}

/// Analysis window, alerting and scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Length of the trailing window in days.
    #[serde(default = "default_history_days")]
    pub history_days: u32,

    /// Alert when overall risk is at or above this percentage.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,

    /// Maximum regional fetches in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Upper bound on one run; 0 disables it.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_seconds: u64,

    /// Watch mode refresh period.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,

    /// Classifier input order.
    #[serde(default = "default_features")]
    pub features: Vec<Feature>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            history_days: default_history_days(),
            alert_threshold: default_alert_threshold(),
            concurrency: default_concurrency(),
            run_timeout_seconds: default_run_timeout(),
            refresh_interval_seconds: default_refresh_interval(),
            features: default_features(),
        }
    }
}

fn default_history_days() -> u32 {
    30
}

fn default_alert_threshold() -> f64 {
    50.0
}

fn default_concurrency() -> usize {
    6
}

fn default_run_timeout() -> u64 {
    600
}

fn default_refresh_interval() -> u64 {
    600 // 10 min
}

fn default_features() -> Vec<Feature> {
    Feature::DEFAULT_ORDER.to_vec()
}

/// Classifier model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// JSON logistic model file.
    #[serde(default = "default_model_path")]
    pub path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
        }
    }
}

fn default_model_path() -> PathBuf {
    PathBuf::from("model.json")
}

/// Region boundary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionsConfig {
    /// GeoJSON boundary collection.
    #[serde(default = "default_regions_path")]
    pub path: PathBuf,

    /// Feature property holding the region name.
    #[serde(default = "default_name_property")]
    pub name_property: String,
}

impl Default for RegionsConfig {
    fn default() -> Self {
        Self {
            path: default_regions_path(),
            name_property: default_name_property(),
        }
    }
}

fn default_regions_path() -> PathBuf {
    PathBuf::from("gadm41_TUR_1.json")
}

fn default_name_property() -> String {
    "NAME_1".to_string()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// Only explicitly provided values override.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = Some(output.clone());
        }
        if let Some(format) = args.format {
            self.general.format = format;
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(ref url) = args.catalog_url {
            self.catalog.url = url.clone();
        }
        if let Some(magnitude) = args.min_magnitude {
            self.catalog.min_magnitude = magnitude;
        }

        if let Some(days) = args.days {
            self.analysis.history_days = days;
        }
        if let Some(threshold) = args.threshold {
            self.analysis.alert_threshold = threshold;
        }
        if let Some(concurrency) = args.concurrency {
            self.analysis.concurrency = concurrency;
        }
        if let Some(interval) = args.interval {
            self.analysis.refresh_interval_seconds = interval;
        }

        if let Some(ref model) = args.model {
            self.model.path = model.clone();
        }
        if let Some(ref regions) = args.regions {
            self.regions.path = regions.clone();
        }
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.national_bbox().validate()?;

        if !(0.0..=100.0).contains(&self.analysis.alert_threshold) {
            return Err(ConfigError::Invalid(format!(
                "alert_threshold must be between 0 and 100, got {}",
                self.analysis.alert_threshold
            )));
        }
        if self.analysis.history_days == 0 {
            return Err(ConfigError::Invalid(
                "history_days must be at least 1".to_string(),
            ));
        }
        TimeWindow::trailing_days(Utc::now(), self.analysis.history_days)?;
        if self.analysis.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.analysis.refresh_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "refresh_interval_seconds must be at least 1".to_string(),
            ));
        }
        if self.catalog.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "catalog timeout_seconds must be at least 1".to_string(),
            ));
        }
        if !self.catalog.url.starts_with("http://") && !self.catalog.url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "catalog url must start with 'http://' or 'https://': {}",
                self.catalog.url
            )));
        }

        Ok(())
    }

    pub fn national_bbox(&self) -> BoundingBox {
        BoundingBox {
            min_latitude: self.catalog.min_latitude,
            max_latitude: self.catalog.max_latitude,
            min_longitude: self.catalog.min_longitude,
            max_longitude: self.catalog.max_longitude,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.catalog.retries,
            ..RetryPolicy::default()
        }
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        match self.analysis.run_timeout_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
