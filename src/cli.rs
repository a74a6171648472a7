//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::TimeWindow;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// SeisRisk - short-term seismic risk for a country and its regions
///
/// Pulls recent earthquakes from a live catalog, scores the nationwide
/// and per-region risk with a pretrained classifier, and writes a
/// Markdown/JSON report. Built in Rust.
///
/// Examples:
///   seisrisk
///   seisrisk --days 7 --threshold 40 --output risk.md
///   seisrisk --start 2023-02-01T00:00:00 --end 2023-02-15T00:00:00
///   seisrisk --watch --interval 300
///   seisrisk --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .seisrisk.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Window start (UTC), e.g. 2023-02-01T00:00:00 or 2023-02-01
    #[arg(long, value_name = "TIME", value_parser = parse_time, requires = "end")]
    pub start: Option<DateTime<Utc>>,

    /// Window end (UTC). Defaults to now
    #[arg(long, value_name = "TIME", value_parser = parse_time)]
    pub end: Option<DateTime<Utc>>,

    /// Trailing window length in days, ending at --end or now
    #[arg(short, long, value_name = "DAYS", conflicts_with = "start")]
    pub days: Option<u32>,

    /// Alert threshold for the overall risk (0 - 100)
    ///
    /// Exit code 2 when the overall risk is at or above it.
    #[arg(short, long, value_name = "PERCENT")]
    pub threshold: Option<f64>,

    /// Keep running and re-analyse on a fixed interval
    #[arg(short, long, conflicts_with_all = ["start", "end"])]
    pub watch: bool,

    /// Refresh interval in seconds for --watch
    #[arg(long, value_name = "SECS", requires = "watch")]
    pub interval: Option<u64>,

    /// Output file path for the report. Printed to stdout when omitted
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Seismic catalog query endpoint
    #[arg(long, value_name = "URL", env = "SEISRISK_CATALOG_URL")]
    pub catalog_url: Option<String>,

    /// Smallest magnitude requested from the catalog
    #[arg(long, value_name = "MAG")]
    pub min_magnitude: Option<f64>,

    /// Number of concurrent regional fetches
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Classifier model file (JSON)
    #[arg(short, long, value_name = "FILE", env = "SEISRISK_MODEL")]
    pub model: Option<PathBuf>,

    /// Region boundary file (GeoJSON FeatureCollection)
    #[arg(short, long, value_name = "FILE", env = "SEISRISK_REGIONS")]
    pub regions: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .seisrisk.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Parse a UTC time given as RFC 3339, `%Y-%m-%dT%H:%M:%S` or a bare date.
pub fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(t.and_utc());
    }
    if let Some(t) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(t.and_utc());
    }
    Err(format!(
        "invalid time '{}': expected YYYY-MM-DD, YYYY-MM-DDTHH:MM:SS or RFC 3339",
        s
    ))
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(threshold) = self.threshold {
            if !(0.0..=100.0).contains(&threshold) {
                return Err("Threshold must be between 0 and 100".to_string());
            }
        }

        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start >= end {
                return Err("--start must be before --end".to_string());
            }
        }

        if let Some(days) = self.days {
            if days == 0 {
                return Err("Days must be at least 1".to_string());
            }
            let end = self.end.unwrap_or_else(Utc::now);
            if let Err(e) = TimeWindow::trailing_days(end, days) {
                return Err(e.to_string());
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.interval == Some(0) {
            return Err("Interval must be at least 1 second".to_string());
        }

        if let Some(ref url) = self.catalog_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Catalog URL must start with 'http://' or 'https://'".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is `[general] verbose` from the config file.
    /// `--quiet` wins over both.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
