//! Data models for the risk pipeline.
//!
//! This module contains the core data structures shared by the fetcher,
//! the scorer, the regional mapper and the report generator.

use crate::error::ConfigError;
use chrono::{DateTime, Duration, Utc};
use geo::{BoundingRect, MultiPolygon, Rect};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One seismic reading parsed from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Catalog identifier, if the record carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Origin time.
    pub time: DateTime<Utc>,
    /// Magnitude.
    pub magnitude: f64,
    /// Hypocenter depth in kilometres.
    pub depth_km: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// Number of seismic stations used to locate the event.
    pub station_count: u32,
    /// Largest azimuthal gap between stations, in degrees.
    pub gap: f64,
    /// Horizontal distance to the nearest station, in degrees.
    pub min_distance: f64,
    /// RMS travel-time residual, in seconds.
    pub rms: f64,
    /// Human-readable location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
}

/// Geographic bounding box in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    /// Check that the box is well formed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let lat_ok = (-90.0..=90.0).contains(&self.min_latitude)
            && (-90.0..=90.0).contains(&self.max_latitude)
            && self.min_latitude < self.max_latitude;
        let lon_ok = (-180.0..=180.0).contains(&self.min_longitude)
            && (-180.0..=180.0).contains(&self.max_longitude)
            && self.min_longitude < self.max_longitude;

        if lat_ok && lon_ok {
            Ok(())
        } else {
            Err(ConfigError::Invalid(format!(
                "bounding box is not well formed: {}",
                self
            )))
        }
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        Self {
            min_latitude: rect.min().y,
            max_latitude: rect.max().y,
            min_longitude: rect.min().x,
            max_longitude: rect.max().x,
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lat {:.3}..{:.3}, lon {:.3}..{:.3}",
            self.min_latitude, self.max_latitude, self.min_longitude, self.max_longitude
        )
    }
}

/// Half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ConfigError> {
        if start >= end {
            return Err(ConfigError::Invalid(format!(
                "time window start {} is not before end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// The `days` days leading up to `end`.
    pub fn trailing_days(end: DateTime<Utc>, days: u32) -> Result<Self, ConfigError> {
        let start = Duration::try_days(i64::from(days))
            .and_then(|span| end.checked_sub_signed(span))
            .ok_or_else(|| {
                ConfigError::Invalid(format!("{} days is outside the supported time range", days))
            })?;
        Self::new(start, end)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.format("%Y-%m-%dT%H:%M:%SZ"),
            self.end.format("%Y-%m-%dT%H:%M:%SZ")
        )
    }
}

/// An administrative region: a named boundary with a derived bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub name: String,
    pub boundary: MultiPolygon<f64>,
    pub bbox: BoundingBox,
    /// Last published risk, 0-100. `None` until the first run completes.
    pub risk: Option<f64>,
}

impl Region {
    /// Build a region, deriving its bounding box from the boundary.
    ///
    /// Returns `None` when the boundary has no points.
    pub fn new(name: impl Into<String>, boundary: MultiPolygon<f64>) -> Option<Self> {
        let bbox = boundary.bounding_rect()?.into();
        Some(Self {
            name: name.into(),
            boundary,
            bbox,
            risk: None,
        })
    }

    /// Copy of this region carrying a new risk value.
    pub fn with_risk(&self, risk: f64) -> Self {
        Self {
            risk: Some(risk.clamp(0.0, 100.0)),
            ..self.clone()
        }
    }
}

/// One named input of the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    #[serde(rename = "mag")]
    Magnitude,
    #[serde(rename = "depth")]
    Depth,
    #[serde(rename = "nst")]
    StationCount,
    #[serde(rename = "gap")]
    Gap,
    #[serde(rename = "dmin")]
    MinDistance,
    #[serde(rename = "rms")]
    Rms,
}

impl Feature {
    /// The order the bundled model was trained with.
    pub const DEFAULT_ORDER: [Feature; 6] = [
        Feature::Magnitude,
        Feature::Depth,
        Feature::StationCount,
        Feature::Gap,
        Feature::MinDistance,
        Feature::Rms,
    ];

    /// Catalog field name.
    pub fn key(&self) -> &'static str {
        match self {
            Feature::Magnitude => "mag",
            Feature::Depth => "depth",
            Feature::StationCount => "nst",
            Feature::Gap => "gap",
            Feature::MinDistance => "dmin",
            Feature::Rms => "rms",
        }
    }

    /// Read this feature's value from an event.
    pub fn extract(&self, event: &Event) -> f64 {
        match self {
            Feature::Magnitude => event.magnitude,
            Feature::Depth => event.depth_km,
            Feature::StationCount => f64::from(event.station_count),
            Feature::Gap => event.gap,
            Feature::MinDistance => event.min_distance,
            Feature::Rms => event.rms,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Feature {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mag" | "magnitude" => Ok(Feature::Magnitude),
            "depth" | "depth_km" => Ok(Feature::Depth),
            "nst" => Ok(Feature::StationCount),
            "gap" => Ok(Feature::Gap),
            "dmin" => Ok(Feature::MinDistance),
            "rms" => Ok(Feature::Rms),
            other => Err(ConfigError::Invalid(format!("unknown feature '{}'", other))),
        }
    }
}

/// Fixed-order numeric summary of an event list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    features: Vec<Feature>,
    values: Vec<f64>,
}

impl FeatureVector {
    pub(crate) fn new(features: Vec<Feature>, values: Vec<f64>) -> Self {
        debug_assert_eq!(features.len(), values.len());
        Self { features, values }
    }

    /// Values in classifier order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Value of a named feature, if it is part of this vector.
    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.features
            .iter()
            .position(|f| *f == feature)
            .map(|i| self.values[i])
    }
}

/// Outcome of scoring a single region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegionRisk {
    /// Events were found and scored.
    Scored { risk: f64 },
    /// The catalog had no events for this region in the window.
    NoData,
    /// The catalog could not be queried for this region.
    Unavailable { reason: String },
}

impl RegionRisk {
    /// Numeric risk; regions without data count as 0.
    pub fn value(&self) -> f64 {
        match self {
            RegionRisk::Scored { risk } => *risk,
            RegionRisk::NoData | RegionRisk::Unavailable { .. } => 0.0,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, RegionRisk::Unavailable { .. })
    }
}

impl fmt::Display for RegionRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionRisk::Scored { risk } => write!(f, "{:.1}%", risk),
            RegionRisk::NoData => write!(f, "0.0% (no events)"),
            RegionRisk::Unavailable { .. } => write!(f, "0.0% (unavailable)"),
        }
    }
}

/// Region name to risk outcome.
pub type RegionRiskMap = BTreeMap<String, RegionRisk>;

/// The complete output of one successful analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Nationwide risk, 0-100.
    pub overall_risk: f64,
    /// Threshold the run was requested with.
    pub alert_threshold: f64,
    /// `overall_risk >= alert_threshold`.
    pub alert: bool,
    /// Analysed window.
    pub window: TimeWindow,
    /// Nationwide events, oldest first.
    pub events: Vec<Event>,
    /// Risk per region; keys match the region set exactly.
    pub regions: RegionRiskMap,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl AnalysisResult {
    /// Regions ordered from highest to lowest risk, ties by name.
    pub fn regions_by_risk(&self) -> Vec<(&str, &RegionRisk)> {
        let mut regions: Vec<_> = self
            .regions
            .iter()
            .map(|(name, risk)| (name.as_str(), risk))
            .collect();
        regions.sort_by(|a, b| {
            b.1.value()
                .partial_cmp(&a.1.value())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });
        regions
    }

    /// Regions at or above the alert threshold.
    pub fn regions_above_threshold(&self) -> Vec<&str> {
        self.regions_by_risk()
            .into_iter()
            .filter(|(_, risk)| risk.value() >= self.alert_threshold)
            .map(|(name, _)| name)
            .collect()
    }

    /// Number of regions whose fetch failed.
    pub fn unavailable_count(&self) -> usize {
        self.regions.values().filter(|r| r.is_unavailable()).count()
    }
}
