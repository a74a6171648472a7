//! Feature aggregation and event statistics.
//!
//! This module reduces a variable-length event list into the fixed-order
//! feature vector the classifier was trained on, and computes the summary
//! statistics shown in reports.

use crate::error::{ConfigError, EmptyInputError};
use crate::models::{Event, Feature, FeatureVector};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Averages event fields into a feature vector.
///
/// The feature order is an external contract with the trained model and is
/// set per deployment from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureAggregator {
    order: Vec<Feature>,
}

impl Default for FeatureAggregator {
    fn default() -> Self {
        Self {
            order: Feature::DEFAULT_ORDER.to_vec(),
        }
    }
}

impl FeatureAggregator {
    /// Create an aggregator for the given feature order.
    pub fn new(order: Vec<Feature>) -> Result<Self, ConfigError> {
        if order.is_empty() {
            return Err(ConfigError::Invalid(
                "feature list must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = order.iter().find(|f| !seen.insert(**f)) {
            return Err(ConfigError::Invalid(format!(
                "feature '{}' is listed more than once",
                dup
            )));
        }

        Ok(Self { order })
    }

    /// The configured feature order.
    pub fn order(&self) -> &[Feature] {
        &self.order
    }

    /// Mean of each configured field across `events`.
    pub fn aggregate(&self, events: &[Event]) -> Result<FeatureVector, EmptyInputError> {
        if events.is_empty() {
            return Err(EmptyInputError);
        }

        let n = events.len() as f64;
        let values = self
            .order
            .iter()
            .map(|feature| events.iter().map(|e| feature.extract(e)).sum::<f64>() / n)
            .collect();

        Ok(FeatureVector::new(self.order.clone(), values))
    }
}

/// Summary statistics of an event list.
#[derive(Debug, Clone, PartialEq)]
pub struct EventStats {
    pub count: usize,
    pub max_magnitude: f64,
    pub mean_magnitude: f64,
    pub mean_depth_km: f64,
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
}

/// Compute summary statistics, or `None` for an empty list.
pub fn event_stats(events: &[Event]) -> Option<EventStats> {
    let first = events.first()?;
    let n = events.len() as f64;

    let mut stats = EventStats {
        count: events.len(),
        max_magnitude: first.magnitude,
        mean_magnitude: 0.0,
        mean_depth_km: 0.0,
        first: first.time,
        last: first.time,
    };

    for event in events {
        stats.max_magnitude = stats.max_magnitude.max(event.magnitude);
        stats.mean_magnitude += event.magnitude / n;
        stats.mean_depth_km += event.depth_km / n;
        stats.first = stats.first.min(event.time);
        stats.last = stats.last.max(event.time);
    }

    Some(stats)
}

/// Count events per whole-magnitude band, e.g. `(4, 12)` for 4.0 <= M < 5.0.
pub fn magnitude_distribution(events: &[Event]) -> Vec<(i32, usize)> {
    let mut bands: std::collections::BTreeMap<i32, usize> = std::collections::BTreeMap::new();

    for event in events {
        *bands.entry(event.magnitude.floor() as i32).or_default() += 1;
    }

    bands.into_iter().collect()
}

/// The `n` strongest events, strongest first.
pub fn strongest_events(events: &[Event], n: usize) -> Vec<&Event> {
    let mut sorted: Vec<&Event> = events.iter().collect();
    sorted.sort_by(|a, b| {
        b.magnitude
            .partial_cmp(&a.magnitude)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted.truncate(n);
    sorted
}
