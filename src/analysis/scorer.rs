//! Risk scoring.
//!
//! The classifier is an external collaborator behind the [`Classifier`]
//! trait. [`LogisticModel`] is the bundled implementation, loaded from a
//! JSON model file at startup.

use super::aggregator::FeatureAggregator;
use crate::error::{AnalysisError, ConfigError, ScoringError};
use crate::models::{Event, Feature, FeatureVector};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// A probabilistic binary classifier over a fixed-order feature row.
pub trait Classifier: Send + Sync {
    /// Number of inputs the classifier accepts.
    fn n_features(&self) -> usize;

    /// Feature order the classifier was trained with, if it declares one.
    fn feature_order(&self) -> Option<&[Feature]> {
        None
    }

    /// Probability of the positive ("risk") class.
    fn predict_proba(&self, row: &[f64]) -> Result<f64, ScoringError>;
}

/// Logistic regression with optional input standardization.
///
/// Model file format:
///
/// ```json
/// {
///   "features": ["mag", "depth", "nst", "gap", "dmin", "rms"],
///   "weights": [1.9, -0.02, 0.01, -0.004, -0.3, 0.2],
///   "intercept": -6.5,
///   "means": [2.1, 12.0, 18.0, 95.0, 0.6, 0.7],
///   "scales": [0.8, 9.0, 11.0, 40.0, 0.7, 0.3]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogisticModel {
    pub features: Vec<Feature>,
    pub weights: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub means: Option<Vec<f64>>,
    #[serde(default)]
    pub scales: Option<Vec<f64>>,
}

impl LogisticModel {
    /// Load and validate a model file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::MissingFile {
                what: "model",
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let model: LogisticModel =
            serde_json::from_str(&content).map_err(|e| ConfigError::Malformed {
                what: "model",
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        model.check().map_err(|message| ConfigError::Malformed {
            what: "model",
            path: path.to_path_buf(),
            message,
        })?;

        info!(
            "Loaded model from {} ({} features)",
            path.display(),
            model.features.len()
        );
        Ok(model)
    }

    fn check(&self) -> Result<(), String> {
        let n = self.features.len();
        if n == 0 {
            return Err("model declares no features".to_string());
        }
        if self.weights.len() != n {
            return Err(format!("{} weights for {} features", self.weights.len(), n));
        }
        for (name, column) in [("means", &self.means), ("scales", &self.scales)] {
            if let Some(values) = column {
                if values.len() != n {
                    return Err(format!("{} {} for {} features", values.len(), name, n));
                }
            }
        }
        if let Some(scales) = &self.scales {
            if scales.iter().any(|s| *s == 0.0 || !s.is_finite()) {
                return Err("scales must be finite and non-zero".to_string());
            }
        }
        Ok(())
    }
}

impl Classifier for LogisticModel {
    fn n_features(&self) -> usize {
        self.weights.len()
    }

    fn feature_order(&self) -> Option<&[Feature]> {
        Some(&self.features)
    }

    fn predict_proba(&self, row: &[f64]) -> Result<f64, ScoringError> {
        if row.len() != self.weights.len() {
            return Err(ScoringError::Arity {
                expected: self.weights.len(),
                actual: row.len(),
            });
        }

        let z = row
            .iter()
            .enumerate()
            .map(|(i, x)| {
                let mean = self.means.as_ref().map_or(0.0, |m| m[i]);
                let scale = self.scales.as_ref().map_or(1.0, |s| s[i]);
                self.weights[i] * (x - mean) / scale
            })
            .sum::<f64>()
            + self.intercept;

        Ok(1.0 / (1.0 + (-z).exp()))
    }
}

/// Turns events into 0-100 risk percentages.
#[derive(Clone)]
pub struct RiskScorer {
    classifier: Arc<dyn Classifier>,
    aggregator: FeatureAggregator,
}

impl RiskScorer {
    /// Pair a classifier with an aggregator, checking the feature contract.
    pub fn new(
        classifier: Arc<dyn Classifier>,
        aggregator: FeatureAggregator,
    ) -> Result<Self, ConfigError> {
        let expected = classifier.n_features();
        let actual = aggregator.order().len();
        if expected != actual {
            return Err(ConfigError::Invalid(format!(
                "classifier expects {} features but {} are configured",
                expected, actual
            )));
        }

        if let Some(trained) = classifier.feature_order() {
            if trained != aggregator.order() {
                let names = |fs: &[Feature]| {
                    fs.iter().map(Feature::key).collect::<Vec<_>>().join(",")
                };
                return Err(ConfigError::Invalid(format!(
                    "configured feature order [{}] does not match the model's [{}]",
                    names(aggregator.order()),
                    names(trained)
                )));
            }
        }

        Ok(Self {
            classifier,
            aggregator,
        })
    }

    pub fn aggregator(&self) -> &FeatureAggregator {
        &self.aggregator
    }

    /// Positive-class probability scaled to 0-100.
    pub fn score(&self, vector: &FeatureVector) -> Result<f64, ScoringError> {
        let p = self.classifier.predict_proba(vector.values())?;
        if !(0.0..=1.0).contains(&p) {
            return Err(ScoringError::InvalidProbability(p));
        }
        debug!("Classifier probability {:.4} for {:?}", p, vector.values());
        Ok(p * 100.0)
    }

    /// Aggregate and score a non-empty event list.
    pub fn score_events(&self, events: &[Event]) -> Result<f64, AnalysisError> {
        let vector = self.aggregator.aggregate(events)?;
        Ok(self.score(&vector)?)
    }

    /// Like [`score_events`](Self::score_events), but an empty list scores 0.
    pub fn score_or_zero(&self, events: &[Event]) -> Result<f64, ScoringError> {
        match self.aggregator.aggregate(events) {
            Ok(vector) => self.score(&vector),
            Err(_) => Ok(0.0),
        }
    }
}

#[cfg(test)]
pub mod testing {
    //! Deterministic classifiers for tests.

    use super::*;

    /// Always returns the same probability.
    pub struct FixedClassifier {
        pub probability: f64,
        pub arity: usize,
    }

    impl Classifier for FixedClassifier {
        fn n_features(&self) -> usize {
            self.arity
        }

        fn predict_proba(&self, row: &[f64]) -> Result<f64, ScoringError> {
            if row.len() != self.arity {
                return Err(ScoringError::Arity {
                    expected: self.arity,
                    actual: row.len(),
                });
            }
            Ok(self.probability)
        }
    }

    /// Probability equals the first feature (mean magnitude) divided by 10.
    pub struct MagnitudeClassifier;

    impl Classifier for MagnitudeClassifier {
        fn n_features(&self) -> usize {
            Feature::DEFAULT_ORDER.len()
        }

        fn predict_proba(&self, row: &[f64]) -> Result<f64, ScoringError> {
            Ok((row[0] / 10.0).clamp(0.0, 1.0))
        }
    }

    pub fn magnitude_scorer() -> Arc<RiskScorer> {
        Arc::new(
            RiskScorer::new(Arc::new(MagnitudeClassifier), FeatureAggregator::default())
                .expect("default order has six features"),
        )
    }
}
