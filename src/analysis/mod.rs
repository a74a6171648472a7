//! Risk analysis.
//!
//! Aggregation turns event lists into feature vectors, the scorer turns
//! feature vectors into risk percentages, and the regional mapper repeats
//! both for every administrative region.

pub mod aggregator;
pub mod regional;
pub mod scorer;

pub use aggregator::*;
pub use regional::RegionalRiskMapper;
pub use scorer::{Classifier, LogisticModel, RiskScorer};
