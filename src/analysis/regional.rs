//! Regional risk sweep.
//!
//! Every region is fetched and scored independently. A catalog failure in
//! one region marks that region unavailable and never aborts the others.

use super::scorer::RiskScorer;
use crate::catalog::{fetch_with_retry, EventSource, RetryPolicy};
use crate::error::ScoringError;
use crate::models::{Region, RegionRisk, RegionRiskMap, TimeWindow};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fans region queries out to the catalog with bounded concurrency.
#[derive(Clone)]
pub struct RegionalRiskMapper {
    source: Arc<dyn EventSource>,
    concurrency: usize,
    retry: RetryPolicy,
}

impl RegionalRiskMapper {
    pub fn new(source: Arc<dyn EventSource>, concurrency: usize, retry: RetryPolicy) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
            retry,
        }
    }

    /// Score every region for `window`.
    ///
    /// The returned map has exactly one entry per input region. Only a
    /// scoring error (a broken feature contract) fails the sweep.
    pub async fn map_risk(
        &self,
        scorer: &RiskScorer,
        regions: &[Region],
        window: &TimeWindow,
    ) -> Result<RegionRiskMap, ScoringError> {
        info!(
            "Scoring {} regions (concurrency={})",
            regions.len(),
            self.concurrency
        );

        let queries: Vec<_> = regions
            .iter()
            .map(|region| async move {
                let result =
                    fetch_with_retry(self.source.as_ref(), window, &region.bbox, self.retry).await;
                (region.name.as_str(), result)
            })
            .collect();
        let fetched: Vec<_> = stream::iter(queries)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut risks = RegionRiskMap::new();
        for (name, result) in fetched {
            let risk = match result {
                Ok(events) if events.is_empty() => RegionRisk::NoData,
                Ok(events) => {
                    let risk = scorer.score_or_zero(&events)?;
                    debug!("{}: {:.1}% from {} events", name, risk, events.len());
                    RegionRisk::Scored { risk }
                }
                Err(e) => {
                    warn!("Catalog fetch failed for region {}: {}", name, e);
                    RegionRisk::Unavailable {
                        reason: e.to_string(),
                    }
                }
            };
            risks.insert(name.to_string(), risk);
        }

        let unavailable = risks.values().filter(|r| r.is_unavailable()).count();
        if unavailable > 0 {
            warn!(
                "{} of {} regions could not be fetched and were scored 0",
                unavailable,
                regions.len()
            );
        }

        Ok(risks)
    }
}
