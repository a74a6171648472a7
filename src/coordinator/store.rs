//! Published analysis state.
//!
//! The store holds an immutable snapshot that is replaced wholesale when a
//! run completes. Readers clone the `Arc`s they need and never observe a
//! half-updated region set.

use crate::models::{AnalysisResult, Region};
use std::sync::{Arc, PoisonError, RwLock};

/// One consistent view of the published state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Region set, carrying the risk of the last successful run.
    pub regions: Arc<[Region]>,
    /// Last successful result, if any.
    pub result: Option<Arc<AnalysisResult>>,
    /// Number of results published so far.
    pub generation: u64,
}

/// Shared holder for the current [`Snapshot`].
#[derive(Debug)]
pub struct AnalysisStore {
    inner: RwLock<Snapshot>,
}

impl AnalysisStore {
    pub fn new(regions: Vec<Region>) -> Self {
        Self {
            inner: RwLock::new(Snapshot {
                regions: regions.into(),
                result: None,
                generation: 0,
            }),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn regions(&self) -> Arc<[Region]> {
        self.snapshot().regions
    }

    pub fn current(&self) -> Option<Arc<AnalysisResult>> {
        self.snapshot().result
    }

    /// Publish a result and the region set re-stamped with its risks.
    ///
    /// Returns the new generation number.
    pub fn publish(&self, result: Arc<AnalysisResult>) -> u64 {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        let regions: Arc<[Region]> = guard
            .regions
            .iter()
            .map(|region| {
                let risk = result
                    .regions
                    .get(&region.name)
                    .map_or(0.0, |r| r.value());
                region.with_risk(risk)
            })
            .collect();

        let generation = guard.generation + 1;
        *guard = Snapshot {
            regions,
            result: Some(result),
            generation,
        };
        generation
    }
}
