//! Seismic catalog access.
//!
//! [`EventSource`] is the seam between the pipeline and the remote
//! catalog; [`CatalogClient`] is the HTTP implementation.

pub mod client;
pub mod parser;
pub mod retry;

use crate::error::FetchError;
use crate::models::{BoundingBox, Event, TimeWindow};
use async_trait::async_trait;

pub use client::CatalogClient;
pub use retry::{fetch_with_retry, RetryPolicy};

/// Anything that can list events in a window and bounding box.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch events in `window` inside `bbox`. One attempt, no retries.
    async fn fetch(&self, window: &TimeWindow, bbox: &BoundingBox) -> Result<Vec<Event>, FetchError>;
}
