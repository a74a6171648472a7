//! HTTP client for the FDSN event web service.

use super::parser::parse_events;
use super::EventSource;
use crate::config::CatalogConfig;
use crate::error::{ConfigError, FetchError};
use crate::models::{BoundingBox, Event, TimeWindow};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Queries a remote seismic catalog over HTTP.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    url: String,
    min_magnitude: f64,
    timeout_seconds: u64,
}

impl CatalogClient {
    /// Build a client from the catalog settings.
    pub fn new(config: &CatalogConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("seisrisk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: config.url.clone(),
            min_magnitude: config.min_magnitude,
            timeout_seconds: config.timeout_seconds,
        })
    }

    /// Query parameters for one catalog request.
    pub fn query_params(&self, window: &TimeWindow, bbox: &BoundingBox) -> Vec<(&'static str, String)> {
        vec![
            ("format", "geojson".to_string()),
            ("starttime", window.start.format(TIME_FORMAT).to_string()),
            ("endtime", window.end.format(TIME_FORMAT).to_string()),
            ("minmagnitude", self.min_magnitude.to_string()),
            ("minlatitude", bbox.min_latitude.to_string()),
            ("maxlatitude", bbox.max_latitude.to_string()),
            ("minlongitude", bbox.min_longitude.to_string()),
            ("maxlongitude", bbox.max_longitude.to_string()),
            ("orderby", "time-asc".to_string()),
        ]
    }
}

#[async_trait]
impl EventSource for CatalogClient {
    async fn fetch(&self, window: &TimeWindow, bbox: &BoundingBox) -> Result<Vec<Event>, FetchError> {
        debug!("Querying catalog for {} ({})", bbox, window);

        let response = self
            .http
            .get(&self.url)
            .query(&self.query_params(window, bbox))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    debug!("Catalog request timed out after {}s", self.timeout_seconds);
                }
                FetchError::Transport(e)
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status,
                body: body.chars().take(200).collect(),
            });
        }

        let body = response.text().await?;
        let events = parse_events(&body)?;
        debug!("Catalog returned {} events for {}", events.len(), bbox);

        Ok(events)
    }
}
