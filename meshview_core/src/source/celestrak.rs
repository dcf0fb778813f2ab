//! CelesTrak element-set source.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, warn};

use super::{snapshot_from_tle, PositionSource, SourceError};
use crate::propagation::Propagator;
use crate::snapshot::Snapshot;

/// Fetches element sets over HTTP and propagates them to the requested instant.
///
/// Holds one HTTP client and one propagator for its whole lifetime.
pub struct CelestrakSource {
    client: reqwest::Client,
    url: String,
    max_satellites: usize,
    propagator: Propagator,
}

impl CelestrakSource {
    /// Creates a source for `url`; every HTTP request is bounded by `request_timeout`.
    pub fn new(
        url: impl Into<String>,
        max_satellites: usize,
        request_timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("meshview/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Network(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            max_satellites,
            propagator: Propagator::new(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PositionSource for CelestrakSource {
    async fn fetch(&self, instant: DateTime<Utc>) -> Result<Snapshot, SourceError> {
        debug!(url = %self.url, "fetching element sets");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Error fetching TLE data");
            return Err(SourceError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        snapshot_from_tle(&body, instant, self.max_satellites, &self.propagator)
    }

    fn label(&self) -> &str {
        "celestrak"
    }
}
