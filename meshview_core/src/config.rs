//! Runtime configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::metric::{DistanceMetric, Threshold};
use crate::proximity::{GraphError, IndexStrategy, ProximityGraphBuilder};
use crate::runtime::RefreshSettings;
use crate::source::CELESTRAK_ACTIVE_URL;

/// Default link threshold for the haversine metric (km)
pub const DEFAULT_THRESHOLD_KM: f64 = 1500.0;
/// Default link threshold for the planar metric (degrees)
pub const DEFAULT_THRESHOLD_DEG: f64 = 15.0;

/// A configuration value that cannot be used.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// Name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            ConfigError::Invalid { field, .. } => field,
            ConfigError::Graph(_) => "threshold",
        }
    }
}

/// Configuration for the mesh refresh pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Seconds between refresh ticks (default: 10)
    pub refresh_interval_secs: u64,

    /// Seconds before a fetch is abandoned (default: 8)
    pub fetch_timeout_secs: u64,

    /// Snapshot size cap (default: 300)
    pub max_satellites: usize,

    /// Distance metric (default: haversine)
    pub metric: DistanceMetric,

    /// Link threshold tagged with its unit, which must match the metric;
    /// `None` picks the metric default
    pub threshold: Option<Threshold>,

    /// Candidate enumeration (default: all_pairs)
    pub index: IndexStrategy,

    /// Element-set URL (default: CelesTrak active group)
    pub source_url: String,

    /// GeoJSON output file; nothing is written when unset
    pub output_path: Option<PathBuf>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 10,
            fetch_timeout_secs: 8,
            max_satellites: 300,
            metric: DistanceMetric::Haversine,
            threshold: None,
            index: IndexStrategy::AllPairs,
            source_url: CELESTRAK_ACTIVE_URL.to_string(),
            output_path: None,
        }
    }
}

impl MeshConfig {
    /// Configured threshold, or the metric's default.
    pub fn threshold(&self) -> Threshold {
        self.threshold.unwrap_or(match self.metric {
            DistanceMetric::Planar => Threshold::Degrees(DEFAULT_THRESHOLD_DEG),
            DistanceMetric::Haversine => Threshold::Kilometers(DEFAULT_THRESHOLD_KM),
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Checks every field, reporting the first one that is unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::invalid("refresh_interval_secs", "must be > 0"));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::invalid("fetch_timeout_secs", "must be > 0"));
        }
        if self.fetch_timeout_secs > self.refresh_interval_secs {
            return Err(ConfigError::invalid(
                "fetch_timeout_secs",
                format!(
                    "{}s exceeds the {}s refresh interval",
                    self.fetch_timeout_secs, self.refresh_interval_secs
                ),
            ));
        }
        if self.max_satellites == 0 {
            return Err(ConfigError::invalid("max_satellites", "must be > 0"));
        }

        let threshold = self.threshold();
        if !threshold.value().is_finite() || threshold.value() <= 0.0 {
            return Err(ConfigError::invalid("threshold", format!("{} must be > 0", threshold)));
        }
        ProximityGraphBuilder::new(self.metric, threshold)?;

        if !self.source_url.starts_with("http://") && !self.source_url.starts_with("https://") {
            return Err(ConfigError::invalid(
                "source_url",
                format!("{} is not an http(s) URL", self.source_url),
            ));
        }
        Ok(())
    }

    /// Graph builder for the configured metric, threshold and index.
    pub fn graph_builder(&self) -> Result<ProximityGraphBuilder, ConfigError> {
        Ok(ProximityGraphBuilder::new(self.metric, self.threshold())?.with_strategy(self.index))
    }

    pub fn refresh_settings(&self) -> RefreshSettings {
        RefreshSettings {
            interval: self.refresh_interval(),
            fetch_timeout: self.fetch_timeout(),
            max_satellites: self.max_satellites,
        }
    }
}
