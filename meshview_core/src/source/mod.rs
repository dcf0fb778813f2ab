//! Position sources: where each refresh pass gets its snapshot.
//!
//! Sources are constructed once and reused every tick. A source reports
//! whole-batch failures as [`SourceError`]; individual bad entries are skipped
//! and counted in [`Snapshot::skipped`] instead (partial success is success).

#[cfg(feature = "celestrak")]
mod celestrak;

#[cfg(feature = "celestrak")]
pub use celestrak::CelestrakSource;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::propagation::Propagator;
use crate::snapshot::{Position, Snapshot};
use crate::tle::parse_tle_batch;

/// All active satellites, TLE format.
pub const CELESTRAK_ACTIVE_URL: &str =
    "https://celestrak.org/NORAD/elements/gp.php?GROUP=active&FORMAT=tle";

/// Whole-batch source failures.
///
/// Every variant is a "source unavailable" condition: the refresh loop logs
/// it, keeps the last good graph and tries again next tick.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport failure (DNS, connect, TLS, read)
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream answered with a non-2xx status
    #[error("Upstream returned HTTP {0}")]
    Status(u16),

    /// Payload is not an element-set listing
    #[error("Non-conforming payload: {0}")]
    NonConforming(String),
}

/// Produces the satellite positions for an observation instant.
#[async_trait]
pub trait PositionSource: Send + Sync + 'static {
    /// Fetches a snapshot stamped with `instant`.
    async fn fetch(&self, instant: DateTime<Utc>) -> Result<Snapshot, SourceError>;

    /// Short label for logs.
    fn label(&self) -> &str {
        "source"
    }
}

/// Parses `text`, propagates every record to `instant` and assembles a snapshot.
///
/// Malformed groups and propagation failures are skipped and counted.
pub fn snapshot_from_tle(
    text: &str,
    instant: DateTime<Utc>,
    max_satellites: usize,
    propagator: &Propagator,
) -> Result<Snapshot, SourceError> {
    let batch = parse_tle_batch(text, max_satellites)?;
    let mut skipped = batch.skipped.len();

    let mut positions = Vec::with_capacity(batch.len());
    for record in &batch.records {
        match propagator.position(record, instant) {
            Ok(position) => positions.push(position),
            Err(e) => {
                warn!("Failed to calculate position: {}", e);
                skipped += 1;
            }
        }
    }

    info!(
        loaded = positions.len(),
        skipped,
        "Successfully loaded {} satellites",
        positions.len()
    );
    Ok(Snapshot::new(instant, positions).with_skipped(skipped))
}

/// Source backed by data held in memory.
#[derive(Debug, Clone)]
pub enum StaticSource {
    /// TLE text, parsed and propagated on every fetch
    Tle {
        text: String,
        max_satellites: usize,
        propagator: Propagator,
    },

    /// Fixed positions, restamped with the requested instant
    Positions(Vec<Position>),
}

impl StaticSource {
    pub fn from_tle(text: impl Into<String>, max_satellites: usize) -> Self {
        StaticSource::Tle {
            text: text.into(),
            max_satellites,
            propagator: Propagator::new(),
        }
    }

    pub fn from_positions(positions: Vec<Position>) -> Self {
        StaticSource::Positions(positions)
    }
}

#[async_trait]
impl PositionSource for StaticSource {
    async fn fetch(&self, instant: DateTime<Utc>) -> Result<Snapshot, SourceError> {
        match self {
            StaticSource::Tle {
                text,
                max_satellites,
                propagator,
            } => snapshot_from_tle(text, instant, *max_satellites, propagator),
            StaticSource::Positions(positions) => Ok(Snapshot::new(instant, positions.clone())),
        }
    }

    fn label(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tle::fixtures::{ISS, TRUNCATED};

    /// Second ISS element set with a distinct name, same epoch.
    fn iss_twin() -> String {
        ISS.replacen("ISS (ZARYA)", "ISS TWIN", 1)
    }

    fn iss_epoch() -> DateTime<Utc> {
        crate::tle::parse_tle_batch(ISS, 1).unwrap().records[0]
            .elements
            .datetime
            .and_utc()
    }

    #[tokio::test]
    async fn test_malformed_entry_between_valid_entries() {
        let text = format!("{}\n{}\n{}", ISS, TRUNCATED, iss_twin());
        let source = StaticSource::from_tle(text, 300);

        let snapshot = source.fetch(iss_epoch()).await.unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.skipped, 1);
        assert_eq!(snapshot.positions[0].name, "ISS (ZARYA)");
        assert_eq!(snapshot.positions[1].name, "ISS TWIN");
        assert_eq!(snapshot.observed_at, iss_epoch());
    }

    #[tokio::test]
    async fn test_html_body_is_source_error() {
        let source = StaticSource::from_tle("<html><body>down</body></html>", 300);
        assert!(matches!(
            source.fetch(Utc::now()).await,
            Err(SourceError::NonConforming(_))
        ));
    }

    #[tokio::test]
    async fn test_static_positions_restamped() {
        let positions = vec![Position::new("A", 1.0, 2.0, 500.0).unwrap()];
        let source = StaticSource::from_positions(positions.clone());
        let instant = Utc::now();

        let snapshot = source.fetch(instant).await.unwrap();
        assert_eq!(snapshot.positions, positions);
        assert_eq!(snapshot.observed_at, instant);
    }
}
