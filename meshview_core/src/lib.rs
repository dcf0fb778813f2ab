//! MeshView Core - proximity mesh of orbiting satellites
//!
//! Each refresh tick turns the current set of satellite positions into an
//! undirected graph linking every pair closer than a configured threshold:
//! 1. **Sources**: element sets fetched and propagated to one instant
//! 2. **Builder**: pairwise proximity under a planar or haversine metric,
//!    optionally pruned with an H3 cell index
//! 3. **Runtime**: a fixed-interval loop that keeps the last good graph
//!    visible while a fetch is slow or failing

pub mod config;
pub mod metric;
pub mod presenter;
pub mod propagation;
pub mod proximity;
pub mod runtime;
pub mod snapshot;
pub mod source;
pub mod spatial_index;
pub mod tle;

// Re-export key types for convenience
pub use config::{ConfigError, MeshConfig};
pub use metric::{DistanceMetric, DistanceUnit, Threshold};
pub use presenter::{
    drive_presenter, GeoJsonPresenter, LogPresenter, MemoryPresenter, PresentError,
    SnapshotPresenter,
};
pub use propagation::{PropagationError, Propagator};
pub use proximity::{GraphError, IndexStrategy, ProximityGraphBuilder};
pub use runtime::{LastGood, LoopStats, PassOutcome, RefreshLoop, RefreshSettings, RetainReason};
pub use snapshot::{Edge, GeoError, Graph, GraphStats, Position, Snapshot};
pub use source::{PositionSource, SourceError, StaticSource};
pub use tle::{parse_tle_batch, MalformedEntry, TleBatch, TleRecord};

#[cfg(feature = "celestrak")]
pub use source::CelestrakSource;
