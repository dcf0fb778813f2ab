//! Snapshot presenters: turn a published graph into something a user sees.
//!
//! Presenters never talk to the source. They are driven from the last-good
//! cache by [`drive_presenter`], so they only ever receive complete graphs.

use serde_json::{json, Value};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::snapshot::{Graph, GraphStats};

#[derive(Debug, Error)]
pub enum PresentError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Presenter task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Renders one graph.
pub trait SnapshotPresenter: Send {
    fn present(&mut self, graph: &Graph) -> Result<(), PresentError>;
}

/// GeoJSON `FeatureCollection` for `graph`.
///
/// One `Point` per position and one `LineString` per edge. Coordinates are
/// `[longitude, latitude]`.
pub fn feature_collection(graph: &Graph) -> Value {
    let observed_at = graph.snapshot().observed_at.to_rfc3339();

    let points = graph.positions().iter().enumerate().map(|(index, position)| {
        json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": position.lon_lat() },
            "properties": {
                "kind": "satellite",
                "index": index,
                "name": position.name,
                "altitude_km": position.altitude_km,
            }
        })
    });

    let lines = graph.segments().zip(graph.edges()).map(|((a, b), edge)| {
        let (i, j) = edge.pair();
        json!({
            "type": "Feature",
            "geometry": { "type": "LineString", "coordinates": [a.lon_lat(), b.lon_lat()] },
            "properties": { "kind": "link", "from": i, "to": j }
        })
    });

    let stats = graph.stats();
    json!({
        "type": "FeatureCollection",
        "features": points.chain(lines).collect::<Vec<_>>(),
        "properties": {
            "observed_at": observed_at,
            "positions": stats.positions,
            "edges": stats.edges,
            "skipped": stats.skipped,
        }
    })
}

/// Writes each graph as GeoJSON to a file, replacing it atomically.
#[derive(Debug, Clone)]
pub struct GeoJsonPresenter {
    path: PathBuf,
}

impl GeoJsonPresenter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotPresenter for GeoJsonPresenter {
    fn present(&mut self, graph: &Graph) -> Result<(), PresentError> {
        let body = serde_json::to_vec_pretty(&feature_collection(graph))?;
        let temp = self.temp_path();
        std::fs::write(&temp, body)?;
        std::fs::rename(&temp, &self.path)?;
        debug!(path = %self.path.display(), edges = graph.edges().len(), "GeoJSON written");
        Ok(())
    }
}

/// Logs a one-line summary per graph.
#[derive(Debug, Clone, Default)]
pub struct LogPresenter;

impl SnapshotPresenter for LogPresenter {
    fn present(&mut self, graph: &Graph) -> Result<(), PresentError> {
        let stats = graph.stats();
        info!(
            positions = stats.positions,
            edges = stats.edges,
            mean_degree = format!("{:.2}", stats.mean_degree),
            isolated = stats.isolated,
            skipped = stats.skipped,
            "Mesh updated"
        );
        Ok(())
    }
}

/// Keeps the stats and GeoJSON of every graph presented.
#[derive(Debug, Clone, Default)]
pub struct MemoryPresenter {
    pub frames: Vec<(GraphStats, Value)>,
}

impl MemoryPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&(GraphStats, Value)> {
        self.frames.last()
    }
}

impl SnapshotPresenter for MemoryPresenter {
    fn present(&mut self, graph: &Graph) -> Result<(), PresentError> {
        self.frames.push((graph.stats(), feature_collection(graph)));
        Ok(())
    }
}

/// Presents every graph published on `updates` until the sender is dropped.
///
/// A graph already in the channel is presented first. `present` runs on the
/// blocking pool since presenters may do file I/O. Presenter errors are
/// logged and do not stop the loop; a panicking presenter does.
pub async fn drive_presenter<P>(
    mut updates: watch::Receiver<Option<Arc<Graph>>>,
    mut presenter: P,
) -> Result<P, PresentError>
where
    P: SnapshotPresenter + 'static,
{
    loop {
        let current = updates.borrow_and_update().clone();
        if let Some(graph) = current {
            let (returned, result) = tokio::task::spawn_blocking(move || {
                let result = presenter.present(&graph);
                (presenter, result)
            })
            .await?;
            presenter = returned;

            if let Err(e) = result {
                warn!("Presenter failed: {}", e);
            }
        }

        if updates.changed().await.is_err() {
            break;
        }
    }
    Ok(presenter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{DistanceMetric, Threshold};
    use crate::proximity::ProximityGraphBuilder;
    use crate::runtime::LastGood;
    use crate::snapshot::{Position, Snapshot};
    use chrono::Utc;

    fn graph() -> Graph {
        let positions = vec![
            Position::new("A", 10.0, 20.0, 550.0).unwrap(),
            Position::new("B", 10.0, 21.0, 560.0).unwrap(),
            Position::new("C", -60.0, 150.0, 1200.0).unwrap(),
        ];
        ProximityGraphBuilder::new(DistanceMetric::Planar, Threshold::Degrees(2.0))
            .unwrap()
            .build(Snapshot::new(Utc::now(), positions))
    }

    #[test]
    fn test_geojson_coordinates_are_lon_lat() {
        let fc = feature_collection(&graph());
        let features = fc["features"].as_array().unwrap();

        assert_eq!(features.len(), 4);
        assert_eq!(features[0]["geometry"]["coordinates"], json!([20.0, 10.0]));
        assert_eq!(features[0]["properties"]["name"], "A");
        assert_eq!(features[3]["geometry"]["type"], "LineString");
        assert_eq!(
            features[3]["geometry"]["coordinates"],
            json!([[20.0, 10.0], [21.0, 10.0]])
        );
        assert_eq!(fc["properties"]["edges"], 1);
    }

    #[test]
    fn test_geojson_presenter_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.geojson");
        let mut presenter = GeoJsonPresenter::new(&path);

        presenter.present(&graph()).unwrap();

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["type"], "FeatureCollection");
        assert!(!presenter.temp_path().exists());
    }

    #[test]
    fn test_geojson_presenter_reports_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut presenter = GeoJsonPresenter::new(dir.path().join("missing/mesh.geojson"));
        assert!(matches!(presenter.present(&graph()), Err(PresentError::Io(_))));
    }

    #[tokio::test]
    async fn test_drive_presenter_sees_each_publish() {
        let last_good = LastGood::new();
        let rx = last_good.subscribe();
        last_good.publish(graph());

        let task = tokio::spawn(drive_presenter(rx, MemoryPresenter::new()));
        tokio::task::yield_now().await;
        drop(last_good);

        let presenter = task.await.unwrap().unwrap();
        assert!(!presenter.frames.is_empty());
        assert_eq!(presenter.last().unwrap().0.edges, 1);
    }

    #[tokio::test]
    async fn test_drive_presenter_writes_geojson_off_the_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.geojson");
        let last_good = LastGood::new();
        let rx = last_good.subscribe();
        last_good.publish(graph());
        drop(last_good);

        let presenter = drive_presenter(rx, GeoJsonPresenter::new(&path)).await.unwrap();

        assert_eq!(presenter.path(), path.as_path());
        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["properties"]["edges"], 1);
    }

    #[tokio::test]
    async fn test_drive_presenter_reports_panicking_presenter() {
        struct Exploding;
        impl SnapshotPresenter for Exploding {
            fn present(&mut self, _graph: &Graph) -> Result<(), PresentError> {
                panic!("boom");
            }
        }

        let last_good = LastGood::new();
        let rx = last_good.subscribe();
        last_good.publish(graph());

        let result = drive_presenter(rx, Exploding).await;
        assert!(matches!(result, Err(PresentError::Task(_))));
    }
}
