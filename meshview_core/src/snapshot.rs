//! Snapshot data model: positions, edges and the per-tick proximity graph.
//!
//! Everything here is ephemeral. A [`Snapshot`] is produced by one fetch pass,
//! turned into a [`Graph`] once, handed to presenters and dropped on the next
//! tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors raised while validating geodetic data at the source boundary.
#[derive(Debug, Error, PartialEq)]
pub enum GeoError {
    /// A coordinate is outside its geodetic domain or not finite
    #[error("{name}: {field} {value} is out of range")]
    OutOfRange {
        name: String,
        field: &'static str,
        value: f64,
    },
}

/// Geodetic position of one named satellite.
///
/// Latitude and longitude are degrees, altitude is kilometers above the
/// ellipsoid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_km: f64,
}

impl Position {
    /// Creates a position, rejecting coordinates outside the geodetic domain.
    pub fn new(
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        altitude_km: f64,
    ) -> Result<Self, GeoError> {
        let position = Self {
            name: name.into(),
            latitude,
            longitude,
            altitude_km,
        };
        position.validate()?;
        Ok(position)
    }

    /// Checks latitude in [-90, 90], longitude in [-180, 180] and a finite altitude.
    pub fn validate(&self) -> Result<(), GeoError> {
        let out_of_range = |field: &'static str, value: f64| GeoError::OutOfRange {
            name: self.name.clone(),
            field,
            value,
        };

        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(out_of_range("latitude", self.latitude));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(out_of_range("longitude", self.longitude));
        }
        if !self.altitude_km.is_finite() {
            return Err(out_of_range("altitude", self.altitude_km));
        }
        Ok(())
    }

    /// Map coordinates in `[longitude, latitude]` order.
    pub fn lon_lat(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

/// All positions observed at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Observation instant shared by every position
    pub observed_at: DateTime<Utc>,

    /// Positions in source order; edges refer to these indices
    pub positions: Vec<Position>,

    /// Entries dropped at the source boundary (malformed or unpropagatable)
    pub skipped: usize,
}

impl Snapshot {
    pub fn new(observed_at: DateTime<Utc>, positions: Vec<Position>) -> Self {
        Self {
            observed_at,
            positions,
            skipped: 0,
        }
    }

    /// A snapshot with no positions.
    pub fn empty(observed_at: DateTime<Utc>) -> Self {
        Self::new(observed_at, Vec::new())
    }

    /// Records how many entries the source skipped.
    pub fn with_skipped(mut self, skipped: usize) -> Self {
        self.skipped = skipped;
        self
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Keeps at most `max` positions, returning how many were removed.
    pub fn truncate_to(&mut self, max: usize) -> usize {
        let removed = self.positions.len().saturating_sub(max);
        self.positions.truncate(max);
        removed
    }
}

/// Unordered link between two positions of a snapshot, stored as `(low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Edge {
    a: usize,
    b: usize,
}

impl Edge {
    /// Normalises the pair so that `a < b`. Returns `None` for a self-pair.
    pub fn new(i: usize, j: usize) -> Option<Self> {
        match i.cmp(&j) {
            std::cmp::Ordering::Less => Some(Self { a: i, b: j }),
            std::cmp::Ordering::Greater => Some(Self { a: j, b: i }),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Index pair `(low, high)`.
    pub fn pair(&self) -> (usize, usize) {
        (self.a, self.b)
    }

    pub fn touches(&self, index: usize) -> bool {
        self.a == index || self.b == index
    }
}

/// Proximity graph for one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    snapshot: Snapshot,
    edges: BTreeSet<Edge>,
}

impl Graph {
    /// Assembles a graph. Edges must index into `snapshot.positions`.
    pub(crate) fn new(snapshot: Snapshot, edges: BTreeSet<Edge>) -> Self {
        debug_assert!(edges.iter().all(|e| e.pair().1 < snapshot.len()));
        Self { snapshot, edges }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn positions(&self) -> &[Position] {
        &self.snapshot.positions
    }

    pub fn edges(&self) -> &BTreeSet<Edge> {
        &self.edges
    }

    /// Index pairs in ascending order.
    pub fn edge_pairs(&self) -> Vec<(usize, usize)> {
        self.edges.iter().map(Edge::pair).collect()
    }

    /// Endpoint positions for every edge, for line rendering.
    pub fn segments(&self) -> impl Iterator<Item = (&Position, &Position)> + '_ {
        self.edges.iter().map(move |edge| {
            let (i, j) = edge.pair();
            (&self.snapshot.positions[i], &self.snapshot.positions[j])
        })
    }

    /// Number of links touching position `index`.
    pub fn degree(&self, index: usize) -> usize {
        self.edges.iter().filter(|e| e.touches(index)).count()
    }

    pub fn stats(&self) -> GraphStats {
        let positions = self.snapshot.len();
        let mut degrees = vec![0usize; positions];
        for edge in &self.edges {
            let (i, j) = edge.pair();
            degrees[i] += 1;
            degrees[j] += 1;
        }

        let mean_degree = if positions > 0 {
            2.0 * self.edges.len() as f64 / positions as f64
        } else {
            0.0
        };

        GraphStats {
            observed_at: self.snapshot.observed_at,
            positions,
            edges: self.edges.len(),
            mean_degree,
            isolated: degrees.iter().filter(|d| **d == 0).count(),
            skipped: self.snapshot.skipped,
        }
    }
}

/// Summary numbers for one graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub observed_at: DateTime<Utc>,
    pub positions: usize,
    pub edges: usize,
    pub mean_degree: f64,
    pub isolated: usize,
    pub skipped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(name: &str, lat: f64, lon: f64) -> Position {
        Position::new(name, lat, lon, 550.0).unwrap()
    }

    #[test]
    fn test_position_rejects_out_of_range() {
        assert!(Position::new("ok", 90.0, -180.0, 400.0).is_ok());

        let err = Position::new("north", 90.5, 0.0, 400.0).unwrap_err();
        assert_eq!(
            err,
            GeoError::OutOfRange {
                name: "north".to_string(),
                field: "latitude",
                value: 90.5,
            }
        );

        assert!(Position::new("east", 0.0, 180.01, 400.0).is_err());
        assert!(Position::new("nan", f64::NAN, 0.0, 400.0).is_err());
        assert!(Position::new("inf", 0.0, 0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_edge_normalises_and_rejects_self_pair() {
        assert_eq!(Edge::new(3, 1).unwrap().pair(), (1, 3));
        assert_eq!(Edge::new(1, 3), Edge::new(3, 1));
        assert!(Edge::new(2, 2).is_none());
    }

    #[test]
    fn test_snapshot_truncate() {
        let mut snapshot = Snapshot::new(
            Utc::now(),
            vec![at("a", 0.0, 0.0), at("b", 1.0, 1.0), at("c", 2.0, 2.0)],
        );

        assert_eq!(snapshot.truncate_to(5), 0);
        assert_eq!(snapshot.truncate_to(2), 1);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.positions[1].name, "b");
    }

    #[test]
    fn test_graph_stats_and_segments() {
        let snapshot = Snapshot::new(
            Utc::now(),
            vec![at("a", 0.0, 0.0), at("b", 0.0, 1.0), at("c", 40.0, 40.0)],
        )
        .with_skipped(2);
        let edges: BTreeSet<Edge> = [Edge::new(0, 1).unwrap()].into_iter().collect();
        let graph = Graph::new(snapshot, edges);

        let stats = graph.stats();
        assert_eq!(stats.positions, 3);
        assert_eq!(stats.edges, 1);
        assert_eq!(stats.isolated, 1);
        assert_eq!(stats.skipped, 2);
        assert!((stats.mean_degree - 2.0 / 3.0).abs() < 1e-12);

        assert_eq!(graph.degree(0), 1);
        assert_eq!(graph.degree(2), 0);

        let segments: Vec<_> = graph.segments().collect();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].0.name, "a");
        assert_eq!(segments[0].1.name, "b");
    }
}
