//! The proximity graph builder.
//!
//! A pure transform from a [`Snapshot`] to a [`Graph`]: pair `(i, j)` with
//! `i < j` is linked exactly when `distance(i, j) < threshold` under the
//! configured [`DistanceMetric`]. The boundary is exclusive.
//!
//! The default strategy compares all pairs, O(n²) distance evaluations. That
//! is fine up to a few hundred positions; beyond that use
//! [`IndexStrategy::H3Grid`], which returns the same edge set.
//!
//! Positions are expected to be validated upstream (`Position::new`). A
//! position with out-of-range coordinates does not panic the builder; its
//! distances are meaningless and a NaN distance never links.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, trace};

use crate::metric::{DistanceMetric, DistanceUnit, Threshold};
use crate::snapshot::{Edge, Graph, Position, Snapshot};
use crate::spatial_index::ProximityIndex;

/// Errors raised when configuring a builder.
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    /// Threshold unit does not match the metric
    #[error("threshold in {threshold} cannot be used with the {metric} metric ({expected})")]
    UnitMismatch {
        metric: DistanceMetric,
        expected: DistanceUnit,
        threshold: DistanceUnit,
    },

    /// Threshold is negative or not finite
    #[error("invalid threshold: {0}")]
    InvalidThreshold(f64),
}

/// How candidate pairs are enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStrategy {
    /// Compare every pair
    #[default]
    AllPairs,

    /// Bucket positions into H3 cells and compare within a cell disk
    #[serde(rename = "h3")]
    H3Grid,
}

impl std::str::FromStr for IndexStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all_pairs" | "allpairs" | "naive" => Ok(IndexStrategy::AllPairs),
            "h3" | "h3_grid" | "grid" => Ok(IndexStrategy::H3Grid),
            _ => Err(format!("Unknown index strategy: {}", s)),
        }
    }
}

/// Builds proximity graphs for a fixed metric and threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityGraphBuilder {
    metric: DistanceMetric,
    threshold: f64,
    strategy: IndexStrategy,
}

impl ProximityGraphBuilder {
    /// Creates a builder. The threshold unit must match `metric`.
    pub fn new(metric: DistanceMetric, threshold: Threshold) -> Result<Self, GraphError> {
        if threshold.unit() != metric.unit() {
            return Err(GraphError::UnitMismatch {
                metric,
                expected: metric.unit(),
                threshold: threshold.unit(),
            });
        }

        let value = threshold.value();
        if !value.is_finite() || value < 0.0 {
            return Err(GraphError::InvalidThreshold(value));
        }

        Ok(Self {
            metric,
            threshold: value,
            strategy: IndexStrategy::AllPairs,
        })
    }

    /// Selects the candidate enumeration strategy.
    pub fn with_strategy(mut self, strategy: IndexStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn threshold(&self) -> Threshold {
        Threshold::for_metric(self.metric, self.threshold)
    }

    pub fn strategy(&self) -> IndexStrategy {
        self.strategy
    }

    /// Builds the graph for `snapshot`, taking ownership of it.
    pub fn build(&self, snapshot: Snapshot) -> Graph {
        let edges = self.linked_pairs(&snapshot.positions);
        trace!(
            positions = snapshot.len(),
            edges = edges.len(),
            metric = %self.metric,
            "graph built"
        );
        Graph::new(snapshot, edges)
    }

    /// Edge set for `positions` without assembling a graph.
    pub fn linked_pairs(&self, positions: &[Position]) -> BTreeSet<Edge> {
        if positions.len() < 2 {
            return BTreeSet::new();
        }

        match self.strategy {
            IndexStrategy::AllPairs => all_pairs(positions, self.metric, self.threshold),
            IndexStrategy::H3Grid => {
                let radius_km = self.metric.search_radius_km(self.threshold);
                match ProximityIndex::build(positions, radius_km) {
                    Some(index) => {
                        trace!(
                            resolution = u8::from(index.resolution()),
                            rings = index.rings(),
                            cells = index.occupied_cells(),
                            "H3 candidate index"
                        );
                        index.linked_pairs(positions, self.metric, self.threshold)
                    }
                    None => {
                        debug!(radius_km, "no H3 plan for radius, comparing all pairs");
                        all_pairs(positions, self.metric, self.threshold)
                    }
                }
            }
        }
    }
}

/// Naive O(n²) enumeration of every `(i, j)`, `i < j`, closer than `threshold`.
pub fn all_pairs(positions: &[Position], metric: DistanceMetric, threshold: f64) -> BTreeSet<Edge> {
    let mut edges = BTreeSet::new();
    for i in 0..positions.len() {
        for j in (i + 1)..positions.len() {
            if metric.distance(&positions[i], &positions[j]) < threshold {
                edges.extend(Edge::new(i, j));
            }
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at(name: &str, lat: f64, lon: f64) -> Position {
        Position::new(name, lat, lon, 550.0).unwrap()
    }

    fn planar(threshold: f64) -> ProximityGraphBuilder {
        ProximityGraphBuilder::new(DistanceMetric::Planar, Threshold::Degrees(threshold)).unwrap()
    }

    fn haversine(threshold: f64) -> ProximityGraphBuilder {
        ProximityGraphBuilder::new(DistanceMetric::Haversine, Threshold::Kilometers(threshold))
            .unwrap()
    }

    fn snapshot(positions: Vec<Position>) -> Snapshot {
        Snapshot::new(Utc::now(), positions)
    }

    #[test]
    fn test_fewer_than_two_positions() {
        let builder = haversine(5000.0);
        assert!(builder.build(snapshot(vec![])).edges().is_empty());
        assert!(builder.build(snapshot(vec![at("solo", 0.0, 0.0)])).edges().is_empty());
    }

    #[test]
    fn test_two_positions_planar_threshold() {
        let positions = vec![at("A", 0.0, 0.0), at("B", 0.0, 1.0)];

        let linked = planar(2.0).build(snapshot(positions.clone()));
        assert_eq!(linked.edge_pairs(), vec![(0, 1)]);

        let unlinked = planar(0.5).build(snapshot(positions));
        assert!(unlinked.edges().is_empty());
    }

    #[test]
    fn test_boundary_is_exclusive() {
        let positions = vec![at("A", 0.0, 0.0), at("B", 0.0, 1.0)];
        assert!(planar(1.0).build(snapshot(positions.clone())).edges().is_empty());

        let exact = DistanceMetric::Haversine.distance(&positions[0], &positions[1]);
        assert!(haversine(exact).build(snapshot(positions.clone())).edges().is_empty());
        assert_eq!(haversine(exact * 1.000001).linked_pairs(&positions).len(), 1);
    }

    #[test]
    fn test_triangle_all_linked() {
        let positions = vec![
            at("A", 0.0, 0.0),
            at("B", 0.0, 1.0),
            at("C", 0.866, 0.5),
        ];
        let graph = planar(1.5).build(snapshot(positions));
        assert_eq!(graph.edge_pairs(), vec![(0, 1), (0, 2), (1, 2)]);
    }

    #[test]
    fn test_duplicate_names_are_distinct_positions() {
        let positions = vec![
            at("STARLINK", 0.0, 0.0),
            at("STARLINK", 0.0, 0.5),
            at("STARLINK", 0.0, 30.0),
        ];
        let graph = planar(1.0).build(snapshot(positions));
        assert_eq!(graph.edge_pairs(), vec![(0, 1)]);
    }

    #[test]
    fn test_coincident_positions_link_but_never_self() {
        let positions = vec![at("A", 10.0, 10.0), at("B", 10.0, 10.0)];
        let graph = haversine(1.0).build(snapshot(positions));
        assert_eq!(graph.edge_pairs(), vec![(0, 1)]);
    }

    #[test]
    fn test_zero_threshold_links_nothing() {
        let positions = vec![at("A", 10.0, 10.0), at("B", 10.0, 10.0)];
        assert!(haversine(0.0).linked_pairs(&positions).is_empty());
    }

    #[test]
    fn test_idempotent() {
        let positions: Vec<Position> = (0..40)
            .map(|i| at("S", (i as f64 * 7.3) % 80.0 - 40.0, (i as f64 * 31.7) % 360.0 - 180.0))
            .collect();
        let builder = haversine(2000.0);
        let first = builder.build(snapshot(positions.clone()));
        let second = builder.build(snapshot(positions));
        assert_eq!(first.edges(), second.edges());
    }

    #[test]
    fn test_seam_crossing_planar_vs_haversine() {
        let positions = vec![at("W", 0.0, 179.5), at("E", 0.0, -179.5)];
        assert!(planar(15.0).linked_pairs(&positions).is_empty());
        assert_eq!(haversine(1500.0).linked_pairs(&positions).len(), 1);
    }

    #[test]
    fn test_unit_mismatch_rejected() {
        let err = ProximityGraphBuilder::new(DistanceMetric::Planar, Threshold::Kilometers(1500.0))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::UnitMismatch {
                metric: DistanceMetric::Planar,
                expected: DistanceUnit::Degrees,
                threshold: DistanceUnit::Kilometers,
            }
        );

        assert!(matches!(
            ProximityGraphBuilder::new(DistanceMetric::Haversine, Threshold::Degrees(15.0)),
            Err(GraphError::UnitMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        assert_eq!(
            ProximityGraphBuilder::new(DistanceMetric::Haversine, Threshold::Kilometers(-1.0)),
            Err(GraphError::InvalidThreshold(-1.0))
        );
        assert!(ProximityGraphBuilder::new(DistanceMetric::Planar, Threshold::Degrees(f64::NAN))
            .is_err());
    }

    #[test]
    fn test_out_of_range_input_does_not_panic() {
        // Bypasses Position::new on purpose
        let bogus = Position {
            name: "bogus".to_string(),
            latitude: 400.0,
            longitude: f64::NAN,
            altitude_km: 0.0,
        };
        let positions = vec![at("A", 0.0, 0.0), bogus];

        for builder in [planar(1000.0), haversine(1.0e6)] {
            let graph = builder.build(snapshot(positions.clone()));
            assert!(graph.edges().is_empty());
        }
    }

    #[test]
    fn test_strategy_h3_matches_all_pairs() {
        let positions: Vec<Position> = (0..60)
            .map(|i| at("S", (i as f64 * 3.1) % 50.0, (i as f64 * 4.7) % 60.0))
            .collect();
        // Closest pair is ~491 km apart
        let builder = haversine(900.0);
        let naive = builder.linked_pairs(&positions);
        let indexed = builder
            .clone()
            .with_strategy(IndexStrategy::H3Grid)
            .linked_pairs(&positions);
        assert!(!naive.is_empty());
        assert_eq!(naive, indexed);
    }
}
