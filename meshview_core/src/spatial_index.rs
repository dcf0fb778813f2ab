//! H3 candidate index for the proximity builder.
//!
//! Positions are bucketed by the H3 cell containing their sub-satellite point.
//! Candidates for a position are the members of every cell within `k` grid
//! steps of its own cell; each candidate is then confirmed with the exact
//! metric, so the index only ever prunes pairs that cannot link.
//!
//! Resolution and `k` are derived from the search radius:
//! - the finest resolution whose average edge is at least half the radius
//! - `k = ceil(2 · radius / edge) + 3`, which leaves room for the edge-length
//!   spread within one resolution and for both points sitting off-center
//!
//! Resolution 0 is never used (icosahedron-scale cells, nothing to prune);
//! such radii fall back to all pairs.

use h3o::{CellIndex, LatLng, Resolution};
use std::collections::{BTreeSet, HashMap};

use crate::metric::DistanceMetric;
use crate::snapshot::{Edge, Position};

/// Extra grid rings on top of the radius-derived disk.
const RING_MARGIN: u32 = 3;

/// H3 buckets over one slice of positions.
#[derive(Debug)]
pub struct ProximityIndex {
    resolution: Resolution,
    k: u32,
    cells: Vec<CellIndex>,
    buckets: HashMap<CellIndex, Vec<usize>>,
}

impl ProximityIndex {
    /// Chooses resolution and ring count for `radius_km`, or `None` if the
    /// radius is too large for a useful disk.
    pub fn plan(radius_km: f64) -> Option<(Resolution, u32)> {
        if !radius_km.is_finite() || radius_km < 0.0 {
            return None;
        }

        let mut chosen = None;
        for level in 1..=15u8 {
            let resolution = Resolution::try_from(level).ok()?;
            if resolution.edge_length_km() * 2.0 < radius_km {
                break;
            }
            chosen = Some(resolution);
        }

        let resolution = chosen?;
        let k = (2.0 * radius_km / resolution.edge_length_km()).ceil() as u32 + RING_MARGIN;
        Some((resolution, k))
    }

    /// Buckets `positions`. Returns `None` when no plan fits the radius or a
    /// position cannot be mapped to a cell.
    pub fn build(positions: &[Position], radius_km: f64) -> Option<Self> {
        let (resolution, k) = Self::plan(radius_km)?;

        let mut cells = Vec::with_capacity(positions.len());
        let mut buckets: HashMap<CellIndex, Vec<usize>> = HashMap::new();
        for (index, position) in positions.iter().enumerate() {
            let cell = LatLng::new(position.latitude, position.longitude)
                .ok()?
                .to_cell(resolution);
            cells.push(cell);
            buckets.entry(cell).or_default().push(index);
        }

        Some(Self {
            resolution,
            k,
            cells,
            buckets,
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn rings(&self) -> u32 {
        self.k
    }

    /// Number of occupied cells.
    pub fn occupied_cells(&self) -> usize {
        self.buckets.len()
    }

    /// Confirms every candidate pair with `metric` and returns the linked ones.
    pub fn linked_pairs(
        &self,
        positions: &[Position],
        metric: DistanceMetric,
        threshold: f64,
    ) -> BTreeSet<Edge> {
        let mut disks: HashMap<CellIndex, Vec<CellIndex>> = HashMap::new();
        let mut edges = BTreeSet::new();

        for (i, cell) in self.cells.iter().enumerate() {
            let disk = disks
                .entry(*cell)
                .or_insert_with(|| cell.grid_disk::<Vec<_>>(self.k));

            for neighbor in disk.iter() {
                let Some(members) = self.buckets.get(neighbor) else {
                    continue;
                };
                for &j in members.iter().filter(|&&j| j > i) {
                    if metric.distance(&positions[i], &positions[j]) < threshold {
                        edges.extend(Edge::new(i, j));
                    }
                }
            }
        }

        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proximity::all_pairs;

    fn at(lat: f64, lon: f64) -> Position {
        Position::new("p", lat, lon, 550.0).unwrap()
    }

    #[test]
    fn test_plan_prefers_fine_resolution_for_small_radius() {
        let (coarse, _) = ProximityIndex::plan(500.0).unwrap();
        let (fine, k) = ProximityIndex::plan(20.0).unwrap();
        assert!(u8::from(fine) > u8::from(coarse));
        assert!(k > RING_MARGIN);
    }

    #[test]
    fn test_plan_rejects_continental_radius() {
        assert!(ProximityIndex::plan(1500.0).is_none());
        assert!(ProximityIndex::plan(f64::INFINITY).is_none());
        assert!(ProximityIndex::plan(-1.0).is_none());
    }

    #[test]
    fn test_build_rejects_unmappable_position() {
        let bogus = Position {
            name: "bogus".to_string(),
            latitude: f64::NAN,
            longitude: 0.0,
            altitude_km: 0.0,
        };
        assert!(ProximityIndex::build(&[at(0.0, 0.0), bogus], 100.0).is_none());
    }

    #[test]
    fn test_index_across_seam_and_pole() {
        let positions = vec![
            at(0.0, 179.9),
            at(0.0, -179.9),
            at(89.9, 0.0),
            at(89.9, 180.0),
            at(-45.0, 45.0),
        ];
        let index = ProximityIndex::build(&positions, 50.0).unwrap();
        let indexed = index.linked_pairs(&positions, DistanceMetric::Haversine, 50.0);
        let naive = all_pairs(&positions, DistanceMetric::Haversine, 50.0);

        assert_eq!(indexed, naive);
        assert_eq!(indexed.len(), 2);
    }

    mod parity {
        use super::*;
        use proptest::prelude::*;

        fn position() -> impl Strategy<Value = Position> {
            (-90.0f64..=90.0, -180.0f64..=180.0)
                .prop_map(|(lat, lon)| Position::new("p", lat, lon, 550.0).unwrap())
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn indexed_equals_all_pairs(
                positions in prop::collection::vec(position(), 0..80),
                radius in 50.0f64..600.0,
            ) {
                let naive = all_pairs(&positions, DistanceMetric::Haversine, radius);
                let indexed = match ProximityIndex::build(&positions, radius) {
                    Some(index) => index.linked_pairs(&positions, DistanceMetric::Haversine, radius),
                    None => naive.clone(),
                };
                prop_assert_eq!(indexed, naive);
            }

            #[test]
            fn indexed_equals_all_pairs_planar(
                positions in prop::collection::vec(position(), 0..80),
                degrees in 0.5f64..5.0,
            ) {
                let radius = DistanceMetric::Planar.search_radius_km(degrees);
                let naive = all_pairs(&positions, DistanceMetric::Planar, degrees);
                if let Some(index) = ProximityIndex::build(&positions, radius) {
                    prop_assert_eq!(index.linked_pairs(&positions, DistanceMetric::Planar, degrees), naive);
                }
            }
        }
    }
}
