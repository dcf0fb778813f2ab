//! Distance metrics and typed thresholds.
//!
//! Two metrics are supported and their units never mix:
//!
//! | metric      | unit       | notes |
//! |-------------|------------|-------|
//! | `Planar`    | degrees    | `sqrt(dlat² + dlon²)` on raw coordinates, no seam or pole correction |
//! | `Haversine` | kilometers | great-circle distance on a mean-radius sphere (default) |

use geo::{HaversineDistance, Point};
use serde::{Deserialize, Serialize};

use crate::snapshot::Position;

/// Mean Earth radius used by the haversine metric.
pub const EARTH_MEAN_RADIUS_KM: f64 = 6371.0088;

/// Unit of a distance value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUnit {
    Degrees,
    Kilometers,
}

impl std::fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceUnit::Degrees => write!(f, "deg"),
            DistanceUnit::Kilometers => write!(f, "km"),
        }
    }
}

/// Distance metric used to decide whether two positions are linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Euclidean distance on raw (lat, lon) degrees.
    ///
    /// Distorted near the poles and across the ±180° seam.
    Planar,

    /// Great-circle distance in kilometers, ignoring altitude.
    #[default]
    Haversine,
}

impl DistanceMetric {
    pub fn unit(&self) -> DistanceUnit {
        match self {
            DistanceMetric::Planar => DistanceUnit::Degrees,
            DistanceMetric::Haversine => DistanceUnit::Kilometers,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Planar => "planar",
            DistanceMetric::Haversine => "haversine",
        }
    }

    /// Distance between two positions in this metric's unit.
    pub fn distance(&self, a: &Position, b: &Position) -> f64 {
        match self {
            DistanceMetric::Planar => planar_degrees(a, b),
            DistanceMetric::Haversine => haversine_km(a, b),
        }
    }

    /// Great-circle radius (km) that contains every pair closer than `threshold`.
    ///
    /// For the planar metric this relies on the equirectangular line element
    /// `ds² = dlat² + cos²(lat)·dlon²` never exceeding `dlat² + dlon²`, so
    /// the planar degree distance bounds the great-circle angle from above.
    pub fn search_radius_km(&self, threshold: f64) -> f64 {
        match self {
            DistanceMetric::Planar => threshold.to_radians() * EARTH_MEAN_RADIUS_KM,
            DistanceMetric::Haversine => threshold,
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "planar" | "degrees" => Ok(DistanceMetric::Planar),
            "haversine" | "great_circle" | "km" => Ok(DistanceMetric::Haversine),
            _ => Err(format!("Unknown metric: {}", s)),
        }
    }
}

/// Link threshold tagged with its unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum Threshold {
    Degrees(f64),
    Kilometers(f64),
}

impl Threshold {
    pub fn unit(&self) -> DistanceUnit {
        match self {
            Threshold::Degrees(_) => DistanceUnit::Degrees,
            Threshold::Kilometers(_) => DistanceUnit::Kilometers,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            Threshold::Degrees(v) | Threshold::Kilometers(v) => *v,
        }
    }

    /// Wraps a raw value in the unit `metric` expects.
    pub fn for_metric(metric: DistanceMetric, value: f64) -> Self {
        match metric.unit() {
            DistanceUnit::Degrees => Threshold::Degrees(value),
            DistanceUnit::Kilometers => Threshold::Kilometers(value),
        }
    }
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.value(), self.unit())
    }
}

impl std::str::FromStr for Threshold {
    type Err = String;

    /// Parses a value with a unit suffix: `1500km`, `1500 km`, `15deg`, `15°`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')))
            .ok_or_else(|| format!("Threshold needs a unit (km or deg): {}", s))?;
        let (number, unit) = s.split_at(split);

        let value: f64 = number
            .trim()
            .parse()
            .map_err(|_| format!("Invalid threshold value: {}", s))?;

        match unit.trim().to_lowercase().as_str() {
            "km" | "kilometers" | "kilometres" => Ok(Threshold::Kilometers(value)),
            "deg" | "degrees" | "°" => Ok(Threshold::Degrees(value)),
            other => Err(format!("Unknown threshold unit: {}", other)),
        }
    }
}

/// Euclidean distance on raw degree coordinates.
pub fn planar_degrees(a: &Position, b: &Position) -> f64 {
    let dlat = a.latitude - b.latitude;
    let dlon = a.longitude - b.longitude;
    (dlat * dlat + dlon * dlon).sqrt()
}

/// Great-circle surface distance in kilometers.
pub fn haversine_km(a: &Position, b: &Position) -> f64 {
    let pa = Point::new(a.longitude, a.latitude);
    let pb = Point::new(b.longitude, b.latitude);
    pa.haversine_distance(&pb) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn at(lat: f64, lon: f64) -> Position {
        Position::new("p", lat, lon, 550.0).unwrap()
    }

    #[test]
    fn test_planar_distance() {
        assert_eq!(planar_degrees(&at(0.0, 0.0), &at(0.0, 1.0)), 1.0);
        assert_eq!(planar_degrees(&at(0.0, 0.0), &at(3.0, 4.0)), 5.0);
    }

    #[test]
    fn test_planar_ignores_seam() {
        // 0.2° apart on the globe, 359.8° apart in raw longitude
        let d = planar_degrees(&at(0.0, 179.9), &at(0.0, -179.9));
        assert_relative_eq!(d, 359.8, epsilon = 1e-9);
    }

    #[test]
    fn test_haversine_one_degree_at_equator() {
        let d = haversine_km(&at(0.0, 0.0), &at(0.0, 1.0));
        assert_relative_eq!(d, 111.195, epsilon = 0.01);
    }

    #[test]
    fn test_haversine_handles_seam() {
        let d = haversine_km(&at(0.0, 179.9), &at(0.0, -179.9));
        assert_relative_eq!(d, 22.239, epsilon = 0.01);
    }

    #[test]
    fn test_altitude_is_ignored() {
        let low = Position::new("low", 10.0, 10.0, 400.0).unwrap();
        let high = Position::new("high", 10.0, 10.0, 20_000.0).unwrap();
        assert_eq!(DistanceMetric::Haversine.distance(&low, &high), 0.0);
        assert_eq!(DistanceMetric::Planar.distance(&low, &high), 0.0);
    }

    #[test]
    fn test_threshold_units() {
        assert_eq!(
            Threshold::for_metric(DistanceMetric::Planar, 15.0),
            Threshold::Degrees(15.0)
        );
        assert_eq!(
            Threshold::for_metric(DistanceMetric::Haversine, 1500.0).unit(),
            DistanceUnit::Kilometers
        );
        assert_eq!(Threshold::Degrees(2.5).to_string(), "2.5 deg");
    }

    #[test]
    fn test_threshold_from_str_requires_unit() {
        assert_eq!("1500km".parse::<Threshold>(), Ok(Threshold::Kilometers(1500.0)));
        assert_eq!("1500 km".parse::<Threshold>(), Ok(Threshold::Kilometers(1500.0)));
        assert_eq!("15deg".parse::<Threshold>(), Ok(Threshold::Degrees(15.0)));
        assert_eq!("2.5°".parse::<Threshold>(), Ok(Threshold::Degrees(2.5)));
        assert_eq!(
            Threshold::Degrees(2.5).to_string().parse::<Threshold>(),
            Ok(Threshold::Degrees(2.5))
        );
        assert!("1500".parse::<Threshold>().is_err());
        assert!("15 miles".parse::<Threshold>().is_err());
        assert!("km".parse::<Threshold>().is_err());
    }

    #[test]
    fn test_threshold_serde_is_tagged() {
        let threshold: Threshold =
            serde_json::from_str(r#"{ "unit": "kilometers", "value": 1500.0 }"#).unwrap();
        assert_eq!(threshold, Threshold::Kilometers(1500.0));
        assert!(serde_json::from_str::<Threshold>("1500.0").is_err());
    }

    #[test]
    fn test_planar_search_radius_bounds_great_circle() {
        let a = at(60.0, 10.0);
        let b = at(62.0, 14.0);
        let planar = planar_degrees(&a, &b);
        let radius = DistanceMetric::Planar.search_radius_km(planar);
        assert!(haversine_km(&a, &b) <= radius);
    }

    #[test]
    fn test_metric_from_str() {
        assert_eq!("planar".parse::<DistanceMetric>(), Ok(DistanceMetric::Planar));
        assert_eq!("Haversine".parse::<DistanceMetric>(), Ok(DistanceMetric::Haversine));
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn distances_are_symmetric(
                lat_a in -90.0f64..=90.0,
                lon_a in -180.0f64..=180.0,
                lat_b in -90.0f64..=90.0,
                lon_b in -180.0f64..=180.0,
            ) {
                let a = at(lat_a, lon_a);
                let b = at(lat_b, lon_b);
                for metric in [DistanceMetric::Planar, DistanceMetric::Haversine] {
                    let ab = metric.distance(&a, &b);
                    let ba = metric.distance(&b, &a);
                    prop_assert!(ab >= 0.0);
                    prop_assert_eq!(ab, ba, "{}", metric);
                }
            }
        }
    }
}
