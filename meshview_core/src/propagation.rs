//! Orbit propagation to sub-satellite geodetic positions.
//!
//! SGP4 yields a TEME position; a GMST rotation about the z axis brings it
//! into an Earth-fixed frame, and an iterative WGS-84 inversion gives
//! latitude, longitude and height.

use chrono::{DateTime, Utc};
use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

use crate::snapshot::{GeoError, Position};
use crate::tle::TleRecord;

pub const SECONDS_PER_DAY: f64 = 86400.0;
pub const DAYS_PER_JULIAN_CENTURY: f64 = 36525.0;
pub const GMST_BASE_DEG: f64 = 280.46061837;
pub const GMST_ROTATION_PER_DAY: f64 = 360.98564736629;
pub const GMST_CORRECTION: f64 = 0.000387933;

/// WGS-84 equatorial radius (km)
pub const WGS84_A_KM: f64 = 6378.137;
/// WGS-84 flattening
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// Why a record produced no position.
#[derive(Debug, Error)]
pub enum PropagationError {
    #[error("{name}: cannot express instant relative to epoch: {reason}")]
    Epoch { name: String, reason: String },

    #[error("{name}: SGP4 failed: {reason}")]
    Sgp4 { name: String, reason: String },

    #[error(transparent)]
    Domain(#[from] GeoError),
}

/// Greenwich Mean Sidereal Time in radians.
pub fn greenwich_mean_sidereal_time(instant: DateTime<Utc>) -> f64 {
    let j2000 = DateTime::from_timestamp(946_728_000, 0).unwrap_or_default();
    let days_since_j2000 =
        (instant - j2000).num_milliseconds() as f64 / (1000.0 * SECONDS_PER_DAY);
    let centuries = days_since_j2000 / DAYS_PER_JULIAN_CENTURY;
    let gmst_degrees = GMST_BASE_DEG
        + GMST_ROTATION_PER_DAY * days_since_j2000
        + GMST_CORRECTION * centuries * centuries
        - centuries * centuries * centuries / 38710000.0;
    gmst_degrees.rem_euclid(360.0).to_radians()
}

/// Rotates a TEME vector into the Earth-fixed frame at `instant`.
pub fn teme_to_ecef(teme: Vector3<f64>, instant: DateTime<Utc>) -> Vector3<f64> {
    let theta = greenwich_mean_sidereal_time(instant);
    let (s, c) = theta.sin_cos();
    #[rustfmt::skip]
    let rotation = Matrix3::new(
         c,   s,   0.0,
        -s,   c,   0.0,
         0.0, 0.0, 1.0,
    );
    rotation * teme
}

/// Converts an Earth-fixed vector (km) to (latitude°, longitude°, height km).
pub fn ecef_to_geodetic(ecef: Vector3<f64>) -> (f64, f64, f64) {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let b = WGS84_A_KM * (1.0 - WGS84_F);
    let p = (ecef.x * ecef.x + ecef.y * ecef.y).sqrt();
    let longitude = ecef.y.atan2(ecef.x);

    if p < 1e-9 {
        let latitude = if ecef.z >= 0.0 { 90.0 } else { -90.0 };
        return (latitude, longitude.to_degrees(), ecef.z.abs() - b);
    }

    let mut latitude = ecef.z.atan2(p * (1.0 - e2));
    let mut height = 0.0;
    for _ in 0..6 {
        let sin_lat = latitude.sin();
        let n = WGS84_A_KM / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        height = p / latitude.cos() - n;
        latitude = ecef.z.atan2(p * (1.0 - e2 * n / (n + height)));
    }

    (latitude.to_degrees(), longitude.to_degrees(), height)
}

/// SGP4-backed propagator.
///
/// Constructed once and reused for every record and every tick.
#[derive(Debug, Clone, Default)]
pub struct Propagator;

impl Propagator {
    pub fn new() -> Self {
        Self
    }

    /// Earth-fixed position (km) of `record` at `instant`.
    pub fn ecef(&self, record: &TleRecord, instant: DateTime<Utc>) -> Result<Vector3<f64>, PropagationError> {
        let minutes = record
            .elements
            .datetime_to_minutes_since_epoch(&instant.naive_utc())
            .map_err(|e| PropagationError::Epoch {
                name: record.name.clone(),
                reason: format!("{:?}", e),
            })?;

        let prediction = record
            .constants
            .propagate(minutes)
            .map_err(|e| PropagationError::Sgp4 {
                name: record.name.clone(),
                reason: e.to_string(),
            })?;

        Ok(teme_to_ecef(Vector3::from(prediction.position), instant))
    }

    /// Validated sub-satellite position of `record` at `instant`.
    pub fn position(&self, record: &TleRecord, instant: DateTime<Utc>) -> Result<Position, PropagationError> {
        let (latitude, longitude, altitude_km) = ecef_to_geodetic(self.ecef(record, instant)?);
        Ok(Position::new(record.name.clone(), latitude, longitude, altitude_km)?)
    }
}
