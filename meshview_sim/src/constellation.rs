//! Walker-delta shells of circular orbits.
//!
//! Positions are computed analytically, so any instant can be sampled without
//! stepping: plane `p` has its ascending node at `raan_offset + 360° · p / P`,
//! satellite `s` sits at argument of latitude
//! `360° · s / S + 360° · f · p / (P · S) + n · t`.

use chrono::{DateTime, Utc};
use meshview_core::propagation::{ecef_to_geodetic, teme_to_ecef};
use meshview_core::Position;
use nalgebra::Vector3;
use std::f64::consts::TAU;

/// Standard gravitational parameter of Earth (km³/s²)
pub const EARTH_MU: f64 = 398_600.4418;
/// Radius used for the orbit size (km)
pub const EARTH_RADIUS_KM: f64 = 6378.137;

/// One Walker-delta shell `i: T/P/f`.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkerShell {
    /// Prefix for satellite names
    pub name: String,

    pub planes: usize,
    pub sats_per_plane: usize,

    /// Relative phasing `f` between adjacent planes
    pub phasing: usize,

    pub inclination_deg: f64,
    pub altitude_km: f64,

    /// RAAN of plane 0 (degrees)
    pub raan_offset_deg: f64,

    /// Instant at which satellite 0 of plane 0 crosses its ascending node
    pub epoch: DateTime<Utc>,
}

impl WalkerShell {
    pub fn new(
        name: impl Into<String>,
        planes: usize,
        sats_per_plane: usize,
        inclination_deg: f64,
        altitude_km: f64,
        epoch: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            planes,
            sats_per_plane,
            phasing: 1,
            inclination_deg,
            altitude_km,
            raan_offset_deg: 0.0,
            epoch,
        }
    }

    pub fn with_raan_offset(mut self, degrees: f64) -> Self {
        self.raan_offset_deg = degrees;
        self
    }

    pub fn total(&self) -> usize {
        self.planes * self.sats_per_plane
    }

    /// Orbital period in seconds.
    pub fn period_secs(&self) -> f64 {
        let a = EARTH_RADIUS_KM + self.altitude_km;
        TAU * (a.powi(3) / EARTH_MU).sqrt()
    }

    /// Inertial position (km) of satellite `sat` of plane `plane`, `t` seconds after epoch.
    fn inertial(&self, plane: usize, sat: usize, t: f64) -> Vector3<f64> {
        let r = EARTH_RADIUS_KM + self.altitude_km;
        let mean_motion = TAU / self.period_secs();
        let inc = self.inclination_deg.to_radians();
        let raan = self.raan_offset_deg.to_radians() + TAU * plane as f64 / self.planes as f64;
        let phase = TAU * (self.phasing * plane) as f64 / self.total() as f64;
        let u = TAU * sat as f64 / self.sats_per_plane as f64 + phase + mean_motion * t;

        let (su, cu) = u.sin_cos();
        let (sr, cr) = raan.sin_cos();
        let (si, ci) = inc.sin_cos();
        Vector3::new(
            r * (cu * cr - su * ci * sr),
            r * (cu * sr + su * ci * cr),
            r * su * si,
        )
    }

    /// Sub-satellite positions of the whole shell at `instant`.
    pub fn positions(&self, instant: DateTime<Utc>) -> Vec<Position> {
        if self.planes == 0 || self.sats_per_plane == 0 {
            return Vec::new();
        }

        let t = (instant - self.epoch).num_milliseconds() as f64 / 1000.0;
        let mut positions = Vec::with_capacity(self.total());

        for plane in 0..self.planes {
            for sat in 0..self.sats_per_plane {
                let ecef = teme_to_ecef(self.inertial(plane, sat, t), instant);
                let (lat, lon, alt) = ecef_to_geodetic(ecef);
                let name = format!("{}-P{:02}-S{:02}", self.name, plane, sat);
                // Geodetic output is always in range
                if let Ok(position) = Position::new(name, lat, lon, alt) {
                    positions.push(position);
                }
            }
        }
        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn shell() -> WalkerShell {
        let epoch = DateTime::from_timestamp(1_704_067_200, 0).unwrap();
        WalkerShell::new("TEST", 6, 8, 53.0, 550.0, epoch)
    }

    #[test]
    fn test_shell_size_and_names() {
        let shell = shell();
        let positions = shell.positions(shell.epoch);

        assert_eq!(positions.len(), 48);
        assert_eq!(positions[0].name, "TEST-P00-S00");
        assert_eq!(positions[47].name, "TEST-P05-S07");
    }

    #[test]
    fn test_latitude_bounded_by_inclination() {
        let shell = shell();
        for minutes in [0, 17, 45, 90] {
            for position in shell.positions(shell.epoch + Duration::minutes(minutes)) {
                assert!(position.latitude.abs() <= 53.3, "{:?}", position);
                // Sphere orbit over the ellipsoid: 550 km ± flattening
                assert!((540.0..575.0).contains(&position.altitude_km), "{:?}", position);
            }
        }
    }

    #[test]
    fn test_period_low_earth_orbit() {
        let minutes = shell().period_secs() / 60.0;
        assert!((95.0..96.5).contains(&minutes));
    }

    #[test]
    fn test_positions_move_over_time() {
        let shell = shell();
        let a = shell.positions(shell.epoch);
        let b = shell.positions(shell.epoch + Duration::seconds(60));
        assert_ne!(a[0], b[0]);
    }

    #[test]
    fn test_empty_shell() {
        let mut shell = shell();
        shell.planes = 0;
        assert!(shell.positions(shell.epoch).is_empty());
    }

    mod bounds {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn latitude_never_exceeds_inclination(
                planes in 1usize..8,
                sats in 1usize..10,
                inclination in 0.0f64..90.0,
                altitude in 300.0f64..2000.0,
                seconds in 0i64..86_400,
            ) {
                let epoch = DateTime::from_timestamp(1_704_067_200, 0).unwrap();
                let shell = WalkerShell::new("P", planes, sats, inclination, altitude, epoch);
                let positions = shell.positions(epoch + Duration::seconds(seconds));

                prop_assert_eq!(positions.len(), planes * sats);
                for position in positions {
                    // Geodetic latitude runs up to ~0.2° above the geocentric one
                    prop_assert!(position.latitude.abs() <= inclination + 0.25);
                }
            }
        }
    }
}
