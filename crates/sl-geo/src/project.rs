//! Oblique stereographic projection about a fixed center.
//!
//! Conformal spherical projection (the `+proj=sterea +units=km` analog) used
//! for all local distance geometry. The forward/inverse pair is analytic, so
//! round-trips are exact up to floating-point noise; callers that need area-
//! of-interest filtering do it themselves.
//!
//! The planar frame is session-scoped: coordinates produced with one center
//! are meaningless under another.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers (spherical model).
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Stateless projector fixed to one geographic center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projector {
    lon0_rad: f64,
    lat0_rad: f64,
}

impl Projector {
    /// Create a projector centered at `(lon0, lat0)` in degrees.
    pub fn new(lon0_deg: f64, lat0_deg: f64) -> Self {
        debug_assert!(lon0_deg.is_finite() && lat0_deg.is_finite());
        Projector {
            lon0_rad: lon0_deg.to_radians(),
            lat0_rad: lat0_deg.to_radians(),
        }
    }

    /// Geographic degrees to local planar kilometers.
    pub fn to_local(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        debug_assert!(lon_deg.is_finite() && lat_deg.is_finite());
        let lon = lon_deg.to_radians();
        let lat = lat_deg.to_radians();
        let dlon = lon - self.lon0_rad;

        let cos_c = self.lat0_rad.sin() * lat.sin() + self.lat0_rad.cos() * lat.cos() * dlon.cos();
        let k = 2.0 * EARTH_RADIUS_KM / (1.0 + cos_c);
        let x = k * lat.cos() * dlon.sin();
        let y = k
            * (self.lat0_rad.cos() * lat.sin() - self.lat0_rad.sin() * lat.cos() * dlon.cos());
        (x, y)
    }

    /// Local planar kilometers back to geographic degrees.
    pub fn to_geo(&self, x_km: f64, y_km: f64) -> (f64, f64) {
        debug_assert!(x_km.is_finite() && y_km.is_finite());
        let rho = (x_km * x_km + y_km * y_km).sqrt();
        if rho == 0.0 {
            return (self.lon0_rad.to_degrees(), self.lat0_rad.to_degrees());
        }
        let c = 2.0 * (rho / (2.0 * EARTH_RADIUS_KM)).atan();

        let lat = (c.cos() * self.lat0_rad.sin() + y_km * c.sin() * self.lat0_rad.cos() / rho)
            .asin();
        let lon = self.lon0_rad
            + (x_km * c.sin())
                .atan2(rho * self.lat0_rad.cos() * c.cos() - y_km * self.lat0_rad.sin() * c.sin());
        (lon.to_degrees(), lat.to_degrees())
    }
}
