//! Plane geometry over latitude/longitude pairs.
//!
//! Region outlines are stored as open rings of `[lat, lon]` vertices. The
//! helpers here close those rings, derive a representative point for search
//! and display, and render the polygon filter used by building queries.

pub mod polygon;

use serde::{Deserialize, Serialize};

pub use polygon::{centroid, close_ring, polygon_filter};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GeometryError {
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
}

/// A point as `(latitude, longitude)` in degrees.
///
/// Serialized as a two-element array `[lat, lon]`, the layout regions are
/// stored in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

impl From<[f64; 2]> for LatLon {
    fn from([lat, lon]: [f64; 2]) -> Self {
        Self { lat, lon }
    }
}

impl From<LatLon> for [f64; 2] {
    fn from(p: LatLon) -> Self {
        [p.lat, p.lon]
    }
}
