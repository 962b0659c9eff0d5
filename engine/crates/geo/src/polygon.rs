use std::collections::BTreeSet;

use crate::{GeometryError, LatLon};

/// Relative area below which a ring counts as collinear.
const DEGENERATE_AREA_RATIO: f64 = 1e-12;

/// Return the ring with its first vertex appended, unless it is already closed.
pub fn close_ring(vertices: &[LatLon]) -> Vec<LatLon> {
    let mut ring = vertices.to_vec();
    if let (Some(first), Some(last)) = (vertices.first(), vertices.last()) {
        if vertices.len() > 1 && first != last {
            ring.push(*first);
        }
    }
    ring
}

/// Area-weighted centroid (center of mass) of the polygon outlined by `vertices`.
///
/// The ring is closed automatically. Coordinates are shifted to the first
/// vertex before the shoelace sums so large absolute coordinates do not eat
/// precision.
pub fn centroid(vertices: &[LatLon]) -> Result<LatLon, GeometryError> {
    if let Some(bad) = vertices.iter().find(|v| !v.is_finite()) {
        return Err(GeometryError::InvalidGeometry(format!(
            "non-finite vertex ({}, {})",
            bad.lat, bad.lon
        )));
    }

    let distinct: BTreeSet<(u64, u64)> = vertices
        .iter()
        .map(|v| (v.lat.to_bits(), v.lon.to_bits()))
        .collect();
    if distinct.len() < 3 {
        return Err(GeometryError::InvalidGeometry(format!(
            "polygon needs at least 3 distinct vertices, got {}",
            distinct.len()
        )));
    }

    let ring = close_ring(vertices);
    let origin = ring[0];

    let mut twice_area = 0.0;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut extent: f64 = 0.0;

    for pair in ring.windows(2) {
        let (x0, y0) = (pair[0].lat - origin.lat, pair[0].lon - origin.lon);
        let (x1, y1) = (pair[1].lat - origin.lat, pair[1].lon - origin.lon);
        let cross = x0 * y1 - x1 * y0;
        twice_area += cross;
        sum_x += (x0 + x1) * cross;
        sum_y += (y0 + y1) * cross;
        extent = extent.max(x1.abs()).max(y1.abs());
    }

    if twice_area.abs() <= extent * extent * DEGENERATE_AREA_RATIO {
        return Err(GeometryError::InvalidGeometry(
            "polygon has zero area".to_string(),
        ));
    }

    // 6A == 3 * (2A)
    let lat = origin.lat + sum_x / (3.0 * twice_area);
    let lon = origin.lon + sum_y / (3.0 * twice_area);
    Ok(LatLon::new(lat, lon))
}

/// Space-separated `"lat lon"` pairs, the polygon filter format of the
/// building-count query.
pub fn polygon_filter(vertices: &[LatLon]) -> String {
    vertices
        .iter()
        .map(|v| format!("{} {}", v.lat, v.lon))
        .collect::<Vec<_>>()
        .join(" ")
}
