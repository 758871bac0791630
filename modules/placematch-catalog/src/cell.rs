//! Geohash bucketing for the geo dedup prefilter.
//!
//! Venues with coordinates are indexed by their precision-6 geohash cell
//! (≈1.2 km × 0.6 km). A probe point queries its own cell plus the eight
//! neighbors, which is a strict superset of any 50 m radius around the
//! probe, so the prefilter can never change match outcomes versus a full
//! scan.

use geohash::Coord;

/// Geohash precision used for venue cells.
pub const CELL_PRECISION: usize = 6;

/// Cell for a venue's coordinates, stored on the row at write time.
pub fn cell_for(lat: f64, lng: f64) -> Option<String> {
    geohash::encode(Coord { x: lng, y: lat }, CELL_PRECISION).ok()
}

/// The probe cell and its eight neighbors, for candidate queries.
pub fn probe_cells(lat: f64, lng: f64) -> Vec<String> {
    let Some(center) = cell_for(lat, lng) else {
        return Vec::new();
    };
    let mut cells = Vec::with_capacity(9);
    if let Ok(n) = geohash::neighbors(&center) {
        cells.extend([n.sw, n.s, n.se, n.w, n.e, n.nw, n.n, n.ne]);
    }
    cells.push(center);
    cells
}
