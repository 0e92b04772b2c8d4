//! Cell calculus: a thin façade over the hexagonal hierarchical grid.
//!
//! Every operation here is pure. Failures reported by the backing library
//! (out-of-range coordinates, degenerate polygons) surface as
//! `CellCalculus` errors; resolution misuse surfaces as
//! `InvalidResolution`.

use crate::error::{GeoIndexError, Result};
use h3o::geom::{PolyfillConfig, Polygon as CellPolygon, ToCells};
use h3o::{CellIndex, LatLng, Resolution};

/// Convert a raw `[0, 15]` value into a grid resolution.
pub fn resolution_from_u8(value: u8) -> Result<Resolution> {
    Resolution::try_from(value)
        .map_err(|_| GeoIndexError::InvalidResolution(format!("{value} is outside [0, 15]")))
}

/// Cell containing the given geographic point at the given resolution.
pub fn latlng_to_cell(lat: f64, lng: f64, resolution: Resolution) -> Result<CellIndex> {
    let coord = LatLng::new(lat, lng)
        .map_err(|e| GeoIndexError::CellCalculus(format!("({lat}, {lng}): {e}")))?;
    Ok(coord.to_cell(resolution))
}

/// Ancestor of `cell` at `resolution`.
///
/// `resolution` must be at or above the cell's own; asking for a finer
/// "parent" is an `InvalidResolution` error.
pub fn cell_to_parent(cell: CellIndex, resolution: Resolution) -> Result<CellIndex> {
    if resolution == cell.resolution() {
        return Ok(cell);
    }
    cell.parent(resolution).ok_or_else(|| {
        GeoIndexError::InvalidResolution(format!(
            "no parent at resolution {resolution} for cell at resolution {}",
            cell.resolution()
        ))
    })
}

/// Descendants of `cell` at `resolution`, finer than the cell's own.
///
/// The iterator is lazy; callers sweeping deep resolution gaps must not
/// collect it.
pub fn cell_to_children(
    cell: CellIndex,
    resolution: Resolution,
) -> impl Iterator<Item = CellIndex> {
    cell.children(resolution)
}

/// Number of descendants of `cell` at `resolution`.
pub fn cell_to_children_count(cell: CellIndex, resolution: Resolution) -> u64 {
    cell.children_count(resolution)
}

/// All cells at `resolution` whose center lies inside the polygon ring.
///
/// `ring` is an exterior ring of `(lat, lng)` vertices; holes are not
/// subtracted. Returns the empty set when no cell center falls inside.
pub fn polygon_to_cells(ring: &[(f64, f64)], resolution: Resolution) -> Result<Vec<CellIndex>> {
    let exterior: Vec<(f64, f64)> = ring.iter().map(|&(lat, lng)| (lng, lat)).collect();
    let polygon = geo_types::Polygon::new(geo_types::LineString::from(exterior), vec![]);

    let polygon = CellPolygon::from_degrees(polygon)
        .map_err(|e| GeoIndexError::CellCalculus(e.to_string()))?;
    Ok(polygon.to_cells(PolyfillConfig::new(resolution)).collect())
}

/// Whether the raw 64-bit value names a valid cell.
pub fn is_valid_cell(raw: u64) -> bool {
    CellIndex::try_from(raw).is_ok()
}

/// Resolution carried by the cell identifier.
pub fn cell_resolution(cell: CellIndex) -> Resolution {
    cell.resolution()
}
