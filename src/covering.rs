//! Representative-cell resolution.
//!
//! Maps a geometry to the single coarsest cell at resolution `<= R` that
//! conservatively covers it: seed a cell set at resolution `R`, then climb
//! the hierarchy, replacing the set with its parents, until one cell
//! remains.
//!
//! Polygons seed from the exterior-ring covering *plus* the ring vertices:
//! centroid-mode covering alone misses slivers narrower than a cell (the
//! seed set would be empty) and can exclude vertices near the boundary,
//! and the returned cell must cover every vertex.

use crate::cell;
use crate::error::{GeoIndexError, Result};
use crate::geometry::Geometry;
use h3o::{CellIndex, Resolution};
use rustc_hash::FxHashSet;

/// Resolve the representative cell of `geometry` at maximum resolution
/// `max_resolution`.
///
/// The result is deterministic for identical inputs. Degenerate
/// geometries with no vertices are reported as `Wkb` errors so the build
/// pipeline can fold them into the null rows.
pub fn representative_cell(geometry: &Geometry, max_resolution: Resolution) -> Result<CellIndex> {
    match geometry {
        Geometry::Point(point) => cell::latlng_to_cell(point.x(), point.y(), max_resolution),
        Geometry::LineString(line) => {
            let mut seeds = FxHashSet::default();
            for coord in line.coords() {
                seeds.insert(cell::latlng_to_cell(coord.x, coord.y, max_resolution)?);
            }
            climb(seeds, geometry)
        }
        Geometry::Polygon(poly) => {
            let ring: Vec<(f64, f64)> = poly.exterior().coords().map(|c| (c.x, c.y)).collect();
            let mut seeds: FxHashSet<CellIndex> = cell::polygon_to_cells(&ring, max_resolution)?
                .into_iter()
                .collect();
            for &(lat, lng) in &ring {
                seeds.insert(cell::latlng_to_cell(lat, lng, max_resolution)?);
            }
            climb(seeds, geometry)
        }
    }
}

/// Climb the hierarchy until a single covering cell remains.
///
/// Stops at resolution 0: cells under distinct base cells have no common
/// ancestor, so a geometry straddling a base-cell boundary anchors to the
/// numerically smallest base cell instead.
fn climb(mut cells: FxHashSet<CellIndex>, geometry: &Geometry) -> Result<CellIndex> {
    if cells.is_empty() {
        return Err(GeoIndexError::Wkb(format!(
            "{} has no vertices",
            geometry.type_name()
        )));
    }

    while cells.len() > 1 {
        let resolution = cells
            .iter()
            .map(|c| c.resolution())
            .max()
            .unwrap_or(Resolution::Zero);
        let Some(coarser) = resolution.pred() else {
            return cells.into_iter().min().ok_or_else(|| {
                GeoIndexError::CellCalculus("covering set drained during climb".to_string())
            });
        };

        let mut parents = FxHashSet::default();
        for cell_id in cells {
            parents.insert(cell::cell_to_parent(cell_id, coarser)?);
        }
        cells = parents;
    }

    cells
        .into_iter()
        .next()
        .ok_or_else(|| GeoIndexError::CellCalculus("covering set drained during climb".to_string()))
}
