//! WKB geometry codec.
//!
//! Parses well-known-binary values into a closed geometry variant and
//! exposes the vertex views the cell resolver needs. The indexed column
//! stores WKB as opaque bytes; this module is the only place those bytes
//! are interpreted.
//!
//! Coordinates follow the column convention: the WKB `x` ordinate is
//! latitude and `y` is longitude.

use crate::error::{GeoIndexError, Result};
use geo_traits::to_geo::ToGeoGeometry;
use wkb::reader::read_wkb;
use wkb::writer::{write_geometry, WriteOptions};
use wkb::Endianness;

/// A parsed geometry value.
///
/// Closed variant: the index supports exactly these three shapes. Anything
/// else in the column is rejected at parse time.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(geo_types::Point<f64>),
    LineString(geo_types::LineString<f64>),
    Polygon(geo_types::Polygon<f64>),
}

impl Geometry {
    /// All vertices of the geometry as `(lat, lng)` pairs.
    ///
    /// For polygons this includes interior-ring vertices; the resolver
    /// only seeds from the exterior ring but coverage checks span all of
    /// them.
    pub fn vertices(&self) -> Vec<(f64, f64)> {
        match self {
            Geometry::Point(p) => vec![(p.x(), p.y())],
            Geometry::LineString(line) => line.coords().map(|c| (c.x, c.y)).collect(),
            Geometry::Polygon(poly) => {
                let mut out: Vec<(f64, f64)> =
                    poly.exterior().coords().map(|c| (c.x, c.y)).collect();
                for ring in poly.interiors() {
                    out.extend(ring.coords().map(|c| (c.x, c.y)));
                }
                out
            }
        }
    }

    /// Exterior ring of a polygon as `(lat, lng)` pairs; the variant name
    /// otherwise.
    pub fn exterior_ring(&self) -> Option<Vec<(f64, f64)>> {
        match self {
            Geometry::Polygon(poly) => {
                Some(poly.exterior().coords().map(|c| (c.x, c.y)).collect())
            }
            _ => None,
        }
    }

    /// Short type name, used in errors and logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "point",
            Geometry::LineString(_) => "linestring",
            Geometry::Polygon(_) => "polygon",
        }
    }
}

impl From<Geometry> for geo_types::Geometry<f64> {
    fn from(value: Geometry) -> Self {
        match value {
            Geometry::Point(p) => geo_types::Geometry::Point(p),
            Geometry::LineString(l) => geo_types::Geometry::LineString(l),
            Geometry::Polygon(p) => geo_types::Geometry::Polygon(p),
        }
    }
}

/// Parse a WKB byte string.
///
/// Empty input is the column's null sentinel and maps to `Ok(None)`.
/// Point, line-string, and polygon parse into their variants; every other
/// geometry type is `UnsupportedGeometry`. Malformed bytes are `Wkb`
/// errors.
pub fn parse_wkb(bytes: &[u8]) -> Result<Option<Geometry>> {
    if bytes.is_empty() {
        return Ok(None);
    }

    let wkb = read_wkb(bytes).map_err(|e| GeoIndexError::Wkb(e.to_string()))?;
    let geometry = wkb
        .try_to_geometry()
        .ok_or_else(|| GeoIndexError::Wkb("unsupported coordinate dimensions".to_string()))?;

    match geometry {
        geo_types::Geometry::Point(p) => Ok(Some(Geometry::Point(p))),
        geo_types::Geometry::LineString(l) => Ok(Some(Geometry::LineString(l))),
        geo_types::Geometry::Polygon(p) => Ok(Some(Geometry::Polygon(p))),
        other => Err(GeoIndexError::UnsupportedGeometry(format!("{other:?}"))),
    }
}

/// Encode a geometry as little-endian WKB.
pub fn write_wkb(geometry: &Geometry) -> Result<Vec<u8>> {
    let geometry: geo_types::Geometry<f64> = geometry.clone().into();
    let mut buf = Vec::new();
    write_geometry(
        &mut buf,
        &geometry,
        &WriteOptions {
            endianness: Endianness::LittleEndian,
        },
    )
    .map_err(|e| GeoIndexError::Wkb(e.to_string()))?;
    Ok(buf)
}

/// Parse WKB into a `geo-types` geometry for exact predicate evaluation.
///
/// Same acceptance rules as [`parse_wkb`]; returns `None` for the null
/// sentinel.
pub fn parse_wkb_exact(bytes: &[u8]) -> Result<Option<geo_types::Geometry<f64>>> {
    Ok(parse_wkb(bytes)?.map(Into::into))
}
