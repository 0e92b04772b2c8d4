//! Index core: the in-memory data model, build pipeline, and probes.
//!
//! The index maps every non-null row to a single representative cell and
//! keeps three structures: the inverted cell → row-offset map, the raw
//! WKB payloads by offset, and the null-offset set. Probes walk the cell
//! hierarchy around a query's representative cell to produce a
//! conservative candidate superset; `exec_geo_relations` refines that
//! superset with exact predicates.

use crate::cell;
use crate::config::{BuildConfig, LoadConfig};
use crate::covering::representative_cell;
use crate::error::{GeoIndexError, Result};
use crate::format::{self, RecordSet, INDEX_DATA_KEY, NULL_OFFSETS_KEY, NUM_ROWS_KEY};
use crate::geometry::parse_wkb;
use crate::loader::{FieldBatch, FieldDataLoader};
use crate::relation::{self, RelationOp};
use crate::slice;
use crate::storage::ObjectStore;
use h3o::{CellIndex, Resolution};
use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Index type tag reported to the schema layer.
pub const INDEX_TYPE: &str = "GEO_H3";

/// Geospatial scalar index over a WKB column segment.
///
/// Created from a [`BuildConfig`], populated exactly once by one of the
/// build entry points or by [`load`](Self::load), then probed any number
/// of times. No incremental mutation after build.
pub struct GeoH3Index {
    /// Maximum cell resolution, fixed at construction.
    max_resolution: Resolution,

    /// Inverted index: representative cell → row offsets, in insertion
    /// (ascending) order. Buckets are non-empty.
    index_data: FxHashMap<CellIndex, Vec<u32>>,

    /// Raw WKB payloads by row offset; null rows hold empty entries.
    raw_data: Vec<Vec<u8>>,

    /// Offsets of null rows, ascending.
    null_offsets: Vec<u32>,

    /// Number of rows ingested at build time.
    total_num_rows: usize,

    /// Probe gate; set only by a completed build or load.
    is_built: bool,
}

impl GeoH3Index {
    /// Create an empty, unbuilt index.
    pub fn new(config: &BuildConfig) -> Result<Self> {
        config.validate()?;
        let max_resolution = cell::resolution_from_u8(config.resolution)?;
        Ok(Self {
            max_resolution,
            index_data: FxHashMap::default(),
            raw_data: Vec::new(),
            null_offsets: Vec::new(),
            total_num_rows: 0,
            is_built: false,
        })
    }

    /// Maximum resolution the index was configured with.
    pub fn max_resolution(&self) -> Resolution {
        self.max_resolution
    }

    /// Whether the index has been built or loaded.
    pub fn is_built(&self) -> bool {
        self.is_built
    }

    /// Number of distinct cells in the inverted index.
    pub fn cardinality(&self) -> usize {
        self.index_data.len()
    }

    /// Number of indexed rows.
    pub fn count(&self) -> usize {
        self.total_num_rows
    }

    /// Alias of [`count`](Self::count), kept for the scalar-index surface.
    pub fn size(&self) -> usize {
        self.count()
    }

    /// The index retains raw payloads for point lookup.
    pub fn has_raw_data(&self) -> bool {
        true
    }

    fn ensure_built(&self) -> Result<()> {
        if self.is_built {
            Ok(())
        } else {
            Err(GeoIndexError::NotBuilt)
        }
    }

    // ------------------------------------------------------------------
    // Build
    // ------------------------------------------------------------------

    /// Build from an ordered sequence of WKB values.
    ///
    /// Empty values become null rows, as do rows whose WKB fails to
    /// parse. Geometry types outside point/line-string/polygon abort the
    /// build and leave the index unbuilt and empty. A second call on a
    /// built index is a no-op.
    pub fn build(&mut self, values: &[Vec<u8>]) -> Result<()> {
        if self.is_built {
            return Ok(());
        }
        u32::try_from(values.len()).map_err(|_| {
            GeoIndexError::Config(format!("{} rows exceed 32-bit offsets", values.len()))
        })?;

        let mut index_data: FxHashMap<CellIndex, Vec<u32>> = FxHashMap::default();
        let mut raw_data: Vec<Vec<u8>> = Vec::with_capacity(values.len());
        let mut null_offsets: Vec<u32> = Vec::new();

        for (offset, value) in values.iter().enumerate() {
            let offset = offset as u32;
            let geometry = match parse_wkb(value) {
                Ok(Some(geometry)) => geometry,
                Ok(None) => {
                    null_offsets.push(offset);
                    raw_data.push(Vec::new());
                    continue;
                }
                Err(e @ GeoIndexError::Wkb(_)) => {
                    tracing::warn!(offset, error = %e, "malformed WKB row treated as null");
                    null_offsets.push(offset);
                    raw_data.push(Vec::new());
                    continue;
                }
                Err(e) => return Err(e),
            };

            match representative_cell(&geometry, self.max_resolution) {
                Ok(cell_id) => {
                    index_data.entry(cell_id).or_default().push(offset);
                    raw_data.push(value.clone());
                }
                Err(e @ GeoIndexError::Wkb(_)) => {
                    tracing::warn!(offset, error = %e, "degenerate geometry treated as null");
                    null_offsets.push(offset);
                    raw_data.push(Vec::new());
                }
                Err(e) => return Err(e),
            }
        }

        self.index_data = index_data;
        self.raw_data = raw_data;
        self.null_offsets = null_offsets;
        self.total_num_rows = values.len();
        self.is_built = true;
        tracing::info!(
            cardinality = self.index_data.len(),
            num_rows = self.total_num_rows,
            resolution = u8::from(self.max_resolution),
            "built geospatial index"
        );
        Ok(())
    }

    /// Build from loaded field-data batches, folding the validity mask
    /// into null rows.
    pub fn build_with_field_data(&mut self, batches: &[FieldBatch]) -> Result<()> {
        if self.is_built {
            return Ok(());
        }

        let total: usize = batches.iter().map(|b| b.values.len()).sum();
        let mut values = Vec::with_capacity(total);
        for batch in batches {
            if batch.values.len() != batch.valid.len() {
                return Err(GeoIndexError::Config(format!(
                    "batch has {} values but {} validity flags",
                    batch.values.len(),
                    batch.valid.len()
                )));
            }
            for (value, &valid) in batch.values.iter().zip(&batch.valid) {
                values.push(if valid { value.clone() } else { Vec::new() });
            }
        }
        self.build(&values)
    }

    /// Build by draining the insert files named in `config` through the
    /// field-data loader.
    pub async fn build_from_config(
        &mut self,
        loader: &dyn FieldDataLoader,
        config: &BuildConfig,
    ) -> Result<()> {
        if self.is_built {
            return Ok(());
        }
        if config.insert_files.is_empty() {
            return Err(GeoIndexError::Config(
                "insert file paths are empty".to_string(),
            ));
        }
        let batches = loader.load(&config.insert_files).await?;
        self.build_with_field_data(&batches)
    }

    // ------------------------------------------------------------------
    // Probes
    // ------------------------------------------------------------------

    /// Rows whose representative cell lies on the hierarchical path of
    /// any query geometry's representative cell.
    ///
    /// The result is a conservative superset: every truly overlapping row
    /// is present, false positives are the caller's to refine. Queries
    /// that fail to parse, or whose geometry type is unsupported, are
    /// skipped and logged.
    pub fn is_in(&self, queries: &[Vec<u8>]) -> Result<RoaringBitmap> {
        self.ensure_built()?;
        let mut out = RoaringBitmap::new();
        for (position, query) in queries.iter().enumerate() {
            let Some(rep) = self.query_representative(position, query)? else {
                continue;
            };
            self.collect_hierarchy(rep, &mut out)?;
        }
        Ok(out)
    }

    /// Complement of [`is_in`](Self::is_in) over the row range, with null
    /// rows cleared: an unknown geometry matches nothing on either side.
    pub fn not_in(&self, queries: &[Vec<u8>]) -> Result<RoaringBitmap> {
        let matched = self.is_in(queries)?;
        let mut out = RoaringBitmap::new();
        if self.total_num_rows > 0 {
            out.insert_range(0..self.total_num_rows as u32);
        }
        out -= &matched;
        for &offset in &self.null_offsets {
            out.remove(offset);
        }
        Ok(out)
    }

    /// Null rows.
    pub fn is_null(&self) -> Result<RoaringBitmap> {
        self.ensure_built()?;
        let mut out = RoaringBitmap::new();
        for &offset in &self.null_offsets {
            out.insert(offset);
        }
        Ok(out)
    }

    /// Non-null rows.
    pub fn is_not_null(&self) -> Result<RoaringBitmap> {
        self.ensure_built()?;
        let mut out = RoaringBitmap::new();
        if self.total_num_rows > 0 {
            out.insert_range(0..self.total_num_rows as u32);
        }
        for &offset in &self.null_offsets {
            out.remove(offset);
        }
        Ok(out)
    }

    /// Cell-level candidates refined by the exact relation predicate.
    ///
    /// A row is set iff some query satisfies `op(row, query)`. Null rows
    /// are never set.
    pub fn exec_geo_relations(
        &self,
        queries: &[Vec<u8>],
        op: RelationOp,
    ) -> Result<RoaringBitmap> {
        let candidates = self.is_in(queries)?;
        let mut out = RoaringBitmap::new();
        for offset in candidates.iter() {
            let row = self.raw_data[offset as usize].as_slice();
            for query in queries {
                match relation::evaluate(op, row, query) {
                    Ok(true) => {
                        out.insert(offset);
                        break;
                    }
                    Ok(false) => {}
                    Err(GeoIndexError::Wkb(_) | GeoIndexError::UnsupportedGeometry(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(out)
    }

    /// Geometry columns have no ordering; range probes are rejected.
    pub fn range(
        &self,
        _lower_bound: &[u8],
        _lb_inclusive: bool,
        _upper_bound: &[u8],
        _ub_inclusive: bool,
    ) -> Result<RoaringBitmap> {
        Err(GeoIndexError::NotImplemented(
            "geospatial data does not support range queries",
        ))
    }

    /// Raw WKB bytes of the row at `offset`, verbatim.
    pub fn reverse_lookup(&self, offset: u32) -> Result<&[u8]> {
        self.ensure_built()?;
        self.raw_data
            .get(offset as usize)
            .map(|v| v.as_slice())
            .ok_or(GeoIndexError::OutOfRange {
                offset,
                total: self.total_num_rows,
            })
    }

    fn query_representative(&self, position: usize, query: &[u8]) -> Result<Option<CellIndex>> {
        let geometry = match parse_wkb(query) {
            Ok(Some(geometry)) => geometry,
            Ok(None) => {
                tracing::warn!(position, "skipping null query geometry");
                return Ok(None);
            }
            Err(e @ (GeoIndexError::Wkb(_) | GeoIndexError::UnsupportedGeometry(_))) => {
                tracing::warn!(position, error = %e, "skipping unusable query geometry");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        match representative_cell(&geometry, self.max_resolution) {
            Ok(rep) => Ok(Some(rep)),
            Err(e @ GeoIndexError::Wkb(_)) => {
                tracing::warn!(position, error = %e, "skipping degenerate query geometry");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Union the buckets of every ancestor and descendant of `rep` into
    /// `out`.
    fn collect_hierarchy(&self, rep: CellIndex, out: &mut RoaringBitmap) -> Result<()> {
        let rep_res = u8::from(rep.resolution());

        // Own bucket, then every coarser ancestor down to resolution 0
        for r in (0..=rep_res).rev() {
            let resolution = cell::resolution_from_u8(r)?;
            let ancestor = cell::cell_to_parent(rep, resolution)?;
            if let Some(offsets) = self.index_data.get(&ancestor) {
                for &offset in offsets {
                    out.insert(offset);
                }
            }
        }

        // Descendant sweep to the index resolution. The child iterator is
        // lazy; a level is never materialized, whatever its count.
        let max = u8::from(self.max_resolution);
        for r in (rep_res + 1)..=max {
            let resolution = cell::resolution_from_u8(r)?;
            for child in cell::cell_to_children(rep, resolution) {
                if let Some(offsets) = self.index_data.get(&child) {
                    for &offset in offsets {
                        out.insert(offset);
                    }
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Serialize into the three-blob record set.
    pub fn serialize(&self) -> Result<RecordSet> {
        self.ensure_built()?;
        let mut records = RecordSet::new();
        records.insert(
            INDEX_DATA_KEY,
            format::encode_index_data(&self.index_data, &self.raw_data),
        );
        records.insert(
            NULL_OFFSETS_KEY,
            format::encode_null_offsets(&self.null_offsets),
        );
        records.insert(NUM_ROWS_KEY, format::encode_num_rows(self.total_num_rows));
        Ok(records)
    }

    /// Serialize, slice, and write the artifact under `path_prefix`.
    ///
    /// Returns the remote path of every written blob with its byte size.
    pub async fn upload(
        &self,
        store: &dyn ObjectStore,
        path_prefix: &str,
    ) -> Result<BTreeMap<String, u64>> {
        let mut records = self.serialize()?;
        slice::disassemble(&mut records, slice::DEFAULT_SLICE_SIZE)?;

        let mut sizes = BTreeMap::new();
        for (key, bytes) in records.iter() {
            let path = join_path(path_prefix, key);
            store.write(&path, bytes).await?;
            sizes.insert(path, bytes.len() as u64);
        }
        tracing::info!(
            prefix = path_prefix,
            blobs = sizes.len(),
            "uploaded geospatial index artifact"
        );
        Ok(sizes)
    }

    /// Load the artifact blobs named in `config` and rebuild the index
    /// state.
    ///
    /// The only code path that populates state from bytes; `is_built`
    /// becomes true only when all three required records decode. On any
    /// failure the previous state is untouched.
    pub async fn load(&mut self, store: &dyn ObjectStore, config: &LoadConfig) -> Result<()> {
        if config.index_files.is_empty() {
            return Err(GeoIndexError::Config(
                "index file paths are empty".to_string(),
            ));
        }

        let mut records = RecordSet::new();
        for path in &config.index_files {
            let bytes = store.read(path).await?;
            let key = path.rsplit('/').next().unwrap_or(path.as_str());
            records.insert(key, bytes);
        }
        slice::assemble(&mut records)?;
        self.apply_records(&records)
    }

    fn apply_records(&mut self, records: &RecordSet) -> Result<()> {
        let num_rows_bytes = records
            .get(NUM_ROWS_KEY)
            .ok_or_else(|| GeoIndexError::Format(format!("missing {NUM_ROWS_KEY} record")))?;
        let total_num_rows = format::decode_num_rows(num_rows_bytes)?;

        let null_bytes = records
            .get(NULL_OFFSETS_KEY)
            .ok_or_else(|| GeoIndexError::Format(format!("missing {NULL_OFFSETS_KEY} record")))?;
        let null_offsets = format::decode_null_offsets(null_bytes)?;
        if let Some(&bad) = null_offsets
            .iter()
            .find(|&&offset| offset as usize >= total_num_rows)
        {
            return Err(GeoIndexError::Format(format!(
                "null offset {bad} exceeds row count {total_num_rows}"
            )));
        }

        let index_bytes = records
            .get(INDEX_DATA_KEY)
            .ok_or_else(|| GeoIndexError::Format(format!("missing {INDEX_DATA_KEY} record")))?;
        let (index_data, raw_data) = format::decode_index_data(index_bytes, total_num_rows)?;

        self.index_data = index_data;
        self.raw_data = raw_data;
        self.null_offsets = null_offsets;
        self.total_num_rows = total_num_rows;
        self.is_built = true;
        tracing::info!(
            cardinality = self.index_data.len(),
            num_rows = self.total_num_rows,
            "loaded geospatial index"
        );
        Ok(())
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}/{key}", prefix.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{write_wkb, Geometry};
    use crate::loader::{encode_field_batch, WkbFileLoader};
    use crate::storage::MemoryObjectStore;
    use std::sync::Arc;

    fn point_wkb(lat: f64, lng: f64) -> Vec<u8> {
        write_wkb(&Geometry::Point(geo_types::Point::new(lat, lng))).unwrap()
    }

    fn line_wkb(vertices: &[(f64, f64)]) -> Vec<u8> {
        write_wkb(&Geometry::LineString(geo_types::LineString::from(
            vertices.to_vec(),
        )))
        .unwrap()
    }

    fn polygon_wkb(ring: &[(f64, f64)]) -> Vec<u8> {
        write_wkb(&Geometry::Polygon(geo_types::Polygon::new(
            geo_types::LineString::from(ring.to_vec()),
            vec![],
        )))
        .unwrap()
    }

    /// Five-row fixture: a point, a line-string, and a polygon around the
    /// same quad, plus two far-away points.
    fn fixture_rows() -> Vec<Vec<u8>> {
        let quad = [(3.0, 4.0), (4.0, 4.0), (4.0, 5.0), (3.0, 5.0)];
        let mut ring = quad.to_vec();
        ring.push(quad[0]);
        vec![
            point_wkb(3.0, 4.0),
            line_wkb(&quad),
            polygon_wkb(&ring),
            point_wkb(60.10, 40.10),
            point_wkb(-40.00, -30.20),
        ]
    }

    /// A query point and query polygon inside/near the fixture quad.
    fn fixture_queries() -> Vec<Vec<u8>> {
        vec![
            point_wkb(3.25, 3.75),
            polygon_wkb(&[
                (3.25, 3.75),
                (3.75, 3.75),
                (3.75, 4.25),
                (3.25, 4.25),
                (3.25, 3.75),
            ]),
        ]
    }

    fn built_index() -> GeoH3Index {
        let mut index = GeoH3Index::new(&BuildConfig::new(9).unwrap()).unwrap();
        index.build(&fixture_rows()).unwrap();
        index
    }

    #[test]
    fn test_probe_before_build_fails() {
        let index = GeoH3Index::new(&BuildConfig::default()).unwrap();
        assert!(matches!(
            index.is_in(&fixture_queries()).unwrap_err(),
            GeoIndexError::NotBuilt
        ));
        assert!(matches!(
            index.is_null().unwrap_err(),
            GeoIndexError::NotBuilt
        ));
        assert!(matches!(
            index.reverse_lookup(0).unwrap_err(),
            GeoIndexError::NotBuilt
        ));
    }

    #[test]
    fn test_build_is_idempotent() {
        let mut index = built_index();
        assert_eq!(index.count(), 5);

        // A second build is a no-op, whatever it is handed
        index.build(&[point_wkb(1.0, 1.0)]).unwrap();
        assert_eq!(index.count(), 5);
    }

    #[test]
    fn test_in_probe_matches_rows_sharing_cells() {
        let index = built_index();
        let matched = index.is_in(&fixture_queries()).unwrap();
        assert!(matched.contains(0));
        assert!(matched.contains(1));
        assert!(matched.contains(2));
        assert!(!matched.contains(3));
        assert!(!matched.contains(4));
    }

    #[test]
    fn test_not_in_is_the_complement() {
        let index = built_index();
        let excluded = index.not_in(&fixture_queries()).unwrap();
        assert!(!excluded.contains(0));
        assert!(!excluded.contains(1));
        assert!(!excluded.contains(2));
        assert!(excluded.contains(3));
        assert!(excluded.contains(4));
        assert_eq!(excluded.len(), 2);
    }

    #[test]
    fn test_exec_geo_relations_equals() {
        let index = built_index();
        let queries = vec![point_wkb(3.0, 4.0)];
        let matched = index.exec_geo_relations(&queries, RelationOp::Equals).unwrap();
        assert_eq!(matched.iter().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_exec_geo_relations_intersects() {
        let index = built_index();
        // The query polygon clips the quad's western edge but excludes
        // the corner point at (3, 4)
        let queries = vec![fixture_queries()[1].clone()];
        let matched = index
            .exec_geo_relations(&queries, RelationOp::Intersects)
            .unwrap();
        assert_eq!(matched.iter().collect::<Vec<_>>(), vec![1, 2]);

        // Soundness: every set bit satisfies the exact predicate
        for offset in matched.iter() {
            assert!(relation::evaluate(
                RelationOp::Intersects,
                index.reverse_lookup(offset).unwrap(),
                &queries[0]
            )
            .unwrap());
        }
    }

    #[test]
    fn test_is_null_all_valid() {
        let index = built_index();
        assert!(index.is_null().unwrap().is_empty());
        assert_eq!(index.is_not_null().unwrap().len(), 5);
    }

    #[test]
    fn test_null_mask_from_field_data() {
        let batch = FieldBatch {
            values: fixture_rows(),
            valid: vec![false, true, false, true, false],
        };
        let mut index = GeoH3Index::new(&BuildConfig::new(9).unwrap()).unwrap();
        index.build_with_field_data(&[batch]).unwrap();

        let nulls = index.is_null().unwrap();
        assert_eq!(nulls.iter().collect::<Vec<_>>(), vec![0, 2, 4]);
        let not_nulls = index.is_not_null().unwrap();
        assert_eq!(not_nulls.iter().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_null_rows_isolated_from_probes() {
        let batch = FieldBatch {
            values: fixture_rows(),
            valid: vec![false, true, false, true, false],
        };
        let mut index = GeoH3Index::new(&BuildConfig::new(9).unwrap()).unwrap();
        index.build_with_field_data(&[batch]).unwrap();

        let queries = fixture_queries();
        for bitmap in [
            index.is_in(&queries).unwrap(),
            index.not_in(&queries).unwrap(),
            index
                .exec_geo_relations(&queries, RelationOp::Intersects)
                .unwrap(),
        ] {
            for null_offset in [0u32, 2, 4] {
                assert!(!bitmap.contains(null_offset));
            }
        }
    }

    #[test]
    fn test_reverse_lookup_returns_exact_bytes() {
        let index = built_index();
        let rows = fixture_rows();
        for (offset, row) in rows.iter().enumerate() {
            assert_eq!(index.reverse_lookup(offset as u32).unwrap(), row.as_slice());
        }
        assert!(matches!(
            index.reverse_lookup(5).unwrap_err(),
            GeoIndexError::OutOfRange { offset: 5, total: 5 }
        ));
    }

    #[test]
    fn test_cardinality_and_count() {
        let index = built_index();
        assert_eq!(index.count(), 5);
        assert_eq!(index.size(), 5);
        assert!(index.has_raw_data());
        // The line and polygon around the same quad may or may not share
        // a representative cell
        assert!(index.cardinality() == 4 || index.cardinality() == 5);
    }

    #[test]
    fn test_range_rejected() {
        let index = built_index();
        assert!(matches!(
            index.range(&[], true, &[], true).unwrap_err(),
            GeoIndexError::NotImplemented(_)
        ));
    }

    #[test]
    fn test_malformed_row_becomes_null() {
        let mut index = GeoH3Index::new(&BuildConfig::new(9).unwrap()).unwrap();
        index
            .build(&[point_wkb(3.0, 4.0), vec![0xde, 0xad, 0xbe, 0xef]])
            .unwrap();
        assert_eq!(index.is_null().unwrap().iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_unsupported_row_aborts_build() {
        let multi = geo_types::Geometry::MultiPoint(geo_types::MultiPoint::from(vec![
            geo_types::Point::new(0.0, 0.0),
        ]));
        let mut bytes = Vec::new();
        wkb::writer::write_geometry(
            &mut bytes,
            &multi,
            &wkb::writer::WriteOptions {
                endianness: wkb::Endianness::LittleEndian,
            },
        )
        .unwrap();

        let mut index = GeoH3Index::new(&BuildConfig::new(9).unwrap()).unwrap();
        let err = index.build(&[point_wkb(3.0, 4.0), bytes]).unwrap_err();
        assert!(matches!(err, GeoIndexError::UnsupportedGeometry(_)));
        assert!(!index.is_built());
        assert_eq!(index.count(), 0);
    }

    #[test]
    fn test_malformed_query_skipped() {
        let index = built_index();
        let matched = index.is_in(&[vec![0x01, 0x02]]).unwrap();
        assert!(matched.is_empty());
    }

    #[test]
    fn test_partition_invariant() {
        let batch = FieldBatch {
            values: fixture_rows(),
            valid: vec![true, false, true, true, true],
        };
        let mut index = GeoH3Index::new(&BuildConfig::new(9).unwrap()).unwrap();
        index.build_with_field_data(&[batch]).unwrap();

        for offset in 0..index.count() as u32 {
            let in_nulls = index.null_offsets.contains(&offset);
            let bucket_hits: usize = index
                .index_data
                .values()
                .map(|bucket| bucket.iter().filter(|&&o| o == offset).count())
                .sum();
            assert_eq!(
                usize::from(!in_nulls),
                bucket_hits,
                "offset {offset} must be in exactly one of nulls or buckets"
            );
        }
    }

    #[test]
    fn test_coverage_invariant() {
        let index = built_index();
        let build_res = index.max_resolution();
        for (cell_id, bucket) in &index.index_data {
            assert!(u8::from(cell_id.resolution()) <= u8::from(build_res));
            for &offset in bucket {
                let geometry = parse_wkb(&index.raw_data[offset as usize])
                    .unwrap()
                    .unwrap();
                for (lat, lng) in geometry.vertices() {
                    let seed = cell::latlng_to_cell(lat, lng, build_res).unwrap();
                    assert_eq!(
                        cell::cell_to_parent(seed, cell_id.resolution()).unwrap(),
                        *cell_id,
                        "row {offset} vertex ({lat}, {lng}) escapes its cell"
                    );
                }
            }
        }
    }

    #[test]
    fn test_serialize_roundtrip() {
        let batch = FieldBatch {
            values: fixture_rows(),
            valid: vec![true, false, true, true, true],
        };
        let mut index = GeoH3Index::new(&BuildConfig::new(9).unwrap()).unwrap();
        index.build_with_field_data(&[batch]).unwrap();

        let records = index.serialize().unwrap();
        let mut restored = GeoH3Index::new(&BuildConfig::new(9).unwrap()).unwrap();
        restored.apply_records(&records).unwrap();

        assert!(restored.is_built());
        assert_eq!(restored.index_data, index.index_data);
        assert_eq!(restored.raw_data, index.raw_data);
        assert_eq!(restored.null_offsets, index.null_offsets);
        assert_eq!(restored.total_num_rows, index.total_num_rows);
    }

    #[test]
    fn test_load_requires_all_records() {
        let index = built_index();
        let records = index.serialize().unwrap();

        for missing in [INDEX_DATA_KEY, NULL_OFFSETS_KEY, NUM_ROWS_KEY] {
            let mut partial = records.clone();
            partial.remove(missing);
            let mut fresh = GeoH3Index::new(&BuildConfig::new(9).unwrap()).unwrap();
            let err = fresh.apply_records(&partial).unwrap_err();
            assert!(matches!(err, GeoIndexError::Format(_)), "missing {missing}");
            assert!(!fresh.is_built());
        }
    }

    #[tokio::test]
    async fn test_upload_load_roundtrip() {
        let index = built_index();
        let store = MemoryObjectStore::new();

        let sizes = index.upload(&store, "idx/seg42").await.unwrap();
        assert!(sizes.keys().all(|path| path.starts_with("idx/seg42/")));
        assert_eq!(sizes.len(), 3);

        let load_config = LoadConfig::new(sizes.keys().cloned().collect());
        let mut restored = GeoH3Index::new(&BuildConfig::new(9).unwrap()).unwrap();
        restored.load(&store, &load_config).await.unwrap();

        assert!(restored.is_built());
        assert_eq!(restored.count(), index.count());
        assert_eq!(restored.cardinality(), index.cardinality());

        // Probe results are identical on the restored instance
        let queries = fixture_queries();
        assert_eq!(
            restored.is_in(&queries).unwrap(),
            index.is_in(&queries).unwrap()
        );
        assert_eq!(
            restored.not_in(&queries).unwrap(),
            index.not_in(&queries).unwrap()
        );
        assert_eq!(restored.is_null().unwrap(), index.is_null().unwrap());
        assert_eq!(
            restored
                .exec_geo_relations(&[point_wkb(3.0, 4.0)], RelationOp::Equals)
                .unwrap(),
            index
                .exec_geo_relations(&[point_wkb(3.0, 4.0)], RelationOp::Equals)
                .unwrap()
        );
        for offset in 0..index.count() as u32 {
            assert_eq!(
                restored.reverse_lookup(offset).unwrap(),
                index.reverse_lookup(offset).unwrap()
            );
        }
    }

    #[tokio::test]
    async fn test_build_from_config_matches_direct_build() {
        let store = Arc::new(MemoryObjectStore::new());
        let rows = fixture_rows();

        // Two insert files splitting the fixture
        let first = FieldBatch::from_values(rows[..2].to_vec());
        let second = FieldBatch {
            values: rows[2..].to_vec(),
            valid: vec![true, true, false],
        };
        store
            .write("ins/0", &encode_field_batch(&first).unwrap())
            .await
            .unwrap();
        store
            .write("ins/1", &encode_field_batch(&second).unwrap())
            .await
            .unwrap();

        let config = BuildConfig::new(9)
            .unwrap()
            .with_insert_files(vec!["ins/0".to_string(), "ins/1".to_string()]);
        let loader = WkbFileLoader::new(store);
        let mut index = GeoH3Index::new(&config).unwrap();
        index.build_from_config(&loader, &config).await.unwrap();

        assert_eq!(index.count(), 5);
        assert_eq!(index.is_null().unwrap().iter().collect::<Vec<_>>(), vec![4]);

        let mut direct = GeoH3Index::new(&config).unwrap();
        let mut values = rows;
        values[4] = Vec::new();
        direct.build(&values).unwrap();
        assert_eq!(
            index.is_in(&fixture_queries()).unwrap(),
            direct.is_in(&fixture_queries()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_build_from_config_requires_insert_files() {
        let config = BuildConfig::new(9).unwrap();
        let loader = WkbFileLoader::new(Arc::new(MemoryObjectStore::new()));
        let mut index = GeoH3Index::new(&config).unwrap();
        let err = index.build_from_config(&loader, &config).await.unwrap_err();
        assert!(matches!(err, GeoIndexError::Config(_)));
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "num_rows"), "num_rows");
        assert_eq!(join_path("idx/seg", "num_rows"), "idx/seg/num_rows");
        assert_eq!(join_path("idx/seg/", "num_rows"), "idx/seg/num_rows");
    }
}
