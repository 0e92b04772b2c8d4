//! Index artifact wire format.
//!
//! The index serializes into a record set of three logical blobs:
//!
//! ```text
//! "index_data":   per-cell records, concatenated
//!   cell_id: u64 (LE)
//!   row_count m: u32 (LE)
//!   m x { row_offset: u32 (LE), wkb_len k: u32 (LE), wkb: [u8; k] }
//!
//! "null_offsets": |nulls| x u64 (LE)
//! "num_rows":     u64 (LE)
//! ```
//!
//! The `index_data` blob ends at its declared length, no terminator.
//! Cells are written in ascending identifier order so the artifact bytes
//! are deterministic for a given index state.

use crate::error::{GeoIndexError, Result};
use h3o::CellIndex;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

/// Logical key of the inverted index + raw payload blob.
pub const INDEX_DATA_KEY: &str = "index_data";

/// Logical key of the null-offset blob.
pub const NULL_OFFSETS_KEY: &str = "null_offsets";

/// Logical key of the row-count blob.
pub const NUM_ROWS_KEY: &str = "num_rows";

/// An ordered set of named binary records.
///
/// Keys iterate in lexicographic order, which keeps uploads and tests
/// deterministic.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecordSet {
    records: BTreeMap<String, Vec<u8>>,
}

impl RecordSet {
    /// Create an empty record set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record.
    pub fn insert(&mut self, key: impl Into<String>, bytes: Vec<u8>) {
        self.records.insert(key.into(), bytes);
    }

    /// Look up a record by key.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.records.get(key).map(|b| b.as_slice())
    }

    /// Remove a record, returning its bytes.
    pub fn remove(&mut self, key: &str) -> Option<Vec<u8>> {
        self.records.remove(key)
    }

    /// Whether a record exists.
    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Iterate records in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.records.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Record keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(|k| k.as_str())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Encode the inverted index and raw payloads.
pub fn encode_index_data(
    index_data: &FxHashMap<CellIndex, Vec<u32>>,
    raw_data: &[Vec<u8>],
) -> Vec<u8> {
    let mut size = 0usize;
    for offsets in index_data.values() {
        size += 8 + 4 + offsets.len() * 8;
        for &offset in offsets {
            size += raw_data[offset as usize].len();
        }
    }

    let mut cells: Vec<&CellIndex> = index_data.keys().collect();
    cells.sort_unstable();

    let mut buf = Vec::with_capacity(size);
    for cell in cells {
        let offsets = &index_data[cell];
        buf.extend_from_slice(&u64::from(*cell).to_le_bytes());
        buf.extend_from_slice(&(offsets.len() as u32).to_le_bytes());
        for &offset in offsets {
            let wkb = raw_data[offset as usize].as_slice();
            buf.extend_from_slice(&offset.to_le_bytes());
            buf.extend_from_slice(&(wkb.len() as u32).to_le_bytes());
            buf.extend_from_slice(wkb);
        }
    }
    buf
}

/// Decode the inverted index and raw payloads.
///
/// `raw_data` is pre-allocated to `total_num_rows` empty entries so null
/// rows keep their empty payloads.
#[allow(clippy::type_complexity)]
pub fn decode_index_data(
    bytes: &[u8],
    total_num_rows: usize,
) -> Result<(FxHashMap<CellIndex, Vec<u32>>, Vec<Vec<u8>>)> {
    let mut index_data: FxHashMap<CellIndex, Vec<u32>> = FxHashMap::default();
    let mut raw_data = vec![Vec::new(); total_num_rows];

    let mut pos = 0usize;
    while pos < bytes.len() {
        let raw_cell = read_u64(bytes, &mut pos)?;
        let cell = CellIndex::try_from(raw_cell)
            .map_err(|_| GeoIndexError::Format(format!("invalid cell id {raw_cell:#018x}")))?;

        let row_count = read_u32(bytes, &mut pos)? as usize;
        if row_count == 0 {
            return Err(GeoIndexError::Format(format!(
                "empty bucket for cell {cell}"
            )));
        }

        let bucket = index_data.entry(cell).or_default();
        for _ in 0..row_count {
            let offset = read_u32(bytes, &mut pos)?;
            if offset as usize >= total_num_rows {
                return Err(GeoIndexError::Format(format!(
                    "row offset {offset} exceeds row count {total_num_rows}"
                )));
            }

            let wkb_len = read_u32(bytes, &mut pos)? as usize;
            if pos + wkb_len > bytes.len() {
                return Err(GeoIndexError::Format("truncated wkb payload".to_string()));
            }
            bucket.push(offset);
            raw_data[offset as usize] = bytes[pos..pos + wkb_len].to_vec();
            pos += wkb_len;
        }
    }

    Ok((index_data, raw_data))
}

/// Encode the null-offset set.
pub fn encode_null_offsets(null_offsets: &[u32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(null_offsets.len() * 8);
    for &offset in null_offsets {
        buf.extend_from_slice(&u64::from(offset).to_le_bytes());
    }
    buf
}

/// Decode the null-offset set.
pub fn decode_null_offsets(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 8 != 0 {
        return Err(GeoIndexError::Format(format!(
            "null offset blob length {} is not a multiple of 8",
            bytes.len()
        )));
    }
    let mut out = Vec::with_capacity(bytes.len() / 8);
    let mut pos = 0usize;
    while pos < bytes.len() {
        let offset = read_u64(bytes, &mut pos)?;
        let offset = u32::try_from(offset)
            .map_err(|_| GeoIndexError::Format(format!("null offset {offset} exceeds u32")))?;
        out.push(offset);
    }
    Ok(out)
}

/// Encode the row count.
pub fn encode_num_rows(total_num_rows: usize) -> Vec<u8> {
    (total_num_rows as u64).to_le_bytes().to_vec()
}

/// Decode the row count.
pub fn decode_num_rows(bytes: &[u8]) -> Result<usize> {
    if bytes.len() != 8 {
        return Err(GeoIndexError::Format(format!(
            "row count blob has {} bytes, expected 8",
            bytes.len()
        )));
    }
    let mut pos = 0usize;
    let value = read_u64(bytes, &mut pos)?;
    usize::try_from(value)
        .map_err(|_| GeoIndexError::Format(format!("row count {value} exceeds usize")))
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> Result<u32> {
    if *pos + 4 > bytes.len() {
        return Err(GeoIndexError::Format("truncated u32 field".to_string()));
    }
    let value = u32::from_le_bytes(bytes[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    Ok(value)
}

fn read_u64(bytes: &[u8], pos: &mut usize) -> Result<u64> {
    if *pos + 8 > bytes.len() {
        return Err(GeoIndexError::Format("truncated u64 field".to_string()));
    }
    let value = u64::from_le_bytes(bytes[*pos..*pos + 8].try_into().unwrap());
    *pos += 8;
    Ok(value)
}
