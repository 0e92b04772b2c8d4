//! Record-set slicing for object storage.
//!
//! Object stores cap practical blob sizes, so large records are split
//! into fixed-size slices before upload and stitched back together on
//! load. Slices of a record `name` are stored under `name_0..name_k` and
//! described by a JSON manifest under the `slice_meta` key:
//!
//! ```text
//! {
//!   "entries": [
//!     { "name": "index_data", "slice_num": 3, "total_len": 40000000,
//!       "checksums": [..] }
//!   ]
//! }
//! ```
//!
//! Each slice carries a CRC32 in the manifest, verified on assembly.
//! Logical keys survive the round trip untouched.

use crate::error::{GeoIndexError, Result};
use crate::format::RecordSet;
use serde::{Deserialize, Serialize};

/// Manifest key within a sliced record set.
pub const SLICE_META_KEY: &str = "slice_meta";

/// Default slice size: 16 MiB.
pub const DEFAULT_SLICE_SIZE: usize = 16 * 1024 * 1024;

/// Manifest entry for one sliced record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliceEntry {
    /// Logical record name.
    pub name: String,

    /// Number of slices.
    pub slice_num: usize,

    /// Total length of the reassembled record.
    pub total_len: u64,

    /// CRC32 of each slice, in order.
    pub checksums: Vec<u32>,
}

/// Manifest describing every sliced record in a record set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SliceMeta {
    pub entries: Vec<SliceEntry>,
}

fn slice_key(name: &str, index: usize) -> String {
    format!("{name}_{index}")
}

/// Split records larger than `slice_size` into numbered slices and record
/// the manifest. Records at or under the threshold pass through.
pub fn disassemble(records: &mut RecordSet, slice_size: usize) -> Result<()> {
    if slice_size == 0 {
        return Err(GeoIndexError::Config("slice size must be positive".to_string()));
    }

    let oversized: Vec<String> = records
        .iter()
        .filter(|(_, bytes)| bytes.len() > slice_size)
        .map(|(key, _)| key.to_string())
        .collect();
    if oversized.is_empty() {
        return Ok(());
    }

    let mut meta = SliceMeta::default();
    for name in oversized {
        let bytes = records
            .remove(&name)
            .ok_or_else(|| GeoIndexError::Format(format!("record {name} vanished")))?;

        let mut checksums = Vec::new();
        for (i, chunk) in bytes.chunks(slice_size).enumerate() {
            checksums.push(crc32fast::hash(chunk));
            records.insert(slice_key(&name, i), chunk.to_vec());
        }

        tracing::debug!(
            record = %name,
            slices = checksums.len(),
            total_len = bytes.len(),
            "sliced record for upload"
        );
        meta.entries.push(SliceEntry {
            name,
            slice_num: checksums.len(),
            total_len: bytes.len() as u64,
            checksums,
        });
    }

    records.insert(SLICE_META_KEY, serde_json::to_vec(&meta)?);
    Ok(())
}

/// Reassemble sliced records in place, verifying lengths and checksums.
///
/// A record set without a manifest is returned unchanged.
pub fn assemble(records: &mut RecordSet) -> Result<()> {
    let Some(meta_bytes) = records.remove(SLICE_META_KEY) else {
        return Ok(());
    };
    let meta: SliceMeta = serde_json::from_slice(&meta_bytes)?;

    for entry in &meta.entries {
        if entry.checksums.len() != entry.slice_num {
            return Err(GeoIndexError::Format(format!(
                "manifest for {} lists {} checksums for {} slices",
                entry.name,
                entry.checksums.len(),
                entry.slice_num
            )));
        }

        let mut whole = Vec::with_capacity(entry.total_len as usize);
        for i in 0..entry.slice_num {
            let key = slice_key(&entry.name, i);
            let chunk = records
                .remove(&key)
                .ok_or_else(|| GeoIndexError::Format(format!("missing slice {key}")))?;

            let checksum = crc32fast::hash(&chunk);
            if checksum != entry.checksums[i] {
                return Err(GeoIndexError::Format(format!(
                    "checksum mismatch in {key}: expected {:08x}, got {checksum:08x}",
                    entry.checksums[i]
                )));
            }
            whole.extend_from_slice(&chunk);
        }

        if whole.len() as u64 != entry.total_len {
            return Err(GeoIndexError::Format(format!(
                "reassembled {} to {} bytes, manifest says {}",
                entry.name,
                whole.len(),
                entry.total_len
            )));
        }
        records.insert(entry.name.clone(), whole);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_set(pairs: &[(&str, Vec<u8>)]) -> RecordSet {
        let mut rs = RecordSet::new();
        for (key, bytes) in pairs {
            rs.insert(*key, bytes.clone());
        }
        rs
    }

    #[test]
    fn test_small_records_pass_through() {
        let mut rs = record_set(&[("num_rows", vec![5; 8]), ("null_offsets", vec![])]);
        let original = rs.clone();
        disassemble(&mut rs, 1024).unwrap();
        assert_eq!(rs, original);
        assemble(&mut rs).unwrap();
        assert_eq!(rs, original);
    }

    #[test]
    fn test_large_record_roundtrip() {
        let payload: Vec<u8> = (0..10_000u32).flat_map(|v| v.to_le_bytes()).collect();
        let mut rs = record_set(&[("index_data", payload.clone()), ("num_rows", vec![0; 8])]);

        disassemble(&mut rs, 1000).unwrap();
        assert!(!rs.contains("index_data"));
        assert!(rs.contains(SLICE_META_KEY));
        assert!(rs.contains("index_data_0"));
        assert_eq!(rs.len(), 2 + payload.len().div_ceil(1000));

        assemble(&mut rs).unwrap();
        assert_eq!(rs.get("index_data"), Some(payload.as_slice()));
        assert!(!rs.contains(SLICE_META_KEY));
        assert!(!rs.contains("index_data_0"));
    }

    #[test]
    fn test_exact_multiple_of_slice_size() {
        let payload = vec![7u8; 3000];
        let mut rs = record_set(&[("index_data", payload.clone())]);
        disassemble(&mut rs, 1000).unwrap();
        assert!(rs.contains("index_data_2"));
        assert!(!rs.contains("index_data_3"));
        assemble(&mut rs).unwrap();
        assert_eq!(rs.get("index_data"), Some(payload.as_slice()));
    }

    #[test]
    fn test_missing_slice_detected() {
        let mut rs = record_set(&[("index_data", vec![1u8; 2500])]);
        disassemble(&mut rs, 1000).unwrap();
        rs.remove("index_data_1");
        let err = assemble(&mut rs).unwrap_err();
        assert!(matches!(err, GeoIndexError::Format(_)));
    }

    #[test]
    fn test_corrupted_slice_detected() {
        let mut rs = record_set(&[("index_data", vec![1u8; 2500])]);
        disassemble(&mut rs, 1000).unwrap();
        let mut corrupted = rs.remove("index_data_1").unwrap();
        corrupted[0] ^= 0xff;
        rs.insert("index_data_1", corrupted);

        let err = assemble(&mut rs).unwrap_err();
        assert!(matches!(err, GeoIndexError::Format(_)));
    }
}
