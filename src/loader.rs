//! Field-data loading for index builds.
//!
//! Insert files hold a column segment's WKB values with a validity mask.
//! The build pipeline drains them through the [`FieldDataLoader`] trait;
//! [`WkbFileLoader`] is the object-store-backed implementation for the
//! length-prefixed batch format below.
//!
//! ```text
//! row_count: u32 (LE)
//! row_count x { valid: u8, wkb_len: u32 (LE), wkb: [u8; wkb_len] }
//! ```
//!
//! Invalid rows carry a zero-length payload.

use crate::error::{GeoIndexError, Result};
use crate::storage::ObjectStore;
use async_trait::async_trait;
use std::sync::Arc;

/// One batch of column values with its validity mask.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldBatch {
    /// WKB payloads, one per row.
    pub values: Vec<Vec<u8>>,

    /// Validity mask; `false` rows are null.
    pub valid: Vec<bool>,
}

impl FieldBatch {
    /// Batch of all-valid rows.
    pub fn from_values(values: Vec<Vec<u8>>) -> Self {
        let valid = vec![true; values.len()];
        Self { values, valid }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Loads columnar insert files into typed row batches.
#[async_trait]
pub trait FieldDataLoader: Send + Sync {
    /// Load every batch from the given insert files, in order.
    async fn load(&self, insert_files: &[String]) -> Result<Vec<FieldBatch>>;
}

/// Encode a batch into the insert-file format.
pub fn encode_field_batch(batch: &FieldBatch) -> Result<Vec<u8>> {
    if batch.values.len() != batch.valid.len() {
        return Err(GeoIndexError::Config(format!(
            "batch has {} values but {} validity flags",
            batch.values.len(),
            batch.valid.len()
        )));
    }

    let mut buf = Vec::new();
    buf.extend_from_slice(&(batch.values.len() as u32).to_le_bytes());
    for (value, &valid) in batch.values.iter().zip(&batch.valid) {
        buf.push(u8::from(valid));
        if valid {
            buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
            buf.extend_from_slice(value);
        } else {
            buf.extend_from_slice(&0u32.to_le_bytes());
        }
    }
    Ok(buf)
}

/// Decode an insert file into a batch.
pub fn decode_field_batch(bytes: &[u8]) -> Result<FieldBatch> {
    let mut pos = 0usize;
    let row_count = read_u32(bytes, &mut pos)? as usize;

    let mut batch = FieldBatch {
        values: Vec::with_capacity(row_count),
        valid: Vec::with_capacity(row_count),
    };
    for _ in 0..row_count {
        if pos >= bytes.len() {
            return Err(GeoIndexError::Format("truncated validity flag".to_string()));
        }
        let valid = bytes[pos] != 0;
        pos += 1;

        let len = read_u32(bytes, &mut pos)? as usize;
        if pos + len > bytes.len() {
            return Err(GeoIndexError::Format("truncated row payload".to_string()));
        }
        batch.values.push(bytes[pos..pos + len].to_vec());
        batch.valid.push(valid);
        pos += len;
    }

    if pos != bytes.len() {
        return Err(GeoIndexError::Format(format!(
            "{} trailing bytes after {row_count} rows",
            bytes.len() - pos
        )));
    }
    Ok(batch)
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> Result<u32> {
    if *pos + 4 > bytes.len() {
        return Err(GeoIndexError::Format("truncated u32 field".to_string()));
    }
    let value = u32::from_le_bytes(bytes[*pos..*pos + 4].try_into().unwrap());
    *pos += 4;
    Ok(value)
}

/// Object-store-backed loader for the length-prefixed batch format.
#[derive(Debug)]
pub struct WkbFileLoader {
    store: Arc<dyn ObjectStore>,
}

impl WkbFileLoader {
    /// Create a loader reading through `store`.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FieldDataLoader for WkbFileLoader {
    async fn load(&self, insert_files: &[String]) -> Result<Vec<FieldBatch>> {
        let mut batches = Vec::with_capacity(insert_files.len());
        for path in insert_files {
            let bytes = self.store.read(path).await?;
            let batch = decode_field_batch(&bytes)?;
            tracing::debug!(path = %path, rows = batch.len(), "loaded insert file");
            batches.push(batch);
        }
        Ok(batches)
    }
}
