//! Error types for the geospatial index.

use thiserror::Error;

/// Geospatial index errors.
#[derive(Error, Debug)]
pub enum GeoIndexError {
    /// Malformed WKB input.
    #[error("WKB parse error: {0}")]
    Wkb(String),

    /// Geometry type outside point / line-string / polygon.
    #[error("unsupported geometry type: {0}")]
    UnsupportedGeometry(String),

    /// Resolution outside `[0, 15]`, or a parent/child request that
    /// contradicts the cell's own resolution.
    #[error("invalid resolution: {0}")]
    InvalidResolution(String),

    /// Probe issued before the index was built or loaded.
    #[error("index has not been built")]
    NotBuilt,

    /// Failure surfaced by the backing cell library.
    #[error("cell calculus error: {0}")]
    CellCalculus(String),

    /// IO error during upload/load.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reverse lookup past the end of the column.
    #[error("offset {offset} out of range of {total} rows")]
    OutOfRange { offset: u32, total: usize },

    /// Stable rejection of operations geometry cannot support.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// Corrupt or truncated index artifact.
    #[error("index format error: {0}")]
    Format(String),

    /// A named blob was missing from the object store.
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    /// Slice manifest (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, GeoIndexError>;
