//! H3-backed geospatial scalar index for WKB geometry columns.
//!
//! This crate accelerates spatial-predicate filtering (equals, touches,
//! overlaps, crosses, contains, intersects, within) over a column of
//! well-known-binary geometries. Each row maps to a single
//! *representative cell* of the hexagonal hierarchical grid (the
//! coarsest cell at or below the configured resolution that covers the
//! whole geometry), and the index inverts that mapping:
//!
//! ```text
//!                build                          query
//!   WKB column ─────────► GeoH3Index ◄──────────────────── expression executor
//!                           │
//!        ┌──────────────────┼───────────────────┐
//!        ▼                  ▼                   ▼
//!   index_data          raw_data           null_offsets
//!   cell → [row]      row → WKB bytes      null rows
//!        │
//!        ▼  probe: ancestors + descendants of the query's cell
//!   candidate superset ──► exact relate kernel ──► result bitmap
//! ```
//!
//! Probes are conservative at the cell level: `is_in`/`not_in` return a
//! superset/complement for the caller to refine, while
//! `exec_geo_relations` refines internally with exact DE-9IM predicates.
//!
//! The artifact persists as three keyed blobs (`index_data`,
//! `null_offsets`, `num_rows`), sliced into bounded chunks for object
//! storage.
//!
//! # Modules
//!
//! - [`config`]: build/load configuration
//! - [`geometry`]: WKB codec and the closed geometry variant
//! - [`cell`]: cell calculus over the hexagonal grid
//! - [`covering`]: representative-cell resolution
//! - [`relation`]: exact spatial relation kernel
//! - [`index`]: the index core and its probes
//! - [`format`]: artifact wire format
//! - [`slice`]: record slicing for object storage
//! - [`storage`]: object-store abstraction
//! - [`loader`]: field-data loading for builds
//! - [`error`]: error types

pub mod cell;
pub mod config;
pub mod covering;
pub mod error;
pub mod format;
pub mod geometry;
pub mod index;
pub mod loader;
pub mod relation;
pub mod slice;
pub mod storage;

pub use config::{BuildConfig, LoadConfig, DEFAULT_RESOLUTION};
pub use error::{GeoIndexError, Result};
pub use format::RecordSet;
pub use geometry::{parse_wkb, write_wkb, Geometry};
pub use index::{GeoH3Index, INDEX_TYPE};
pub use loader::{FieldBatch, FieldDataLoader, WkbFileLoader};
pub use relation::RelationOp;
pub use storage::{FileObjectStore, MemoryObjectStore, ObjectStore};
