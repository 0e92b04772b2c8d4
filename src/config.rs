//! Build-time and load-time configuration.

use crate::error::{GeoIndexError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default maximum resolution when none is configured.
pub const DEFAULT_RESOLUTION: u8 = 9;

/// Finest resolution the hexagonal grid supports.
pub const MAX_RESOLUTION: u8 = 15;

/// Parameter key for the index resolution in string parameter maps.
pub const RESOLUTION_PARAM: &str = "resolution";

/// Build-time configuration for a geospatial index.
///
/// `resolution` is the maximum cell resolution `R`, fixed for the lifetime
/// of the index. `insert_files` name the columnar insert files the
/// field-data loader reads during `build_from_config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Maximum cell resolution in `[0, 15]`.
    pub resolution: u8,

    /// Object-store paths of the insert files to index.
    #[serde(default)]
    pub insert_files: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            insert_files: Vec::new(),
        }
    }
}

impl BuildConfig {
    /// Create a config with the given maximum resolution.
    pub fn new(resolution: u8) -> Result<Self> {
        let config = Self {
            resolution,
            insert_files: Vec::new(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the insert files to build from.
    pub fn with_insert_files(mut self, insert_files: Vec<String>) -> Self {
        self.insert_files = insert_files;
        self
    }

    /// Parse from a string parameter map, as handed down by an index
    /// coordinator. Missing `resolution` falls back to the default.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self> {
        let resolution = match params.get(RESOLUTION_PARAM) {
            Some(raw) => raw.parse::<u8>().map_err(|_| {
                GeoIndexError::Config(format!("resolution is not an integer: {raw:?}"))
            })?,
            None => DEFAULT_RESOLUTION,
        };
        Self::new(resolution)
    }

    /// Check the resolution bound.
    pub fn validate(&self) -> Result<()> {
        if self.resolution > MAX_RESOLUTION {
            return Err(GeoIndexError::InvalidResolution(format!(
                "{} is outside [0, {MAX_RESOLUTION}]",
                self.resolution
            )));
        }
        Ok(())
    }
}

/// Load-time configuration: the chunked artifact paths produced by upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Object-store paths of the index artifact blobs.
    pub index_files: Vec<String>,
}

impl LoadConfig {
    /// Create a config from the given artifact paths.
    pub fn new(index_files: Vec<String>) -> Self {
        Self { index_files }
    }
}
