//! Series configuration.
//!
//! Defines the prefix, bucket width and per-bucket expiration of a series.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Configuration for one time series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesConfig {
    /// Prefix of every bucket key in the series.
    /// Default: "series"
    pub prefix: String,

    /// Width of each bucket.
    /// Default: 1 second
    pub bucket_width: Duration,

    /// Lifetime of a bucket, counted from its first insert.
    /// Zero means buckets never expire.
    /// Default: 0
    #[serde(default)]
    pub expiration: Duration,

    /// Most buckets a single range fetch may fan out to.
    /// Default: 65536
    #[serde(default = "default_max_buckets")]
    pub max_buckets: usize,
}

fn default_max_buckets() -> usize {
    DEFAULT_MAX_BUCKETS
}

/// Default cap on the buckets one range fetch reads.
pub const DEFAULT_MAX_BUCKETS: usize = 65_536;

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            prefix: "series".to_string(),
            bucket_width: Duration::from_secs(1),
            expiration: Duration::ZERO,
            max_buckets: DEFAULT_MAX_BUCKETS,
        }
    }
}

impl SeriesConfig {
    pub fn new(prefix: impl Into<String>, bucket_width: Duration, expiration: Duration) -> Self {
        Self {
            prefix: prefix.into(),
            bucket_width,
            expiration,
            max_buckets: DEFAULT_MAX_BUCKETS,
        }
    }

    /// Parse a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SeriesConfig =
            serde_json::from_str(json).map_err(|err| Error::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("read {}: {err}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Check the configuration before a store is built from it.
    ///
    /// # Errors
    ///
    /// - `Error::Config`: empty prefix, zero bucket width or zero `max_buckets`
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(Error::Config("series prefix must not be empty".to_string()));
        }
        if self.bucket_width.is_zero() {
            return Err(Error::Config("bucket width must be positive".to_string()));
        }
        if self.max_buckets == 0 {
            return Err(Error::Config("max_buckets must be positive".to_string()));
        }
        Ok(())
    }

    /// Expiration in whole seconds, rounded up, or `None` when buckets never expire.
    pub fn expiration_secs(&self) -> Option<u64> {
        if self.expiration.is_zero() {
            return None;
        }
        let secs = self.expiration.as_secs();
        if self.expiration.subsec_nanos() > 0 {
            Some(secs + 1)
        } else {
            Some(secs)
        }
    }
}
