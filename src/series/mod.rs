//! Time-bucketed series.
//!
//! A series is addressed by a prefix and a fixed bucket width. Each bucket is
//! one sorted set, so a point lives at `({prefix}::ts::{bucket_start}, score =
//! timestamp_ns, member = encoded value)`.
//!
//! ```
//! use std::time::Duration;
//! use tsbucket::series::{SeriesConfig, TimeSeries};
//! use tsbucket::conn::MemoryConnection;
//!
//! let config = SeriesConfig::new("dev1", Duration::from_secs(1), Duration::ZERO);
//! let ts = TimeSeries::with_config(config, MemoryConnection::new())?;
//! for i in 0..300_u64 {
//!     ts.add_at(&format!("Message {i}"), i * 10_000_000)?;
//! }
//!
//! let mut window: Vec<String> = Vec::new();
//! ts.fetch_range(1_000_000_000, 2_000_000_000, &mut window)?;
//! assert_eq!(window.len(), 101);
//! # Ok::<(), tsbucket::Error>(())
//! ```

mod bucket;
mod codec;
mod config;
mod store;

pub use bucket::{bucket_key, normalize, Bucketer, KEY_SEPARATOR};
pub use codec::{Codec, JsonCodec, MsgPackCodec};
pub use config::{SeriesConfig, DEFAULT_MAX_BUCKETS};
pub use store::TimeSeries;
