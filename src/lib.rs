//! Time-bucketed time series on top of a sorted-set key-value store.
//!
//! Points are partitioned into fixed-width time buckets, one sorted set per
//! bucket, scored by nanosecond timestamp. Callers add and fetch values of
//! any serde shape without managing how they are spread over keys.

pub mod conn;
pub mod core;
pub mod series;

pub use crate::conn::{Command, Connection, MemoryConnection, Reply};
#[cfg(feature = "redis")]
pub use crate::conn::RedisConnection;
pub use crate::core::{timestamp_ns, Clock, ConnectionError, Error, ManualClock, Result, SystemClock};
pub use crate::series::{Bucketer, Codec, JsonCodec, MsgPackCodec, SeriesConfig, TimeSeries};
