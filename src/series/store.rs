//! Time series over bucketed sorted sets.
//!
//! # Design
//!
//! - **Add**: one sorted-set insert into the point's bucket, scored by the
//!   timestamp. With an expiration configured the insert also sets the
//!   bucket's TTL, but only when it created the bucket, in one atomic unit.
//! - **Fetch**: exact-score query against a single bucket.
//! - **FetchRange**: one range query per bucket the interval touches, sent as
//!   a single pipelined batch and read back in send order.
//!
//! The connection is strictly request/response, so every operation holds the
//! store lock for its whole exchange. A pipelined fan-out that interleaved
//! with another caller's commands would pair replies with the wrong requests.
//! Callers wanting parallelism open several stores over separate connections;
//! bucket keys are derived, never cached, so they can share a keyspace.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::conn::{Command, Connection};
use crate::core::{Clock, Error, Result, SystemClock};
use crate::series::bucket::Bucketer;
use crate::series::codec::{Codec, MsgPackCodec};
use crate::series::config::SeriesConfig;

/// A named series of points stored in time buckets.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tsbucket::{MemoryConnection, TimeSeries};
///
/// let ts = TimeSeries::new("dump::device1", Duration::from_secs(1), Duration::ZERO, MemoryConnection::new())?;
/// ts.add_at("hello", 1_500_000_000)?;
///
/// let mut value = String::new();
/// ts.fetch(1_500_000_000, &mut value)?;
/// assert_eq!(value, "hello");
/// # Ok::<(), tsbucket::Error>(())
/// ```
pub struct TimeSeries<C, K = MsgPackCodec> {
    config: SeriesConfig,
    bucketer: Bucketer,
    expiration_secs: Option<u64>,
    codec: K,
    clock: Arc<dyn Clock>,
    conn: Mutex<C>,
}

impl<C: Connection> TimeSeries<C, MsgPackCodec> {
    /// Create a series named `prefix` over an established connection.
    ///
    /// An `expiration` of zero keeps buckets forever.
    ///
    /// # Errors
    ///
    /// - `Error::Config`: empty prefix or zero bucket width
    pub fn new(
        prefix: impl Into<String>,
        bucket_width: Duration,
        expiration: Duration,
        conn: C,
    ) -> Result<Self> {
        Self::with_config(SeriesConfig::new(prefix, bucket_width, expiration), conn)
    }

    pub fn with_config(config: SeriesConfig, conn: C) -> Result<Self> {
        Self::with_codec(config, MsgPackCodec, conn)
    }
}

impl<C: Connection, K: Codec> TimeSeries<C, K> {
    /// Create a series that encodes points with `codec`.
    pub fn with_codec(config: SeriesConfig, codec: K, conn: C) -> Result<Self> {
        config.validate()?;
        let bucketer = Bucketer::new(config.prefix.clone(), config.bucket_width)?;
        let expiration_secs = config.expiration_secs();
        Ok(Self {
            config,
            bucketer,
            expiration_secs,
            codec,
            clock: Arc::new(SystemClock),
            conn: Mutex::new(conn),
        })
    }

    /// Use `clock` for points added without a timestamp.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SeriesConfig {
        &self.config
    }

    pub fn bucketer(&self) -> &Bucketer {
        &self.bucketer
    }

    /// Hand the connection back to the caller.
    pub fn into_connection(self) -> Result<C> {
        self.conn.into_inner().map_err(|_| Error::LockPoisoned)
    }

    fn lock(&self) -> Result<MutexGuard<'_, C>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }

    /// Add a point at `timestamp_ns`, or at the clock's current time when `None`.
    ///
    /// # Errors
    ///
    /// - `Error::Encode`: the value cannot be encoded (the store is not touched)
    /// - `Error::Store`: the insert failed
    pub fn add<T: Serialize + ?Sized>(&self, value: &T, timestamp_ns: Option<u64>) -> Result<()> {
        let timestamp_ns = timestamp_ns.unwrap_or_else(|| self.clock.now());
        let member = self.codec.encode(value)?;
        let key = self.bucketer.key(timestamp_ns);
        log::trace!("add {} bytes to {key} at {timestamp_ns}", member.len());

        let command = match self.expiration_secs {
            Some(ttl_secs) => Command::ZAddExpireIfFirst {
                key,
                score: timestamp_ns,
                member,
                ttl_secs,
            },
            None => Command::ZAdd {
                key,
                score: timestamp_ns,
                member,
            },
        };

        let mut conn = self.lock()?;
        conn.execute(&command)?.into_integer()?;
        Ok(())
    }

    pub fn add_at<T: Serialize + ?Sized>(&self, value: &T, timestamp_ns: u64) -> Result<()> {
        self.add(value, Some(timestamp_ns))
    }

    pub fn add_now<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        self.add(value, None)
    }

    /// Decode the point stored at exactly `timestamp_ns` into `dest`.
    ///
    /// When several points share the timestamp the first one the store
    /// returns is used.
    ///
    /// # Errors
    ///
    /// - `Error::NotFound`: no point has that timestamp
    /// - `Error::Decode`: the point does not decode into a `T`
    /// - `Error::Store`: the query failed
    pub fn fetch<T: DeserializeOwned>(&self, timestamp_ns: u64, dest: &mut T) -> Result<()> {
        let key = self.bucketer.key(timestamp_ns);
        let command = Command::ZRangeByScore {
            key: key.clone(),
            min: timestamp_ns,
            max: timestamp_ns,
        };

        let members = {
            let mut conn = self.lock()?;
            conn.execute(&command)?.into_members()?
        };

        let Some(first) = members.first() else {
            return Err(Error::NotFound { key, timestamp_ns });
        };
        *dest = self.codec.decode(first)?;
        Ok(())
    }

    /// Keys of every bucket `[begin_ns, end_ns]` touches, oldest first.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidRange`: `begin_ns > end_ns`
    /// - `Error::TooManyBuckets`: more than `config.max_buckets` keys
    pub fn bucket_keys(&self, begin_ns: u64, end_ns: u64) -> Result<Vec<String>> {
        if begin_ns > end_ns {
            return Err(Error::InvalidRange { begin_ns, end_ns });
        }
        let max_buckets = self.config.max_buckets;
        self.bucketer
            .keys_between(begin_ns, end_ns, max_buckets)
            .ok_or(Error::TooManyBuckets {
                begin_ns,
                end_ns,
                max_buckets,
            })
    }

    /// Replace the contents of `dest` with every point in `[begin_ns, end_ns]`,
    /// ascending by timestamp.
    ///
    /// Each bucket the interval touches gets one range query; all of them are
    /// sent before any reply is read. Elements of `dest` may be `Box<T>` to
    /// get one fresh allocation per point.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidRange`: `begin_ns > end_ns` (the store is not touched)
    /// - `Error::TooManyBuckets`: the interval spans more than
    ///   `config.max_buckets` buckets (the store is not touched)
    /// - `Error::Store`: any query failed; nothing is retried
    /// - `Error::Decode`: a point does not decode into a `T`
    ///
    /// On error the contents of `dest` are unspecified.
    pub fn fetch_range<T: DeserializeOwned>(
        &self,
        begin_ns: u64,
        end_ns: u64,
        dest: &mut Vec<T>,
    ) -> Result<()> {
        let keys = self.bucket_keys(begin_ns, end_ns)?;
        let groups = self.pipeline_ranges(keys, begin_ns, end_ns)?;

        let total: usize = groups.iter().map(Vec::len).sum();
        log::debug!(
            "fetch_range [{begin_ns}, {end_ns}] over {} buckets: {total} points",
            groups.len()
        );

        dest.clear();
        dest.reserve_exact(total);
        for member in groups.iter().flatten() {
            dest.push(self.codec.decode(member)?);
        }
        Ok(())
    }

    /// Like [`fetch_range`](Self::fetch_range), returning a new vector.
    pub fn fetch_range_vec<T: DeserializeOwned>(
        &self,
        begin_ns: u64,
        end_ns: u64,
    ) -> Result<Vec<T>> {
        let mut out = Vec::new();
        self.fetch_range(begin_ns, end_ns, &mut out)?;
        Ok(out)
    }

    /// Send one range query per key, then read the replies in the same order.
    fn pipeline_ranges(
        &self,
        keys: Vec<String>,
        min: u64,
        max: u64,
    ) -> Result<Vec<Vec<Vec<u8>>>> {
        let count = keys.len();
        let mut conn = self.lock()?;

        for key in keys {
            conn.send(&Command::ZRangeByScore { key, min, max })?;
        }
        conn.flush()?;

        let mut groups = Vec::with_capacity(count);
        for received in 0..count {
            match conn.receive().and_then(|reply| reply.into_members()) {
                Ok(members) => groups.push(members),
                Err(err) => {
                    // Consume what is still in flight so the next caller's
                    // replies pair with its own requests.
                    for _ in received + 1..count {
                        if conn.receive().is_err() {
                            break;
                        }
                    }
                    return Err(err.into());
                }
            }
        }
        Ok(groups)
    }
}
