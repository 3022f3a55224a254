//! Timestamp to bucket-key derivation.
//!
//! A bucket is the half-open interval `[start, start + width)` where
//! `start = t - (t % width)`. Every point whose timestamp falls inside the
//! interval lands in the same sorted set, keyed `{prefix}::ts::{start}`.

use std::time::Duration;

use crate::core::{Error, Result};

/// Separator between the series prefix and the bucket start.
pub const KEY_SEPARATOR: &str = "::ts::";

/// Maps timestamps to bucket keys for one series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucketer {
    prefix: String,
    width_ns: u64,
}

impl Bucketer {
    /// Create a bucketer for `prefix` with a fixed bucket width.
    ///
    /// # Errors
    ///
    /// - `Error::Config`: `width` is zero or does not fit in u64 nanoseconds
    pub fn new(prefix: impl Into<String>, width: Duration) -> Result<Self> {
        let width_ns = u64::try_from(width.as_nanos())
            .map_err(|_| Error::Config(format!("bucket width {width:?} is too large")))?;
        if width_ns == 0 {
            return Err(Error::Config("bucket width must be positive".to_string()));
        }
        Ok(Self {
            prefix: prefix.into(),
            width_ns,
        })
    }

    /// Round `timestamp_ns` down to the start of its bucket.
    pub fn bucket_start(&self, timestamp_ns: u64) -> u64 {
        normalize(self.width_ns, timestamp_ns)
    }

    /// Key of the bucket holding `timestamp_ns`.
    pub fn key(&self, timestamp_ns: u64) -> String {
        bucket_key(&self.prefix, self.width_ns, timestamp_ns)
    }

    /// Number of buckets touched by the inclusive interval `[begin_ns, end_ns]`,
    /// or `None` when it does not fit in a u64 (1 ns width over the whole range).
    ///
    /// Callers must ensure `begin_ns <= end_ns`.
    pub fn bucket_count(&self, begin_ns: u64, end_ns: u64) -> Option<u64> {
        ((self.bucket_start(end_ns) - self.bucket_start(begin_ns)) / self.width_ns).checked_add(1)
    }

    /// Keys of every bucket touched by `[begin_ns, end_ns]`, oldest first.
    ///
    /// Returns `None` without allocating when more than `limit` keys would be
    /// produced.
    pub fn keys_between(&self, begin_ns: u64, end_ns: u64, limit: usize) -> Option<Vec<String>> {
        let count = self
            .bucket_count(begin_ns, end_ns)
            .and_then(|count| usize::try_from(count).ok())
            .filter(|count| *count <= limit)?;
        let first = self.bucket_start(begin_ns);
        let width_ns = self.width_ns;
        Some(
            (0..count as u64)
                .map(|i| self.key_for_start(first + i * width_ns))
                .collect(),
        )
    }

    fn key_for_start(&self, start_ns: u64) -> String {
        format!("{}{KEY_SEPARATOR}{start_ns}", self.prefix)
    }
}

/// Round `timestamp_ns` down to a multiple of `width_ns`.
///
/// `width_ns` must be non-zero; `Bucketer::new` enforces that.
pub fn normalize(width_ns: u64, timestamp_ns: u64) -> u64 {
    timestamp_ns - (timestamp_ns % width_ns)
}

/// Key of the bucket holding `timestamp_ns` in series `prefix`.
pub fn bucket_key(prefix: &str, width_ns: u64, timestamp_ns: u64) -> String {
    format!("{prefix}{KEY_SEPARATOR}{}", normalize(width_ns, timestamp_ns))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: u64 = 1_000_000_000;

    fn bucketer() -> Bucketer {
        Bucketer::new("dev1", Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_zero_width_rejected() {
        let err = Bucketer::new("dev1", Duration::ZERO).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_normalize_rounds_down() {
        assert_eq!(normalize(SEC, 0), 0);
        assert_eq!(normalize(SEC, SEC - 1), 0);
        assert_eq!(normalize(SEC, SEC), SEC);
        assert_eq!(normalize(SEC, 5 * SEC + 123), 5 * SEC);
        assert_eq!(normalize(7, 20), 14);
    }

    #[test]
    fn test_key_format() {
        assert_eq!(bucketer().key(3 * SEC + 999), "dev1::ts::3000000000");
        assert_eq!(bucket_key("a", 10, 25), "a::ts::20");
    }

    #[test]
    fn test_same_bucket_same_key() {
        let b = bucketer();
        let base = 1_700_000_000 * SEC;
        for offset in [0, 1, SEC / 2, SEC - 1] {
            assert_eq!(b.key(base), b.key(base + offset));
        }
        assert_ne!(b.key(base), b.key(base + SEC));
        assert_ne!(b.key(base), b.key(base - 1));
    }

    #[test]
    fn test_key_is_pure() {
        let b = bucketer();
        assert_eq!(b.key(12_345), b.key(12_345));
    }

    #[test]
    fn test_bucket_count_and_keys() {
        let b = bucketer();
        assert_eq!(b.bucket_count(SEC, SEC), Some(1));
        assert_eq!(b.bucket_count(SEC, 2 * SEC), Some(2));
        assert_eq!(b.bucket_count(SEC, 2 * SEC - 1), Some(1));

        // Unaligned begin still reaches the bucket that holds `end`.
        let keys = b.keys_between(SEC / 2, 2 * SEC + SEC / 5, 16).unwrap();
        assert_eq!(
            keys,
            vec![
                "dev1::ts::0".to_string(),
                "dev1::ts::1000000000".to_string(),
                "dev1::ts::2000000000".to_string(),
            ]
        );
    }

    #[test]
    fn test_full_range_at_one_nanosecond_overflows() {
        let b = Bucketer::new("p", Duration::from_nanos(1)).unwrap();
        assert_eq!(b.bucket_count(0, u64::MAX), None);
        assert_eq!(b.bucket_count(1, u64::MAX), Some(u64::MAX));
        assert!(b.keys_between(0, u64::MAX, usize::MAX).is_none());
    }

    #[test]
    fn test_keys_between_respects_limit() {
        let b = bucketer();
        assert_eq!(b.keys_between(0, 9 * SEC, 10).map(|keys| keys.len()), Some(10));
        assert!(b.keys_between(0, 10 * SEC, 10).is_none());
    }
}
