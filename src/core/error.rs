use thiserror::Error;

/// Failure reported by the underlying sorted-set store.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The store answered with a reply the request cannot be paired with.
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("no point at {timestamp_ns} in bucket {key}")]
    NotFound { key: String, timestamp_ns: u64 },
    #[error("invalid range: begin {begin_ns} is after end {end_ns}")]
    InvalidRange { begin_ns: u64, end_ns: u64 },
    #[error("range [{begin_ns}, {end_ns}] spans more than {max_buckets} buckets")]
    TooManyBuckets {
        begin_ns: u64,
        end_ns: u64,
        max_buckets: usize,
    },
    #[error("store error: {0}")]
    Store(#[from] ConnectionError),
    #[error("connection lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, Error>;
