//! The sorted-set store a series lives in.
//!
//! A [`Connection`] is a strict request/response channel: replies come back
//! in the order requests were sent, and nothing pairs them other than that
//! order. Callers may queue several requests with [`Connection::send`],
//! push them out with [`Connection::flush`], and then collect one reply per
//! request with [`Connection::receive`].

mod memory;
#[cfg(feature = "redis")]
mod redis_conn;

pub use memory::MemoryConnection;
#[cfg(feature = "redis")]
pub use redis_conn::RedisConnection;

use crate::core::ConnectionError;

pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

/// A request understood by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Insert `member` into the sorted set at `key` with `score`.
    ZAdd {
        key: String,
        score: u64,
        member: Vec<u8>,
    },
    /// Insert like `ZAdd`, then set a TTL of `ttl_secs` on `key` if the set
    /// now holds exactly one member. Applied atomically.
    ZAddExpireIfFirst {
        key: String,
        score: u64,
        member: Vec<u8>,
        ttl_secs: u64,
    },
    /// Members of `key` with `min <= score <= max`, ascending by score.
    ZRangeByScore { key: String, min: u64, max: u64 },
    /// Number of members at `key`.
    ZCard { key: String },
    /// Remaining time to live of `key` in seconds; -1 without TTL, -2 if missing.
    Ttl { key: String },
}

impl Command {
    pub fn key(&self) -> &str {
        match self {
            Command::ZAdd { key, .. }
            | Command::ZAddExpireIfFirst { key, .. }
            | Command::ZRangeByScore { key, .. }
            | Command::ZCard { key }
            | Command::Ttl { key } => key,
        }
    }
}

/// A reply paired with one [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Integer(i64),
    Members(Vec<Vec<u8>>),
    Nil,
}

impl Reply {
    pub fn into_integer(self) -> ConnectionResult<i64> {
        match self {
            Reply::Integer(value) => Ok(value),
            other => Err(unexpected("integer", &other)),
        }
    }

    pub fn into_members(self) -> ConnectionResult<Vec<Vec<u8>>> {
        match self {
            Reply::Members(members) => Ok(members),
            Reply::Nil => Ok(Vec::new()),
            other => Err(unexpected("members", &other)),
        }
    }
}

fn unexpected(wanted: &str, got: &Reply) -> ConnectionError {
    ConnectionError::Protocol(format!("expected {wanted} reply, got {got:?}"))
}

/// A single-use-at-a-time channel to the store.
pub trait Connection: Send {
    /// Queue a request. It may not reach the store until [`flush`](Self::flush).
    fn send(&mut self, command: &Command) -> ConnectionResult<()>;

    /// Push every queued request to the store.
    fn flush(&mut self) -> ConnectionResult<()>;

    /// Read the reply to the oldest request that has not been answered yet.
    fn receive(&mut self) -> ConnectionResult<Reply>;

    /// Send one request and wait for its reply.
    fn execute(&mut self, command: &Command) -> ConnectionResult<Reply> {
        self.send(command)?;
        self.flush()?;
        self.receive()
    }
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn send(&mut self, command: &Command) -> ConnectionResult<()> {
        (**self).send(command)
    }

    fn flush(&mut self) -> ConnectionResult<()> {
        (**self).flush()
    }

    fn receive(&mut self) -> ConnectionResult<Reply> {
        (**self).receive()
    }
}
