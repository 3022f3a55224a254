//! Redis-backed connection.

use std::collections::VecDeque;

use crate::conn::{Command, Connection, ConnectionResult, Reply};
use crate::core::ConnectionError;

/// ZADD, then EXPIRE only when the insert created the key. Runs atomically
/// on the server, so no other client can observe the bucket without its TTL.
const ZADD_EXPIRE_IF_FIRST: &str = r"
local added = redis.call('ZADD', KEYS[1], ARGV[1], ARGV[2])
if redis.call('ZCARD', KEYS[1]) == 1 then
  redis.call('EXPIRE', KEYS[1], ARGV[3])
end
return added
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyKind {
    Integer,
    Members,
}

/// Packed requests waiting for flush, and the reply kinds still owed.
#[derive(Debug, Default)]
struct Pipeline {
    buffer: Vec<u8>,
    expected: VecDeque<ReplyKind>,
    /// Entries at the back of `expected` whose bytes are still in `buffer`.
    unflushed: usize,
}

impl Pipeline {
    fn queue(&mut self, command: &Command) {
        let (packed, kind) = pack(command);
        self.buffer.extend_from_slice(&packed);
        self.expected.push_back(kind);
        self.unflushed += 1;
    }

    fn written(&mut self) {
        self.buffer.clear();
        self.unflushed = 0;
    }

    /// Forget the unflushed batch. Replies to it will never arrive.
    fn abort(&mut self) {
        let keep = self.expected.len() - self.unflushed;
        self.expected.truncate(keep);
        self.buffer.clear();
        self.unflushed = 0;
    }

    fn next_kind(&mut self) -> ConnectionResult<ReplyKind> {
        if self.expected.len() > self.unflushed {
            if let Some(kind) = self.expected.pop_front() {
                return Ok(kind);
            }
        }
        Err(ConnectionError::Protocol(
            "receive without pending request".to_string(),
        ))
    }
}

/// A [`Connection`] over a synchronous `redis::Connection`.
///
/// Sent commands are packed into one buffer and written with a single call
/// on flush, so a batch of range queries costs one round trip.
pub struct RedisConnection {
    inner: redis::Connection,
    pipeline: Pipeline,
}

impl RedisConnection {
    pub fn new(inner: redis::Connection) -> Self {
        Self {
            inner,
            pipeline: Pipeline::default(),
        }
    }

    /// Connect to `url`, e.g. `redis://127.0.0.1:6379/0`.
    pub fn open(url: &str) -> ConnectionResult<Self> {
        let client = redis::Client::open(url).map_err(backend)?;
        let inner = client.get_connection().map_err(backend)?;
        Ok(Self::new(inner))
    }

    pub fn into_inner(self) -> redis::Connection {
        self.inner
    }
}

fn backend(err: redis::RedisError) -> ConnectionError {
    ConnectionError::Backend(Box::new(err))
}

fn pack(command: &Command) -> (Vec<u8>, ReplyKind) {
    match command {
        Command::ZAdd { key, score, member } => {
            let mut cmd = redis::cmd("ZADD");
            cmd.arg(key).arg(*score).arg(member.as_slice());
            (cmd.get_packed_command(), ReplyKind::Integer)
        }
        Command::ZAddExpireIfFirst {
            key,
            score,
            member,
            ttl_secs,
        } => {
            let mut cmd = redis::cmd("EVAL");
            cmd.arg(ZADD_EXPIRE_IF_FIRST)
                .arg(1)
                .arg(key)
                .arg(*score)
                .arg(member.as_slice())
                .arg(*ttl_secs);
            (cmd.get_packed_command(), ReplyKind::Integer)
        }
        Command::ZRangeByScore { key, min, max } => {
            let mut cmd = redis::cmd("ZRANGEBYSCORE");
            cmd.arg(key).arg(*min).arg(*max);
            (cmd.get_packed_command(), ReplyKind::Members)
        }
        Command::ZCard { key } => {
            let mut cmd = redis::cmd("ZCARD");
            cmd.arg(key);
            (cmd.get_packed_command(), ReplyKind::Integer)
        }
        Command::Ttl { key } => {
            let mut cmd = redis::cmd("TTL");
            cmd.arg(key);
            (cmd.get_packed_command(), ReplyKind::Integer)
        }
    }
}

impl Connection for RedisConnection {
    fn send(&mut self, command: &Command) -> ConnectionResult<()> {
        self.pipeline.queue(command);
        Ok(())
    }

    fn flush(&mut self) -> ConnectionResult<()> {
        if self.pipeline.buffer.is_empty() {
            return Ok(());
        }
        match self.inner.send_packed_command(&self.pipeline.buffer) {
            Ok(()) => {
                self.pipeline.written();
                Ok(())
            }
            Err(err) => {
                self.pipeline.abort();
                Err(backend(err))
            }
        }
    }

    fn receive(&mut self) -> ConnectionResult<Reply> {
        let kind = self.pipeline.next_kind()?;
        let value = self.inner.recv_response().map_err(backend)?;
        if matches!(value, redis::Value::Nil) {
            return Ok(Reply::Nil);
        }
        match kind {
            ReplyKind::Integer => redis::from_redis_value::<i64>(&value)
                .map(Reply::Integer)
                .map_err(backend),
            ReplyKind::Members => redis::from_redis_value::<Vec<Vec<u8>>>(&value)
                .map(Reply::Members)
                .map_err(backend),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// RESP array of bulk strings, the way requests go over the wire.
    fn resp(args: &[&[u8]]) -> Vec<u8> {
        let mut out = format!("*{}\r\n", args.len()).into_bytes();
        for arg in args {
            out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
            out.extend_from_slice(arg);
            out.extend_from_slice(b"\r\n");
        }
        out
    }

    #[test]
    fn test_pack_range_by_score() {
        let (bytes, kind) = pack(&Command::ZRangeByScore {
            key: "dev::ts::0".to_string(),
            min: 0,
            max: 1_500_000_000,
        });
        assert_eq!(
            bytes,
            resp(&[b"ZRANGEBYSCORE", b"dev::ts::0", b"0", b"1500000000"])
        );
        assert_eq!(kind, ReplyKind::Members);
    }

    #[test]
    fn test_pack_zadd_expire_if_first() {
        let (bytes, kind) = pack(&Command::ZAddExpireIfFirst {
            key: "dev::ts::1000000000".to_string(),
            score: 1_000_000_007,
            member: vec![0xa1, b'x'],
            ttl_secs: 60,
        });
        assert_eq!(
            bytes,
            resp(&[
                b"EVAL",
                ZADD_EXPIRE_IF_FIRST.as_bytes(),
                b"1",
                b"dev::ts::1000000000",
                b"1000000007",
                &[0xa1, b'x'],
                b"60",
            ])
        );
        assert_eq!(kind, ReplyKind::Integer);
    }

    #[test]
    fn test_pack_ttl_and_zadd() {
        let (bytes, kind) = pack(&Command::Ttl {
            key: "k".to_string(),
        });
        assert_eq!(bytes, resp(&[b"TTL", b"k"]));
        assert_eq!(kind, ReplyKind::Integer);

        let (bytes, _) = pack(&Command::ZAdd {
            key: "k".to_string(),
            score: 5,
            member: b"m".to_vec(),
        });
        assert_eq!(bytes, resp(&[b"ZADD", b"k", b"5", b"m"]));
    }

    #[test]
    fn test_pipeline_pairs_kinds_in_send_order() {
        let mut pipeline = Pipeline::default();
        pipeline.queue(&Command::ZCard { key: "a".to_string() });
        pipeline.queue(&Command::ZRangeByScore {
            key: "b".to_string(),
            min: 0,
            max: 1,
        });
        pipeline.queue(&Command::Ttl { key: "c".to_string() });

        let mut expected = resp(&[b"ZCARD", b"a"]);
        expected.extend(resp(&[b"ZRANGEBYSCORE", b"b", b"0", b"1"]));
        expected.extend(resp(&[b"TTL", b"c"]));
        assert_eq!(pipeline.buffer, expected);

        // Nothing is owed before the batch is written.
        assert!(matches!(
            pipeline.next_kind(),
            Err(ConnectionError::Protocol(_))
        ));

        pipeline.written();
        assert!(pipeline.buffer.is_empty());
        assert_eq!(pipeline.next_kind().unwrap(), ReplyKind::Integer);
        assert_eq!(pipeline.next_kind().unwrap(), ReplyKind::Members);
        assert_eq!(pipeline.next_kind().unwrap(), ReplyKind::Integer);
        assert!(pipeline.next_kind().is_err());
    }

    #[test]
    fn test_failed_flush_forgets_unwritten_batch() {
        let mut pipeline = Pipeline::default();
        pipeline.queue(&Command::ZCard { key: "a".to_string() });
        pipeline.written();

        pipeline.queue(&Command::ZRangeByScore {
            key: "b".to_string(),
            min: 0,
            max: 1,
        });
        pipeline.queue(&Command::Ttl { key: "c".to_string() });
        pipeline.abort();

        assert!(pipeline.buffer.is_empty());
        assert_eq!(pipeline.expected.len(), 1);
        assert_eq!(pipeline.next_kind().unwrap(), ReplyKind::Integer);
        assert!(pipeline.next_kind().is_err());
    }
}
