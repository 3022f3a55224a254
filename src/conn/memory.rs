//! In-process sorted-set keyspace.
//!
//! Behaves like the subset of Redis the series needs: members within a set
//! are unique and ordered by `(score, member bytes)`, re-adding an existing
//! member only moves its score, and a key with a TTL disappears once the
//! clock passes its deadline. Several connections can share one keyspace.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::conn::{Command, Connection, ConnectionResult, Reply};
use crate::core::{Clock, ConnectionError, SystemClock};

const NANOS_PER_SEC: u64 = 1_000_000_000;

#[derive(Debug, Default)]
struct SortedSet {
    /// Kept sorted by `(score, member)`.
    members: Vec<(u64, Vec<u8>)>,
    expires_at_ns: Option<u64>,
}

impl SortedSet {
    /// Returns true when `member` was not present before.
    fn insert(&mut self, score: u64, member: Vec<u8>) -> bool {
        let existed = match self.members.iter().position(|(_, m)| *m == member) {
            Some(idx) => {
                self.members.remove(idx);
                true
            }
            None => false,
        };
        let at = self
            .members
            .partition_point(|(s, m)| (*s, m.as_slice()) < (score, member.as_slice()));
        self.members.insert(at, (score, member));
        !existed
    }

    fn range_by_score(&self, min: u64, max: u64) -> Vec<Vec<u8>> {
        let start = self.members.partition_point(|(s, _)| *s < min);
        self.members[start..]
            .iter()
            .take_while(|(s, _)| *s <= max)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    sets: HashMap<String, SortedSet>,
}

impl Keyspace {
    fn purge_expired(&mut self, key: &str, now_ns: u64) {
        let expired = self
            .sets
            .get(key)
            .and_then(|set| set.expires_at_ns)
            .is_some_and(|deadline| now_ns >= deadline);
        if expired {
            self.sets.remove(key);
        }
    }

    fn apply(&mut self, command: &Command, now_ns: u64) -> Reply {
        self.purge_expired(command.key(), now_ns);
        match command {
            Command::ZAdd { key, score, member } => {
                let added = self
                    .sets
                    .entry(key.clone())
                    .or_default()
                    .insert(*score, member.clone());
                Reply::Integer(i64::from(added))
            }
            Command::ZAddExpireIfFirst {
                key,
                score,
                member,
                ttl_secs,
            } => {
                let set = self.sets.entry(key.clone()).or_default();
                let added = set.insert(*score, member.clone());
                if set.members.len() == 1 {
                    let ttl_ns = ttl_secs.saturating_mul(NANOS_PER_SEC);
                    set.expires_at_ns = Some(now_ns.saturating_add(ttl_ns));
                    log::debug!("bucket {key} born, expires in {ttl_secs}s");
                }
                Reply::Integer(i64::from(added))
            }
            Command::ZRangeByScore { key, min, max } => Reply::Members(
                self.sets
                    .get(key)
                    .map(|set| set.range_by_score(*min, *max))
                    .unwrap_or_default(),
            ),
            Command::ZCard { key } => {
                let len = self.sets.get(key).map_or(0, |set| set.members.len());
                Reply::Integer(i64::try_from(len).unwrap_or(i64::MAX))
            }
            Command::Ttl { key } => match self.sets.get(key) {
                None => Reply::Integer(-2),
                Some(SortedSet {
                    expires_at_ns: None,
                    ..
                }) => Reply::Integer(-1),
                Some(SortedSet {
                    expires_at_ns: Some(deadline),
                    ..
                }) => {
                    // Round to the nearest second like Redis does.
                    let remaining = deadline.saturating_sub(now_ns);
                    let secs = (remaining + NANOS_PER_SEC / 2) / NANOS_PER_SEC;
                    Reply::Integer(i64::try_from(secs).unwrap_or(i64::MAX))
                }
            },
        }
    }
}

/// A connection to an in-process keyspace.
///
/// Requests are buffered by [`send`](Connection::send) and applied together,
/// in order, on [`flush`](Connection::flush); replies are then handed out one
/// per [`receive`](Connection::receive).
pub struct MemoryConnection {
    keyspace: Arc<Mutex<Keyspace>>,
    clock: Arc<dyn Clock>,
    queued: Vec<Command>,
    replies: VecDeque<Reply>,
    receives_left: Option<usize>,
}

impl Default for MemoryConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnection {
    /// A connection to a fresh, empty keyspace on wall-clock time.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// A connection to a fresh keyspace whose TTLs run on `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            keyspace: Arc::new(Mutex::new(Keyspace::default())),
            clock,
            queued: Vec::new(),
            replies: VecDeque::new(),
            receives_left: None,
        }
    }

    /// Another, independent connection to the same keyspace.
    pub fn handle(&self) -> Self {
        Self {
            keyspace: Arc::clone(&self.keyspace),
            clock: Arc::clone(&self.clock),
            queued: Vec::new(),
            replies: VecDeque::new(),
            receives_left: None,
        }
    }

    /// Let `n` more receives succeed, then fail every later one as if the
    /// connection had dropped.
    pub fn fail_receive_after(&mut self, n: usize) {
        self.receives_left = Some(n);
    }

    /// Number of replies that have been produced but not yet received.
    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }

    /// Number of non-expired keys in the keyspace.
    pub fn key_count(&self) -> usize {
        let now_ns = self.clock.now();
        self.keyspace.lock().map_or(0, |keyspace| {
            keyspace
                .sets
                .values()
                .filter(|set| set.expires_at_ns.map_or(true, |deadline| now_ns < deadline))
                .count()
        })
    }
}

impl Connection for MemoryConnection {
    fn send(&mut self, command: &Command) -> ConnectionResult<()> {
        self.queued.push(command.clone());
        Ok(())
    }

    fn flush(&mut self) -> ConnectionResult<()> {
        if self.queued.is_empty() {
            return Ok(());
        }
        let now_ns = self.clock.now();
        let mut keyspace = self
            .keyspace
            .lock()
            .map_err(|_| ConnectionError::Protocol("keyspace lock poisoned".to_string()))?;
        log::trace!("flushing {} queued commands", self.queued.len());
        for command in self.queued.drain(..) {
            self.replies.push_back(keyspace.apply(&command, now_ns));
        }
        Ok(())
    }

    fn receive(&mut self) -> ConnectionResult<Reply> {
        if let Some(left) = self.receives_left.as_mut() {
            if *left == 0 {
                self.replies.clear();
                return Err(ConnectionError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "connection dropped",
                )));
            }
            *left -= 1;
        }
        self.replies
            .pop_front()
            .ok_or_else(|| ConnectionError::Protocol("receive without pending request".to_string()))
    }
}
