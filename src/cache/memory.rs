//! In-process fast store.
//!
//! A single mutex guards the whole keyspace, which makes every batch trivially
//! atomic. Expiry is lazy: an expired key is dropped the next time it is touched.
//! Keys carrying a TTL are tracked in an LRU so the number of volatile keys stays
//! bounded; overflow evicts the least recently used one.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::time::Instant;
use tracing::debug;

use super::lock::mutex_lock;
use super::store::{Batch, Command, FastStore, Reply, StoreError};

const SOURCE: &str = "cache::memory";

// ============================================================================
// Value types
// ============================================================================

#[derive(Debug, Clone)]
struct RankKey {
    score: f64,
    member: String,
}

impl PartialEq for RankKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankKey {}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.member.cmp(&other.member))
    }
}

#[derive(Debug, Clone, Default)]
struct SortedSet {
    scores: HashMap<String, f64>,
    order: BTreeSet<RankKey>,
}

impl SortedSet {
    /// Returns true when `member` was not present before.
    fn insert(&mut self, member: String, score: f64) -> bool {
        let is_new = match self.scores.insert(member.clone(), score) {
            Some(previous) => {
                self.order.remove(&RankKey {
                    score: previous,
                    member: member.clone(),
                });
                false
            }
            None => true,
        };
        self.order.insert(RankKey { score, member });
        is_new
    }

    fn score(&self, member: &str) -> Option<f64> {
        self.scores.get(member).copied()
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.order.remove(&RankKey {
                    score,
                    member: member.to_string(),
                });
                true
            }
            None => false,
        }
    }

    fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    fn rev_range(&self, start: usize, stop: usize) -> Vec<String> {
        if start > stop {
            return Vec::new();
        }
        self.order
            .iter()
            .rev()
            .skip(start)
            .take(stop - start + 1)
            .map(|key| key.member.clone())
            .collect()
    }

    fn count(&self, min: f64, max: f64) -> usize {
        self.order
            .iter()
            .filter(|key| key.score >= min && key.score <= max)
            .count()
    }
}

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(HashSet<String>),
    ZSet(SortedSet),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn persistent(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

// ============================================================================
// Keyspace
// ============================================================================

struct Keyspace {
    entries: HashMap<String, Entry>,
    volatile: LruCache<String, ()>,
}

impl Keyspace {
    fn purge_expired(&mut self, key: &str, now: Instant) {
        if self.entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            self.entries.remove(key);
            self.volatile.pop(key);
        }
    }

    fn live(&mut self, key: &str, now: Instant) -> Option<&Entry> {
        self.purge_expired(key, now);
        if self.entries.contains_key(key) {
            self.volatile.get(key);
        }
        self.entries.get(key)
    }

    fn sync_volatile(&mut self, key: &str) {
        match self.entries.get(key) {
            Some(entry) if entry.expires_at.is_some() => {
                self.volatile.put(key.to_string(), ());
            }
            _ => {
                self.volatile.pop(key);
            }
        }
    }

    fn sweep_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.entries.remove(key);
            self.volatile.pop(key.as_str());
        }
        expired.len()
    }

    fn enforce_capacity(&mut self, capacity: usize, now: Instant) -> usize {
        if self.volatile.len() <= capacity {
            return 0;
        }
        self.sweep_expired(now);

        let mut evicted = 0;
        while self.volatile.len() > capacity {
            match self.volatile.pop_lru() {
                Some((key, ())) => {
                    self.entries.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }
}

// ============================================================================
// Transactional application of a batch
// ============================================================================

struct Tx<'a> {
    space: &'a mut Keyspace,
    now: Instant,
    undo: HashMap<String, Option<Entry>>,
}

impl<'a> Tx<'a> {
    fn new(space: &'a mut Keyspace, now: Instant) -> Self {
        Self {
            space,
            now,
            undo: HashMap::new(),
        }
    }

    /// Record the prior state of `key` the first time the batch mutates it.
    fn touch(&mut self, key: &str) {
        if !self.undo.contains_key(key) {
            let prior = self.space.entries.get(key).cloned();
            self.undo.insert(key.to_string(), prior);
        }
    }

    fn rollback(self) {
        for (key, prior) in self.undo {
            match prior {
                Some(entry) => {
                    self.space.entries.insert(key.clone(), entry);
                    self.space.sync_volatile(&key);
                }
                None => {
                    self.space.entries.remove(&key);
                    self.space.volatile.pop(key.as_str());
                }
            }
        }
    }

    fn exists(&mut self, key: &str) -> bool {
        self.space.live(key, self.now).is_some()
    }

    fn string(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        match self.space.live(key, self.now) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn zset(&mut self, key: &str) -> Result<Option<&SortedSet>, StoreError> {
        match self.space.live(key, self.now) {
            None => Ok(None),
            Some(Entry {
                value: Value::ZSet(zset),
                ..
            }) => Ok(Some(zset)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn zset_mut(&mut self, key: &str) -> Result<&mut SortedSet, StoreError> {
        if self
            .space
            .live(key, self.now)
            .is_some_and(|entry| !matches!(entry.value, Value::ZSet(_)))
        {
            return Err(wrong_type(key));
        }
        self.touch(key);
        let entry = self
            .space
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::persistent(Value::ZSet(SortedSet::default())));
        match &mut entry.value {
            Value::ZSet(zset) => Ok(zset),
            _ => Err(wrong_type(key)),
        }
    }

    fn set_mut(&mut self, key: &str) -> Result<&mut HashSet<String>, StoreError> {
        if self
            .space
            .live(key, self.now)
            .is_some_and(|entry| !matches!(entry.value, Value::Set(_)))
        {
            return Err(wrong_type(key));
        }
        self.touch(key);
        let entry = self
            .space
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::persistent(Value::Set(HashSet::new())));
        match &mut entry.value {
            Value::Set(set) => Ok(set),
            _ => Err(wrong_type(key)),
        }
    }

    fn put(&mut self, key: &str, entry: Entry) {
        self.touch(key);
        self.space.entries.insert(key.to_string(), entry);
        self.space.sync_volatile(key);
    }

    fn remove(&mut self, key: &str) -> bool {
        if !self.exists(key) {
            return false;
        }
        self.touch(key);
        self.space.entries.remove(key);
        self.space.volatile.pop(key);
        true
    }

    /// Members and scores of a ZINTERSTORE source; plain sets weigh 1.
    fn weighted_members(&mut self, key: &str) -> Result<HashMap<String, f64>, StoreError> {
        match self.space.live(key, self.now) {
            None => Ok(HashMap::new()),
            Some(Entry {
                value: Value::ZSet(zset),
                ..
            }) => Ok(zset.scores.clone()),
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(set.iter().map(|member| (member.clone(), 1.0)).collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn apply(&mut self, command: Command) -> Result<Reply, StoreError> {
        let now = self.now;
        match command {
            Command::Get { key } => Ok(self.string(&key)?.map_or(Reply::Nil, Reply::Str)),
            Command::Set { key, value, ttl } => {
                self.put(
                    &key,
                    Entry {
                        value: Value::Str(value),
                        expires_at: ttl.map(|ttl| now + ttl),
                    },
                );
                Ok(Reply::Ok)
            }
            Command::SetNx { key, value, ttl } => {
                if self.exists(&key) {
                    return Ok(Reply::Bool(false));
                }
                self.put(
                    &key,
                    Entry {
                        value: Value::Str(value),
                        expires_at: ttl.map(|ttl| now + ttl),
                    },
                );
                Ok(Reply::Bool(true))
            }
            Command::Del { keys } => {
                let removed = keys.iter().filter(|key| self.remove(key)).count();
                Ok(Reply::Int(removed as i64))
            }
            Command::Exists { key } => Ok(Reply::Bool(self.exists(&key))),
            Command::Expire { key, ttl } => {
                if !self.exists(&key) {
                    return Ok(Reply::Bool(false));
                }
                self.touch(&key);
                if let Some(entry) = self.space.entries.get_mut(&key) {
                    entry.expires_at = Some(now + ttl);
                }
                self.space.sync_volatile(&key);
                Ok(Reply::Bool(true))
            }
            Command::Incr { key } => {
                let current = match self.string(&key)? {
                    None => 0,
                    Some(raw) => raw
                        .parse::<i64>()
                        .map_err(|_| StoreError::NotInteger { key: key.clone() })?,
                };
                let next = current
                    .checked_add(1)
                    .ok_or_else(|| StoreError::NotInteger { key: key.clone() })?;
                self.touch(&key);
                let expires_at = self.space.entries.get(&key).and_then(|e| e.expires_at);
                self.space.entries.insert(
                    key,
                    Entry {
                        value: Value::Str(next.to_string()),
                        expires_at,
                    },
                );
                Ok(Reply::Int(next))
            }
            Command::SAdd { key, members } => {
                let set = self.set_mut(&key)?;
                let added = members
                    .into_iter()
                    .filter(|member| set.insert(member.clone()))
                    .count();
                Ok(Reply::Int(added as i64))
            }
            Command::SIsMember { key, member } => match self.space.live(&key, now) {
                None => Ok(Reply::Bool(false)),
                Some(Entry {
                    value: Value::Set(set),
                    ..
                }) => Ok(Reply::Bool(set.contains(&member))),
                Some(_) => Err(wrong_type(&key)),
            },
            Command::ZAdd { key, member, score } => {
                let zset = self.zset_mut(&key)?;
                Ok(Reply::Bool(zset.insert(member, score)))
            }
            Command::ZAddNx { key, member, score } => {
                let zset = self.zset_mut(&key)?;
                if zset.score(&member).is_some() {
                    return Ok(Reply::Bool(false));
                }
                Ok(Reply::Bool(zset.insert(member, score)))
            }
            Command::ZIncrBy { key, member, delta } => {
                let zset = self.zset_mut(&key)?;
                let next = zset.score(&member).unwrap_or(0.0) + delta;
                zset.insert(member, next);
                Ok(Reply::Float(next))
            }
            Command::ZScore { key, member } => Ok(self
                .zset(&key)?
                .and_then(|zset| zset.score(&member))
                .map_or(Reply::Nil, Reply::Float)),
            Command::ZRem { key, member } => {
                if self.zset(&key)?.is_none() {
                    return Ok(Reply::Bool(false));
                }
                let zset = self.zset_mut(&key)?;
                let removed = zset.remove(&member);
                if zset.is_empty() {
                    self.space.entries.remove(&key);
                    self.space.volatile.pop(key.as_str());
                }
                Ok(Reply::Bool(removed))
            }
            Command::ZRevRange { key, start, stop } => Ok(Reply::Members(
                self.zset(&key)?
                    .map(|zset| zset.rev_range(start, stop))
                    .unwrap_or_default(),
            )),
            Command::ZCount { key, min, max } => Ok(Reply::Int(
                self.zset(&key)?.map_or(0, |zset| zset.count(min, max)) as i64,
            )),
            Command::ZInterStoreMax { dest, sources } => {
                let mut combined: Option<HashMap<String, f64>> = None;
                for source in &sources {
                    let weighted = self.weighted_members(source)?;
                    combined = Some(match combined {
                        None => weighted,
                        Some(acc) => acc
                            .into_iter()
                            .filter_map(|(member, score)| {
                                weighted
                                    .get(&member)
                                    .map(|other| (member, score.max(*other)))
                            })
                            .collect(),
                    });
                }

                let combined = combined.unwrap_or_default();
                let cardinality = combined.len();
                if combined.is_empty() {
                    self.remove(&dest);
                } else {
                    let mut zset = SortedSet::default();
                    for (member, score) in combined {
                        zset.insert(member, score);
                    }
                    self.put(&dest, Entry::persistent(Value::ZSet(zset)));
                }
                Ok(Reply::Int(cardinality as i64))
            }
        }
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

pub struct MemoryStore {
    space: Mutex<Keyspace>,
    max_volatile_keys: NonZeroUsize,
}

impl MemoryStore {
    pub fn new(max_volatile_keys: NonZeroUsize) -> Self {
        Self {
            space: Mutex::new(Keyspace {
                entries: HashMap::new(),
                volatile: LruCache::unbounded(),
            }),
            max_volatile_keys,
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let space = mutex_lock(&self.space, SOURCE, "len");
        space
            .entries
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time to live of `key`; `None` when absent or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let space = mutex_lock(&self.space, SOURCE, "ttl");
        space
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Drop every expired key eagerly.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        mutex_lock(&self.space, SOURCE, "sweep_expired").sweep_expired(now)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(100_000).unwrap_or(NonZeroUsize::MIN))
    }
}

#[async_trait]
impl FastStore for MemoryStore {
    async fn exec(&self, batch: Batch) -> Result<Vec<Reply>, StoreError> {
        let (commands, absent) = batch.into_parts();
        let now = Instant::now();
        let mut guard = mutex_lock(&self.space, SOURCE, "exec");
        let space = &mut *guard;

        for key in absent {
            if space.live(&key, now).is_some() {
                return Err(StoreError::Conflict { key });
            }
        }

        let mut tx = Tx::new(space, now);
        let mut replies = Vec::with_capacity(commands.len());
        for command in commands {
            match tx.apply(command) {
                Ok(reply) => replies.push(reply),
                Err(err) => {
                    tx.rollback();
                    return Err(err);
                }
            }
        }
        drop(tx);

        let evicted = space.enforce_capacity(self.max_volatile_keys.get(), now);
        if evicted > 0 {
            metrics::counter!("plaza_fast_store_evict_total").increment(evicted as u64);
            debug!(
                target = SOURCE,
                evicted,
                capacity = self.max_volatile_keys.get(),
                "evicted least recently used volatile keys"
            );
        }

        Ok(replies)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let space = mutex_lock(&self.space, SOURCE, "scan_prefix");
        Ok(space
            .entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
