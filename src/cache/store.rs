//! Fast store abstraction.
//!
//! The fast store is a keyed in-memory store holding strings, sets and sorted sets
//! with optional per-key expiry. Every mutation goes through [`FastStore::exec`],
//! which applies a [`Batch`] of commands atomically and in order.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("fast store unavailable: {0}")]
    Unavailable(String),
    #[error("operation against key `{key}` holding the wrong kind of value")]
    WrongType { key: String },
    #[error("value at `{key}` is not an integer")]
    NotInteger { key: String },
    #[error("batch aborted: watched key `{key}` changed")]
    Conflict { key: String },
    #[error("unexpected reply: expected {expected}, found {found}")]
    UnexpectedReply {
        expected: &'static str,
        found: String,
    },
    #[error("fast store timed out")]
    Timeout,
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    fn unexpected(expected: &'static str, found: &Reply) -> Self {
        Self::UnexpectedReply {
            expected,
            found: format!("{found:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Get {
        key: String,
    },
    /// Overwrite a string value. `ttl: None` leaves the key persistent.
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    /// Set only when absent; replies `Bool(created)`.
    SetNx {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    Del {
        keys: Vec<String>,
    },
    Exists {
        key: String,
    },
    /// Replies `Bool(false)` when the key does not exist.
    Expire {
        key: String,
        ttl: Duration,
    },
    Incr {
        key: String,
    },
    SAdd {
        key: String,
        members: Vec<String>,
    },
    SIsMember {
        key: String,
        member: String,
    },
    ZAdd {
        key: String,
        member: String,
        score: f64,
    },
    /// Add only when the member is absent.
    ZAddNx {
        key: String,
        member: String,
        score: f64,
    },
    ZIncrBy {
        key: String,
        member: String,
        delta: f64,
    },
    ZScore {
        key: String,
        member: String,
    },
    ZRem {
        key: String,
        member: String,
    },
    /// Members by descending score, ranks `start..=stop`.
    ZRevRange {
        key: String,
        start: usize,
        stop: usize,
    },
    /// Number of members with `min <= score <= max`.
    ZCount {
        key: String,
        min: f64,
        max: f64,
    },
    /// Store the intersection of `sources` into `dest`, combining scores with max.
    /// Plain sets contribute a score of 1 per member.
    ZInterStoreMax {
        dest: String,
        sources: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nil,
    Ok,
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Members(Vec<String>),
}

impl Reply {
    pub fn into_int(self) -> Result<i64, StoreError> {
        match self {
            Reply::Int(value) => Ok(value),
            other => Err(StoreError::unexpected("integer", &other)),
        }
    }

    pub fn into_bool(self) -> Result<bool, StoreError> {
        match self {
            Reply::Bool(value) => Ok(value),
            other => Err(StoreError::unexpected("bool", &other)),
        }
    }

    pub fn into_opt_str(self) -> Result<Option<String>, StoreError> {
        match self {
            Reply::Nil => Ok(None),
            Reply::Str(value) => Ok(Some(value)),
            other => Err(StoreError::unexpected("string or nil", &other)),
        }
    }

    pub fn into_opt_float(self) -> Result<Option<f64>, StoreError> {
        match self {
            Reply::Nil => Ok(None),
            Reply::Float(value) => Ok(Some(value)),
            other => Err(StoreError::unexpected("float or nil", &other)),
        }
    }

    pub fn into_float(self) -> Result<f64, StoreError> {
        match self {
            Reply::Float(value) => Ok(value),
            other => Err(StoreError::unexpected("float", &other)),
        }
    }

    pub fn into_members(self) -> Result<Vec<String>, StoreError> {
        match self {
            Reply::Members(members) => Ok(members),
            other => Err(StoreError::unexpected("members", &other)),
        }
    }

    /// Interpret a `GET` reply as a counter; absent counters read as zero.
    pub fn into_counter(self) -> Result<i64, StoreError> {
        Ok(self.into_opt_counter()?.unwrap_or(0))
    }

    /// Like [`Reply::into_counter`] but keeps "no counter" distinct from zero.
    pub fn into_opt_counter(self) -> Result<Option<i64>, StoreError> {
        match self.into_opt_str()? {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| StoreError::UnexpectedReply {
                    expected: "integer string",
                    found: raw,
                }),
        }
    }
}

/// Pull the next reply of an executed batch, failing if the store returned fewer
/// replies than commands.
pub fn next_reply(replies: &mut impl Iterator<Item = Reply>) -> Result<Reply, StoreError> {
    replies.next().ok_or_else(|| StoreError::UnexpectedReply {
        expected: "another reply",
        found: "end of batch".to_string(),
    })
}

/// An ordered group of commands applied as one atomic unit.
///
/// Watched keys turn the batch into a compare-and-apply: if any of them exists
/// when the batch runs, nothing is applied and [`StoreError::Conflict`] is
/// returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    commands: Vec<Command>,
    absent: Vec<String>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    pub fn extend(mut self, commands: impl IntoIterator<Item = Command>) -> Self {
        self.commands.extend(commands);
        self
    }

    /// Abort the batch if `key` exists at execution time.
    pub fn require_absent(mut self, key: impl Into<String>) -> Self {
        self.absent.push(key.into());
        self
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn watched_absent(&self) -> &[String] {
        &self.absent
    }

    pub fn into_parts(self) -> (Vec<Command>, Vec<String>) {
        (self.commands, self.absent)
    }
}

#[async_trait]
pub trait FastStore: Send + Sync {
    /// Apply every command of `batch` atomically, returning one reply per command.
    /// On error no command of the batch has taken effect.
    async fn exec(&self, batch: Batch) -> Result<Vec<Reply>, StoreError>;

    /// Live keys beginning with `prefix`, in no particular order.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    async fn run(&self, command: Command) -> Result<Reply, StoreError> {
        self.exec(Batch::new().push(command))
            .await?
            .pop()
            .ok_or_else(|| StoreError::UnexpectedReply {
                expected: "one reply",
                found: "none".to_string(),
            })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.run(Command::Get {
            key: key.to_string(),
        })
        .await?
        .into_opt_str()
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.run(Command::Set {
            key: key.to_string(),
            value,
            ttl,
        })
        .await
        .map(|_| ())
    }

    async fn del(&self, keys: Vec<String>) -> Result<i64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.run(Command::Del { keys }).await?.into_int()
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.run(Command::Exists {
            key: key.to_string(),
        })
        .await?
        .into_bool()
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.run(Command::Expire {
            key: key.to_string(),
            ttl,
        })
        .await?
        .into_bool()
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
        self.run(Command::ZScore {
            key: key.to_string(),
            member: member.to_string(),
        })
        .await?
        .into_opt_float()
    }

    async fn zrevrange(
        &self,
        key: &str,
        start: usize,
        stop: usize,
    ) -> Result<Vec<String>, StoreError> {
        self.run(Command::ZRevRange {
            key: key.to_string(),
            start,
            stop,
        })
        .await?
        .into_members()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_reply_treats_nil_as_zero() {
        assert_eq!(Reply::Nil.into_counter(), Ok(0));
        assert_eq!(Reply::Str("42".to_string()).into_counter(), Ok(42));
        assert!(Reply::Str("forty".to_string()).into_counter().is_err());
        assert_eq!(Reply::Nil.into_opt_counter(), Ok(None));
    }

    #[test]
    fn mismatched_reply_reports_expected_kind() {
        let err = Reply::Ok.into_int().expect_err("mismatch");
        assert!(matches!(
            err,
            StoreError::UnexpectedReply {
                expected: "integer",
                ..
            }
        ));
    }

    #[test]
    fn batch_builder_keeps_command_order() {
        let batch = Batch::new()
            .push(Command::Incr {
                key: "a".to_string(),
            })
            .push(Command::Expire {
                key: "a".to_string(),
                ttl: Duration::from_secs(5),
            })
            .require_absent("marker");

        assert_eq!(batch.len(), 2);
        assert!(matches!(batch.commands()[0], Command::Incr { .. }));
        assert_eq!(batch.watched_absent(), ["marker".to_string()]);
    }
}
