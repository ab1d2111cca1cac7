//! The log store capability consumed by the stream transport.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entry::{EntryId, FieldSet, RawEntry};

/// Errors a log store can report.
///
/// Missing keys and missing groups are distinct variants so callers can react to
/// them without inspecting message text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("no such key '{0}'")]
    NoSuchKey(String),

    #[error("NOGROUP No such key '{key}' or consumer group '{group}'")]
    NoGroup { key: String, group: String },

    #[error("BUSYGROUP Consumer group '{group}' already exists on '{key}'")]
    GroupExists { key: String, group: String },

    #[error("Invalid entry id: {0}")]
    InvalidEntryId(String),

    #[error("ERR invalid expire time: {0} seconds")]
    InvalidTtl(u64),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store error: {0}")]
    Server(String),
}

impl StoreError {
    /// The log key a missing-key or missing-group error refers to.
    pub fn missing_key(&self) -> Option<&str> {
        match self {
            StoreError::NoSuchKey(key) | StoreError::NoGroup { key, .. } => Some(key),
            _ => None,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Where a newly created consumer group starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPosition {
    /// Oldest possible position (`0-0`); every entry in the log is new to the group.
    #[default]
    Beginning,
    /// Current tail (`$`); only entries appended after creation are new.
    Tail,
    /// Explicit id; entries strictly after it are new.
    After(EntryId),
}

impl fmt::Display for StartPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartPosition::Beginning => write!(f, "{}", EntryId::MIN),
            StartPosition::Tail => write!(f, "$"),
            StartPosition::After(id) => write!(f, "{}", id),
        }
    }
}

/// Length bound applied to a log on append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrimStrategy {
    #[default]
    None,
    /// Keep at least the `n` most recent entries; the store may keep more.
    Approximate(usize),
}

/// Key-addressed append-only logs with server-side consumer-group bookkeeping.
///
/// Every method is a store round-trip. Implementations serialize concurrent
/// writers and readers on the same key themselves.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append a field set, creating the log if it does not exist.
    async fn append(&self, key: &str, fields: FieldSet, trim: TrimStrategy)
    -> StoreResult<EntryId>;

    /// Whether the log exists (and has not expired).
    async fn key_exists(&self, key: &str) -> StoreResult<bool>;

    /// Names of the groups registered on a log. Fails with
    /// [`StoreError::NoSuchKey`] when the log is absent.
    async fn group_names(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Register a consumer group.
    ///
    /// Fails with [`StoreError::GroupExists`] if the group is already present and
    /// with [`StoreError::NoSuchKey`] if the log is absent and
    /// `create_key_if_absent` is false.
    async fn create_group(
        &self,
        key: &str,
        group: &str,
        start: StartPosition,
        create_key_if_absent: bool,
    ) -> StoreResult<()>;

    /// Claim up to `count` entries never delivered to any consumer of `group`
    /// and record them as pending for `consumer`.
    async fn read_group(
        &self,
        key: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> StoreResult<Vec<RawEntry>>;

    /// Remove an entry from the group's pending list. Returns how many entries
    /// were acknowledged; unknown or already acknowledged ids yield 0.
    async fn acknowledge(&self, key: &str, group: &str, id: EntryId) -> StoreResult<u64>;
}
