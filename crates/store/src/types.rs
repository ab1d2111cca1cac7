//! Core types for the in-process log store.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use groupstream_types::{EntryId, FieldSet, RawEntry, TrimStrategy};
use serde::{Deserialize, Serialize};

/// Number of entries an approximate trim removes at once.
///
/// Approximate trimming only drops whole chunks, so a log bounded to `n` holds
/// between `n` and `n + TRIM_CHUNK - 1` entries once it has grown past `n`.
pub const TRIM_CHUNK: usize = 100;

/// An entry stored in a log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    pub id: EntryId,
    pub fields: FieldSet,
    /// Timestamp when the entry was appended (milliseconds since epoch)
    pub timestamp: i64,
}

impl StoredEntry {
    pub fn to_raw(&self) -> RawEntry {
        RawEntry::new(self.id, self.fields.clone())
    }
}

/// An entry delivered to a consumer and not yet acknowledged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingEntry {
    pub consumer: String,
    /// Last delivery time (milliseconds since epoch)
    pub delivered_at: i64,
    pub delivery_count: u32,
}

/// Server-side bookkeeping for one consumer group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerGroupState {
    pub name: String,
    /// Highest id handed to any consumer of the group
    pub last_delivered: EntryId,
    /// Total entries delivered since the group was created
    pub entries_read: u64,
    /// Pending entries list, keyed by entry id
    pub pending: BTreeMap<EntryId, PendingEntry>,
    /// Consumer name -> last time it read (milliseconds since epoch)
    pub consumers: BTreeMap<String, i64>,
    pub created_at: i64,
}

impl ConsumerGroupState {
    pub fn new(name: String, last_delivered: EntryId) -> Self {
        Self {
            name,
            last_delivered,
            entries_read: 0,
            pending: BTreeMap::new(),
            consumers: BTreeMap::new(),
            created_at: Utc::now().timestamp_millis(),
        }
    }

    pub fn info(&self) -> GroupInfo {
        let consumers = self
            .consumers
            .iter()
            .map(|(name, seen_at)| ConsumerInfo {
                name: name.clone(),
                pending: self
                    .pending
                    .values()
                    .filter(|p| &p.consumer == name)
                    .count(),
                seen_at: *seen_at,
            })
            .collect();

        GroupInfo {
            name: self.name.clone(),
            consumers,
            pending: self.pending.len(),
            last_delivered_id: self.last_delivered,
            entries_read: self.entries_read,
        }
    }
}

/// One append-only log and its consumer groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    /// Key identifying the log
    pub key: String,
    /// Entries in ascending id order
    pub entries: VecDeque<StoredEntry>,
    /// Last id assigned (survives trimming)
    pub last_id: EntryId,
    /// Total entries ever appended
    pub entries_added: u64,
    pub groups: BTreeMap<String, ConsumerGroupState>,
    /// Absolute expiration timestamp
    pub expires_at: Option<DateTime<Utc>>,
    /// Creation timestamp (milliseconds since epoch)
    pub created_at: i64,
}

impl Log {
    /// Create a new empty log with the given key.
    pub fn new(key: String) -> Self {
        Self {
            key,
            entries: VecDeque::new(),
            last_id: EntryId::MIN,
            entries_added: 0,
            groups: BTreeMap::new(),
            expires_at: None,
            created_at: Utc::now().timestamp_millis(),
        }
    }

    /// Check if the log has expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires_at| Utc::now() >= expires_at)
            .unwrap_or(false)
    }

    /// Append a field set and return its id.
    pub fn push(&mut self, fields: FieldSet) -> EntryId {
        let now = Utc::now();
        let id = EntryId::next_after(self.last_id, now.timestamp_millis().max(0) as u64);
        self.entries.push_back(StoredEntry {
            id,
            fields,
            timestamp: now.timestamp_millis(),
        });
        self.last_id = id;
        self.entries_added += 1;
        id
    }

    /// Apply a length bound. Returns the number of entries removed.
    pub fn trim(&mut self, strategy: TrimStrategy) -> usize {
        let before = self.entries.len();
        match strategy {
            TrimStrategy::None => {}
            TrimStrategy::Approximate(max_len) => {
                while self.entries.len().saturating_sub(max_len) >= TRIM_CHUNK {
                    self.entries.drain(..TRIM_CHUNK);
                }
            }
        }
        before - self.entries.len()
    }

    /// Entries strictly after `after`, at most `count` of them (0 = no limit).
    pub fn entries_after(&self, after: EntryId, count: usize) -> Vec<&StoredEntry> {
        let start = self.entries.partition_point(|e| e.id <= after);
        let limit = if count == 0 { usize::MAX } else { count };
        self.entries.range(start..).take(limit).collect()
    }

    pub fn info(&self) -> LogInfo {
        LogInfo {
            key: self.key.clone(),
            length: self.entries.len(),
            first_id: self.entries.front().map(|e| e.id),
            last_id: self.last_id,
            entries_added: self.entries_added,
            groups: self.groups.len(),
            expires_at: self.expires_at,
            created_at: self.created_at,
        }
    }
}

/// Summary of a log for the admin surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogInfo {
    pub key: String,
    pub length: usize,
    pub first_id: Option<EntryId>,
    pub last_id: EntryId,
    pub entries_added: u64,
    pub groups: usize,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: i64,
}

/// Summary of a consumer group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub name: String,
    pub consumers: Vec<ConsumerInfo>,
    pub pending: usize,
    pub last_delivered_id: EntryId,
    pub entries_read: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerInfo {
    pub name: String,
    pub pending: usize,
    pub seen_at: i64,
}

/// Log lifecycle event for hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogLifecycleEvent {
    Created {
        key: String,
        timestamp: i64,
    },
    GroupCreated {
        key: String,
        group: String,
        timestamp: i64,
    },
    Deleted {
        key: String,
        timestamp: i64,
    },
    Expired {
        key: String,
        timestamp: i64,
    },
}

/// Admin server configuration options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminOptions {
    /// Port to listen on (0 for auto-assign)
    pub port: u16,
    /// Host to bind to
    pub host: String,
}

impl Default for AdminOptions {
    fn default() -> Self {
        Self {
            port: 4437,
            host: "127.0.0.1".to_string(),
        }
    }
}
