//! In-memory log storage.
//!
//! Provides a thread-safe in-memory implementation of [`LogStore`] with
//! consumer groups, pending-entry tracking, approximate trimming and TTL expiry.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use groupstream_types::{
    EntryId, FieldSet, LogStore, RawEntry, StartPosition, StoreError, StoreResult, TrimStrategy,
};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::types::{ConsumerGroupState, GroupInfo, Log, LogInfo, LogLifecycleEvent, PendingEntry};

/// In-memory log store.
pub struct MemoryLogStore {
    /// Logs indexed by key
    logs: RwLock<HashMap<String, Log>>,
    /// Lifecycle event callback
    on_lifecycle: Option<Box<dyn Fn(LogLifecycleEvent) + Send + Sync>>,
}

impl MemoryLogStore {
    /// Create a new empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a new store with lifecycle callbacks.
    pub fn with_lifecycle<F>(on_lifecycle: F) -> Arc<Self>
    where
        F: Fn(LogLifecycleEvent) + Send + Sync + 'static,
    {
        Arc::new(Self {
            logs: RwLock::new(HashMap::new()),
            on_lifecycle: Some(Box::new(on_lifecycle)),
        })
    }

    /// Check if a log exists (and is not expired).
    pub fn has(&self, key: &str) -> bool {
        let logs = self.logs.read();
        logs.get(key).map(|log| !log.is_expired()).unwrap_or(false)
    }

    /// Append a field set, creating the log if needed.
    pub fn add(&self, key: &str, fields: FieldSet, trim: TrimStrategy) -> EntryId {
        let mut logs = self.logs.write();
        self.evict_if_expired(&mut logs, key);

        let log = logs.entry(key.to_string()).or_insert_with(|| {
            info!(key = %key, "Created log");
            self.emit_lifecycle(LogLifecycleEvent::Created {
                key: key.to_string(),
                timestamp: Utc::now().timestamp_millis(),
            });
            Log::new(key.to_string())
        });

        let id = log.push(fields);
        let trimmed = log.trim(trim);

        debug!(key = %key, id = %id, trimmed, "Appended to log");
        id
    }

    /// Names of the groups registered on a log.
    pub fn groups_of(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut logs = self.logs.write();
        self.evict_if_expired(&mut logs, key);

        logs.get(key)
            .map(|log| log.groups.keys().cloned().collect())
            .ok_or_else(|| StoreError::NoSuchKey(key.to_string()))
    }

    /// Register a consumer group.
    pub fn add_group(
        &self,
        key: &str,
        group: &str,
        start: StartPosition,
        create_key_if_absent: bool,
    ) -> StoreResult<()> {
        let mut logs = self.logs.write();
        self.evict_if_expired(&mut logs, key);

        if !logs.contains_key(key) {
            if !create_key_if_absent {
                return Err(StoreError::NoSuchKey(key.to_string()));
            }
            info!(key = %key, "Created log");
            logs.insert(key.to_string(), Log::new(key.to_string()));
            self.emit_lifecycle(LogLifecycleEvent::Created {
                key: key.to_string(),
                timestamp: Utc::now().timestamp_millis(),
            });
        }

        let log = logs
            .get_mut(key)
            .ok_or_else(|| StoreError::NoSuchKey(key.to_string()))?;

        if log.groups.contains_key(group) {
            return Err(StoreError::GroupExists {
                key: key.to_string(),
                group: group.to_string(),
            });
        }

        let last_delivered = match start {
            StartPosition::Beginning => EntryId::MIN,
            StartPosition::Tail => log.last_id,
            StartPosition::After(id) => id,
        };
        log.groups.insert(
            group.to_string(),
            ConsumerGroupState::new(group.to_string(), last_delivered),
        );

        info!(key = %key, group = %group, start = %start, "Created consumer group");
        self.emit_lifecycle(LogLifecycleEvent::GroupCreated {
            key: key.to_string(),
            group: group.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        });

        Ok(())
    }

    /// Deliver up to `count` new entries to `consumer` (0 = no limit).
    pub fn claim(
        &self,
        key: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> StoreResult<Vec<RawEntry>> {
        let mut logs = self.logs.write();
        self.evict_if_expired(&mut logs, key);

        let no_group = || StoreError::NoGroup {
            key: key.to_string(),
            group: group.to_string(),
        };

        let log = logs.get_mut(key).ok_or_else(no_group)?;
        let last_delivered = log.groups.get(group).ok_or_else(no_group)?.last_delivered;
        let delivered: Vec<RawEntry> = log
            .entries_after(last_delivered, count)
            .into_iter()
            .map(|e| e.to_raw())
            .collect();

        let state = log.groups.get_mut(group).ok_or_else(no_group)?;
        let now = Utc::now().timestamp_millis();
        state.consumers.insert(consumer.to_string(), now);

        for entry in &delivered {
            state.pending.insert(
                entry.id,
                PendingEntry {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                    delivery_count: 1,
                },
            );
            state.last_delivered = entry.id;
            state.entries_read += 1;
        }

        debug!(
            key = %key,
            group = %group,
            consumer = %consumer,
            delivered = delivered.len(),
            "Delivered entries"
        );

        Ok(delivered)
    }

    /// Remove an entry from a group's pending list.
    pub fn ack(&self, key: &str, group: &str, id: EntryId) -> u64 {
        let mut logs = self.logs.write();
        self.evict_if_expired(&mut logs, key);

        logs.get_mut(key)
            .and_then(|log| log.groups.get_mut(group))
            .map(|state| state.pending.remove(&id).is_some() as u64)
            .unwrap_or(0)
    }

    /// Delete a log and all its groups.
    pub fn delete(&self, key: &str) -> bool {
        let mut logs = self.logs.write();
        let removed = logs.remove(key).is_some();

        if removed {
            info!(key = %key, "Deleted log");
            self.emit_lifecycle(LogLifecycleEvent::Deleted {
                key: key.to_string(),
                timestamp: Utc::now().timestamp_millis(),
            });
        }

        removed
    }

    /// Expire a log `seconds` from now. Zero expires it immediately.
    ///
    /// Returns whether the log exists, or `InvalidTtl` when the deadline does
    /// not fit in a timestamp.
    pub fn expire(&self, key: &str, seconds: u64) -> StoreResult<bool> {
        let expires_at = i64::try_from(seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or(StoreError::InvalidTtl(seconds))?;

        let mut logs = self.logs.write();
        self.evict_if_expired(&mut logs, key);

        match logs.get_mut(key) {
            Some(log) => {
                log.expires_at = Some(expires_at);
                debug!(key = %key, seconds, "Set log expiry");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Summary of a log.
    pub fn info(&self, key: &str) -> Option<LogInfo> {
        let mut logs = self.logs.write();
        self.evict_if_expired(&mut logs, key);
        logs.get(key).map(Log::info)
    }

    /// Consumer group summaries of a log.
    pub fn group_infos(&self, key: &str) -> Option<Vec<GroupInfo>> {
        let mut logs = self.logs.write();
        self.evict_if_expired(&mut logs, key);
        logs.get(key)
            .map(|log| log.groups.values().map(ConsumerGroupState::info).collect())
    }

    /// Every entry currently held by a log, oldest first.
    pub fn range(&self, key: &str) -> Option<Vec<RawEntry>> {
        let mut logs = self.logs.write();
        self.evict_if_expired(&mut logs, key);
        logs.get(key)
            .map(|log| log.entries.iter().map(|e| e.to_raw()).collect())
    }

    /// Number of entries currently held by a log.
    pub fn len(&self, key: &str) -> Option<usize> {
        self.info(key).map(|info| info.length)
    }

    /// List all non-expired logs, sorted by key.
    pub fn list(&self) -> Vec<String> {
        let logs = self.logs.read();
        let mut keys: Vec<String> = logs
            .iter()
            .filter(|(_, log)| !log.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    fn evict_if_expired(&self, logs: &mut HashMap<String, Log>, key: &str) {
        if logs.get(key).is_some_and(Log::is_expired) {
            logs.remove(key);
            info!(key = %key, "Log expired");
            self.emit_lifecycle(LogLifecycleEvent::Expired {
                key: key.to_string(),
                timestamp: Utc::now().timestamp_millis(),
            });
        }
    }

    fn emit_lifecycle(&self, event: LogLifecycleEvent) {
        if let Some(ref callback) = self.on_lifecycle {
            callback(event);
        }
    }
}

impl Default for MemoryLogStore {
    fn default() -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            on_lifecycle: None,
        }
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn append(
        &self,
        key: &str,
        fields: FieldSet,
        trim: TrimStrategy,
    ) -> StoreResult<EntryId> {
        Ok(self.add(key, fields, trim))
    }

    async fn key_exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.has(key))
    }

    async fn group_names(&self, key: &str) -> StoreResult<Vec<String>> {
        self.groups_of(key)
    }

    async fn create_group(
        &self,
        key: &str,
        group: &str,
        start: StartPosition,
        create_key_if_absent: bool,
    ) -> StoreResult<()> {
        self.add_group(key, group, start, create_key_if_absent)
    }

    async fn read_group(
        &self,
        key: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> StoreResult<Vec<RawEntry>> {
        self.claim(key, group, consumer, count)
    }

    async fn acknowledge(&self, key: &str, group: &str, id: EntryId) -> StoreResult<u64> {
        Ok(self.ack(key, group, id))
    }
}
