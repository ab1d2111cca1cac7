//! Initialization cache and the provisioning state machine.
//!
//! Before a log is touched its consumer group must exist. The cache remembers
//! which `(log, group)` pairs this transport has confirmed so the steady-state
//! path costs no store round-trip. The store stays authoritative: a read that
//! proves a log is gone evicts every pair of that log.
//!
//! ```text
//!  Unknown ──ensure──▶ Initializing ──ok──▶ Confirmed
//!     ▲                     │                   │
//!     └──────error──────────┘                   │
//!     └─────────────────evict───────────────────┘
//! ```

use std::collections::HashMap;

use groupstream_types::{LogStore, StartPosition, StoreError, StoreResult};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Provisioning state of one `(log, group)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Unknown,
    Initializing,
    Confirmed,
}

/// What an `ensure` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// Already confirmed; no store round-trip
    Cached,
    /// The store already had the group
    AlreadyPresent,
    /// The group (and possibly the log) was created by this call
    Created,
    /// Provisioning failed; the next call retries
    Failed,
}

impl InitOutcome {
    pub fn is_confirmed(&self) -> bool {
        !matches!(self, InitOutcome::Failed)
    }
}

/// Per-transport record of provisioned consumer groups.
pub struct InitCache {
    states: RwLock<HashMap<(String, String), InitState>>,
    /// Serializes the Unknown -> Confirmed transition across all keys
    init_lock: Mutex<()>,
}

impl InitCache {
    pub fn new() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            init_lock: Mutex::new(()),
        }
    }

    /// Current state of a pair
    pub fn state(&self, key: &str, group: &str) -> InitState {
        self.states
            .read()
            .get(&(key.to_string(), group.to_string()))
            .copied()
            .unwrap_or(InitState::Unknown)
    }

    pub fn is_confirmed(&self, key: &str, group: &str) -> bool {
        self.state(key, group) == InitState::Confirmed
    }

    /// Forget every group of a log. Returns how many pairs were dropped.
    ///
    /// Waits for provisioning in flight, so a confirm that raced with the
    /// eviction cannot survive it.
    pub async fn evict(&self, key: &str) -> usize {
        let _guard = self.init_lock.lock().await;
        let mut states = self.states.write();
        let before = states.len();
        states.retain(|(k, _), _| k != key);
        before - states.len()
    }

    /// Confirmed pairs, sorted
    pub fn confirmed(&self) -> Vec<(String, String)> {
        let states = self.states.read();
        let mut pairs: Vec<(String, String)> = states
            .iter()
            .filter(|(_, state)| **state == InitState::Confirmed)
            .map(|(pair, _)| pair.clone())
            .collect();
        pairs.sort();
        pairs
    }

    /// Make sure `group` exists on `key`, creating both if needed.
    ///
    /// Store errors are logged and reported as [`InitOutcome::Failed`]; the pair
    /// stays unconfirmed so a later call retries.
    pub async fn ensure<S>(
        &self,
        store: &S,
        key: &str,
        group: &str,
        start: StartPosition,
    ) -> InitOutcome
    where
        S: LogStore + ?Sized,
    {
        if self.is_confirmed(key, group) {
            return InitOutcome::Cached;
        }

        let _guard = self.init_lock.lock().await;

        // Another task may have finished while we waited
        if self.is_confirmed(key, group) {
            return InitOutcome::Cached;
        }

        self.set(key, group, InitState::Initializing);

        match provision(store, key, group, start).await {
            Ok(created) => {
                self.set(key, group, InitState::Confirmed);
                if created {
                    InitOutcome::Created
                } else {
                    InitOutcome::AlreadyPresent
                }
            }
            Err(e) => {
                error!(key = %key, group = %group, error = %e, "Failed to initialize consumer group");
                self.clear(key, group);
                InitOutcome::Failed
            }
        }
    }

    fn set(&self, key: &str, group: &str, state: InitState) {
        self.states
            .write()
            .insert((key.to_string(), group.to_string()), state);
    }

    fn clear(&self, key: &str, group: &str) {
        self.states
            .write()
            .remove(&(key.to_string(), group.to_string()));
    }
}

impl Default for InitCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns whether a group had to be created.
async fn provision<S>(store: &S, key: &str, group: &str, start: StartPosition) -> StoreResult<bool>
where
    S: LogStore + ?Sized,
{
    let registered = if store.key_exists(key).await? {
        match store.group_names(key).await {
            Ok(names) => names.iter().any(|name| name == group),
            // Deleted between the two calls
            Err(StoreError::NoSuchKey(_)) => false,
            Err(e) => return Err(e),
        }
    } else {
        false
    };

    if registered {
        debug!(key = %key, group = %group, "Consumer group already registered");
        return Ok(false);
    }

    match store.create_group(key, group, start, true).await {
        Ok(()) => {
            info!(key = %key, group = %group, start = %start, "Provisioned consumer group");
            Ok(true)
        }
        Err(StoreError::GroupExists { .. }) => {
            debug!(key = %key, group = %group, "Consumer group created concurrently");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use groupstream_store::MemoryLogStore;

    use super::*;
    use crate::test_support::CountingStore;

    #[tokio::test]
    async fn test_ensure_creates_then_caches() {
        let store = CountingStore::new();
        let cache = InitCache::new();

        let first = cache
            .ensure(&*store, "orders", "g1", StartPosition::Beginning)
            .await;
        let second = cache
            .ensure(&*store, "orders", "g1", StartPosition::Beginning)
            .await;

        assert_eq!(first, InitOutcome::Created);
        assert_eq!(second, InitOutcome::Cached);
        assert_eq!(store.create_group_calls(), 1);
        assert_eq!(store.key_exists_calls(), 1);
        assert!(cache.is_confirmed("orders", "g1"));
        assert!(store.inner().has("orders"));
    }

    #[tokio::test]
    async fn test_ensure_detects_existing_group() {
        let store = CountingStore::new();
        store
            .inner()
            .add_group("orders", "g1", StartPosition::Beginning, true)
            .unwrap();
        let cache = InitCache::new();

        let outcome = cache
            .ensure(&*store, "orders", "g1", StartPosition::Beginning)
            .await;

        assert_eq!(outcome, InitOutcome::AlreadyPresent);
        assert_eq!(store.create_group_calls(), 0);
        assert!(cache.is_confirmed("orders", "g1"));
    }

    #[tokio::test]
    async fn test_ensure_treats_group_exists_as_success() {
        // A store that claims the key is missing but rejects the create
        let store = CountingStore::new();
        store
            .inner()
            .add_group("orders", "g1", StartPosition::Beginning, true)
            .unwrap();
        store.hide_keys(true);
        let cache = InitCache::new();

        let outcome = cache
            .ensure(&*store, "orders", "g1", StartPosition::Beginning)
            .await;

        assert_eq!(outcome, InitOutcome::AlreadyPresent);
        assert_eq!(store.create_group_calls(), 1);
        assert!(cache.is_confirmed("orders", "g1"));
    }

    #[tokio::test]
    async fn test_ensure_failure_leaves_pair_unknown_and_retries() {
        let store = CountingStore::new();
        store.fail_creates(true);
        let cache = InitCache::new();

        let outcome = cache
            .ensure(&*store, "orders", "g1", StartPosition::Beginning)
            .await;
        assert_eq!(outcome, InitOutcome::Failed);
        assert_eq!(cache.state("orders", "g1"), InitState::Unknown);

        store.fail_creates(false);
        let outcome = cache
            .ensure(&*store, "orders", "g1", StartPosition::Beginning)
            .await;
        assert_eq!(outcome, InitOutcome::Created);
        assert_eq!(store.create_group_calls(), 2);
    }

    #[tokio::test]
    async fn test_groups_on_one_log_are_tracked_separately() {
        let store = MemoryLogStore::new();
        let cache = InitCache::new();

        cache
            .ensure(&*store, "orders", "g1", StartPosition::Beginning)
            .await;
        assert!(cache.is_confirmed("orders", "g1"));
        assert!(!cache.is_confirmed("orders", "g2"));

        let outcome = cache
            .ensure(&*store, "orders", "g2", StartPosition::Beginning)
            .await;
        assert_eq!(outcome, InitOutcome::Created);
        assert_eq!(
            store.groups_of("orders").unwrap(),
            vec!["g1".to_string(), "g2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_evict_drops_all_groups_of_a_log() {
        let store = MemoryLogStore::new();
        let cache = InitCache::new();
        for (key, group) in [("orders", "g1"), ("orders", "g2"), ("payments", "g1")] {
            cache.ensure(&*store, key, group, StartPosition::Beginning).await;
        }

        assert_eq!(cache.evict("orders").await, 2);
        assert_eq!(cache.state("orders", "g1"), InitState::Unknown);
        assert_eq!(
            cache.confirmed(),
            vec![("payments".to_string(), "g1".to_string())]
        );
        assert_eq!(cache.evict("orders").await, 0);
    }

    #[tokio::test]
    async fn test_evict_waits_for_provisioning_in_flight() {
        let cache = Arc::new(InitCache::new());

        let guard = cache.init_lock.lock().await;
        cache.set("orders", "g1", InitState::Confirmed);

        let evicting = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.evict("orders").await })
        };
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(!evicting.is_finished());
        assert!(cache.is_confirmed("orders", "g1"));

        drop(guard);
        assert_eq!(evicting.await.unwrap(), 1);
        assert_eq!(cache.state("orders", "g1"), InitState::Unknown);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ensure_creates_once() {
        let store = CountingStore::new();
        let cache = Arc::new(InitCache::new());

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let store = Arc::clone(&store);
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    cache
                        .ensure(&*store, "orders", "g1", StartPosition::Beginning)
                        .await
                })
            })
            .collect();

        let outcomes: Vec<InitOutcome> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(store.create_group_calls(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == InitOutcome::Created)
                .count(),
            1
        );
        assert!(outcomes.iter().all(InitOutcome::is_confirmed));
    }
}
