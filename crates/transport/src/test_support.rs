//! Store wrapper used by the tests: counts round-trips and injects failures.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use groupstream_store::MemoryLogStore;
use groupstream_types::{
    EntryId, FieldSet, LogStore, RawEntry, StartPosition, StoreError, StoreResult, TrimStrategy,
};
use parking_lot::Mutex;

pub struct CountingStore {
    inner: Arc<MemoryLogStore>,
    appends: AtomicUsize,
    key_exists: AtomicUsize,
    create_groups: AtomicUsize,
    reads: AtomicUsize,
    acks: AtomicUsize,
    fail_appends: AtomicBool,
    fail_creates: AtomicBool,
    fail_acks: AtomicBool,
    hide_keys: AtomicBool,
    next_read_error: Mutex<Option<StoreError>>,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Self::wrap(MemoryLogStore::new())
    }

    pub fn wrap(inner: Arc<MemoryLogStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            appends: AtomicUsize::new(0),
            key_exists: AtomicUsize::new(0),
            create_groups: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            acks: AtomicUsize::new(0),
            fail_appends: AtomicBool::new(false),
            fail_creates: AtomicBool::new(false),
            fail_acks: AtomicBool::new(false),
            hide_keys: AtomicBool::new(false),
            next_read_error: Mutex::new(None),
        })
    }

    pub fn inner(&self) -> &Arc<MemoryLogStore> {
        &self.inner
    }

    pub fn append_calls(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    pub fn key_exists_calls(&self) -> usize {
        self.key_exists.load(Ordering::SeqCst)
    }

    pub fn create_group_calls(&self) -> usize {
        self.create_groups.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn ack_calls(&self) -> usize {
        self.acks.load(Ordering::SeqCst)
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_acks(&self, fail: bool) {
        self.fail_acks.store(fail, Ordering::SeqCst);
    }

    /// Report every key as missing from `key_exists`
    pub fn hide_keys(&self, hide: bool) {
        self.hide_keys.store(hide, Ordering::SeqCst);
    }

    /// Fail the next `read_group` call with `err`
    pub fn fail_next_read(&self, err: StoreError) {
        *self.next_read_error.lock() = Some(err);
    }

    fn unavailable(op: &str) -> StoreError {
        StoreError::Unavailable(format!("{} refused", op))
    }
}

#[async_trait]
impl LogStore for CountingStore {
    async fn append(
        &self,
        key: &str,
        fields: FieldSet,
        trim: TrimStrategy,
    ) -> StoreResult<EntryId> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(Self::unavailable("append"));
        }
        self.inner.append(key, fields, trim).await
    }

    async fn key_exists(&self, key: &str) -> StoreResult<bool> {
        self.key_exists.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.hide_keys.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.inner.key_exists(key).await
    }

    async fn group_names(&self, key: &str) -> StoreResult<Vec<String>> {
        tokio::task::yield_now().await;
        self.inner.group_names(key).await
    }

    async fn create_group(
        &self,
        key: &str,
        group: &str,
        start: StartPosition,
        create_key_if_absent: bool,
    ) -> StoreResult<()> {
        self.create_groups.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(Self::unavailable("create_group"));
        }
        self.inner
            .create_group(key, group, start, create_key_if_absent)
            .await
    }

    async fn read_group(
        &self,
        key: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> StoreResult<Vec<RawEntry>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let injected = self.next_read_error.lock().take();
        if let Some(err) = injected {
            return Err(err);
        }
        self.inner.read_group(key, group, consumer, count).await
    }

    async fn acknowledge(&self, key: &str, group: &str, id: EntryId) -> StoreResult<u64> {
        self.acks.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_acks.load(Ordering::SeqCst) {
            return Err(Self::unavailable("acknowledge"));
        }
        self.inner.acknowledge(key, group, id).await
    }
}
