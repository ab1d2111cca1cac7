//! The stream transport: append, consumer-group reads, acknowledgment and
//! recovery from logs that disappear underneath their groups.

use std::sync::Arc;

use chrono::Utc;
use groupstream_types::{EntryId, LogStore, RawEntry, TrimStrategy, VALUE_FIELD};
use tracing::{debug, debug_span, error, warn};

use crate::{
    config::TransportConfig,
    envelope::{Delivery, Envelope},
    error::{Result, TransportError},
    init::{InitCache, InitOutcome},
    stats::{TransportStats, add, bump},
    telemetry::TelemetryCarrier,
};

/// Durable stream transport over a [`LogStore`].
///
/// Share one instance between every producer and consumer task of a process.
/// Provisioning is lazy: appending to or reading from a log creates the log and
/// its consumer group on first use.
///
/// The plain operations never fail. [`append`](Self::append) returns `None`,
/// [`read_group`](Self::read_group) an empty batch and
/// [`acknowledge`](Self::acknowledge) nothing when the store misbehaves; the
/// error is logged and the caller retries on its own schedule. The `try_*`
/// variants return the error instead.
pub struct StreamTransport {
    store: Arc<dyn LogStore>,
    config: TransportConfig,
    cache: InitCache,
    carrier: Option<Arc<dyn TelemetryCarrier>>,
    stats: TransportStats,
}

impl StreamTransport {
    pub fn new(store: Arc<dyn LogStore>, config: TransportConfig) -> Self {
        Self {
            store,
            config,
            cache: InitCache::new(),
            carrier: None,
            stats: TransportStats::default(),
        }
    }

    /// Propagate trace contexts through the `ctx` field
    pub fn with_carrier(mut self, carrier: Arc<dyn TelemetryCarrier>) -> Self {
        self.carrier = Some(carrier);
        self
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn cache(&self) -> &InitCache {
        &self.cache
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Make sure `group` exists on `key`. Returns whether the pair is confirmed.
    pub async fn ensure_initialized(&self, key: &str, group: &str) -> bool {
        self.ensure(key, group).await.is_confirmed()
    }

    async fn ensure(&self, key: &str, group: &str) -> InitOutcome {
        let outcome = self
            .cache
            .ensure(&*self.store, key, group, self.config.start_position)
            .await;
        if outcome == InitOutcome::Created {
            bump(&self.stats.groups_created);
        }
        outcome
    }

    /// Append a payload. Returns the new entry id, or `None` if the store
    /// rejected the write.
    pub async fn append(
        &self,
        key: &str,
        payload: impl Into<String>,
        max_length: Option<usize>,
    ) -> Option<EntryId> {
        self.append_envelope(key, Envelope::new(payload), max_length)
            .await
    }

    /// Append a payload with metadata. See [`append`](Self::append).
    pub async fn append_envelope(
        &self,
        key: &str,
        envelope: Envelope,
        max_length: Option<usize>,
    ) -> Option<EntryId> {
        self.try_append(key, envelope, max_length).await.ok()
    }

    /// Append a payload with metadata, returning store failures.
    pub async fn try_append(
        &self,
        key: &str,
        envelope: Envelope,
        max_length: Option<usize>,
    ) -> Result<EntryId> {
        self.ensure(key, &self.config.default_group).await;

        let context = self.carrier.as_ref().and_then(|carrier| carrier.inject());
        let fields = envelope.into_fields(Utc::now(), context);
        let payload = fields.get(VALUE_FIELD).cloned().unwrap_or_default();
        let trim = TrimStrategy::Approximate(max_length.unwrap_or(self.config.max_length));

        match self.store.append(key, fields, trim).await {
            Ok(id) => {
                bump(&self.stats.appends);
                debug!(key = %key, id = %id, "Appended entry");
                Ok(id)
            }
            Err(e) => {
                bump(&self.stats.append_failures);
                error!(key = %key, payload = %payload, error = %e, "Failed to append entry");
                Err(e.into())
            }
        }
    }

    /// Read up to `max_count` new entries for `consumer` (transport default
    /// when `None`). Malformed entries are dropped; a vanished log is
    /// re-provisioned and yields an empty batch.
    pub async fn read_group(
        &self,
        key: &str,
        group: &str,
        consumer: &str,
        max_count: Option<usize>,
    ) -> Vec<Delivery> {
        match self.try_read_group(key, group, consumer, max_count).await {
            Ok(deliveries) => deliveries,
            Err(e) => {
                error!(
                    key = %key,
                    group = %group,
                    consumer = %consumer,
                    error = %e,
                    "Failed to read from consumer group"
                );
                Vec::new()
            }
        }
    }

    /// Like [`read_group`](Self::read_group) but returns store failures other
    /// than a missing log or group.
    pub async fn try_read_group(
        &self,
        key: &str,
        group: &str,
        consumer: &str,
        max_count: Option<usize>,
    ) -> Result<Vec<Delivery>> {
        self.ensure(key, group).await;

        let count = max_count.unwrap_or(self.config.read_count);
        let raw = match self.store.read_group(key, group, consumer, count).await {
            Ok(raw) => raw,
            Err(e) => {
                let err = TransportError::from(e);
                if let Some(missing) = err.missing_key() {
                    self.recover(key, group, consumer, &missing, &err).await;
                    return Ok(Vec::new());
                }
                bump(&self.stats.read_failures);
                return Err(err);
            }
        };

        let deliveries = self.decode_batch(key, group, raw);
        add(&self.stats.deliveries, deliveries.len() as u64);

        if self.config.auto_ack {
            for delivery in &deliveries {
                self.acknowledge(key, group, delivery.id).await;
            }
        }

        Ok(deliveries)
    }

    async fn recover(
        &self,
        key: &str,
        group: &str,
        consumer: &str,
        missing: &str,
        err: &TransportError,
    ) {
        warn!(
            key = %key,
            group = %group,
            consumer = %consumer,
            missing = %missing,
            error = %err,
            "Consumer group is gone, re-provisioning"
        );
        bump(&self.stats.recoveries);

        self.cache.evict(missing).await;
        if missing != key {
            self.cache.evict(key).await;
        }
        self.ensure(key, group).await;
    }

    fn decode_batch(&self, key: &str, group: &str, raw: Vec<RawEntry>) -> Vec<Delivery> {
        let mut deliveries = Vec::with_capacity(raw.len());

        for entry in raw {
            let mut delivery = match Delivery::from_raw(entry) {
                Ok(delivery) => delivery,
                Err(e) => {
                    bump(&self.stats.malformed_dropped);
                    warn!(key = %key, group = %group, error = %e, "Dropping malformed entry");
                    continue;
                }
            };

            if let (Some(carrier), Some(token)) = (&self.carrier, &delivery.context_token) {
                delivery.parent = carrier.extract(token);
            }

            match &delivery.parent {
                Some(parent) => {
                    let span = debug_span!(
                        "stream_read",
                        key = %key,
                        group = %group,
                        id = %delivery.id,
                        trace_id = %parent.trace_id_hex(),
                        parent_span_id = %parent.span_id_hex(),
                    );
                    let _entered = span.enter();
                    debug!("Delivered entry");
                }
                None => debug!(key = %key, group = %group, id = %delivery.id, "Delivered entry"),
            }

            deliveries.push(delivery);
        }

        deliveries
    }

    /// Acknowledge a delivered entry. Failures are logged, never returned.
    pub async fn acknowledge(&self, key: &str, group: &str, id: EntryId) {
        if let Err(e) = self.try_acknowledge(key, group, id).await {
            error!(key = %key, group = %group, id = %id, error = %e, "Failed to acknowledge entry");
        }
    }

    /// Acknowledge a delivered entry, returning how many entries the store
    /// cleared (0 for unknown or already acknowledged ids).
    pub async fn try_acknowledge(&self, key: &str, group: &str, id: EntryId) -> Result<u64> {
        if self.ensure(key, group).await == InitOutcome::Created {
            bump(&self.stats.acks_into_fresh_group);
            warn!(
                key = %key,
                group = %group,
                id = %id,
                "Acknowledging into a consumer group that had to be created"
            );
        }

        match self.store.acknowledge(key, group, id).await {
            Ok(acked) => {
                add(&self.stats.acks, acked);
                Ok(acked)
            }
            Err(e) => {
                bump(&self.stats.ack_failures);
                Err(e.into())
            }
        }
    }
}
