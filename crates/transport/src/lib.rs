//! groupstream - durable stream transport
//!
//! Producers append opaque payloads to a key-addressed append-only log;
//! consumers pull them through consumer groups, acknowledge what they have
//! processed, and keep working when the log is deleted or expires underneath
//! them.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use groupstream::{StreamTransport, TransportConfig};
//! use groupstream_store::MemoryLogStore;
//!
//! let transport = StreamTransport::new(MemoryLogStore::new(), TransportConfig::default());
//!
//! transport.append("orders", "order-1", None).await;
//!
//! for delivery in transport.read_group("orders", "default", "worker-1", None).await {
//!     println!("{} -> {}", delivery.id, delivery.payload);
//!     transport.acknowledge("orders", "default", delivery.id).await;
//! }
//! ```
//!
//! Group provisioning is lazy and cached per transport (see [`InitCache`]).
//! A read that finds the log or its group missing evicts the cache entry,
//! re-provisions, and returns an empty batch; the next poll picks up whatever
//! is appended afterwards.

pub mod config;
pub mod envelope;
pub mod error;
pub mod init;
pub mod stats;
pub mod telemetry;
pub mod transport;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use config::{ConsumerConfig, TransportConfig};
pub use envelope::{Delivery, Envelope};
pub use error::{Result, TransportError, missing_key_from_message};
pub use init::{InitCache, InitOutcome, InitState};
pub use stats::{StatsSnapshot, TransportStats};
pub use telemetry::{TelemetryCarrier, TraceContext, W3cTraceCarrier};
pub use transport::StreamTransport;
pub use worker::{
    ConsumerWorker, FnHandler, HandlerOutcome, MessageHandler, PollSummary, WorkerState,
};

// Re-export the store-facing types so callers need a single dependency
pub use groupstream_types::{EntryId, LogStore, StartPosition, StoreError, TrimStrategy};
