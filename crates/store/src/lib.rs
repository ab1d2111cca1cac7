//! In-process log store
//!
//! A thread-safe, in-memory implementation of the [`LogStore`] capability:
//! key-addressed append-only logs with server-side consumer-group bookkeeping.
//!
//! # Features
//!
//! - **Lazy logs**: appending to or creating a group on an absent key creates the log
//! - **Consumer groups**: per-group delivery cursor and pending-entries list
//! - **Approximate trimming**: logs are cut in whole chunks, never below the bound
//! - **TTL/Expiration**: logs expire and are dropped together with their groups
//! - **Admin surface**: an HTTP router to inspect logs and delete or expire them
//!
//! # Example
//!
//! ```rust,no_run
//! use groupstream_store::{server, AdminOptions, MemoryLogStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryLogStore::new();
//!     server::start_server(store, AdminOptions::default()).await.unwrap();
//! }
//! ```
//!
//! # Admin protocol
//!
//! ```text
//! GET /logs                 -> ["orders", ...]
//! GET /logs/orders          -> {"key": "orders", "length": 42, ...}
//! GET /logs/orders/groups   -> [{"name": "workers", "pending": 3, ...}]
//! DELETE /logs/orders       -> 204 No Content
//! PUT /logs/orders/ttl  30  -> 204 No Content
//! ```

pub mod server;
pub mod store;
pub mod types;

pub use groupstream_types::LogStore;
pub use server::{AppState, create_router, start_server};
pub use store::MemoryLogStore;
pub use types::{AdminOptions, GroupInfo, LogInfo, LogLifecycleEvent, TRIM_CHUNK};
