//! Shared types for groupstream.
//!
//! This crate holds the vocabulary spoken between the stream transport and a
//! log store: entry identifiers, raw entries, the reserved field names of the
//! message envelope, and the [`LogStore`] capability trait every backing store
//! implements.

pub mod entry;
pub mod store;

pub use entry::{EntryId, FieldSet, RawEntry};
pub use store::{LogStore, StartPosition, StoreError, StoreResult, TrimStrategy};

/// Field holding the opaque payload string.
pub const VALUE_FIELD: &str = "value";

/// Field holding the producer-side creation timestamp (RFC 3339, UTC).
pub const CREATED_AT_FIELD: &str = "createdAtDateTimeOffset";

/// Field holding the optional telemetry propagation token.
pub const CONTEXT_FIELD: &str = "ctx";

/// Field names owned by the transport. Caller metadata never overrides them.
pub const RESERVED_FIELDS: [&str; 3] = [VALUE_FIELD, CREATED_AT_FIELD, CONTEXT_FIELD];

/// Defaults shared by producers and consumers.
pub mod defaults {
    /// Approximate upper bound on log length applied on append.
    pub const MAX_LENGTH: usize = 10_000;

    /// Maximum number of entries returned by one group read.
    pub const READ_COUNT: usize = 1_000;

    /// Consumer polling cadence in milliseconds.
    pub const POLL_INTERVAL_MS: u64 = 500;
}
