use groupstream_types::{EntryId, StoreError};
use thiserror::Error;

/// Errors surfaced by the `try_*` transport operations
#[derive(Error, Debug)]
pub enum TransportError {
    /// The log store rejected or failed a round-trip
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// An entry had no usable payload
    #[error("Malformed entry {id}: {reason}")]
    MalformedEntry { id: EntryId, reason: String },
}

impl TransportError {
    /// The log key a missing-key or missing-group condition points at.
    ///
    /// Typed store errors carry the key directly. Untyped server errors are
    /// matched against the `No such key '<key>'` wording as a fallback.
    pub fn missing_key(&self) -> Option<String> {
        match self {
            TransportError::Store(StoreError::Server(message)) => {
                missing_key_from_message(message).map(str::to_string)
            }
            TransportError::Store(err) => err.missing_key().map(str::to_string),
            TransportError::MalformedEntry { .. } => None,
        }
    }
}

/// Extract the quoted key from a `NOGROUP No such key '<key>' ...` message.
pub fn missing_key_from_message(message: &str) -> Option<&str> {
    const MARKER: &str = "No such key '";

    let start = message.find(MARKER)? + MARKER.len();
    let rest = &message[start..];
    let end = rest.find('\'')?;
    Some(&rest[..end])
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;
