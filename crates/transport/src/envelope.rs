//! Message envelope: the payload plus flat metadata, and its field-set encoding.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use groupstream_types::{
    CONTEXT_FIELD, CREATED_AT_FIELD, EntryId, FieldSet, RESERVED_FIELDS, RawEntry, VALUE_FIELD,
};
use serde::{Deserialize, Serialize};

use crate::{error::TransportError, telemetry::TraceContext};

/// A payload to append, with optional caller metadata.
///
/// Metadata keys become extra entry fields. Keys colliding with the transport's
/// own fields (`value`, `createdAtDateTimeOffset`, `ctx`) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Envelope {
    pub payload: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Envelope {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata field
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Encode as the flat field set written to the log.
    pub fn into_fields(self, created_at: DateTime<Utc>, context: Option<String>) -> FieldSet {
        let mut fields = FieldSet::new();
        fields.insert(VALUE_FIELD.to_string(), self.payload);
        fields.insert(
            CREATED_AT_FIELD.to_string(),
            created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        if let Some(context) = context {
            fields.insert(CONTEXT_FIELD.to_string(), context);
        }
        for (key, value) in self.metadata {
            if !RESERVED_FIELDS.contains(&key.as_str()) {
                fields.insert(key, value);
            }
        }
        fields
    }
}

impl From<String> for Envelope {
    fn from(payload: String) -> Self {
        Envelope::new(payload)
    }
}

impl From<&str> for Envelope {
    fn from(payload: &str) -> Self {
        Envelope::new(payload)
    }
}

/// A message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: EntryId,
    pub payload: String,
    /// Producer-side timestamp, when present and parseable
    pub created_at: Option<DateTime<Utc>>,
    /// Raw telemetry token, when present
    pub context_token: Option<String>,
    /// Producing trace context rebuilt by the transport's carrier
    pub parent: Option<TraceContext>,
    /// Every non-reserved field of the entry
    pub metadata: BTreeMap<String, String>,
}

impl Delivery {
    /// Decode a raw entry. Entries without a non-empty `value` are malformed.
    pub fn from_raw(entry: RawEntry) -> Result<Self, TransportError> {
        let RawEntry { id, mut fields } = entry;

        let payload = match fields.shift_remove(VALUE_FIELD) {
            Some(value) if !value.is_empty() => value,
            Some(_) => {
                return Err(TransportError::MalformedEntry {
                    id,
                    reason: format!("empty '{}' field", VALUE_FIELD),
                });
            }
            None => {
                return Err(TransportError::MalformedEntry {
                    id,
                    reason: format!("missing '{}' field", VALUE_FIELD),
                });
            }
        };

        let created_at = fields
            .shift_remove(CREATED_AT_FIELD)
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let context_token = fields.shift_remove(CONTEXT_FIELD);

        Ok(Self {
            id,
            payload,
            created_at,
            context_token,
            parent: None,
            metadata: fields.into_iter().collect(),
        })
    }

    /// The `(entry id, payload)` pair
    pub fn into_pair(self) -> (EntryId, String) {
        (self.id, self.payload)
    }

    /// Rebuild the envelope the producer appended
    pub fn envelope(&self) -> Envelope {
        Envelope {
            payload: self.payload.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(fields: &[(&str, &str)]) -> RawEntry {
        RawEntry::new(
            EntryId::new(1, 0),
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_into_fields_layout() {
        let created_at = DateTime::parse_from_rfc3339("2024-10-09T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let fields = Envelope::new("hello")
            .with_metadata("tenant", "acme")
            .with_metadata("value", "ignored")
            .into_fields(created_at, Some("token".to_string()));

        let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["value", "createdAtDateTimeOffset", "ctx", "tenant"]);
        assert_eq!(fields["value"], "hello");
        assert_eq!(fields["createdAtDateTimeOffset"], "2024-10-09T12:00:00.000Z");
        assert_eq!(fields["ctx"], "token");
    }

    #[test]
    fn test_into_fields_without_context() {
        let fields = Envelope::new("hello").into_fields(Utc::now(), None);
        assert!(!fields.contains_key("ctx"));
    }

    #[test]
    fn test_delivery_from_raw_tolerates_unknown_fields_and_order() {
        let delivery = Delivery::from_raw(raw(&[
            ("extra", "1"),
            ("ctx", "token"),
            ("createdAtDateTimeOffset", "2024-10-09T12:00:00.000Z"),
            ("value", "hello"),
        ]))
        .unwrap();

        assert_eq!(delivery.payload, "hello");
        assert_eq!(delivery.context_token.as_deref(), Some("token"));
        assert!(delivery.created_at.is_some());
        assert_eq!(delivery.metadata.get("extra").map(String::as_str), Some("1"));
        assert!(delivery.parent.is_none());
    }

    #[test]
    fn test_delivery_keeps_unparseable_timestamp_out() {
        let delivery =
            Delivery::from_raw(raw(&[("value", "x"), ("createdAtDateTimeOffset", "10/9/2024")]))
                .unwrap();
        assert!(delivery.created_at.is_none());
    }

    #[test]
    fn test_delivery_rejects_missing_or_empty_value() {
        assert!(matches!(
            Delivery::from_raw(raw(&[("other", "x")])),
            Err(TransportError::MalformedEntry { .. })
        ));
        assert!(matches!(
            Delivery::from_raw(raw(&[("value", "")])),
            Err(TransportError::MalformedEntry { .. })
        ));
    }

    #[test]
    fn test_delivery_envelope_round_trip() {
        let fields = Envelope::new("hello")
            .with_metadata("tenant", "acme")
            .into_fields(Utc::now(), None);
        let delivery = Delivery::from_raw(RawEntry::new(EntryId::new(1, 0), fields)).unwrap();

        assert_eq!(
            delivery.envelope(),
            Envelope::new("hello").with_metadata("tenant", "acme")
        );
        assert_eq!(
            delivery.into_pair(),
            (EntryId::new(1, 0), "hello".to_string())
        );
    }
}
