use std::{fmt, str::FromStr};

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::store::StoreError;

/// Flat field set of an entry, in the order the producer wrote it.
pub type FieldSet = IndexMap<String, String>;

/// Store-assigned identifier of a log entry.
///
/// Formatted as `<millis>-<seq>`. Ids are totally ordered by `(millis, seq)` and
/// strictly increase within one log. `0-0` is the smallest id and is never
/// assigned to an entry, which makes it usable as a "beginning of log" anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntryId {
    pub millis: u64,
    pub seq: u64,
}

impl EntryId {
    /// The oldest possible position in any log.
    pub const MIN: EntryId = EntryId { millis: 0, seq: 0 };

    pub fn new(millis: u64, seq: u64) -> Self {
        Self { millis, seq }
    }

    /// Next id to assign after `last`, given the current wall clock.
    ///
    /// When the clock stalls or runs backwards the millisecond part is held and
    /// the sequence incremented, so ids never go down.
    pub fn next_after(last: EntryId, now_millis: u64) -> Self {
        if now_millis > last.millis {
            Self::new(now_millis, 0)
        } else {
            Self::new(last.millis, last.seq + 1)
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.millis, self.seq)
    }
}

impl FromStr for EntryId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StoreError::InvalidEntryId(s.to_string());
        let (millis, seq) = match s.split_once('-') {
            Some((millis, seq)) => (millis, seq),
            // A bare millisecond part means sequence 0
            None => (s, "0"),
        };
        let millis = millis.parse().map_err(|_| invalid())?;
        let seq = seq.parse().map_err(|_| invalid())?;
        Ok(Self { millis, seq })
    }
}

impl Serialize for EntryId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntryId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// An entry as handed back by a store read, before any envelope decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    pub id: EntryId,
    pub fields: FieldSet,
}

impl RawEntry {
    pub fn new(id: EntryId, fields: FieldSet) -> Self {
        Self { id, fields }
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}
