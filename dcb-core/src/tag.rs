//! Tags and event types: the vocabulary a [`crate::Query`] matches against.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

const MAX_TAG_KEY_LEN: usize = 64;
const MAX_TAG_VALUE_LEN: usize = 128;
const MAX_EVENT_TYPE_LEN: usize = 255;

/// Reserved tag-key prefix. Tags whose key starts with this prefix never
/// participate in query matching; they only drive the advisory-lock fast
/// path in the append pipeline.
pub const LOCK_TAG_PREFIX: &str = "lock";

/// A `(key, value)` pair attached to an event.
///
/// Tags are the unit of matching in a [`crate::Query`]: an event matches a
/// query item only if every tag the item asks for is present on the event.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    key: String,
    value: String,
}

impl Tag {
    /// Builds a new tag, validating key and value length and charset.
    ///
    /// The key may not contain `:` since that is the separator used by the
    /// canonical wire form (`key:value`); without this constraint the
    /// canonical form could not be parsed back unambiguously.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self, Error> {
        let key = key.into();
        let value = value.into();
        if key.is_empty() {
            return Err(Error::validation("tag.key", "must not be empty"));
        }
        if key.len() > MAX_TAG_KEY_LEN {
            return Err(Error::validation(
                "tag.key",
                format!("must be at most {MAX_TAG_KEY_LEN} bytes"),
            ));
        }
        if key.contains(':') {
            return Err(Error::validation("tag.key", "must not contain ':'"));
        }
        if value.len() > MAX_TAG_VALUE_LEN {
            return Err(Error::validation(
                "tag.value",
                format!("must be at most {MAX_TAG_VALUE_LEN} bytes"),
            ));
        }
        Ok(Self { key, value })
    }

    /// Whether this tag's key carries the reserved `lock` prefix.
    pub fn is_lock(&self) -> bool {
        self.key.starts_with(LOCK_TAG_PREFIX)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Canonical `key:value` form used both for Postgres array storage and
    /// for advisory-lock key derivation.
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.key, self.value)
    }

    /// Parses a tag back out of its canonical `key:value` form. Splits on
    /// the first `:` only, since a tag key can never contain one but a
    /// value may.
    pub fn parse_canonical(raw: &str) -> Result<Self, Error> {
        let (key, value) = raw
            .split_once(':')
            .ok_or_else(|| Error::validation("tag", format!("malformed canonical tag: {raw}")))?;
        Tag::new(key, value)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

/// A short identifier naming the kind of business event (e.g. `"OrderPlaced"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventType(String);

impl EventType {
    pub fn new(value: impl Into<String>) -> Result<Self, Error> {
        let value = value.into();
        if value.is_empty() {
            return Err(Error::validation("event_type", "must not be empty"));
        }
        if value.len() > MAX_EVENT_TYPE_LEN {
            return Err(Error::validation(
                "event_type",
                format!("must be at most {MAX_EVENT_TYPE_LEN} bytes"),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_colon_in_key() {
        assert!(Tag::new("a:b", "v").is_err());
    }

    #[test]
    fn accepts_empty_value() {
        let tag = Tag::new("status", "").unwrap();
        assert_eq!(tag.canonical(), "status:");
    }

    #[test]
    fn lock_prefix_is_detected() {
        let tag = Tag::new("lockAccount", "42").unwrap();
        assert!(tag.is_lock());
        let tag = Tag::new("account", "42").unwrap();
        assert!(!tag.is_lock());
    }

    #[test]
    fn event_type_rejects_empty() {
        assert!(EventType::new("").is_err());
    }

    #[test]
    fn canonical_round_trips_through_parse() {
        let tag = Tag::new("region", "eu:west").unwrap();
        let parsed = Tag::parse_canonical(&tag.canonical()).unwrap();
        assert_eq!(tag, parsed);
    }
}
