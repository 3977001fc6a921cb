//! Input and stored event shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::query::Cursor;
use crate::tag::{EventType, Tag};

/// An event as supplied by the caller, not yet persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputEvent {
    event_type: EventType,
    tags: Vec<Tag>,
    data: Vec<u8>,
}

impl InputEvent {
    pub fn new(event_type: EventType, tags: Vec<Tag>, data: Vec<u8>) -> Result<Self, Error> {
        let mut seen = std::collections::HashSet::new();
        for tag in &tags {
            if !seen.insert((tag.key(), tag.value())) {
                return Err(Error::validation(
                    "input_event.tags",
                    format!("duplicate tag {tag}"),
                ));
            }
        }
        Ok(Self {
            event_type,
            tags,
            data,
        })
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Tags that participate in query matching (i.e. not reserved lock tags).
    pub fn matching_tags(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter().filter(|t| !t.is_lock())
    }

    /// Tags that drive the advisory-lock fast path.
    pub fn lock_tags(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter().filter(|t| t.is_lock())
    }
}

/// An event as returned by the store, carrying its assigned position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: uuid::Uuid,
    pub event_type: EventType,
    pub tags: Vec<Tag>,
    pub data: Vec<u8>,
    pub position: i64,
    pub transaction_id: i64,
    pub occurred_at: DateTime<Utc>,
}

impl StoredEvent {
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.transaction_id, self.position)
    }
}
