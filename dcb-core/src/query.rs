//! Queries: an OR of AND-predicates over event types and tags, plus cursors.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::tag::{EventType, Tag};

/// A position in the canonical event order: `(transaction_id, position)`.
///
/// "After cursor C" means strictly greater than C under the lexicographic
/// order on this pair. The zero cursor means "from the beginning".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Cursor {
    pub transaction_id: i64,
    pub position: i64,
}

impl Cursor {
    pub const START: Cursor = Cursor {
        transaction_id: 0,
        position: 0,
    };

    pub fn new(transaction_id: i64, position: i64) -> Self {
        Self {
            transaction_id,
            position,
        }
    }
}

/// One `(types AND tags)` clause of a [`Query`].
///
/// Matches an event iff (`types` is empty, or the event's type is in
/// `types`) AND every tag in `tags` is present on the event. A query item
/// with no types and no tags matches every event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct QueryItem {
    types: Vec<EventType>,
    tags: Vec<Tag>,
}

impl QueryItem {
    /// Builds a query item, rejecting duplicate `(key, value)` tag pairs.
    pub fn new(types: Vec<EventType>, tags: Vec<Tag>) -> Result<Self, Error> {
        let mut seen = std::collections::HashSet::new();
        for tag in &tags {
            if !seen.insert((tag.key(), tag.value())) {
                return Err(Error::validation(
                    "query_item.tags",
                    format!("duplicate tag {tag}"),
                ));
            }
        }
        Ok(Self { types, tags })
    }

    pub fn types(&self) -> &[EventType] {
        &self.types
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// True for an item with no types and no tags: it matches every event.
    pub fn is_wildcard(&self) -> bool {
        self.types.is_empty() && self.tags.is_empty()
    }

    /// In-process matching, used by the projection engine's dispatch step
    /// and by the in-memory test double; storage backends translate this
    /// into SQL rather than calling it per row.
    pub fn matches(&self, event_type: &EventType, tags: &[Tag]) -> bool {
        let type_ok = self.types.is_empty() || self.types.contains(event_type);
        let tags_ok = self.tags.iter().all(|want| tags.contains(want));
        type_ok && tags_ok
    }
}

/// An ordered collection of [`QueryItem`]s, matched as an OR across items.
///
/// A query with zero items is the *empty query*: it matches nothing, both
/// when used to read events and when used as an append condition's
/// `fail_if_events_match` (in which case the condition can never trigger and
/// the append degenerates to unconditional).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    items: Vec<QueryItem>,
}

impl Query {
    /// Builds a query, normalizing identical items while preserving
    /// first-seen order.
    pub fn new(items: Vec<QueryItem>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let items = items
            .into_iter()
            .filter(|item| seen.insert(item.clone()))
            .collect();
        Self { items }
    }

    pub fn empty() -> Self {
        Self { items: Vec::new() }
    }

    pub fn items(&self) -> &[QueryItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// OR-union of two queries' items, used by the projection engine to
    /// combine multiple projectors' queries into a single underlying read.
    pub fn union(&self, other: &Query) -> Query {
        let mut items = self.items.clone();
        items.extend(other.items.iter().cloned());
        Query::new(items)
    }

    pub fn matches(&self, event_type: &EventType, tags: &[Tag]) -> bool {
        self.items.iter().any(|item| item.matches(event_type, tags))
    }
}
