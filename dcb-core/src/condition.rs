//! Append conditions: optimistic concurrency for conditional appends.

use serde::{Deserialize, Serialize};

use crate::query::{Cursor, Query};

/// The append must fail if, at commit time, any event (strictly after
/// `after` if set) matches `fail_if_events_match`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendCondition {
    fail_if_events_match: Query,
    after: Option<Cursor>,
}

impl AppendCondition {
    pub fn new(fail_if_events_match: Query, after: Option<Cursor>) -> Self {
        Self {
            fail_if_events_match,
            after,
        }
    }

    pub fn fail_if_events_match(&self) -> &Query {
        &self.fail_if_events_match
    }

    pub fn after(&self) -> Option<Cursor> {
        self.after
    }
}
