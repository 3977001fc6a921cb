//! The storage-agnostic `EventStore` contract.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::condition::AppendCondition;
use crate::error::Error;
use crate::event::{InputEvent, StoredEvent};
use crate::query::{Cursor, Query};

/// Isolation level an append runs under; see `EventStore::append_if_isolated`
/// vs `append_if` for when to pick which.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppendMode {
    /// Unconditional, `ReadCommitted`. Highest throughput.
    Append,
    /// Conditional, `RepeatableRead`. The common case for business invariants.
    AppendIf,
    /// Conditional, `Serializable`. For invariants that must not tolerate
    /// the anomalies `RepeatableRead` still allows.
    AppendIfIsolated,
}

/// An event store with Dynamic Consistency Boundaries.
///
/// Implementations must honor batch atomicity (all events in one `append*`
/// call are visible together or not at all), the canonical
/// `(transaction_id, position)` ordering, and the lock-tag fast path
/// described on [`crate::tag::Tag::is_lock`].
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends `events` unconditionally.
    async fn append(&self, events: Vec<InputEvent>) -> Result<Vec<StoredEvent>, Error>;

    /// Appends `events` iff `condition` does not match, running the check
    /// and the insert in one `RepeatableRead` transaction.
    async fn append_if(
        &self,
        events: Vec<InputEvent>,
        condition: AppendCondition,
    ) -> Result<Vec<StoredEvent>, Error>;

    /// As `append_if`, but runs the transaction at `Serializable` isolation.
    async fn append_if_isolated(
        &self,
        events: Vec<InputEvent>,
        condition: AppendCondition,
    ) -> Result<Vec<StoredEvent>, Error>;

    /// Returns every event matching `query`, after `after` if given, in
    /// canonical order.
    async fn query(&self, query: &Query, after: Option<Cursor>) -> Result<Vec<StoredEvent>, Error>;

    /// As `query`, but streamed with bounded buffering.
    fn query_stream<'a>(
        &'a self,
        query: &'a Query,
        after: Option<Cursor>,
    ) -> BoxStream<'a, Result<StoredEvent, Error>>;
}
