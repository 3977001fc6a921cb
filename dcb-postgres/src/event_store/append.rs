//! SQL insert-building for the append pipeline.
//!
//! Mirrors the teacher's `InsertEventsBuilder`
//! (`disintegrate-postgres::event_store::append`): a `sqlx::QueryBuilder`
//! fed through `push_values`/`push_bind`, with a `RETURNING` clause handing
//! back the columns the database itself assigns.

use dcb_core::InputEvent;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

/// Builds a single multi-row `INSERT INTO events (...) VALUES (...), (...)
/// RETURNING position, transaction_id, occurred_at` statement for one append
/// batch. `ids` supplies the opaque event id generated client-side for each
/// event, in the same order as `events`. Only matching tags are persisted to
/// the `tags` column, sorted; lock tags exist solely to drive the
/// advisory-lock fast path and never need to be queried back.
pub fn build_insert<'a>(ids: &'a [Uuid], events: &'a [InputEvent]) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new("INSERT INTO events (id, event_type, tags, data) ");
    builder.push_values(ids.iter().zip(events.iter()), |mut b, (id, event)| {
        b.push_bind(*id);
        b.push_bind(event.event_type().as_str().to_string());
        let mut tags: Vec<String> = event.matching_tags().map(|t| t.canonical()).collect();
        tags.sort_unstable();
        b.push_bind(tags);
        b.push_bind(event.data().to_vec());
    });
    builder.push(" RETURNING position, transaction_id, occurred_at");
    builder
}
