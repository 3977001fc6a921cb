//! Turns a `dcb_core::Query` into a single SQL statement and streams the
//! matching rows.
//!
//! Grounded in the teacher's `PgEventStore::stream_with`
//! (`disintegrate-postgres::event_store`), which drives an `async_stream`
//! generator off a raw `sqlx::query(...).fetch(executor)` row stream. We
//! drop the teacher's "epoch" snapshot marker (`StreamItem::End`): that
//! construct exists there to support the `listener`'s incremental resync,
//! which is out of scope here.

use async_stream::stream;
use dcb_core::{Cursor, Error as CoreError, EventType, Query, StoredEvent, Tag};
use futures::stream::BoxStream;
use futures::StreamExt;
use sqlx::{PgExecutor, Postgres, QueryBuilder, Row};

use super::query_builder::{push_cursor_predicate, push_query_predicate};
use crate::Error;

/// Streams every event matching `query`, after `after` if given, in
/// canonical `(transaction_id, position)` order.
pub fn stream_events<'a, EX>(
    executor: EX,
    query: &'a Query,
    after: Option<Cursor>,
) -> BoxStream<'a, Result<StoredEvent, CoreError>>
where
    EX: PgExecutor<'a> + 'a,
{
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT position, transaction_id, id, event_type, tags, data, occurred_at FROM events WHERE ",
    );
    push_cursor_predicate(&mut builder, after);
    builder.push(" AND ");
    push_query_predicate(&mut builder, query);
    builder.push(" ORDER BY transaction_id ASC, position ASC");

    stream! {
        let built = builder.build();
        let mut rows = built.fetch(executor);
        while let Some(row) = rows.next().await {
            match row {
                Ok(row) => yield row_to_event(&row).map_err(CoreError::from),
                Err(err) => {
                    yield Err(CoreError::from(Error::Database(err)));
                    return;
                }
            }
        }
    }
    .boxed()
}

pub(crate) fn row_to_event(row: &sqlx::postgres::PgRow) -> Result<StoredEvent, Error> {
    let raw_tags: Vec<String> = row.try_get("tags")?;
    let tags = raw_tags
        .iter()
        .map(|t| Tag::parse_canonical(t))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| match e {
            CoreError::Validation { field, reason } => Error::Validation { field, reason },
            _ => Error::Validation {
                field: "tags".into(),
                reason: "malformed stored tag".into(),
            },
        })?;
    let event_type_raw: String = row.try_get("event_type")?;
    let event_type = EventType::new(event_type_raw).map_err(|e| match e {
        CoreError::Validation { field, reason } => Error::Validation { field, reason },
        _ => Error::Validation {
            field: "event_type".into(),
            reason: "malformed stored event type".into(),
        },
    })?;

    Ok(StoredEvent {
        id: row.try_get("id")?,
        event_type,
        tags,
        data: row.try_get("data")?,
        position: row.try_get("position")?,
        transaction_id: row.try_get("transaction_id")?,
        occurred_at: row.try_get("occurred_at")?,
    })
}
